//! Delivery sweep over queued emails.
//!
//! Every attempt is written back before the next email is touched, so the
//! attempt count and last transport status survive a crash mid-sweep.

use std::sync::Arc;

use uuid::Uuid;

use super::transport::MailTransport;
use crate::error::AppResult;
use crate::models::{AttemptOutcome, Email, EmailStatus};
use crate::repositories::EmailStore;
use crate::utils::Clock;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendReport {
    pub fetched: usize,
    pub sent: usize,
    /// Failed, still `New`
    pub retrying: usize,
    /// Failed for the last time, now `Error`
    pub gave_up: usize,
    /// Could not be written back
    pub errors: usize,
}

impl SendReport {
    fn record(&mut self, outcome: AttemptOutcome) {
        match outcome {
            AttemptOutcome::Sent => self.sent += 1,
            AttemptOutcome::WillRetry { .. } => self.retrying += 1,
            AttemptOutcome::GaveUp { .. } => self.gave_up += 1,
        }
    }
}

#[derive(Clone)]
pub struct EmailSender {
    emails: Arc<dyn EmailStore>,
    transport: Arc<dyn MailTransport>,
    clock: Arc<dyn Clock>,
    max_retries: u32,
}

impl EmailSender {
    pub fn new(
        emails: Arc<dyn EmailStore>,
        transport: Arc<dyn MailTransport>,
        clock: Arc<dyn Clock>,
        max_retries: u32,
    ) -> Self {
        Self {
            emails,
            transport,
            clock,
            max_retries,
        }
    }

    /// Attempts up to `fetch_size` pending emails once each.
    ///
    /// A failure to fetch aborts the sweep; a failure to write back one
    /// email is logged and the sweep moves on.
    pub async fn send_pending(&self, fetch_size: i64) -> AppResult<SendReport> {
        let pending = self.emails.fetch_pending(fetch_size).await?;
        let mut report = SendReport {
            fetched: pending.len(),
            ..SendReport::default()
        };
        if pending.is_empty() {
            tracing::debug!(fetch_size, "No emails to send");
            return Ok(report);
        }

        tracing::info!(count = pending.len(), transport = self.transport.name(), "Sending emails");
        for email in pending {
            let id = email.id;
            match self.attempt(email).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(email_id = %id, error = %e, "Skipping email for now");
                }
            }
        }

        tracing::info!(
            sent = report.sent,
            retrying = report.retrying,
            gave_up = report.gave_up,
            errors = report.errors,
            "Email sweep finished"
        );
        Ok(report)
    }

    /// Attempts one email if it is still `New`. Returns `None` when it is
    /// missing or already terminal.
    pub async fn send_by_id(&self, id: Uuid) -> AppResult<Option<AttemptOutcome>> {
        match self.emails.find(id).await? {
            Some(email) if email.status == EmailStatus::New => Ok(Some(self.attempt(email).await?)),
            Some(email) => {
                tracing::info!(email_id = %id, status = %email.status, "Email already settled, skipping");
                Ok(None)
            }
            None => {
                tracing::info!(email_id = %id, "Email not found, skipping");
                Ok(None)
            }
        }
    }

    async fn attempt(&self, mut email: Email) -> AppResult<AttemptOutcome> {
        let result = self.transport.send(&email).await;
        let now = self.clock.now();

        let outcome = match result {
            Ok(delivery) => email.record_success(now, delivery.status_code, delivery.reference)?,
            Err(e) => {
                let outcome = email.record_failure(now, e.status_code(), self.max_retries)?;
                match outcome {
                    AttemptOutcome::GaveUp { attempts } => tracing::error!(
                        email_id = %email.id,
                        attempts,
                        status_code = ?e.status_code(),
                        error = %e,
                        "Email failed permanently"
                    ),
                    _ => tracing::warn!(
                        email_id = %email.id,
                        attempts = email.attempts,
                        status_code = ?e.status_code(),
                        error = %e,
                        "Email send failed, will retry"
                    ),
                }
                outcome
            }
        };

        self.emails.update(&email).await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EmailPriority;
    use crate::repositories::MemoryStore;
    use crate::services::email::transport::testing::ScriptedTransport;
    use crate::utils::FakeClock;
    use chrono::Duration;

    fn sender(store: &Arc<MemoryStore>, transport: Arc<ScriptedTransport>, max_retries: u32) -> EmailSender {
        EmailSender::new(store.clone(), transport, Arc::new(FakeClock::default()), max_retries)
    }

    async fn seed(store: &MemoryStore, count: usize) -> Vec<Uuid> {
        let clock = FakeClock::default();
        let mut ids = Vec::new();
        for n in 0..count {
            clock.advance(Duration::seconds(1));
            let email = Email::new("from@gov", format!("user{n}@example.com"), "s", "b", clock.now());
            ids.push(email.id);
            store.insert(&email).await.unwrap();
        }
        ids
    }

    #[tokio::test]
    async fn test_sweep_sends_and_records() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 3).await;
        let transport = Arc::new(ScriptedTransport::new());

        let report = sender(&store, transport.clone(), 9).send_pending(250).await.unwrap();

        assert_eq!(report.sent, 3);
        assert!(store.emails().unwrap().iter().all(|e| {
            e.status == EmailStatus::Sent
                && e.attempts == 1
                && e.sent_at.is_some()
                && e.transport_status == Some(201)
                && e.notification_id.is_some()
        }));
        // nothing left for a second sweep
        let again = sender(&store, transport.clone(), 9).send_pending(250).await.unwrap();
        assert_eq!(again.fetched, 0);
        assert_eq!(transport.attempts(), 3);
    }

    #[tokio::test]
    async fn test_fetch_size_bounds_each_sweep() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 5).await;
        let transport = Arc::new(ScriptedTransport::new());
        let sender = sender(&store, transport, 9);

        assert_eq!(sender.send_pending(2).await.unwrap().sent, 2);
        assert_eq!(sender.send_pending(2).await.unwrap().sent, 2);
        assert_eq!(sender.send_pending(2).await.unwrap().sent, 1);
    }

    #[tokio::test]
    async fn test_retry_budget_ends_in_error() {
        let store = Arc::new(MemoryStore::new());
        let ids = seed(&store, 1).await;
        let transport = Arc::new(ScriptedTransport::new().always_reject(421, 5));
        let sender = sender(&store, transport.clone(), 3);

        for expected in 1..=2 {
            let report = sender.send_pending(10).await.unwrap();
            assert_eq!(report.retrying, 1);
            let email = store.find(ids[0]).await.unwrap().unwrap();
            assert_eq!(email.status, EmailStatus::New);
            assert_eq!(email.attempts, expected);
            assert_eq!(email.transport_status, Some(421));
        }

        let report = sender.send_pending(10).await.unwrap();
        assert_eq!(report.gave_up, 1);
        let email = store.find(ids[0]).await.unwrap().unwrap();
        assert_eq!(email.status, EmailStatus::Error);
        assert_eq!(email.attempts, 3);

        // terminal: never attempted again
        assert_eq!(sender.send_pending(10).await.unwrap().fetched, 0);
        assert_eq!(transport.attempts(), 3);
    }

    #[tokio::test]
    async fn test_ninth_failure_is_terminal() {
        let store = Arc::new(MemoryStore::new());
        let mut email = Email::new("from@gov", "to@example.com", "s", "b", FakeClock::default().now());
        email.attempts = 8;
        store.insert(&email).await.unwrap();
        let transport = Arc::new(ScriptedTransport::new().then_unreachable());

        let report = sender(&store, transport, 9).send_pending(250).await.unwrap();

        assert_eq!(report.gave_up, 1);
        let stored = store.find(email.id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 9);
        assert_eq!(stored.status, EmailStatus::Error);
        assert_eq!(stored.transport_status, None);
    }

    #[tokio::test]
    async fn test_sweep_prefers_urgent_email() {
        let store = Arc::new(MemoryStore::new());
        seed(&store, 2).await;
        let urgent = Email::new("from@gov", "vip@example.com", "s", "b", FakeClock::default().now() + Duration::hours(1))
            .with_priority(EmailPriority::Urgent);
        store.insert(&urgent).await.unwrap();
        let transport = Arc::new(ScriptedTransport::new());

        sender(&store, transport.clone(), 9).send_pending(1).await.unwrap();

        assert_eq!(*transport.sent.lock().unwrap(), vec![urgent.id]);
    }

    #[tokio::test]
    async fn test_send_by_id_skips_settled_email() {
        let store = Arc::new(MemoryStore::new());
        let ids = seed(&store, 1).await;
        let transport = Arc::new(ScriptedTransport::new());
        let sender = sender(&store, transport.clone(), 9);

        assert_eq!(sender.send_by_id(ids[0]).await.unwrap(), Some(AttemptOutcome::Sent));
        assert_eq!(sender.send_by_id(ids[0]).await.unwrap(), None);
        assert_eq!(sender.send_by_id(Uuid::new_v4()).await.unwrap(), None);
        assert_eq!(transport.attempts(), 1);
    }
}
