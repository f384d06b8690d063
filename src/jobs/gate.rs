//! Lease-based mutual exclusion per job key.
//!
//! A lease is live until it is released or its timeout elapses, so a
//! worker that dies mid-run blocks its job for at most one timeout.

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::Lease;
use crate::repositories::LeaseStore;
use crate::utils::Clock;

#[derive(Clone)]
pub struct ConcurrencyGate {
    store: Arc<dyn LeaseStore>,
    clock: Arc<dyn Clock>,
}

impl ConcurrencyGate {
    pub fn new(store: Arc<dyn LeaseStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Returns the new lease, or `None` while another holder's lease is live.
    pub async fn try_acquire(&self, job_key: &str, timeout: Duration) -> AppResult<Option<Lease>> {
        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(timeout)
            .ok()
            .and_then(|length| now.checked_add_signed(length))
            .ok_or_else(|| AppError::Validation {
                field: "concurrency_timeout_secs".to_string(),
                reason: format!("{}s is out of range", timeout.as_secs()),
            })?;

        let lease = Lease {
            job_key: job_key.to_string(),
            holder: Uuid::new_v4(),
            acquired_at: now,
            expires_at,
        };

        if self.store.try_insert(&lease, now).await? {
            tracing::debug!(job_key, holder = %lease.holder, expires_at = %lease.expires_at, "Lease acquired");
            Ok(Some(lease))
        } else {
            Ok(None)
        }
    }

    /// Releases `lease` if it is still ours. An expired lease that someone
    /// else has since taken over is left alone.
    pub async fn release(&self, lease: &Lease) -> AppResult<bool> {
        let released = self.store.remove(&lease.job_key, lease.holder).await?;
        if !released {
            tracing::warn!(
                job_key = %lease.job_key,
                holder = %lease.holder,
                "Lease was already gone or taken over on release"
            );
        }
        Ok(released)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::MemoryStore;
    use crate::utils::FakeClock;

    fn gate() -> (ConcurrencyGate, FakeClock) {
        let clock = FakeClock::default();
        let gate = ConcurrencyGate::new(Arc::new(MemoryStore::new()), Arc::new(clock.clone()));
        (gate, clock)
    }

    #[tokio::test]
    async fn test_second_acquire_is_rejected_while_live() {
        let (gate, _) = gate();
        let timeout = Duration::from_secs(60);

        let first = gate.try_acquire("CloseAccounts", timeout).await.unwrap();
        assert!(first.is_some());
        assert!(gate.try_acquire("CloseAccounts", timeout).await.unwrap().is_none());
        assert!(gate.try_acquire("CleanCache", timeout).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_acquires_never_both_succeed() {
        let (gate, _) = gate();
        let timeout = Duration::from_secs(60);

        let (a, b) = tokio::join!(
            gate.try_acquire("SendEmails", timeout),
            gate.try_acquire("SendEmails", timeout)
        );
        let granted = [a.unwrap(), b.unwrap()].iter().filter(|l| l.is_some()).count();
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn test_expired_lease_can_be_taken_over() {
        let (gate, clock) = gate();
        let timeout = Duration::from_secs(300);

        let crashed = gate.try_acquire("OneTime", timeout).await.unwrap().unwrap();
        clock.advance(chrono::Duration::seconds(299));
        assert!(gate.try_acquire("OneTime", timeout).await.unwrap().is_none());

        // still live at exactly the timeout
        clock.advance(chrono::Duration::seconds(1));
        assert!(gate.try_acquire("OneTime", timeout).await.unwrap().is_none());

        clock.advance(chrono::Duration::seconds(1));
        let next = gate.try_acquire("OneTime", timeout).await.unwrap().unwrap();
        assert_ne!(next.holder, crashed.holder);

        // the crashed holder waking up must not drop the new lease
        assert!(!gate.release(&crashed).await.unwrap());
        assert!(gate.try_acquire("OneTime", timeout).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_release_allows_next_run() {
        let (gate, _) = gate();
        let timeout = Duration::from_secs(60);

        let lease = gate.try_acquire("DeleteEmails", timeout).await.unwrap().unwrap();
        assert!(gate.release(&lease).await.unwrap());
        assert!(gate.try_acquire("DeleteEmails", timeout).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_out_of_range_timeout_is_rejected() {
        let (gate, _) = gate();
        let timeout = Duration::from_secs(i64::MAX as u64 / 1000);

        let err = gate.try_acquire("CleanCache", timeout).await.unwrap_err();
        assert!(matches!(err, AppError::Validation { ref field, .. } if field == "concurrency_timeout_secs"));
        assert!(gate.try_acquire("CleanCache", Duration::from_secs(60)).await.unwrap().is_some());
    }
}
