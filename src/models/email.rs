//! Outbound email rows and their delivery state machine.
//!
//! ```text
//!            attempt ok
//!   New ──────────────────────▶ Sent      (terminal)
//!    │ ▲
//!    │ │ attempt failed, attempts < max_retries
//!    └─┘
//!    │
//!    │ attempt failed, attempts >= max_retries
//!    └────────────────────────▶ Error     (terminal)
//! ```
//!
//! `attempts` only grows and nothing ever moves back to `New` from a
//! terminal state.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::schema::emails;

// ============================================================================
// Enums
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::EmailStatus")]
#[serde(rename_all = "lowercase")]
pub enum EmailStatus {
    New,
    Sent,
    Error,
}

impl EmailStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, EmailStatus::New)
    }
}

impl std::fmt::Display for EmailStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EmailStatus::New => write!(f, "new"),
            EmailStatus::Sent => write!(f, "sent"),
            EmailStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::EmailFormat")]
#[serde(rename_all = "lowercase")]
pub enum EmailFormat {
    #[default]
    Text,
    Html,
}

/// Declaration order matters: the pending-mail query sorts on it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize, DbEnum,
)]
#[db_enum(existing_type_path = "crate::schema::sql_types::EmailPriority")]
#[serde(rename_all = "lowercase")]
pub enum EmailPriority {
    Low,
    #[default]
    Standard,
    High,
    Urgent,
}

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = emails)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct Email {
    pub id: Uuid,
    pub from_address: String,
    pub to_address: String,
    pub subject: String,
    pub body: String,
    pub format: EmailFormat,
    pub priority: EmailPriority,
    pub template: Option<String>,
    pub personalization: Option<JsonValue>,
    pub status: EmailStatus,
    pub attempts: i32,
    pub transport_status: Option<i32>,
    pub notification_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub last_retry_at: Option<DateTime<Utc>>,
}

/// What a delivery attempt did to an email
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Sent,
    /// Still `New`; will be picked up by a later sweep
    WillRetry { attempts: i32 },
    /// Retry budget exhausted; now `Error`
    GaveUp { attempts: i32 },
}

impl Email {
    /// Builds a fresh `New` email with no attempts.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            from_address: from.into(),
            to_address: to.into(),
            subject: subject.into(),
            body: body.into(),
            format: EmailFormat::default(),
            priority: EmailPriority::default(),
            template: None,
            personalization: None,
            status: EmailStatus::New,
            attempts: 0,
            transport_status: None,
            notification_id: None,
            created_at,
            sent_at: None,
            last_retry_at: None,
        }
    }

    pub fn with_format(mut self, format: EmailFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_priority(mut self, priority: EmailPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>, personalization: JsonValue) -> Self {
        self.template = Some(template.into());
        self.personalization = Some(personalization);
        self
    }

    fn ensure_pending(&self, to: EmailStatus) -> AppResult<()> {
        if self.status.is_terminal() {
            return Err(AppError::InvalidTransition {
                entity: format!("email {}", self.id),
                from: self.status.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    /// Records a successful delivery attempt.
    pub fn record_success(
        &mut self,
        now: DateTime<Utc>,
        transport_status: Option<i32>,
        notification_id: Option<String>,
    ) -> AppResult<AttemptOutcome> {
        self.ensure_pending(EmailStatus::Sent)?;
        self.attempts += 1;
        self.status = EmailStatus::Sent;
        self.sent_at = Some(now);
        self.transport_status = transport_status;
        self.notification_id = notification_id;
        Ok(AttemptOutcome::Sent)
    }

    /// Records a failed delivery attempt against a budget of `max_retries`
    /// attempts in total.
    pub fn record_failure(
        &mut self,
        now: DateTime<Utc>,
        transport_status: Option<i32>,
        max_retries: u32,
    ) -> AppResult<AttemptOutcome> {
        self.ensure_pending(EmailStatus::Error)?;
        self.attempts += 1;
        self.last_retry_at = Some(now);
        if transport_status.is_some() {
            self.transport_status = transport_status;
        }

        if i64::from(self.attempts) < i64::from(max_retries) {
            self.status = EmailStatus::New;
            Ok(AttemptOutcome::WillRetry {
                attempts: self.attempts,
            })
        } else {
            self.status = EmailStatus::Error;
            Ok(AttemptOutcome::GaveUp {
                attempts: self.attempts,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn email() -> Email {
        Email::new("noreply@gov", "user@example.com", "Hello", "Body", now())
    }

    #[test]
    fn test_success_is_terminal() {
        let mut email = email();
        let outcome = email.record_success(now(), Some(250), None).unwrap();
        assert_eq!(outcome, AttemptOutcome::Sent);
        assert_eq!(email.status, EmailStatus::Sent);
        assert_eq!(email.attempts, 1);
        assert_eq!(email.sent_at, Some(now()));
        assert_eq!(email.transport_status, Some(250));

        let err = email.record_failure(now(), None, 9).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(email.attempts, 1);
    }

    #[test]
    fn test_failures_below_budget_stay_new() {
        let mut email = email();
        for n in 1..=3 {
            let outcome = email.record_failure(now(), Some(421), 9).unwrap();
            assert_eq!(outcome, AttemptOutcome::WillRetry { attempts: n });
            assert_eq!(email.status, EmailStatus::New);
            assert_eq!(email.attempts, n);
        }
        assert_eq!(email.last_retry_at, Some(now()));
        assert_eq!(email.transport_status, Some(421));
    }

    #[test]
    fn test_ninth_failure_of_nine_gives_up() {
        let mut email = email();
        email.attempts = 8;
        let outcome = email.record_failure(now(), Some(554), 9).unwrap();
        assert_eq!(outcome, AttemptOutcome::GaveUp { attempts: 9 });
        assert_eq!(email.status, EmailStatus::Error);

        let err = email.record_failure(now(), None, 9).unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
        assert_eq!(email.attempts, 9);
        assert_eq!(email.status, EmailStatus::Error);
    }

    #[test]
    fn test_connection_failure_keeps_previous_status_code() {
        let mut email = email();
        email.record_failure(now(), Some(451), 9).unwrap();
        email.record_failure(now(), None, 9).unwrap();
        assert_eq!(email.transport_status, Some(451));
    }

    #[test]
    fn test_priority_ordering() {
        assert!(EmailPriority::Urgent > EmailPriority::High);
        assert!(EmailPriority::Standard > EmailPriority::Low);
    }
}
