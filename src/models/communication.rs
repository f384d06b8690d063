//! Broadcast communications and the emails fanned out from them.
//!
//! ```text
//!   New ──▶ Processing ──▶ Processed   (terminal)
//!              │
//!              └─────────▶ Error       (terminal)
//! ```
//!
//! A run that stops mid-way leaves the communication in `Processing`; the
//! next run resumes it and only reaches users not yet linked to it.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_derive_enum::DbEnum;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::EmailPriority;
use crate::schema::{communication_emails, communications};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::CommunicationType")]
#[serde(rename_all = "snake_case")]
pub enum CommunicationType {
    Banner,
    InApp,
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, DbEnum)]
#[db_enum(existing_type_path = "crate::schema::sql_types::CommunicationStatus")]
#[serde(rename_all = "snake_case")]
pub enum CommunicationStatus {
    Draft,
    New,
    Processing,
    Processed,
    Error,
}

impl std::fmt::Display for CommunicationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommunicationStatus::Draft => write!(f, "draft"),
            CommunicationStatus::New => write!(f, "new"),
            CommunicationStatus::Processing => write!(f, "processing"),
            CommunicationStatus::Processed => write!(f, "processed"),
            CommunicationStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = communications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Communication {
    pub id: Uuid,
    pub communication_type: CommunicationType,
    pub status: CommunicationStatus,
    pub subject: String,
    pub body: String,
    pub priority: EmailPriority,
    pub effective_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Communication {
    /// A `New` email communication live from `effective_at` until `expires_at`.
    pub fn email(
        subject: impl Into<String>,
        body: impl Into<String>,
        effective_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            communication_type: CommunicationType::Email,
            status: CommunicationStatus::New,
            subject: subject.into(),
            body: body.into(),
            priority: EmailPriority::default(),
            effective_at,
            expires_at,
            created_at: effective_at,
            updated_at: effective_at,
        }
    }

    /// An email communication that still has users to reach at `now`.
    pub fn is_pending_email(&self, now: DateTime<Utc>) -> bool {
        self.communication_type == CommunicationType::Email
            && matches!(
                self.status,
                CommunicationStatus::New | CommunicationStatus::Processing
            )
            && self.effective_at <= now
            && now < self.expires_at
    }
}

/// Links a queued email to the communication and user it was made for.
#[derive(Debug, Clone, PartialEq, Eq, Queryable, Selectable, Insertable)]
#[diesel(table_name = communication_emails)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CommunicationEmail {
    pub communication_id: Uuid,
    pub hdid: String,
    pub email_id: Uuid,
    pub created_at: DateTime<Utc>,
}
