//! Mail transport abstraction.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Email;

/// What the transport reported for an accepted message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delivery {
    pub status_code: Option<i32>,
    /// Transport-side message id, when the transport issues one
    pub reference: Option<String>,
}

/// A failed delivery attempt. Every variant counts against the email's
/// retry budget.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No response at all: DNS, connect, TLS or timeout
    #[error("Mail transport unreachable: {0}")]
    Connect(String),

    /// The transport answered and refused the message
    #[error("Mail transport rejected message with status {status_code}: {message}")]
    Rejected { status_code: i32, message: String },
}

impl TransportError {
    pub fn status_code(&self) -> Option<i32> {
        match self {
            TransportError::Connect(_) => None,
            TransportError::Rejected { status_code, .. } => Some(*status_code),
        }
    }
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Transport name for logs
    fn name(&self) -> &'static str;

    /// Delivers one message. Each call stands alone: connect, send and
    /// disconnect all happen inside it.
    async fn send(&self, email: &Email) -> Result<Delivery, TransportError>;
}
