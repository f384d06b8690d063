//! Outbound email: queueing from jobs and the delivery sweep.

mod notify;
mod queue;
mod sender;
pub(crate) mod transport;

pub use notify::NotifyTransport;
pub use queue::{EmailQueueService, Substitutions};
pub use sender::{EmailSender, SendReport};
pub use transport::{Delivery, MailTransport, TransportError};
