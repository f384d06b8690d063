//! Service layer: outbound collaborators and email handling.
//!
//! Every collaborator sits behind a trait so jobs can be driven with
//! scripted doubles in tests.

pub mod drug_file;
pub mod email;
mod files;
mod identity;
mod patient;

pub use email::{
    Delivery, EmailQueueService, EmailSender, MailTransport, NotifyTransport, SendReport,
    Substitutions, TransportError,
};
pub use files::{FileFetcher, HttpFileFetcher};
pub use identity::{IdentityAdmin, KeycloakAdmin};
pub use patient::{PatientClient, PatientLookup};
