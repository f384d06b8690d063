mod cache;
mod communication;
mod drug;
mod email;
mod lease;
mod legal;
mod profile;
mod setting;

pub use cache::CacheEntry;
pub use communication::{
    Communication, CommunicationEmail, CommunicationStatus, CommunicationType,
};
pub use drug::{DrugProduct, FileDownload};
pub use email::{AttemptOutcome, Email, EmailFormat, EmailPriority, EmailStatus};
pub use lease::Lease;
pub use legal::LegalAgreement;
pub use profile::{BetaFeatureAccess, UserProfile};
pub use setting::{ApplicationSetting, SettingKey};
