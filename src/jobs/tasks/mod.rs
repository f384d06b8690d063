pub mod beta_feature;
pub mod clean_cache;
pub mod close_accounts;
pub mod communication_emails;
pub mod delete_emails;
pub mod drug_import;
pub mod legal_agreements;
pub mod one_time;
pub mod populate_year_of_birth;
pub mod send_emails;

pub use beta_feature::BetaFeatureJob;
pub use clean_cache::CleanCacheJob;
pub use close_accounts::CloseAccountsJob;
pub use communication_emails::CommunicationEmailsJob;
pub use delete_emails::DeleteEmailsJob;
pub use drug_import::DrugImportJob;
pub use legal_agreements::LegalAgreementNotifierJob;
pub use one_time::{OneTimeJob, OneTimeTask};
pub use populate_year_of_birth::PopulateYearOfBirth;
pub use send_emails::SendEmailsJob;
