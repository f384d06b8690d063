//! Store seams used by the job engine.
//!
//! Every store has a PostgreSQL implementation and an in-memory one
//! ([`MemoryStore`](super::MemoryStore)) that tests drive directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::{
    ApplicationSetting, BetaFeatureAccess, Communication, CommunicationEmail, CommunicationStatus,
    DrugProduct, Email, FileDownload, Lease, LegalAgreement, SettingKey, UserProfile,
};

#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Inserts `lease` unless a lease for the same key that has not expired
    /// at `now` already exists. Expired leases are replaced.
    async fn try_insert(&self, lease: &Lease, now: DateTime<Utc>) -> AppResult<bool>;

    /// Removes the lease only while `holder` still owns it.
    async fn remove(&self, job_key: &str, holder: Uuid) -> AppResult<bool>;
}

#[async_trait]
pub trait SettingStore: Send + Sync {
    async fn get(&self, key: &SettingKey) -> AppResult<Option<ApplicationSetting>>;

    /// Returns `false` when a row with the same key already exists.
    async fn insert_if_absent(&self, setting: &ApplicationSetting) -> AppResult<bool>;

    /// Inserts or overwrites the value, keeping the original `created_at`.
    async fn upsert(&self, setting: &ApplicationSetting) -> AppResult<()>;
}

#[async_trait]
pub trait EmailStore: Send + Sync {
    async fn insert(&self, email: &Email) -> AppResult<()>;

    async fn find(&self, id: Uuid) -> AppResult<Option<Email>>;

    /// `New` emails, highest priority first, then oldest first.
    async fn fetch_pending(&self, limit: i64) -> AppResult<Vec<Email>>;

    /// Persists every mutable column of `email`.
    async fn update(&self, email: &Email) -> AppResult<()>;

    /// Deletes at most `max_rows` emails created before `cutoff`, oldest
    /// first, whatever their status.
    async fn delete_created_before(&self, cutoff: DateTime<Utc>, max_rows: i64)
    -> AppResult<usize>;
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Deletes at most `max_rows` entries with `expires_at < now`, earliest
    /// expiry first.
    async fn delete_expired(&self, now: DateTime<Utc>, max_rows: i64) -> AppResult<usize>;
}

/// The record sets profile-driven jobs walk. Each is ordered by `hdid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileFilter {
    /// Closed before the cutoff
    ClosedBefore(DateTime<Utc>),
    /// Any profile without a stored year of birth
    MissingYearOfBirth,
    /// Active profiles without access to the feature
    LackingFeature(String),
    /// Active profiles with an email address, created before the cutoff
    ReachableCreatedBefore(DateTime<Utc>),
    /// Active profiles with an email address not yet linked to the
    /// communication
    AwaitingCommunication(Uuid),
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// One keyset page: matching profiles with `hdid > after`, ascending.
    async fn page(
        &self,
        filter: &ProfileFilter,
        after: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<UserProfile>>;
}

#[async_trait]
pub trait LegalAgreementStore: Send + Sync {
    /// The agreement of `agreement_type` with the greatest effective date
    /// not after `as_of`.
    async fn latest_effective(
        &self,
        agreement_type: &str,
        as_of: DateTime<Utc>,
    ) -> AppResult<Option<LegalAgreement>>;
}

#[async_trait]
pub trait CommunicationStore: Send + Sync {
    /// Email communications in `New` or `Processing` that are effective
    /// and not expired at `now`, earliest effective first.
    async fn pending_email(&self, now: DateTime<Utc>) -> AppResult<Vec<Communication>>;

    async fn set_status(
        &self,
        id: Uuid,
        status: CommunicationStatus,
        now: DateTime<Utc>,
    ) -> AppResult<()>;
}

#[async_trait]
pub trait DrugStore: Send + Sync {
    async fn download_exists(&self, program_code: &str, hash: &str) -> AppResult<bool>;

    /// In one transaction: drops the program's previous downloads and their
    /// products, then records `download` with `products`.
    async fn replace_program(
        &self,
        download: &FileDownload,
        products: &[DrugProduct],
    ) -> AppResult<usize>;
}

/// Mutations staged while processing one page.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    pub deleted_profiles: Vec<String>,
    pub updated_profiles: Vec<UserProfile>,
    pub beta_grants: Vec<BetaFeatureAccess>,
    pub emails: Vec<Email>,
    /// Inserted after `emails`, which they reference
    pub communication_emails: Vec<CommunicationEmail>,
}

impl ChangeSet {
    pub fn delete_profile(&mut self, hdid: impl Into<String>) {
        self.deleted_profiles.push(hdid.into());
    }

    pub fn update_profile(&mut self, profile: UserProfile) {
        self.updated_profiles.push(profile);
    }

    pub fn grant(&mut self, grant: BetaFeatureAccess) {
        self.beta_grants.push(grant);
    }

    pub fn queue_email(&mut self, email: Email) {
        self.emails.push(email);
    }

    pub fn link_communication_email(&mut self, link: CommunicationEmail) {
        self.communication_emails.push(link);
    }

    pub fn merge(&mut self, other: ChangeSet) {
        self.deleted_profiles.extend(other.deleted_profiles);
        self.updated_profiles.extend(other.updated_profiles);
        self.beta_grants.extend(other.beta_grants);
        self.emails.extend(other.emails);
        self.communication_emails.extend(other.communication_emails);
    }

    pub fn len(&self) -> usize {
        self.deleted_profiles.len()
            + self.updated_profiles.len()
            + self.beta_grants.len()
            + self.emails.len()
            + self.communication_emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Applies every staged mutation atomically.
    async fn commit(&self, changes: ChangeSet) -> AppResult<()>;
}
