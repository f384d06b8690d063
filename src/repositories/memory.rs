//! In-memory implementation of every store.
//!
//! One mutex guards all tables so a [`ChangeSet`] commit is atomic the same
//! way a database transaction is. No lock is held across an await.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    ApplicationSetting, BetaFeatureAccess, CacheEntry, Communication, CommunicationEmail,
    CommunicationStatus, DrugProduct, Email, EmailStatus, FileDownload, Lease, LegalAgreement,
    SettingKey, UserProfile,
};
use crate::repositories::traits::{
    CacheStore, ChangeSet, CommunicationStore, DrugStore, EmailStore, LeaseStore,
    LegalAgreementStore, ProfileFilter, ProfileStore, SettingStore, UnitOfWork,
};

#[derive(Debug, Default)]
struct Tables {
    leases: HashMap<String, Lease>,
    settings: HashMap<SettingKey, ApplicationSetting>,
    emails: Vec<Email>,
    cache: Vec<CacheEntry>,
    profiles: BTreeMap<String, UserProfile>,
    beta_access: HashSet<(String, String)>,
    agreements: Vec<LegalAgreement>,
    communications: Vec<Communication>,
    communication_emails: Vec<CommunicationEmail>,
    downloads: Vec<FileDownload>,
    products: Vec<DrugProduct>,
    commits: usize,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_commits: Mutex<bool>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> AppResult<MutexGuard<'_, Tables>> {
        self.tables.lock().map_err(|_| AppError::Internal {
            source: anyhow::anyhow!("memory store lock poisoned"),
        })
    }

    // ------------------------------------------------------------------
    // Seeding and inspection
    // ------------------------------------------------------------------

    pub fn insert_profile(&self, profile: UserProfile) -> AppResult<()> {
        self.tables()?.profiles.insert(profile.hdid.clone(), profile);
        Ok(())
    }

    pub fn profile(&self, hdid: &str) -> AppResult<Option<UserProfile>> {
        Ok(self.tables()?.profiles.get(hdid).cloned())
    }

    pub fn profile_count(&self) -> AppResult<usize> {
        Ok(self.tables()?.profiles.len())
    }

    pub fn insert_cache_entry(&self, entry: CacheEntry) -> AppResult<()> {
        self.tables()?.cache.push(entry);
        Ok(())
    }

    pub fn cache_count(&self) -> AppResult<usize> {
        Ok(self.tables()?.cache.len())
    }

    pub fn insert_agreement(&self, agreement: LegalAgreement) -> AppResult<()> {
        self.tables()?.agreements.push(agreement);
        Ok(())
    }

    pub fn insert_communication(&self, communication: Communication) -> AppResult<()> {
        self.tables()?.communications.push(communication);
        Ok(())
    }

    pub fn communication(&self, id: Uuid) -> AppResult<Option<Communication>> {
        Ok(self.tables()?.communications.iter().find(|c| c.id == id).cloned())
    }

    pub fn communication_emails(&self) -> AppResult<Vec<CommunicationEmail>> {
        Ok(self.tables()?.communication_emails.clone())
    }

    pub fn emails(&self) -> AppResult<Vec<Email>> {
        Ok(self.tables()?.emails.clone())
    }

    pub fn has_feature(&self, hdid: &str, feature: &str) -> AppResult<bool> {
        Ok(self
            .tables()?
            .beta_access
            .contains(&(hdid.to_string(), feature.to_string())))
    }

    pub fn beta_grant_count(&self) -> AppResult<usize> {
        Ok(self.tables()?.beta_access.len())
    }

    pub fn downloads(&self) -> AppResult<Vec<FileDownload>> {
        Ok(self.tables()?.downloads.clone())
    }

    pub fn products(&self) -> AppResult<Vec<DrugProduct>> {
        Ok(self.tables()?.products.clone())
    }

    pub fn lease(&self, job_key: &str) -> AppResult<Option<Lease>> {
        Ok(self.tables()?.leases.get(job_key).cloned())
    }

    /// Number of non-empty change sets committed so far.
    pub fn commit_count(&self) -> AppResult<usize> {
        Ok(self.tables()?.commits)
    }

    /// Makes every following commit fail like a lost database connection.
    pub fn fail_commits(&self, fail: bool) -> AppResult<()> {
        let mut flag = self.fail_commits.lock().map_err(|_| AppError::Internal {
            source: anyhow::anyhow!("memory store lock poisoned"),
        })?;
        *flag = fail;
        Ok(())
    }

    fn commits_failing(&self) -> bool {
        self.fail_commits.lock().map(|flag| *flag).unwrap_or(false)
    }
}

fn matches_filter(tables: &Tables, profile: &UserProfile, filter: &ProfileFilter) -> bool {
    match filter {
        ProfileFilter::ClosedBefore(cutoff) => profile.is_due_for_deletion(*cutoff),
        ProfileFilter::MissingYearOfBirth => profile.year_of_birth.is_none(),
        ProfileFilter::LackingFeature(feature) => {
            profile.is_active()
                && !tables
                    .beta_access
                    .contains(&(profile.hdid.clone(), feature.clone()))
        }
        ProfileFilter::ReachableCreatedBefore(cutoff) => {
            profile.is_active() && profile.email.is_some() && profile.created_at < *cutoff
        }
        ProfileFilter::AwaitingCommunication(communication) => {
            profile.is_active()
                && profile.email.is_some()
                && !tables
                    .communication_emails
                    .iter()
                    .any(|link| link.communication_id == *communication && link.hdid == profile.hdid)
        }
    }
}

#[async_trait]
impl LeaseStore for MemoryStore {
    async fn try_insert(&self, lease: &Lease, now: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables()?;
        if let Some(existing) = tables.leases.get(&lease.job_key)
            && !existing.is_expired(now)
        {
            return Ok(false);
        }
        tables.leases.insert(lease.job_key.clone(), lease.clone());
        Ok(true)
    }

    async fn remove(&self, job_key: &str, holder: Uuid) -> AppResult<bool> {
        let mut tables = self.tables()?;
        match tables.leases.get(job_key) {
            Some(lease) if lease.holder == holder => {
                tables.leases.remove(job_key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl SettingStore for MemoryStore {
    async fn get(&self, key: &SettingKey) -> AppResult<Option<ApplicationSetting>> {
        Ok(self.tables()?.settings.get(key).cloned())
    }

    async fn insert_if_absent(&self, setting: &ApplicationSetting) -> AppResult<bool> {
        let mut tables = self.tables()?;
        let key = setting.key();
        if tables.settings.contains_key(&key) {
            return Ok(false);
        }
        tables.settings.insert(key, setting.clone());
        Ok(true)
    }

    async fn upsert(&self, setting: &ApplicationSetting) -> AppResult<()> {
        let mut tables = self.tables()?;
        let key = setting.key();
        match tables.settings.get_mut(&key) {
            Some(existing) => {
                existing.value = setting.value.clone();
                existing.updated_at = setting.updated_at;
            }
            None => {
                tables.settings.insert(key, setting.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EmailStore for MemoryStore {
    async fn insert(&self, email: &Email) -> AppResult<()> {
        let mut tables = self.tables()?;
        if tables.emails.iter().any(|e| e.id == email.id) {
            return Err(AppError::Duplicate {
                entity: "emails".to_string(),
                field: "id".to_string(),
                value: email.id.to_string(),
            });
        }
        tables.emails.push(email.clone());
        Ok(())
    }

    async fn find(&self, id: Uuid) -> AppResult<Option<Email>> {
        Ok(self.tables()?.emails.iter().find(|e| e.id == id).cloned())
    }

    async fn fetch_pending(&self, limit: i64) -> AppResult<Vec<Email>> {
        let tables = self.tables()?;
        let mut pending: Vec<Email> = tables
            .emails
            .iter()
            .filter(|e| e.status == EmailStatus::New)
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        pending.truncate(usize::try_from(limit).unwrap_or(0));
        Ok(pending)
    }

    async fn update(&self, email: &Email) -> AppResult<()> {
        let mut tables = self.tables()?;
        match tables.emails.iter_mut().find(|e| e.id == email.id) {
            Some(existing) => {
                *existing = email.clone();
                Ok(())
            }
            None => Err(AppError::NotFound {
                entity: "email".to_string(),
                field: "id".to_string(),
                value: email.id.to_string(),
            }),
        }
    }

    async fn delete_created_before(
        &self,
        cutoff: DateTime<Utc>,
        max_rows: i64,
    ) -> AppResult<usize> {
        let mut tables = self.tables()?;
        let mut doomed: Vec<(DateTime<Utc>, Uuid)> = tables
            .emails
            .iter()
            .filter(|e| e.created_at < cutoff)
            .map(|e| (e.created_at, e.id))
            .collect();
        doomed.sort();
        doomed.truncate(usize::try_from(max_rows).unwrap_or(0));
        let doomed: HashSet<Uuid> = doomed.into_iter().map(|(_, id)| id).collect();

        tables.emails.retain(|e| !doomed.contains(&e.id));
        Ok(doomed.len())
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn delete_expired(&self, now: DateTime<Utc>, max_rows: i64) -> AppResult<usize> {
        let mut tables = self.tables()?;
        let mut expired: Vec<(DateTime<Utc>, Uuid)> = tables
            .cache
            .iter()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| (entry.expires_at, entry.id))
            .collect();
        expired.sort();
        expired.truncate(usize::try_from(max_rows).unwrap_or(0));
        let expired: HashSet<Uuid> = expired.into_iter().map(|(_, id)| id).collect();

        tables.cache.retain(|entry| !expired.contains(&entry.id));
        Ok(expired.len())
    }
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn page(
        &self,
        filter: &ProfileFilter,
        after: Option<&str>,
        limit: i64,
    ) -> AppResult<Vec<UserProfile>> {
        let tables = self.tables()?;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(tables
            .profiles
            .values()
            .filter(|p| after.is_none_or(|after| p.hdid.as_str() > after))
            .filter(|p| matches_filter(&tables, p, filter))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LegalAgreementStore for MemoryStore {
    async fn latest_effective(
        &self,
        agreement_type: &str,
        as_of: DateTime<Utc>,
    ) -> AppResult<Option<LegalAgreement>> {
        Ok(self
            .tables()?
            .agreements
            .iter()
            .filter(|a| a.agreement_type == agreement_type && a.effective_date <= as_of)
            .max_by_key(|a| a.effective_date)
            .cloned())
    }
}

#[async_trait]
impl CommunicationStore for MemoryStore {
    async fn pending_email(&self, now: DateTime<Utc>) -> AppResult<Vec<Communication>> {
        let mut pending: Vec<Communication> = self
            .tables()?
            .communications
            .iter()
            .filter(|c| c.is_pending_email(now))
            .cloned()
            .collect();
        pending.sort_by_key(|c| c.effective_at);
        Ok(pending)
    }

    async fn set_status(
        &self,
        id: Uuid,
        status: CommunicationStatus,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut tables = self.tables()?;
        match tables.communications.iter_mut().find(|c| c.id == id) {
            Some(communication) => {
                communication.status = status;
                communication.updated_at = now;
                Ok(())
            }
            None => Err(AppError::NotFound {
                entity: "communication".to_string(),
                field: "id".to_string(),
                value: id.to_string(),
            }),
        }
    }
}

#[async_trait]
impl DrugStore for MemoryStore {
    async fn download_exists(&self, program_code: &str, hash: &str) -> AppResult<bool> {
        Ok(self
            .tables()?
            .downloads
            .iter()
            .any(|d| d.program_code == program_code && d.hash == hash))
    }

    async fn replace_program(
        &self,
        download: &FileDownload,
        products: &[DrugProduct],
    ) -> AppResult<usize> {
        let mut tables = self.tables()?;
        let stale: HashSet<Uuid> = tables
            .downloads
            .iter()
            .filter(|d| d.program_code == download.program_code)
            .map(|d| d.id)
            .collect();
        tables.downloads.retain(|d| !stale.contains(&d.id));
        tables
            .products
            .retain(|p| !stale.contains(&p.file_download_id));

        tables.downloads.push(download.clone());
        tables.products.extend_from_slice(products);
        Ok(products.len())
    }
}

#[async_trait]
impl UnitOfWork for MemoryStore {
    async fn commit(&self, changes: ChangeSet) -> AppResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        if self.commits_failing() {
            return Err(AppError::Database {
                operation: "commit page".to_string(),
                source: anyhow::anyhow!("connection reset"),
            });
        }

        let mut tables = self.tables()?;
        if let Some(email) = changes
            .emails
            .iter()
            .find(|email| tables.emails.iter().any(|e| e.id == email.id))
        {
            return Err(AppError::Duplicate {
                entity: "emails".to_string(),
                field: "id".to_string(),
                value: email.id.to_string(),
            });
        }

        for hdid in &changes.deleted_profiles {
            tables.profiles.remove(hdid);
            tables.beta_access.retain(|(owner, _)| owner != hdid);
            tables.communication_emails.retain(|link| &link.hdid != hdid);
        }
        for profile in changes.updated_profiles {
            if tables.profiles.contains_key(&profile.hdid) {
                tables.profiles.insert(profile.hdid.clone(), profile);
            }
        }
        for grant in changes.beta_grants {
            tables.beta_access.insert((grant.hdid, grant.feature));
        }
        tables.emails.extend(changes.emails);
        tables.communication_emails.extend(changes.communication_emails);
        tables.commits += 1;
        Ok(())
    }
}
