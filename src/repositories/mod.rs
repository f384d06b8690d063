//! Repository layer for data access operations.
//!
//! Jobs depend on the store traits only. [`Repositories::postgres`] wires
//! the diesel implementations; [`Repositories::in_memory`] wires a shared
//! [`MemoryStore`].

mod cache_repo;
mod communication_repo;
mod drug_repo;
mod email_repo;
mod lease_repo;
mod legal_repo;
mod memory;
mod profile_repo;
mod setting_repo;
mod traits;
mod unit_of_work;

pub use cache_repo::CacheRepository;
pub use communication_repo::CommunicationRepository;
pub use drug_repo::DrugRepository;
pub use email_repo::EmailRepository;
pub use lease_repo::LeaseRepository;
pub use legal_repo::LegalAgreementRepository;
pub use memory::MemoryStore;
pub use profile_repo::ProfileRepository;
pub use setting_repo::SettingRepository;
pub use traits::{
    CacheStore, ChangeSet, CommunicationStore, DrugStore, EmailStore, LeaseStore,
    LegalAgreementStore, ProfileFilter, ProfileStore, SettingStore, UnitOfWork,
};
pub use unit_of_work::PgUnitOfWork;

use std::sync::Arc;

use crate::db::AsyncDbPool;

/// Aggregates all stores. Cloning only bumps reference counts.
#[derive(Clone)]
pub struct Repositories {
    pub leases: Arc<dyn LeaseStore>,
    pub settings: Arc<dyn SettingStore>,
    pub emails: Arc<dyn EmailStore>,
    pub cache: Arc<dyn CacheStore>,
    pub profiles: Arc<dyn ProfileStore>,
    pub agreements: Arc<dyn LegalAgreementStore>,
    pub communications: Arc<dyn CommunicationStore>,
    pub drugs: Arc<dyn DrugStore>,
    pub unit_of_work: Arc<dyn UnitOfWork>,
}

impl Repositories {
    pub fn postgres(pool: AsyncDbPool) -> Self {
        Self {
            leases: Arc::new(LeaseRepository::new(pool.clone())),
            settings: Arc::new(SettingRepository::new(pool.clone())),
            emails: Arc::new(EmailRepository::new(pool.clone())),
            cache: Arc::new(CacheRepository::new(pool.clone())),
            profiles: Arc::new(ProfileRepository::new(pool.clone())),
            agreements: Arc::new(LegalAgreementRepository::new(pool.clone())),
            communications: Arc::new(CommunicationRepository::new(pool.clone())),
            drugs: Arc::new(DrugRepository::new(pool.clone())),
            unit_of_work: Arc::new(PgUnitOfWork::new(pool)),
        }
    }

    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            leases: store.clone(),
            settings: store.clone(),
            emails: store.clone(),
            cache: store.clone(),
            profiles: store.clone(),
            agreements: store.clone(),
            communications: store.clone(),
            drugs: store.clone(),
            unit_of_work: store,
        }
    }
}
