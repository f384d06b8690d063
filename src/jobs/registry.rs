use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use validator::Validate;

use crate::config::Settings;
use crate::config::validation::{describe_errors, describe_section_errors, validate_schedule};
use crate::jobs::error::{JobError, JobResult};
use crate::jobs::once::OneTimeRunner;
use crate::jobs::tasks::{
    BetaFeatureJob, CleanCacheJob, CloseAccountsJob, CommunicationEmailsJob, DeleteEmailsJob,
    DrugImportJob, LegalAgreementNotifierJob, OneTimeJob, PopulateYearOfBirth, SendEmailsJob,
    beta_feature, clean_cache, close_accounts, communication_emails, delete_emails,
    legal_agreements, one_time, send_emails,
};
use crate::jobs::types::JobTask;
use crate::repositories::Repositories;
use crate::services::{
    EmailQueueService, EmailSender, FileFetcher, IdentityAdmin, MailTransport, PatientLookup,
};
use crate::utils::Clock;

/// Name listed for the drug import when no source is configured
pub const DRUG_IMPORT_NAME: &str = "DrugImport";

/// Everything the jobs need from outside, built once at startup
#[derive(Clone)]
pub struct JobDependencies {
    pub repositories: Repositories,
    pub clock: Arc<dyn Clock>,
    pub transport: Arc<dyn MailTransport>,
    pub identity: Arc<dyn IdentityAdmin>,
    pub patients: Arc<dyn PatientLookup>,
    pub fetcher: Arc<dyn FileFetcher>,
}

/// Whether a job can run
#[derive(Clone)]
pub enum JobState {
    Ready(Arc<dyn JobTask>),
    Disabled,
    Misconfigured(String),
}

impl JobState {
    pub fn label(&self) -> &'static str {
        match self {
            JobState::Ready(_) => "ready",
            JobState::Disabled => "disabled",
            JobState::Misconfigured(_) => "misconfigured",
        }
    }
}

impl fmt::Debug for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Ready(task) => f.debug_tuple("Ready").field(task).finish(),
            JobState::Disabled => write!(f, "Disabled"),
            JobState::Misconfigured(reason) => f.debug_tuple("Misconfigured").field(reason).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobEntry {
    pub name: String,
    pub schedule: Option<String>,
    pub state: JobState,
}

/// Registry mapping job names to runnable tasks
#[derive(Debug, Default)]
pub struct JobRegistry {
    entries: Vec<JobEntry>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job under a unique (case-insensitive) name
    pub fn register(&mut self, entry: JobEntry) -> JobResult<&mut Self> {
        if self.get(&entry.name).is_some() {
            return Err(JobError::AlreadyExists(entry.name));
        }
        self.entries.push(entry);
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&JobEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name.eq_ignore_ascii_case(name))
    }

    /// All jobs in registration order
    pub fn entries(&self) -> &[JobEntry] {
        &self.entries
    }

    /// Builds every job from its configuration section.
    ///
    /// A disabled or invalid section yields a non-ready entry rather than
    /// an error, so one bad section never keeps the other jobs from running.
    pub fn from_settings(settings: &Settings, deps: &JobDependencies) -> JobResult<Self> {
        let jobs = &settings.jobs;
        let repos = &deps.repositories;
        let queue = EmailQueueService::new(settings.email.clone(), repos.emails.clone(), deps.clock.clone());
        let mut registry = Self::new();

        let config = &jobs.close_accounts;
        let state = assess(config.enabled, config, config.schedule.as_deref(), || {
            Arc::new(CloseAccountsJob::new(
                config.clone(),
                repos.profiles.clone(),
                repos.unit_of_work.clone(),
                queue.clone(),
                deps.identity.clone(),
            ))
        });
        registry.register(JobEntry {
            name: close_accounts::JOB_NAME.to_string(),
            schedule: config.schedule.clone(),
            state: require_collaborator(
                require_template(state, &queue, &config.email_template),
                "identity",
                &settings.identity,
            ),
        })?;

        let config = &jobs.notify_legal_agreements;
        let state = assess(config.enabled, config, config.schedule.as_deref(), || {
            Arc::new(LegalAgreementNotifierJob::new(
                config.clone(),
                repos.agreements.clone(),
                repos.profiles.clone(),
                repos.settings.clone(),
                repos.unit_of_work.clone(),
                queue.clone(),
            ))
        });
        registry.register(JobEntry {
            name: legal_agreements::JOB_NAME.to_string(),
            schedule: config.schedule.clone(),
            state: require_template(state, &queue, &config.email_template),
        })?;

        let config = &jobs.beta_feature;
        registry.register(JobEntry {
            name: beta_feature::JOB_NAME.to_string(),
            schedule: config.schedule.clone(),
            state: assess(config.enabled, config, config.schedule.as_deref(), || {
                Arc::new(BetaFeatureJob::new(
                    config.clone(),
                    repos.profiles.clone(),
                    repos.unit_of_work.clone(),
                ))
            }),
        })?;

        let config = &jobs.clean_cache;
        registry.register(JobEntry {
            name: clean_cache::JOB_NAME.to_string(),
            schedule: config.schedule.clone(),
            state: assess(config.enabled, config, config.schedule.as_deref(), || {
                Arc::new(CleanCacheJob::new(config.clone(), repos.cache.clone()))
            }),
        })?;

        let config = &jobs.delete_emails;
        registry.register(JobEntry {
            name: delete_emails::JOB_NAME.to_string(),
            schedule: config.schedule.clone(),
            state: assess(config.enabled, config, config.schedule.as_deref(), || {
                Arc::new(DeleteEmailsJob::new(config.clone(), repos.emails.clone()))
            }),
        })?;

        let config = &jobs.send_emails;
        let state = assess(config.enabled, config, config.schedule.as_deref(), || {
            let sender = EmailSender::new(
                repos.emails.clone(),
                deps.transport.clone(),
                deps.clock.clone(),
                config.max_retries,
            );
            Arc::new(SendEmailsJob::new(config.clone(), sender))
        });
        registry.register(JobEntry {
            name: send_emails::JOB_NAME.to_string(),
            schedule: config.schedule.clone(),
            state: require_collaborator(state, "notify", &settings.notify),
        })?;

        let config = &jobs.communication_emails;
        registry.register(JobEntry {
            name: communication_emails::JOB_NAME.to_string(),
            schedule: config.schedule.clone(),
            state: assess(config.enabled, config, config.schedule.as_deref(), || {
                Arc::new(CommunicationEmailsJob::new(
                    config.clone(),
                    repos.communications.clone(),
                    repos.profiles.clone(),
                    repos.unit_of_work.clone(),
                    queue.clone(),
                ))
            }),
        })?;

        let config = &jobs.one_time;
        let state = assess(config.enabled, config, config.schedule.as_deref(), || {
            let runner = OneTimeRunner::new(repos.settings.clone(), deps.clock.clone());
            Arc::new(OneTimeJob::new(config.clone(), runner).with_task(Arc::new(
                PopulateYearOfBirth::new(
                    repos.profiles.clone(),
                    repos.unit_of_work.clone(),
                    deps.patients.clone(),
                    config.batch_size,
                ),
            )))
        });
        registry.register(JobEntry {
            name: one_time::JOB_NAME.to_string(),
            schedule: config.schedule.clone(),
            state: require_collaborator(state, "patient", &settings.patient),
        })?;

        let config = &jobs.drug_import;
        if config.sources.is_empty() {
            let state = if config.enabled {
                JobState::Misconfigured("sources: at least one source is required".to_string())
            } else {
                JobState::Disabled
            };
            registry.register(JobEntry {
                name: DRUG_IMPORT_NAME.to_string(),
                schedule: config.schedule.clone(),
                state,
            })?;
        }
        for source in &config.sources {
            registry.register(JobEntry {
                name: source.name.clone(),
                schedule: config.schedule.clone(),
                state: assess(config.enabled, config, config.schedule.as_deref(), || {
                    Arc::new(DrugImportJob::new(
                        source.clone(),
                        Duration::from_secs(config.concurrency_timeout_secs),
                        deps.fetcher.clone(),
                        repos.drugs.clone(),
                    ))
                }),
            })?;
        }

        for entry in &registry.entries {
            match &entry.state {
                JobState::Ready(_) => tracing::debug!(job = %entry.name, schedule = ?entry.schedule, "Job ready"),
                JobState::Disabled => tracing::debug!(job = %entry.name, "Job disabled"),
                JobState::Misconfigured(reason) => {
                    tracing::warn!(job = %entry.name, reason = %reason, "Job misconfigured, runs will be skipped")
                }
            }
        }
        Ok(registry)
    }
}

fn assess<C: Validate>(
    enabled: bool,
    config: &C,
    schedule: Option<&str>,
    build: impl FnOnce() -> Arc<dyn JobTask>,
) -> JobState {
    if !enabled {
        return JobState::Disabled;
    }
    if let Err(errors) = config.validate() {
        return JobState::Misconfigured(describe_errors(&errors));
    }
    if let Some(schedule) = schedule
        && let Err(reason) = validate_schedule(schedule)
    {
        return JobState::Misconfigured(reason);
    }
    JobState::Ready(build())
}

fn require_template(state: JobState, queue: &EmailQueueService, template: &str) -> JobState {
    match state {
        JobState::Ready(_) if !queue.has_template(template) => {
            JobState::Misconfigured(format!("email template '{template}' is not configured"))
        }
        other => other,
    }
}

/// A ready job whose outbound service has no usable settings would fail
/// every run, so it is taken out of service instead.
fn require_collaborator<C: Validate>(state: JobState, section: &str, config: &C) -> JobState {
    if let JobState::Ready(_) = &state
        && let Err(errors) = config.validate()
    {
        return JobState::Misconfigured(describe_section_errors(section, &errors));
    }
    state
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DrugSourceConfig, EmailTemplateConfig, IdentityConfig, NotifyConfig};
    use crate::jobs::gate::ConcurrencyGate;
    use crate::jobs::{JobExecutor, JobOutcome, SkipReason};
    use crate::models::{Email, EmailStatus};
    use crate::repositories::{EmailStore, MemoryStore};
    use crate::services::testing::{
        FakeFileFetcher, FakeIdentityAdmin, FakePatientLookup, ScriptedTransport,
    };
    use crate::utils::FakeClock;

    pub(crate) fn deps(store: Arc<MemoryStore>) -> JobDependencies {
        JobDependencies {
            repositories: Repositories::in_memory(store),
            clock: Arc::new(FakeClock::default()),
            transport: Arc::new(ScriptedTransport::new()),
            identity: Arc::new(FakeIdentityAdmin::default()),
            patients: Arc::new(FakePatientLookup::default()),
            fetcher: Arc::new(FakeFileFetcher::default()),
        }
    }

    fn identity_config() -> IdentityConfig {
        IdentityConfig {
            token_url: "https://idp.example.org/token".to_string(),
            admin_url: "https://idp.example.org/admin".to_string(),
            client_id: "gateway-jobs".to_string(),
            client_secret: "secret".to_string(),
            ..IdentityConfig::default()
        }
    }

    fn notify_config() -> NotifyConfig {
        NotifyConfig {
            base_url: "https://api.notification.example.org".to_string(),
            api_key: "key".to_string(),
            template_id: "template".to_string(),
            ..NotifyConfig::default()
        }
    }

    fn reason_of(registry: &JobRegistry, name: &str) -> String {
        match state_of(registry, name) {
            JobState::Misconfigured(reason) => reason.clone(),
            other => panic!("{name} is {other:?}"),
        }
    }

    fn state_of<'a>(registry: &'a JobRegistry, name: &str) -> &'a JobState {
        &registry.get(name).unwrap().state
    }

    #[test]
    fn test_everything_disabled_by_default() {
        let registry = JobRegistry::from_settings(&Settings::default(), &deps(Arc::new(MemoryStore::new()))).unwrap();

        assert_eq!(registry.entries().len(), 9);
        assert!(registry
            .entries()
            .iter()
            .all(|entry| matches!(entry.state, JobState::Disabled)));
        assert!(registry.get("cleancache").is_some());
        assert!(registry.get("createcommunicationemails").is_some());
    }

    #[test]
    fn test_invalid_sections_are_misconfigured() {
        let mut settings = Settings::default();
        settings.jobs.clean_cache.enabled = true;
        settings.jobs.clean_cache.delete_max_rows = 0;
        settings.jobs.delete_emails.enabled = true;
        settings.jobs.delete_emails.schedule = Some("0 * * * *".to_string());
        settings.jobs.close_accounts.enabled = true;
        settings.jobs.beta_feature.enabled = true;
        settings.jobs.beta_feature.feature = "Salesforce".to_string();
        settings.jobs.drug_import.enabled = true;

        let registry = JobRegistry::from_settings(&settings, &deps(Arc::new(MemoryStore::new()))).unwrap();

        match state_of(&registry, clean_cache::JOB_NAME) {
            JobState::Misconfigured(reason) => assert!(reason.starts_with("delete_max_rows:")),
            other => panic!("unexpected state {other:?}"),
        }
        match state_of(&registry, delete_emails::JOB_NAME) {
            JobState::Misconfigured(reason) => assert!(reason.contains("5 fields")),
            other => panic!("unexpected state {other:?}"),
        }
        match state_of(&registry, close_accounts::JOB_NAME) {
            JobState::Misconfigured(reason) => assert!(reason.contains("AccountRemoved")),
            other => panic!("unexpected state {other:?}"),
        }
        assert_eq!(state_of(&registry, beta_feature::JOB_NAME).label(), "ready");
        assert_eq!(state_of(&registry, DRUG_IMPORT_NAME).label(), "misconfigured");
    }

    #[test]
    fn test_each_drug_source_is_a_job() {
        let mut settings = Settings::default();
        settings.jobs.drug_import.enabled = true;
        settings.jobs.drug_import.sources = ["FedDrugMarketed", "FedDrugCancelled"]
            .iter()
            .map(|name| DrugSourceConfig {
                name: name.to_string(),
                program: "FED".to_string(),
                url: format!("https://files.example.org/{name}.zip"),
                entry: None,
            })
            .collect();
        settings.email.templates.insert(
            "AccountRemoved".to_string(),
            EmailTemplateConfig {
                subject: "s".to_string(),
                body: "b".to_string(),
                format: Default::default(),
                priority: Default::default(),
            },
        );
        settings.jobs.close_accounts.enabled = true;
        settings.identity = identity_config();

        let registry = JobRegistry::from_settings(&settings, &deps(Arc::new(MemoryStore::new()))).unwrap();

        assert!(registry.get(DRUG_IMPORT_NAME).is_none());
        assert_eq!(state_of(&registry, "FedDrugMarketed").label(), "ready");
        assert_eq!(state_of(&registry, "FedDrugCancelled").label(), "ready");
        assert_eq!(state_of(&registry, close_accounts::JOB_NAME).label(), "ready");
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let mut registry = JobRegistry::new();
        let entry = JobEntry {
            name: "CleanCache".to_string(),
            schedule: None,
            state: JobState::Disabled,
        };
        registry.register(entry.clone()).unwrap();
        let mut duplicate = entry;
        duplicate.name = "cleancache".to_string();
        assert!(matches!(registry.register(duplicate), Err(JobError::AlreadyExists(_))));
    }

    #[test]
    fn test_missing_collaborator_settings_are_misconfigured() {
        let mut settings = Settings::default();
        settings.jobs.send_emails.enabled = true;
        settings.jobs.one_time.enabled = true;
        settings.jobs.close_accounts.enabled = true;
        settings.email.templates.insert(
            "AccountRemoved".to_string(),
            EmailTemplateConfig {
                subject: "s".to_string(),
                body: "b".to_string(),
                format: Default::default(),
                priority: Default::default(),
            },
        );
        settings.notify = NotifyConfig {
            api_key: String::new(),
            ..notify_config()
        };
        settings.identity = IdentityConfig {
            client_secret: String::new(),
            ..identity_config()
        };
        let store = Arc::new(MemoryStore::new());

        let registry = JobRegistry::from_settings(&settings, &deps(store.clone())).unwrap();
        assert_eq!(reason_of(&registry, send_emails::JOB_NAME), "notify.api_key: required");
        assert_eq!(reason_of(&registry, close_accounts::JOB_NAME), "identity.client_secret: required");
        assert_eq!(reason_of(&registry, one_time::JOB_NAME), "patient.base_url: required");

        settings.notify = notify_config();
        settings.identity = identity_config();
        settings.patient.base_url = "https://patient.example.org/api".to_string();
        let registry = JobRegistry::from_settings(&settings, &deps(store)).unwrap();
        assert_eq!(state_of(&registry, send_emails::JOB_NAME).label(), "ready");
        assert_eq!(state_of(&registry, close_accounts::JOB_NAME).label(), "ready");
        assert_eq!(state_of(&registry, one_time::JOB_NAME).label(), "ready");
    }

    #[tokio::test]
    async fn test_send_without_transport_settings_leaves_queue_alone() {
        let mut settings = Settings::default();
        settings.jobs.send_emails.enabled = true;
        settings.jobs.send_emails.max_retries = 3;
        let store = Arc::new(MemoryStore::new());
        let email = Email::new("from@gov", "to@example.com", "s", "b", FakeClock::default().now());
        store.insert(&email).await.unwrap();

        let deps = deps(store.clone());
        let registry = JobRegistry::from_settings(&settings, &deps).unwrap();
        let executor = JobExecutor::new(
            Arc::new(registry),
            ConcurrencyGate::new(store.clone(), deps.clock.clone()),
            deps.clock.clone(),
        );

        for _ in 0..3 {
            let outcome = executor.run(send_emails::JOB_NAME).await.unwrap();
            assert!(matches!(outcome, JobOutcome::Skipped(SkipReason::Misconfigured(_))));
        }

        let stored = store.find(email.id).await.unwrap().unwrap();
        assert_eq!(stored.status, EmailStatus::New);
        assert_eq!(stored.attempts, 0);
    }
}
