//! Configuration settings structures
//!
//! Everything that can be loaded from TOML files and `GATEWAY_*`
//! environment variables. A loaded [`Settings`] value is handed to each
//! component when it is built; nothing reads configuration globally.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::config::error::ConfigError;
use crate::logger::{ConsoleConfig, FileConfig, LogFormat, LoggerConfig};
use crate::models::{EmailFormat, EmailPriority};

// ============================================================================
// Default value functions
// ============================================================================

fn default_app_name() -> String {
    "gateway-jobs".to_string()
}

fn default_app_version() -> String {
    crate::pkg_version().to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_min_connections() -> u32 {
    1
}

fn default_connection_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_log_path() -> String {
    "logs/gateway-jobs.log".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_max_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

fn default_max_files() -> usize {
    5
}

fn default_http_timeout() -> u64 {
    30
}

fn default_from_address() -> String {
    "HG_Donotreply@gov.bc.ca".to_string()
}

fn default_concurrency_timeout() -> u64 {
    300
}

fn default_page_size() -> i64 {
    500
}

fn default_hours_before_deletion() -> i64 {
    720
}

fn default_close_template() -> String {
    "AccountRemoved".to_string()
}

fn default_agreement_type() -> String {
    "ToS".to_string()
}

fn default_legal_template() -> String {
    "UpdatedLegalAgreement".to_string()
}

fn default_beta_batch_size() -> i64 {
    1000
}

fn default_beta_user_count() -> i64 {
    10_000
}

fn default_delete_max_rows() -> i64 {
    1000
}

fn default_delete_after_days() -> i64 {
    30
}

fn default_max_retries() -> u32 {
    9
}

fn default_retry_fetch_size() -> i64 {
    250
}

fn default_communication_timeout() -> u64 {
    1800
}

fn default_communication_fetch_size() -> i64 {
    250
}

fn default_one_time_batch_size() -> i64 {
    5000
}

// ============================================================================
// Application Configuration
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    #[serde(default = "default_app_name")]
    pub name: String,

    #[serde(default = "default_app_version")]
    pub version: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
        }
    }
}

// ============================================================================
// Database Configuration
// ============================================================================

/// Diesel database connection configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub url: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout: u64,

    /// Apply pending migrations when `serve` starts
    #[serde(default)]
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connection_timeout: default_connection_timeout(),
            auto_migrate: false,
        }
    }
}

// ============================================================================
// Logger Settings
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_true")]
    pub colored: bool,
}

impl Default for ConsoleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            colored: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_log_path")]
    pub path: String,

    #[serde(default = "default_true")]
    pub append: bool,

    /// "full", "compact" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Maximum file size in bytes before rotation
    #[serde(default = "default_max_size")]
    pub max_size: u64,

    /// Rotated files to keep
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_log_path(),
            append: true,
            format: default_log_format(),
            max_size: default_max_size(),
            max_files: default_max_files(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggerSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub console: ConsoleSettings,

    #[serde(default)]
    pub file: FileSettings,
}

impl Default for LoggerSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            console: ConsoleSettings::default(),
            file: FileSettings::default(),
        }
    }
}

impl LoggerSettings {
    /// Convert the file representation into the runtime [`LoggerConfig`].
    pub fn into_logger_config(self) -> Result<LoggerConfig, ConfigError> {
        let format = self
            .file
            .format
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::validation("logger.file.format", e.to_string()))?;

        let file = FileConfig {
            enabled: self.file.enabled,
            path: PathBuf::from(self.file.path),
            append: self.file.append,
            format,
            max_size: self.file.max_size,
            max_files: self.file.max_files,
        };
        let console = ConsoleConfig::new(self.console.enabled, self.console.colored);

        LoggerConfig::new(console, file, self.level)
            .map_err(|e| ConfigError::validation("logger", e.to_string()))
    }
}

// ============================================================================
// Outbound collaborators
// ============================================================================

/// Notification API used as the mail transport
///
/// Checked only by the jobs that send through it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct NotifyConfig {
    #[serde(default)]
    #[validate(length(min = 1, message = "required"))]
    pub base_url: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "required"))]
    pub api_key: String,

    /// Notify template used for every outbound email
    #[serde(default)]
    #[validate(length(min = 1, message = "required"))]
    pub template_id: String,

    #[serde(default = "default_http_timeout")]
    #[validate(range(min = 1, max = 300, message = "Timeout must be 1-300 seconds"))]
    pub timeout_secs: u64,
}

/// Identity provider administration API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct IdentityConfig {
    #[serde(default)]
    #[validate(length(min = 1, message = "required"))]
    pub token_url: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "required"))]
    pub admin_url: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "required"))]
    pub client_id: String,

    #[serde(default)]
    #[validate(length(min = 1, message = "required"))]
    pub client_secret: String,

    #[serde(default = "default_http_timeout")]
    #[validate(range(min = 1, max = 300, message = "Timeout must be 1-300 seconds"))]
    pub timeout_secs: u64,
}

/// Patient demographics service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct PatientConfig {
    #[serde(default)]
    #[validate(length(min = 1, message = "required"))]
    pub base_url: String,

    #[serde(default = "default_http_timeout")]
    #[validate(range(min = 1, max = 300, message = "Timeout must be 1-300 seconds"))]
    pub timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            template_id: String::new(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            token_url: String::new(),
            admin_url: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            timeout_secs: default_http_timeout(),
        }
    }
}

impl Default for PatientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: default_http_timeout(),
        }
    }
}

// ============================================================================
// Email templates
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailTemplateConfig {
    pub subject: String,
    pub body: String,

    #[serde(default)]
    pub format: EmailFormat,

    #[serde(default)]
    pub priority: EmailPriority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "default_from_address")]
    pub from: String,

    #[serde(default)]
    pub templates: HashMap<String, EmailTemplateConfig>,
}

impl EmailConfig {
    /// Looks a template up by name, ignoring case (environment overrides
    /// arrive lowercased).
    pub fn template(&self, name: &str) -> Option<&EmailTemplateConfig> {
        self.templates.get(name).or_else(|| {
            self.templates
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, template)| template)
        })
    }
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            from: default_from_address(),
            templates: HashMap::new(),
        }
    }
}

// ============================================================================
// Jobs Configuration
// ============================================================================

/// Account closure: delete profiles closed for longer than the grace period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CloseAccountsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default = "default_concurrency_timeout")]
    #[validate(range(min = 1, max = 604_800, message = "Lease length must be between one second and one week"))]
    pub concurrency_timeout_secs: u64,

    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, message = "Page size must be positive"))]
    pub profiles_page_size: i64,

    #[serde(default = "default_hours_before_deletion")]
    #[validate(range(min = 0, max = 876_000, message = "Grace period must be between 0 and 100 years in hours"))]
    pub hours_before_deletion: i64,

    #[serde(default = "default_close_template")]
    #[validate(length(min = 1, message = "Template name is required"))]
    pub email_template: String,
}

impl Default for CloseAccountsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: None,
            concurrency_timeout_secs: default_concurrency_timeout(),
            profiles_page_size: default_page_size(),
            hours_before_deletion: default_hours_before_deletion(),
            email_template: default_close_template(),
        }
    }
}

/// Legal-agreement notifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct LegalAgreementsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default = "default_concurrency_timeout")]
    #[validate(range(min = 1, max = 604_800, message = "Lease length must be between one second and one week"))]
    pub concurrency_timeout_secs: u64,

    #[serde(default = "default_page_size")]
    #[validate(range(min = 1, message = "Page size must be positive"))]
    pub profiles_page_size: i64,

    #[serde(default = "default_agreement_type")]
    #[validate(length(min = 1, max = 16, message = "Agreement type must be 1-16 characters"))]
    pub agreement_type: String,

    #[serde(default = "default_legal_template")]
    #[validate(length(min = 1, message = "Template name is required"))]
    pub email_template: String,
}

impl Default for LegalAgreementsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: None,
            concurrency_timeout_secs: default_concurrency_timeout(),
            profiles_page_size: default_page_size(),
            agreement_type: default_agreement_type(),
            email_template: default_legal_template(),
        }
    }
}

/// Beta-feature assignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct BetaFeatureConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default = "default_concurrency_timeout")]
    #[validate(range(min = 1, max = 604_800, message = "Lease length must be between one second and one week"))]
    pub concurrency_timeout_secs: u64,

    #[serde(default)]
    #[validate(length(min = 1, max = 64, message = "Feature name must be 1-64 characters"))]
    pub feature: String,

    #[serde(default = "default_beta_batch_size")]
    #[validate(range(min = 1, message = "Batch size must be positive"))]
    pub max_batch_size: i64,

    #[serde(default = "default_beta_user_count")]
    #[validate(range(min = 0, message = "User count cannot be negative"))]
    pub user_count: i64,
}

impl Default for BetaFeatureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: None,
            concurrency_timeout_secs: default_concurrency_timeout(),
            feature: String::new(),
            max_batch_size: default_beta_batch_size(),
            user_count: default_beta_user_count(),
        }
    }
}

/// Expired generic-cache eviction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CleanCacheConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default = "default_concurrency_timeout")]
    #[validate(range(min = 1, max = 604_800, message = "Lease length must be between one second and one week"))]
    pub concurrency_timeout_secs: u64,

    #[serde(default = "default_delete_max_rows")]
    #[validate(range(min = 1, message = "Row limit must be positive"))]
    pub delete_max_rows: i64,
}

impl Default for CleanCacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: None,
            concurrency_timeout_secs: default_concurrency_timeout(),
            delete_max_rows: default_delete_max_rows(),
        }
    }
}

/// Email retention
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct DeleteEmailsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default = "default_concurrency_timeout")]
    #[validate(range(min = 1, max = 604_800, message = "Lease length must be between one second and one week"))]
    pub concurrency_timeout_secs: u64,

    #[serde(default = "default_delete_after_days")]
    #[validate(range(min = 1, max = 36_500, message = "Retention must be between one day and 100 years"))]
    pub delete_after_days: i64,

    #[serde(default = "default_delete_max_rows")]
    #[validate(range(min = 1, message = "Row limit must be positive"))]
    pub delete_max_rows: i64,
}

impl Default for DeleteEmailsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: None,
            concurrency_timeout_secs: default_concurrency_timeout(),
            delete_after_days: default_delete_after_days(),
            delete_max_rows: default_delete_max_rows(),
        }
    }
}

/// Pending-email sender sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SendEmailsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default = "default_concurrency_timeout")]
    #[validate(range(min = 1, max = 604_800, message = "Lease length must be between one second and one week"))]
    pub concurrency_timeout_secs: u64,

    /// Total delivery attempts before an email is marked as failed
    #[serde(default = "default_max_retries")]
    #[validate(range(min = 1, message = "At least one attempt is required"))]
    pub max_retries: u32,

    #[serde(default = "default_retry_fetch_size")]
    #[validate(range(min = 1, message = "Fetch size must be positive"))]
    pub max_retry_fetch_size: i64,
}

impl Default for SendEmailsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: None,
            concurrency_timeout_secs: default_concurrency_timeout(),
            max_retries: default_max_retries(),
            max_retry_fetch_size: default_retry_fetch_size(),
        }
    }
}

/// Fan-out of broadcast email communications into queued emails
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CommunicationEmailsConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default = "default_communication_timeout")]
    #[validate(range(min = 1, max = 604_800, message = "Lease length must be between one second and one week"))]
    pub concurrency_timeout_secs: u64,

    /// Profiles fetched and committed per page
    #[serde(default = "default_communication_fetch_size")]
    #[validate(range(min = 1, message = "Fetch size must be positive"))]
    pub max_fetch_size: i64,
}

impl Default for CommunicationEmailsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: None,
            concurrency_timeout_secs: default_communication_timeout(),
            max_fetch_size: default_communication_fetch_size(),
        }
    }
}

/// One-time task runner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct OneTimeConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default = "default_concurrency_timeout")]
    #[validate(range(min = 1, max = 604_800, message = "Lease length must be between one second and one week"))]
    pub concurrency_timeout_secs: u64,

    #[serde(default = "default_one_time_batch_size")]
    #[validate(range(min = 1, message = "Batch size must be positive"))]
    pub batch_size: i64,
}

impl Default for OneTimeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: None,
            concurrency_timeout_secs: default_concurrency_timeout(),
            batch_size: default_one_time_batch_size(),
        }
    }
}

/// One downloadable drug product file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct DrugSourceConfig {
    #[validate(length(min = 1, message = "Source name is required"))]
    pub name: String,

    #[validate(length(min = 1, max = 32, message = "Program code must be 1-32 characters"))]
    pub program: String,

    #[validate(length(min = 1, message = "Source URL is required"))]
    pub url: String,

    /// Member to extract when the download is a zip archive
    #[serde(default)]
    pub entry: Option<String>,
}

/// Drug-file import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct DrugImportConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub schedule: Option<String>,

    #[serde(default = "default_concurrency_timeout")]
    #[validate(range(min = 1, max = 604_800, message = "Lease length must be between one second and one week"))]
    pub concurrency_timeout_secs: u64,

    #[serde(default)]
    #[validate(nested)]
    pub sources: Vec<DrugSourceConfig>,
}

impl Default for DrugImportConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            schedule: None,
            concurrency_timeout_secs: default_concurrency_timeout(),
            sources: Vec::new(),
        }
    }
}

/// Per-job configuration sections
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct JobsConfig {
    #[serde(default)]
    pub close_accounts: CloseAccountsConfig,

    #[serde(default)]
    pub notify_legal_agreements: LegalAgreementsConfig,

    #[serde(default)]
    pub beta_feature: BetaFeatureConfig,

    #[serde(default)]
    pub clean_cache: CleanCacheConfig,

    #[serde(default)]
    pub delete_emails: DeleteEmailsConfig,

    #[serde(default)]
    pub send_emails: SendEmailsConfig,

    #[serde(default)]
    pub communication_emails: CommunicationEmailsConfig,

    #[serde(default)]
    pub one_time: OneTimeConfig,

    #[serde(default)]
    pub drug_import: DrugImportConfig,
}

// ============================================================================
// Main Settings Structure
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub application: ApplicationConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub logger: LoggerSettings,

    #[serde(default)]
    pub notify: NotifyConfig,

    #[serde(default)]
    pub identity: IdentityConfig,

    #[serde(default)]
    pub patient: PatientConfig,

    #[serde(default)]
    pub email: EmailConfig,

    #[serde(default)]
    pub jobs: JobsConfig,
}
