//! Configuration validation logic
//!
//! Global sections (database, logger) are checked when settings load and
//! abort startup. Job sections are checked when the job registry is built;
//! a bad job section only takes that job out of service.

use validator::{ValidationErrors, ValidationErrorsKind};

use crate::config::error::ConfigError;
use crate::config::settings::{DatabaseConfig, LoggerSettings, Settings};

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];

impl DatabaseConfig {
    /// Validate database configuration
    ///
    /// # Validation Rules
    /// - URL must not be empty and must be a PostgreSQL URL
    /// - Min and max connections must be positive, min <= max
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::validation(
                "database.url",
                "Database URL is required. Set database.url or GATEWAY_DATABASE__URL.",
            ));
        }

        if !self.url.starts_with("postgres://") && !self.url.starts_with("postgresql://") {
            return Err(ConfigError::validation(
                "database.url",
                "Invalid database URL format. Expected postgres://[user:password@]host[:port]/database",
            ));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::validation(
                "database.max_connections",
                "Max connections must be greater than 0.",
            ));
        }

        if self.min_connections == 0 {
            return Err(ConfigError::validation(
                "database.min_connections",
                "Min connections must be greater than 0.",
            ));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::ValidationError {
                field: "database.min_connections".to_string(),
                message: format!(
                    "Min connections ({}) cannot exceed max connections ({}).",
                    self.min_connections, self.max_connections
                ),
            });
        }

        Ok(())
    }
}

impl LoggerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.level.to_lowercase();
        if !level.contains('=') && !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.level".to_string(),
                message: format!(
                    "Invalid log level '{}'. Valid levels are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }

        if self.file.enabled && self.file.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.file.path",
                "File path is required when file logging is enabled.",
            ));
        }

        if !VALID_LOG_FORMATS.contains(&self.file.format.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                field: "logger.file.format".to_string(),
                message: format!(
                    "Invalid log format '{}'. Valid formats are: {}",
                    self.file.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        Ok(())
    }
}

impl Settings {
    /// Validate the sections every command depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.database.validate()?;
        self.logger.validate()?;
        Ok(())
    }
}

/// Checks a cron expression has the seconds-first shape the scheduler
/// expects (6 fields, or 7 with a year).
pub fn validate_schedule(expression: &str) -> Result<(), String> {
    let fields = expression.split_whitespace().count();
    if fields == 6 || fields == 7 {
        Ok(())
    } else {
        Err(format!(
            "schedule '{}' has {} fields, expected 6 (sec min hour dom mon dow)",
            expression, fields
        ))
    }
}

/// Flattens `validator` errors into `field: message` pairs joined by `; `.
pub fn describe_errors(errors: &ValidationErrors) -> String {
    describe_section_errors("", errors)
}

/// Like [`describe_errors`], with every field prefixed by `section.`
pub fn describe_section_errors(section: &str, errors: &ValidationErrors) -> String {
    let mut parts = Vec::new();
    collect_errors(section, errors, &mut parts);
    parts.sort();
    parts.join("; ")
}

fn collect_errors(prefix: &str, errors: &ValidationErrors, parts: &mut Vec<String>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{}.{}", prefix, field)
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                for error in field_errors {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    parts.push(format!("{}: {}", path, message));
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_errors(&path, nested, parts),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_errors(&format!("{}[{}]", path, index), nested, parts);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::{
        CleanCacheConfig, DrugImportConfig, DrugSourceConfig, NotifyConfig, PatientConfig,
    };
    use validator::Validate;

    fn valid_database() -> DatabaseConfig {
        DatabaseConfig {
            url: "postgres://localhost/gateway".to_string(),
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn test_database_config_valid() {
        assert!(valid_database().validate().is_ok());
    }

    #[test]
    fn test_database_config_empty_url() {
        let err = DatabaseConfig::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "database.url"));
    }

    #[test]
    fn test_database_config_rejects_other_backends() {
        let config = DatabaseConfig {
            url: "mysql://localhost/gateway".to_string(),
            ..DatabaseConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_config_min_exceeds_max() {
        let config = DatabaseConfig {
            min_connections: 5,
            max_connections: 2,
            ..valid_database()
        };
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, ConfigError::ValidationError { ref field, .. } if field == "database.min_connections")
        );
    }

    #[test]
    fn test_logger_settings_invalid_level() {
        let settings = LoggerSettings {
            level: "verbose".to_string(),
            ..LoggerSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_logger_settings_file_enabled_empty_path() {
        let mut settings = LoggerSettings::default();
        settings.file.enabled = true;
        settings.file.path = "  ".to_string();
        let err = settings.validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { ref field, .. } if field == "logger.file.path"));
    }

    #[test]
    fn test_settings_valid() {
        let settings = Settings {
            database: valid_database(),
            ..Settings::default()
        };
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_schedule() {
        assert!(validate_schedule("0 */5 * * * *").is_ok());
        assert!(validate_schedule("0 0 3 * * Sun 2030").is_ok());
        assert!(validate_schedule("*/5 * * * *").is_err());
    }

    #[test]
    fn test_describe_errors_flat() {
        let config = CleanCacheConfig {
            delete_max_rows: 0,
            ..CleanCacheConfig::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(
            describe_errors(&errors),
            "delete_max_rows: Row limit must be positive"
        );
    }

    #[test]
    fn test_describe_errors_nested_list() {
        let config = DrugImportConfig {
            sources: vec![DrugSourceConfig {
                name: "FedDrug".to_string(),
                program: "FED".to_string(),
                url: String::new(),
                entry: None,
            }],
            ..DrugImportConfig::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(
            describe_errors(&errors),
            "sources[0].url: Source URL is required"
        );
    }

    #[test]
    fn test_describe_section_errors() {
        let config = NotifyConfig {
            base_url: "https://api.notification.example.org".to_string(),
            template_id: "tmpl".to_string(),
            ..NotifyConfig::default()
        };
        let errors = config.validate().unwrap_err();
        assert_eq!(describe_section_errors("notify", &errors), "notify.api_key: required");

        let patient = PatientConfig {
            timeout_secs: 0,
            ..PatientConfig::default()
        };
        let errors = patient.validate().unwrap_err();
        assert_eq!(
            describe_section_errors("patient", &errors),
            "patient.base_url: required; patient.timeout_secs: Timeout must be 1-300 seconds"
        );
    }
}
