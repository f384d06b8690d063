use crate::error::DatabaseErrorConverter;
use thiserror::Error;

/// Application-wide error type shared by stores, services and jobs.
///
/// Jobs never inspect these variants to decide control flow directly; the
/// executor asks [`AppError::is_transient`] and turns the answer into a
/// [`JobOutcome`](crate::jobs::JobOutcome).
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found error with entity, field, and value information
    #[error("Resource not found: {entity} with {field}={value}")]
    NotFound {
        entity: String,
        field: String,
        value: String,
    },

    /// Duplicate entry error for unique constraint violations
    #[error("Duplicate entry: {entity}.{field} = '{value}' already exists")]
    Duplicate {
        entity: String,
        field: String,
        value: String,
    },

    /// Validation error with field-specific details
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// A state machine was asked to move somewhere it cannot go
    #[error("Invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// Database operation error with operation context
    #[error("Database operation failed: {operation}")]
    Database {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// Configuration error with key information
    #[error("Configuration error: {key}")]
    Configuration {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Connection pool error
    #[error("Connection pool error")]
    ConnectionPool {
        #[source]
        source: anyhow::Error,
    },

    /// An outbound collaborator (identity provider, patient service,
    /// file host) failed or rejected the call
    #[error("External service '{service}' failed")]
    External {
        service: String,
        #[source]
        source: anyhow::Error,
    },

    /// Work stopped at a cancellation request before it was complete
    #[error("Cancelled before completion: {operation}")]
    Cancelled { operation: String },

    /// Internal error for unexpected failures
    #[error("Internal error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

impl AppError {
    /// Shorthand for an [`AppError::External`] with a plain message.
    pub fn external(service: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::External {
            service: service.into(),
            source: anyhow::Error::msg(message.into()),
        }
    }

    /// Shorthand for an [`AppError::Configuration`] with a plain message.
    pub fn configuration(key: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Configuration {
            key: key.into(),
            source: anyhow::Error::msg(message.into()),
        }
    }

    /// Whether a later run of the same job can reasonably be expected to
    /// succeed without anyone changing code or configuration.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Database { .. }
                | AppError::ConnectionPool { .. }
                | AppError::External { .. }
                | AppError::Cancelled { .. }
        )
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal { source: error }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(error: diesel::result::Error) -> Self {
        DatabaseErrorConverter::convert_diesel_error(error, "database operation")
    }
}

impl From<crate::config::error::ConfigError> for AppError {
    fn from(error: crate::config::error::ConfigError) -> Self {
        let key = match &error {
            crate::config::error::ConfigError::ValidationError { field, .. } => field.clone(),
            _ => "settings".to_string(),
        };
        AppError::Configuration {
            key,
            source: anyhow::Error::from(error),
        }
    }
}

impl From<crate::jobs::JobError> for AppError {
    fn from(error: crate::jobs::JobError) -> Self {
        match error {
            crate::jobs::JobError::NotFound(name) => AppError::NotFound {
                entity: "job".to_string(),
                field: "name".to_string(),
                value: name,
            },
            other => AppError::Internal {
                source: anyhow::Error::from(other),
            },
        }
    }
}

/// Type alias for Result with AppError to simplify function signatures
pub type AppResult<T> = Result<T, AppError>;
