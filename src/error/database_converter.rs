use crate::error::AppError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// Utility for converting database errors to structured AppError variants.
pub struct DatabaseErrorConverter;

impl DatabaseErrorConverter {
    /// Converts a Diesel error to an appropriate AppError variant.
    ///
    /// Constraint violations become `Duplicate`/`Validation` (fatal for a job),
    /// everything else becomes `Database` (transient).
    pub fn convert_diesel_error(error: DieselError, operation: &str) -> AppError {
        match error {
            DieselError::DatabaseError(kind, info) => {
                Self::convert_database_error(kind, info.as_ref(), operation)
            }
            DieselError::NotFound => AppError::NotFound {
                entity: "resource".to_string(),
                field: "id".to_string(),
                value: "unknown".to_string(),
            },
            other => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::from(other),
            },
        }
    }

    fn convert_database_error(
        kind: DatabaseErrorKind,
        info: &(dyn diesel::result::DatabaseErrorInformation + Send + Sync),
        operation: &str,
    ) -> AppError {
        let message = info.message();
        let entity = info.table_name().unwrap_or("unknown").to_string();
        let field = info
            .column_name()
            .or(info.constraint_name())
            .unwrap_or("unknown")
            .to_string();

        match kind {
            DatabaseErrorKind::UniqueViolation => AppError::Duplicate {
                entity,
                field,
                value: info.details().unwrap_or(message).to_string(),
            },
            DatabaseErrorKind::NotNullViolation => AppError::Validation {
                field,
                reason: format!("Field is required for {}", entity),
            },
            DatabaseErrorKind::ForeignKeyViolation => AppError::Validation {
                field,
                reason: format!("Invalid reference from {}: {}", entity, message),
            },
            DatabaseErrorKind::CheckViolation => AppError::Validation {
                field,
                reason: format!("Check constraint failed for {}", entity),
            },
            _ => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::msg(format!("Database error: {}", message)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_not_found() {
        let err = DatabaseErrorConverter::convert_diesel_error(DieselError::NotFound, "load");
        assert!(matches!(err, AppError::NotFound { .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_rollback_is_transient_database_error() {
        let err = DatabaseErrorConverter::convert_diesel_error(
            DieselError::RollbackTransaction,
            "commit page",
        );
        match &err {
            AppError::Database { operation, .. } => assert_eq!(operation, "commit page"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.is_transient());
    }
}
