//! # Persistence Errors
//!
//! Error types cho persistence layer, wrapping sqlx và IO errors.

use thiserror::Error;

/// Persistence layer errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    // === Database errors ===
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Record already exists: {entity} with id {id}")]
    AlreadyExists { entity: String, id: String },

    #[error("Unique constraint violation: {0}")]
    UniqueViolation(String),

    // === Event store errors ===
    #[error("Event store IO error: {0}")]
    EventStoreIo(#[from] std::io::Error),

    #[error("Event serialization error: {0}")]
    EventSerialization(#[from] serde_json::Error),

    // === Conversion errors ===
    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    // === Other errors ===
    #[error("{0}")]
    Other(String),
}

/// Result type alias cho PersistenceError
pub type PersistenceResult<T> = Result<T, PersistenceError>;

impl PersistenceError {
    /// Tạo NotFound error
    pub fn not_found(entity: &str, id: &str) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Tạo AlreadyExists error
    pub fn already_exists(entity: &str, id: &str) -> Self {
        Self::AlreadyExists {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    pub fn invalid_value(field: &str, value: impl ToString) -> Self {
        Self::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Kiểm tra có phải lỗi not found không
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Kiểm tra có phải lỗi trùng khóa không (kể cả lỗi gốc từ SQLite)
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::UniqueViolation(_) | Self::AlreadyExists { .. } => true,
            Self::Database(sqlx::Error::Database(db)) => db.is_unique_violation(),
            _ => false,
        }
    }

    /// Kiểm tra có phải lỗi database không
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors() {
        let err = PersistenceError::not_found("Record", "INV_001");
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Record not found: Record with id INV_001");

        let err = PersistenceError::already_exists("ViewCredit", "user_1");
        assert!(err.is_unique_violation());
        assert!(!err.is_database_error());
    }
}
