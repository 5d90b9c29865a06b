//! Business layer errors
//!
//! Lỗi hạ tầng và cấu hình. Kết quả nghiệp vụ (thiếu credit, hết quota)
//! đi qua `ConsumeOutcome::Denied`, không phải qua đây.

use crate::config::ConfigError;
use thiserror::Error;

/// Gate operation errors
#[derive(Debug, Error)]
pub enum GateError {
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    #[error("Owner not provisioned: {0}")]
    OwnerNotFound(String),

    #[error("Invalid grant amount: {0}")]
    InvalidGrant(i64),

    #[error("Operation requires an authenticated identity: {0}")]
    AuthenticationRequired(String),

    /// CAS không thắng sau `attempts` lần thử
    #[error("Contention on {owner_id} after {attempts} attempts")]
    Contended { owner_id: String, attempts: u32 },

    #[error("Internal error: {0}")]
    Internal(String),

    // === Wrapped errors ===
    #[error("Persistence error: {0}")]
    Persistence(#[from] creditgate_persistence::PersistenceError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Core error: {0}")]
    Core(#[from] creditgate_core::CoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias cho gate operations
pub type GateResult<T> = Result<T, GateError>;

impl GateError {
    pub fn contended(owner_id: &str, attempts: u32) -> Self {
        Self::Contended {
            owner_id: owner_id.to_string(),
            attempts,
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Self::RecordNotFound(_) | Self::OwnerNotFound(_) => true,
            Self::Persistence(e) => e.is_not_found(),
            _ => false,
        }
    }

    pub fn is_contended(&self) -> bool {
        matches!(self, Self::Contended { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use creditgate_persistence::PersistenceError;

    #[test]
    fn test_contended_error() {
        let err = GateError::contended("user_1", 5);
        assert!(err.is_contended());
        assert!(err.to_string().contains("after 5 attempts"));
    }

    #[test]
    fn test_not_found_through_persistence() {
        let err: GateError = PersistenceError::not_found("Record", "INV_404").into();
        assert!(err.is_not_found());
        assert!(!GateError::InvalidGrant(0).is_not_found());
    }
}
