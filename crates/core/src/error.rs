//! # Error Module
//!
//! Định nghĩa các domain errors cho Creditgate sử dụng thiserror.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Core domain errors.
///
/// Các lỗi nghiệp vụ cốt lõi, không liên quan đến infrastructure.
#[derive(Debug, Error)]
pub enum CoreError {
    // === Credit errors ===
    #[error("Insufficient credits for {owner_id}: allocated {allocated}, used {used}")]
    InsufficientCredits {
        owner_id: String,
        allocated: i64,
        used: i64,
    },

    #[error("Quota exhausted for {owner_id}, resets at {reset_at}")]
    QuotaExhausted {
        owner_id: String,
        reset_at: DateTime<Utc>,
    },

    #[error("Invalid grant amount: {0}")]
    InvalidGrant(i64),

    // === Identity errors ===
    #[error("Invalid identity: {0}")]
    InvalidIdentity(String),

    // === Policy errors ===
    #[error("Unknown tier: {0}")]
    UnknownTier(String),

    #[error("Invalid cadence: {0}")]
    InvalidCadence(String),

    #[error("Unknown credit flavor: {0}")]
    UnknownFlavor(String),

    // === Validation errors ===
    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Result type alias với CoreError
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Kiểm tra có phải lỗi thiếu credit không
    pub fn is_insufficient_credits(&self) -> bool {
        matches!(self, CoreError::InsufficientCredits { .. })
    }

    /// Kiểm tra có phải lỗi hết quota không
    pub fn is_quota_exhausted(&self) -> bool {
        matches!(self, CoreError::QuotaExhausted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::InsufficientCredits {
            owner_id: "user_1".to_string(),
            allocated: 3,
            used: 3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient credits for user_1: allocated 3, used 3"
        );

        let err = CoreError::UnknownTier("platinum".to_string());
        assert_eq!(err.to_string(), "Unknown tier: platinum");
    }

    #[test]
    fn test_error_checks() {
        let err = CoreError::InsufficientCredits {
            owner_id: "user_1".to_string(),
            allocated: 1,
            used: 1,
        };
        assert!(err.is_insufficient_credits());
        assert!(!err.is_quota_exhausted());

        let err = CoreError::QuotaExhausted {
            owner_id: "user_1".to_string(),
            reset_at: Utc::now(),
        };
        assert!(err.is_quota_exhausted());
    }
}
