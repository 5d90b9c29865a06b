//! # Credit Module
//!
//! Định nghĩa CreditFlavor và ViewCredit.
//! ViewCredit là bộ đếm (allocated, used) cho việc unlock investor records.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hai loại credit mà gate quản lý.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditFlavor {
    /// Unlock một investor contact record
    RecordUnlock,
    /// Chạy một calculation tool
    Calculation,
}

impl CreditFlavor {
    /// Trả về code string cho DB và events
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditFlavor::RecordUnlock => "record_unlock",
            CreditFlavor::Calculation => "calculation",
        }
    }

    /// Parse từ string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "record_unlock" | "unlock" | "view" => Some(CreditFlavor::RecordUnlock),
            "calculation" | "calc" => Some(CreditFlavor::Calculation),
            _ => None,
        }
    }
}

impl fmt::Display for CreditFlavor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Số dư view credits của một owner.
///
/// - `allocated`: tổng số credits đã được cấp (mua/tặng)
/// - `used`: số credits đã tiêu, chỉ tăng
/// - `version`: row version cho compare-and-swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewCredit {
    pub owner_id: String,
    pub allocated: i64,
    pub used: i64,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl ViewCredit {
    /// Tạo ViewCredit mới với allocation ban đầu
    pub fn new(owner_id: &str, allocated: i64) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            allocated: allocated.max(0),
            used: 0,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    /// `max(0, allocated - used)`
    pub fn remaining(&self) -> i64 {
        (self.allocated - self.used).max(0)
    }

    pub fn can_consume(&self) -> bool {
        self.remaining() > 0
    }

    /// Tiêu một credit
    pub fn consume_one(&mut self) -> CoreResult<()> {
        if !self.can_consume() {
            return Err(CoreError::InsufficientCredits {
                owner_id: self.owner_id.clone(),
                allocated: self.allocated,
                used: self.used,
            });
        }
        self.used += 1;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Cộng thêm credits (purchase/grant)
    pub fn grant(&mut self, amount: i64) -> CoreResult<()> {
        if amount <= 0 {
            return Err(CoreError::InvalidGrant(amount));
        }
        self.allocated += amount;
        self.version += 1;
        self.updated_at = Utc::now();
        Ok(())
    }
}

impl fmt::Display for ViewCredit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} remaining ({} used of {})",
            self.remaining(),
            self.used,
            self.allocated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_str() {
        assert_eq!(CreditFlavor::RecordUnlock.as_str(), "record_unlock");
        assert_eq!(CreditFlavor::from_str("CALC"), Some(CreditFlavor::Calculation));
        assert_eq!(CreditFlavor::from_str("unknown"), None);
    }

    #[test]
    fn test_remaining_never_negative() {
        let mut credit = ViewCredit::new("user_1", 2);
        credit.used = 5;
        assert_eq!(credit.remaining(), 0);
        assert!(!credit.can_consume());
    }

    #[test]
    fn test_consume_and_grant() {
        let mut credit = ViewCredit::new("user_1", 1);
        assert!(credit.consume_one().is_ok());
        assert_eq!(credit.used, 1);
        assert_eq!(credit.version, 1);

        let err = credit.consume_one().unwrap_err();
        assert!(err.is_insufficient_credits());
        assert_eq!(credit.used, 1);

        credit.grant(2).unwrap();
        assert_eq!(credit.remaining(), 2);
        assert!(credit.grant(0).is_err());
    }
}
