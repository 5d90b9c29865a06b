//! Database schema definitions
//!
//! Row types cho sqlx mapping từ SQLite tables.
//! Schema được định nghĩa trong migrations/20261017000000_init.sql

use crate::error::{PersistenceError, PersistenceResult};
use chrono::{DateTime, Utc};
use creditgate_core::{CalculationPolicy, Record, UnlockFact, ViewCredit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row type cho bảng `view_credits`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ViewCreditRow {
    pub owner_id: String,
    pub allocated: i64,
    pub used: i64,
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl ViewCreditRow {
    pub fn remaining(&self) -> i64 {
        (self.allocated - self.used).max(0)
    }
}

/// Row type cho bảng `unlock_facts`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct UnlockFactRow {
    pub owner_id: String,
    pub record_id: String,
    pub unlocked_at: DateTime<Utc>,
}

/// Row type cho bảng `calculation_policies`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct PolicyRow {
    pub owner_id: String,
    pub tier: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub used: i64,
    pub unlimited_override: bool,
    pub version: i64,
}

/// Row type cho bảng `records`
#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct RecordRow {
    pub id: String,
    pub name: String,
    pub fields: String, // JSON object stored as TEXT
    pub created_at: DateTime<Utc>,
}

// === Conversion implementations ===

impl From<ViewCreditRow> for ViewCredit {
    fn from(row: ViewCreditRow) -> Self {
        Self {
            owner_id: row.owner_id,
            allocated: row.allocated,
            used: row.used,
            version: row.version,
            updated_at: row.updated_at,
        }
    }
}

impl From<UnlockFactRow> for UnlockFact {
    fn from(row: UnlockFactRow) -> Self {
        Self {
            owner_id: row.owner_id,
            record_id: row.record_id,
            unlocked_at: row.unlocked_at,
        }
    }
}

impl TryFrom<PolicyRow> for CalculationPolicy {
    type Error = PersistenceError;

    fn try_from(row: PolicyRow) -> PersistenceResult<Self> {
        let used = u32::try_from(row.used)
            .map_err(|_| PersistenceError::invalid_value("calculation_policies.used", row.used))?;
        Ok(Self {
            owner_id: row.owner_id,
            tier: row.tier,
            period_start: row.period_start,
            period_end: row.period_end,
            used,
            unlimited_override: row.unlimited_override,
            version: row.version,
        })
    }
}

impl TryFrom<RecordRow> for Record {
    type Error = PersistenceError;

    fn try_from(row: RecordRow) -> PersistenceResult<Self> {
        let fields: BTreeMap<String, String> = serde_json::from_str(&row.fields)?;
        Ok(Self {
            id: row.id,
            name: row.name,
            fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_row_rejects_negative_used() {
        let now = Utc::now();
        let row = PolicyRow {
            owner_id: "user_1".to_string(),
            tier: "free".to_string(),
            period_start: now,
            period_end: now,
            used: -1,
            unlimited_override: false,
            version: 0,
        };
        assert!(CalculationPolicy::try_from(row).is_err());
    }

    #[test]
    fn test_record_row_parses_fields() {
        let row = RecordRow {
            id: "INV_001".to_string(),
            name: "Jane Doe".to_string(),
            fields: r#"{"email":"jane@x.com"}"#.to_string(),
            created_at: Utc::now(),
        };
        let record = Record::try_from(row).unwrap();
        assert_eq!(record.field("email"), Some("jane@x.com"));
    }
}
