//! Unlock ledger fact: "owner X đã trả credit để xem record Y".
//!
//! Tối đa một fact cho mỗi cặp (owner_id, record_id), bất biến, không bao giờ xóa.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnlockFact {
    pub owner_id: String,
    pub record_id: String,
    pub unlocked_at: DateTime<Utc>,
}

impl UnlockFact {
    pub fn new(owner_id: &str, record_id: &str) -> Self {
        Self {
            owner_id: owner_id.to_string(),
            record_id: record_id.to_string(),
            unlocked_at: Utc::now(),
        }
    }
}
