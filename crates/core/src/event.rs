//! # Event Module
//!
//! Định nghĩa CreditEvent và CreditEventType cho audit trail.
//! Events được ghi vào JSONL files sau mỗi mutation đã commit.

use crate::credit::CreditFlavor;
use crate::decision::DenyReason;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Loại sự kiện credit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditEventType {
    /// Cấp thêm view credits (purchase/grant)
    CreditsGranted,
    /// Unlock record lần đầu - đã trừ một credit
    RecordUnlocked,
    /// Tiêu một calculation credit
    CalculationConsumed,
    /// Quota roll sang chu kỳ mới
    PeriodRolledOver,
    /// Consume bị từ chối
    ConsumeDenied,
}

impl CreditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditEventType::CreditsGranted => "credits_granted",
            CreditEventType::RecordUnlocked => "record_unlocked",
            CreditEventType::CalculationConsumed => "calculation_consumed",
            CreditEventType::PeriodRolledOver => "period_rolled_over",
            CreditEventType::ConsumeDenied => "consume_denied",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "credits_granted" => Some(CreditEventType::CreditsGranted),
            "record_unlocked" => Some(CreditEventType::RecordUnlocked),
            "calculation_consumed" => Some(CreditEventType::CalculationConsumed),
            "period_rolled_over" => Some(CreditEventType::PeriodRolledOver),
            "consume_denied" => Some(CreditEventType::ConsumeDenied),
            _ => None,
        }
    }
}

impl fmt::Display for CreditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Một sự kiện trong audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditEvent {
    /// ID của event (EVT_000001, ...)
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: CreditEventType,
    pub owner_id: String,
    pub flavor: CreditFlavor,
    /// Record ID hoặc tên calculation tool
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_key: Option<String>,
    /// Số credits tham gia (grant amount, 1 cho consume)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CreditEvent {
    fn base(
        event_id: &str,
        event_type: CreditEventType,
        owner_id: &str,
        flavor: CreditFlavor,
    ) -> Self {
        Self {
            event_id: event_id.to_string(),
            timestamp: Utc::now(),
            event_type,
            owner_id: owner_id.to_string(),
            flavor,
            resource_key: None,
            amount: None,
            detail: None,
        }
    }

    pub fn credits_granted(event_id: &str, owner_id: &str, amount: i64) -> Self {
        let mut event = Self::base(
            event_id,
            CreditEventType::CreditsGranted,
            owner_id,
            CreditFlavor::RecordUnlock,
        );
        event.amount = Some(amount);
        event
    }

    pub fn record_unlocked(event_id: &str, owner_id: &str, record_id: &str) -> Self {
        let mut event = Self::base(
            event_id,
            CreditEventType::RecordUnlocked,
            owner_id,
            CreditFlavor::RecordUnlock,
        );
        event.resource_key = Some(record_id.to_string());
        event.amount = Some(1);
        event
    }

    pub fn calculation_consumed(event_id: &str, owner_id: &str, tool: &str) -> Self {
        let mut event = Self::base(
            event_id,
            CreditEventType::CalculationConsumed,
            owner_id,
            CreditFlavor::Calculation,
        );
        event.resource_key = Some(tool.to_string());
        event.amount = Some(1);
        event
    }

    pub fn period_rolled_over(
        event_id: &str,
        owner_id: &str,
        new_period_end: DateTime<Utc>,
    ) -> Self {
        let mut event = Self::base(
            event_id,
            CreditEventType::PeriodRolledOver,
            owner_id,
            CreditFlavor::Calculation,
        );
        event.detail = Some(format!("period_end={}", new_period_end.to_rfc3339()));
        event
    }

    pub fn consume_denied(
        event_id: &str,
        owner_id: &str,
        flavor: CreditFlavor,
        resource_key: &str,
        reason: &DenyReason,
    ) -> Self {
        let mut event = Self::base(event_id, CreditEventType::ConsumeDenied, owner_id, flavor);
        event.resource_key = Some(resource_key.to_string());
        event.detail = Some(reason.as_str().to_string());
        event
    }
}
