//! Gate decisions - kết quả của `evaluate` và `consume`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Số credits còn lại, hoặc sentinel "unlimited"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Remaining {
    Count(i64),
    Unlimited,
}

impl Remaining {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, Remaining::Unlimited)
    }

    /// Số lượng cụ thể, None nếu unlimited
    pub fn count(&self) -> Option<i64> {
        match self {
            Remaining::Count(n) => Some(*n),
            Remaining::Unlimited => None,
        }
    }
}

impl fmt::Display for Remaining {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Remaining::Count(n) => write!(f, "{}", n),
            Remaining::Unlimited => write!(f, "unlimited"),
        }
    }
}

/// Lý do đi kèm kết quả evaluate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum EvaluationReason {
    CreditsAvailable,
    Unlimited,
    InsufficientCredits,
    QuotaExhausted { reset_at: DateTime<Utc> },
    SignInRequired,
}

/// Kết quả của `evaluate` - read-only, không thay đổi state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    pub allowed: bool,
    pub remaining: Remaining,
    pub reason: EvaluationReason,
}

impl Evaluation {
    pub fn allowed(remaining: Remaining) -> Self {
        let reason = if remaining.is_unlimited() {
            EvaluationReason::Unlimited
        } else {
            EvaluationReason::CreditsAvailable
        };
        Self {
            allowed: true,
            remaining,
            reason,
        }
    }

    pub fn denied(reason: EvaluationReason) -> Self {
        Self {
            allowed: false,
            remaining: Remaining::Count(0),
            reason,
        }
    }
}

/// Lý do từ chối consume.
///
/// - `InsufficientCredits`: cần mua thêm, không tự retry
/// - `QuotaExhausted`: hết quota, reset tại `reset_at`
/// - `TransientFailure`: lỗi backend, state không đổi, retry an toàn
/// - `SignInRequired`: anonymous identity không thể unlock record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum DenyReason {
    InsufficientCredits,
    QuotaExhausted { reset_at: DateTime<Utc> },
    TransientFailure { detail: String },
    SignInRequired,
}

impl DenyReason {
    pub fn transient(detail: impl Into<String>) -> Self {
        DenyReason::TransientFailure {
            detail: detail.into(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::InsufficientCredits => "insufficient_credits",
            DenyReason::QuotaExhausted { .. } => "quota_exhausted",
            DenyReason::TransientFailure { .. } => "transient_failure",
            DenyReason::SignInRequired => "sign_in_required",
        }
    }

    /// Chỉ TransientFailure là retry được
    pub fn is_retryable(&self) -> bool {
        matches!(self, DenyReason::TransientFailure { .. })
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::InsufficientCredits => write!(f, "insufficient credits"),
            DenyReason::QuotaExhausted { reset_at } => {
                write!(f, "quota exhausted, resets at {}", reset_at.to_rfc3339())
            }
            DenyReason::TransientFailure { detail } => write!(f, "transient failure: {}", detail),
            DenyReason::SignInRequired => write!(f, "sign in required"),
        }
    }
}

/// Kết quả của `consume`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConsumeOutcome {
    /// `already_owned = true` nghĩa là truy cập lại miễn phí, không trừ credit
    Consumed { already_owned: bool },
    Denied { reason: DenyReason },
}

impl ConsumeOutcome {
    pub fn new_charge() -> Self {
        ConsumeOutcome::Consumed {
            already_owned: false,
        }
    }

    pub fn already_owned() -> Self {
        ConsumeOutcome::Consumed {
            already_owned: true,
        }
    }

    pub fn denied(reason: DenyReason) -> Self {
        ConsumeOutcome::Denied { reason }
    }

    pub fn is_consumed(&self) -> bool {
        matches!(self, ConsumeOutcome::Consumed { .. })
    }

    /// True nếu consume này thực sự trừ credit
    pub fn is_new_charge(&self) -> bool {
        matches!(
            self,
            ConsumeOutcome::Consumed {
                already_owned: false
            }
        )
    }

    pub fn deny_reason(&self) -> Option<&DenyReason> {
        match self {
            ConsumeOutcome::Denied { reason } => Some(reason),
            ConsumeOutcome::Consumed { .. } => None,
        }
    }
}
