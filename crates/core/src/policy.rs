//! # Policy Module
//!
//! Calculation-credit policy: quota theo chu kỳ, limit lấy từ tier,
//! có thể override thành unlimited.

use crate::error::{CoreError, CoreResult};
use crate::decision::Remaining;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Giới hạn của một tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierLimit {
    /// Số lần tính toán tối đa mỗi chu kỳ
    Limited(u32),
    /// Không giới hạn
    Unlimited,
}

impl TierLimit {
    pub fn is_unlimited(&self) -> bool {
        matches!(self, TierLimit::Unlimited)
    }
}

/// Bảng tra cứu tier -> limit.
///
/// Limit có thể thay đổi giữa các chu kỳ; policy chỉ đọc limit tại thời điểm evaluate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierTable {
    tiers: HashMap<String, TierLimit>,
}

impl TierTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tier(mut self, tier: &str, limit: TierLimit) -> Self {
        self.insert(tier, limit);
        self
    }

    pub fn insert(&mut self, tier: &str, limit: TierLimit) {
        self.tiers.insert(tier.to_lowercase(), limit);
    }

    pub fn get(&self, tier: &str) -> Option<TierLimit> {
        self.tiers.get(&tier.to_lowercase()).copied()
    }

    /// Lấy limit của tier, lỗi nếu tier không tồn tại
    pub fn limit_for(&self, tier: &str) -> CoreResult<TierLimit> {
        self.get(tier)
            .ok_or_else(|| CoreError::UnknownTier(tier.to_string()))
    }

    pub fn contains(&self, tier: &str) -> bool {
        self.tiers.contains_key(&tier.to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }
}

/// Chu kỳ dài nhất được chấp nhận (100 năm)
pub const MAX_CADENCE_DAYS: u32 = 36_500;

/// Độ dài cố định của một chu kỳ quota, là bội số nguyên của 1ms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cadence {
    length: Duration,
}

impl Cadence {
    pub fn days(days: u32) -> CoreResult<Self> {
        if days == 0 || days > MAX_CADENCE_DAYS {
            return Err(CoreError::InvalidCadence(format!(
                "cadence must be between 1 and {} days, got {}",
                MAX_CADENCE_DAYS, days
            )));
        }
        Ok(Self {
            length: Duration::days(days as i64),
        })
    }

    /// Cadence tùy ý: từ 1ms đến `MAX_CADENCE_DAYS`, không có phần lẻ dưới 1ms
    pub fn from_duration(length: Duration) -> CoreResult<Self> {
        if length < Duration::milliseconds(1) || length > Duration::days(MAX_CADENCE_DAYS as i64) {
            return Err(CoreError::InvalidCadence(format!(
                "cadence must be between 1ms and {} days, got {}",
                MAX_CADENCE_DAYS, length
            )));
        }
        if length.subsec_nanos() % 1_000_000 != 0 {
            return Err(CoreError::InvalidCadence(format!(
                "cadence must be a whole number of milliseconds, got {}",
                length
            )));
        }
        Ok(Self { length })
    }

    pub fn as_duration(&self) -> Duration {
        self.length
    }

    fn as_millis(&self) -> i64 {
        self.length.num_milliseconds()
    }
}

fn out_of_range(what: &str) -> CoreError {
    CoreError::InvalidCadence(format!("{} is out of the supported date range", what))
}

/// Quota tính toán của một identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalculationPolicy {
    pub owner_id: String,
    pub tier: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub used: u32,
    /// Override thành unlimited bất kể tier
    pub unlimited_override: bool,
    /// Row version cho compare-and-swap
    pub version: i64,
}

impl CalculationPolicy {
    /// Mở policy mới với chu kỳ bắt đầu tại `now`
    pub fn open(
        owner_id: &str,
        tier: &str,
        now: DateTime<Utc>,
        cadence: Cadence,
    ) -> CoreResult<Self> {
        let period_end = now
            .checked_add_signed(cadence.as_duration())
            .ok_or_else(|| out_of_range("period end"))?;
        Ok(Self {
            owner_id: owner_id.to_string(),
            tier: tier.to_lowercase(),
            period_start: now,
            period_end,
            used: 0,
            unlimited_override: false,
            version: 0,
        })
    }

    /// `now >= period_end`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.period_end
    }

    /// Trả về policy đã roll sang chu kỳ chứa `now`, hoặc None nếu chưa hết hạn.
    ///
    /// `period_end` tiến theo bội số của cadence tính từ giá trị cũ, không tính
    /// từ `now`, nên các chu kỳ luôn thẳng hàng. Kết quả chỉ phụ thuộc vào
    /// `(period_end, now, cadence)`.
    pub fn rolled_forward(
        &self,
        now: DateTime<Utc>,
        cadence: Cadence,
    ) -> CoreResult<Option<Self>> {
        if !self.is_expired(now) {
            return Ok(None);
        }

        let length_ms = cadence.as_millis();
        let overdue_ms = (now - self.period_end).num_milliseconds();
        let steps = overdue_ms / length_ms + 1;
        let offset = steps
            .checked_mul(length_ms)
            .ok_or_else(|| out_of_range("rollover offset"))?;

        let mut next = self.clone();
        next.period_end = self
            .period_end
            .checked_add_signed(Duration::milliseconds(offset))
            .ok_or_else(|| out_of_range("period end"))?;
        next.period_start = next
            .period_end
            .checked_sub_signed(cadence.as_duration())
            .ok_or_else(|| out_of_range("period start"))?;
        next.used = 0;
        Ok(Some(next))
    }

    /// Limit hiệu lực: override thắng tier
    pub fn effective_limit(&self, tiers: &TierTable) -> CoreResult<TierLimit> {
        if self.unlimited_override {
            return Ok(TierLimit::Unlimited);
        }
        tiers.limit_for(&self.tier)
    }

    pub fn remaining(&self, limit: TierLimit) -> Remaining {
        match limit {
            TierLimit::Unlimited => Remaining::Unlimited,
            TierLimit::Limited(max) => Remaining::Count(max.saturating_sub(self.used) as i64),
        }
    }

    pub fn can_consume(&self, limit: TierLimit) -> bool {
        match limit {
            TierLimit::Unlimited => true,
            TierLimit::Limited(max) => self.used < max,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 0, 0, 0).unwrap()
    }

    fn tiers() -> TierTable {
        TierTable::new()
            .with_tier("free", TierLimit::Limited(5))
            .with_tier("Pro", TierLimit::Unlimited)
    }

    #[test]
    fn test_tier_lookup_case_insensitive() {
        let tiers = tiers();
        assert_eq!(tiers.get("FREE"), Some(TierLimit::Limited(5)));
        assert_eq!(tiers.get("pro"), Some(TierLimit::Unlimited));
        assert!(tiers.limit_for("gold").is_err());
    }

    #[test]
    fn test_cadence_rejects_zero() {
        assert!(Cadence::days(0).is_err());
        assert!(Cadence::from_duration(Duration::seconds(-5)).is_err());
        assert_eq!(Cadence::days(7).unwrap().as_duration(), Duration::days(7));
    }

    #[test]
    fn test_cadence_bounds() {
        assert!(Cadence::days(MAX_CADENCE_DAYS).is_ok());
        assert!(Cadence::days(MAX_CADENCE_DAYS + 1).is_err());
        assert!(Cadence::days(200_000_000).is_err());
        assert!(Cadence::from_duration(Duration::microseconds(500)).is_err());
        assert!(Cadence::from_duration(Duration::microseconds(1500)).is_err());
        assert!(Cadence::from_duration(Duration::milliseconds(1)).is_ok());
    }

    #[test]
    fn test_open_near_max_date_is_error() {
        let cadence = Cadence::days(30).unwrap();
        let result = CalculationPolicy::open("user_1", "free", DateTime::<Utc>::MAX_UTC, cadence);
        assert!(matches!(result, Err(CoreError::InvalidCadence(_))));
    }

    #[test]
    fn test_rollover_millisecond_cadence_long_overdue() {
        // Hơn i32::MAX chu kỳ đã trôi qua
        let cadence = Cadence::from_duration(Duration::milliseconds(1)).unwrap();
        let end = at(1) + Duration::milliseconds(1);
        let policy = CalculationPolicy {
            owner_id: "user_1".to_string(),
            tier: "free".to_string(),
            period_start: at(1),
            period_end: end,
            used: 3,
            unlimited_override: false,
            version: 0,
        };

        let now = at(31);
        let next = policy.rolled_forward(now, cadence).unwrap().unwrap();
        assert!(next.period_end > now);
        assert!(next.period_end > end);
        assert!(!next.is_expired(now));
        assert_eq!(next.period_end, now + Duration::milliseconds(1));
        assert_eq!(next.period_end - next.period_start, Duration::milliseconds(1));
        assert_eq!(next.used, 0);
    }

    #[test]
    fn test_not_expired_does_not_roll() {
        let cadence = Cadence::days(7).unwrap();
        let policy = CalculationPolicy::open("user_1", "free", at(1), cadence).unwrap();
        assert!(policy.rolled_forward(at(7), cadence).unwrap().is_none());
    }

    #[test]
    fn test_rollover_keeps_alignment() {
        let cadence = Cadence::days(7).unwrap();
        let mut policy = CalculationPolicy::open("user_1", "free", at(1), cadence).unwrap();
        policy.used = 4;

        // period_end = Jan 8; now = Jan 10 -> new end = Jan 15, not Jan 17
        let rolled = policy.rolled_forward(at(10), cadence).unwrap().unwrap();
        assert_eq!(rolled.used, 0);
        assert_eq!(rolled.period_end, at(8) + Duration::days(7));
        assert_eq!(rolled.period_start, at(8));
    }

    #[test]
    fn test_rollover_at_exact_boundary() {
        let cadence = Cadence::days(7).unwrap();
        let policy = CalculationPolicy::open("user_1", "free", at(1), cadence).unwrap();
        let rolled = policy.rolled_forward(at(8), cadence).unwrap().unwrap();
        assert_eq!(rolled.period_end, at(15));
    }

    #[test]
    fn test_rollover_skips_idle_periods() {
        let cadence = Cadence::days(7).unwrap();
        let policy = CalculationPolicy::open("user_1", "free", at(1), cadence).unwrap();
        // Idle for several periods: Jan 8, 15, 22 all passed
        let rolled = policy.rolled_forward(at(23), cadence).unwrap().unwrap();
        assert_eq!(rolled.period_start, at(22));
        assert_eq!(rolled.period_end, at(29));
        assert!(!rolled.is_expired(at(23)));
    }

    #[test]
    fn test_rollover_is_idempotent() {
        let cadence = Cadence::days(7).unwrap();
        let mut policy = CalculationPolicy::open("user_1", "free", at(1), cadence).unwrap();
        policy.used = 2;
        let first = policy.rolled_forward(at(10), cadence).unwrap().unwrap();
        let second = policy.rolled_forward(at(10), cadence).unwrap().unwrap();
        assert_eq!(first, second);
        assert!(first.rolled_forward(at(10), cadence).unwrap().is_none());
    }

    #[test]
    fn test_effective_limit_and_remaining() {
        let cadence = Cadence::days(30).unwrap();
        let tiers = tiers();
        let mut policy = CalculationPolicy::open("user_1", "free", at(1), cadence).unwrap();
        policy.used = 5;

        let limit = policy.effective_limit(&tiers).unwrap();
        assert_eq!(policy.remaining(limit), Remaining::Count(0));
        assert!(!policy.can_consume(limit));

        policy.unlimited_override = true;
        let limit = policy.effective_limit(&tiers).unwrap();
        assert_eq!(policy.remaining(limit), Remaining::Unlimited);
        assert!(policy.can_consume(limit));
    }
}
