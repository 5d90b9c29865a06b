//! Calculation-credit quota
//!
//! Policy của anonymous session nằm trong bộ nhớ (`SessionPolicyStore`),
//! của authenticated owner nằm trong bảng `calculation_policies`.
//! Mọi thay đổi đi qua compare-and-swap trên `version`.

use crate::error::{GateError, GateResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use creditgate_core::{
    Cadence, CalculationPolicy, ConsumeOutcome, CoreError, DenyReason, Evaluation,
    EvaluationReason, Identity, TierLimit, TierTable,
};
use creditgate_persistence::PolicyRepo;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

/// Kho lưu CalculationPolicy
#[async_trait]
pub trait PolicyStore: Send + Sync {
    async fn load(&self, owner_id: &str) -> GateResult<Option<CalculationPolicy>>;

    /// Thêm policy mới; `false` nếu owner đã có
    async fn create(&self, policy: &CalculationPolicy) -> GateResult<bool>;

    /// Ghi `policy` nếu version đang lưu là `expected_version`; version mới = expected + 1
    async fn compare_and_set(
        &self,
        policy: &CalculationPolicy,
        expected_version: i64,
    ) -> GateResult<bool>;
}

/// Policies của authenticated owners
pub struct SqlitePolicyStore {
    pool: SqlitePool,
}

impl SqlitePolicyStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PolicyStore for SqlitePolicyStore {
    async fn load(&self, owner_id: &str) -> GateResult<Option<CalculationPolicy>> {
        match PolicyRepo::get(&self.pool, owner_id).await? {
            Some(row) => Ok(Some(row.try_into()?)),
            None => Ok(None),
        }
    }

    async fn create(&self, policy: &CalculationPolicy) -> GateResult<bool> {
        Ok(PolicyRepo::insert(&self.pool, policy).await?)
    }

    async fn compare_and_set(
        &self,
        policy: &CalculationPolicy,
        expected_version: i64,
    ) -> GateResult<bool> {
        Ok(PolicyRepo::compare_and_set(&self.pool, policy, expected_version).await?)
    }
}

/// Policies của anonymous sessions, sống cùng process
#[derive(Default)]
pub struct SessionPolicyStore {
    policies: Mutex<HashMap<String, CalculationPolicy>>,
}

impl SessionPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> GateResult<MutexGuard<'_, HashMap<String, CalculationPolicy>>> {
        self.policies
            .lock()
            .map_err(|_| GateError::Internal("session policy lock poisoned".to_string()))
    }

    pub fn len(&self) -> usize {
        self.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Bỏ các session có chu kỳ đã hết hạn tại `now`, trừ `keep`
    pub fn evict_expired(&self, now: DateTime<Utc>, keep: &str) -> GateResult<usize> {
        let mut policies = self.lock()?;
        Ok(sweep(&mut policies, now, keep))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn sweep(policies: &mut HashMap<String, CalculationPolicy>, now: DateTime<Utc>, keep: &str) -> usize {
    let before = policies.len();
    policies.retain(|owner_id, policy| owner_id == keep || !policy.is_expired(now));
    let evicted = before - policies.len();
    if evicted > 0 {
        tracing::debug!(evicted, "evicted expired session policies");
    }
    evicted
}

#[async_trait]
impl PolicyStore for SessionPolicyStore {
    async fn load(&self, owner_id: &str) -> GateResult<Option<CalculationPolicy>> {
        let mut policies = self.lock()?;
        sweep(&mut policies, Utc::now(), owner_id);
        Ok(policies.get(owner_id).cloned())
    }

    async fn create(&self, policy: &CalculationPolicy) -> GateResult<bool> {
        let mut policies = self.lock()?;
        sweep(&mut policies, Utc::now(), &policy.owner_id);
        if policies.contains_key(&policy.owner_id) {
            return Ok(false);
        }
        policies.insert(policy.owner_id.clone(), policy.clone());
        Ok(true)
    }

    async fn compare_and_set(
        &self,
        policy: &CalculationPolicy,
        expected_version: i64,
    ) -> GateResult<bool> {
        let mut policies = self.lock()?;
        match policies.get_mut(&policy.owner_id) {
            Some(current) if current.version == expected_version => {
                *current = policy.clone();
                current.version = expected_version + 1;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Policy sau khi đã resolve chu kỳ hiện tại
#[derive(Debug, Clone)]
pub struct ResolvedPolicy {
    pub policy: CalculationPolicy,
    /// `Some(period_end mới)` nếu lần resolve này đã roll chu kỳ
    pub rolled_over: Option<DateTime<Utc>>,
}

/// Kết quả consume kèm thông tin rollover
#[derive(Debug, Clone)]
pub struct QuotaDecision {
    pub outcome: ConsumeOutcome,
    pub policy: CalculationPolicy,
    pub rolled_over: Option<DateTime<Utc>>,
}

/// Quota settings lấy từ config
#[derive(Debug, Clone)]
pub struct QuotaSettings {
    pub tiers: TierTable,
    pub cadence: Cadence,
    pub default_tier: String,
    pub anonymous_tier: String,
    pub max_attempts: u32,
}

/// Calculation credits: evaluate / consume / patch policy
pub struct CalculationCreditService {
    durable: Arc<dyn PolicyStore>,
    session: Arc<dyn PolicyStore>,
    settings: QuotaSettings,
}

impl CalculationCreditService {
    pub fn new(
        durable: Arc<dyn PolicyStore>,
        session: Arc<dyn PolicyStore>,
        settings: QuotaSettings,
    ) -> Self {
        Self {
            durable,
            session,
            settings,
        }
    }

    pub fn settings(&self) -> &QuotaSettings {
        &self.settings
    }

    fn store_for(&self, identity: &Identity) -> &dyn PolicyStore {
        if identity.is_anonymous() {
            self.session.as_ref()
        } else {
            self.durable.as_ref()
        }
    }

    fn initial_tier(&self, identity: &Identity) -> &str {
        if identity.is_anonymous() {
            &self.settings.anonymous_tier
        } else {
            &self.settings.default_tier
        }
    }

    /// Limit hiệu lực. Tier không còn trong bảng thì coi như quota 0.
    pub fn limit_for(&self, policy: &CalculationPolicy) -> TierLimit {
        match policy.effective_limit(&self.settings.tiers) {
            Ok(limit) => limit,
            Err(e) => {
                tracing::warn!(
                    owner = %policy.owner_id,
                    tier = %policy.tier,
                    error = %e,
                    "unknown tier, treating quota as zero"
                );
                TierLimit::Limited(0)
            }
        }
    }

    /// Load policy (tạo nếu chưa có) và roll chu kỳ nếu đã hết hạn
    pub async fn resolve(&self, identity: &Identity, now: DateTime<Utc>) -> GateResult<ResolvedPolicy> {
        let store = self.store_for(identity);
        let owner_id = identity.owner_id();
        let cadence = self.settings.cadence;

        for attempt in 1..=self.settings.max_attempts {
            let policy = match store.load(owner_id).await? {
                Some(policy) => policy,
                None => {
                    let policy =
                        CalculationPolicy::open(owner_id, self.initial_tier(identity), now, cadence)?;
                    if store.create(&policy).await? {
                        tracing::debug!(owner = owner_id, tier = %policy.tier, "opened calculation policy");
                        return Ok(ResolvedPolicy {
                            policy,
                            rolled_over: None,
                        });
                    }
                    continue;
                }
            };

            let Some(mut next) = policy.rolled_forward(now, cadence)? else {
                return Ok(ResolvedPolicy {
                    policy,
                    rolled_over: None,
                });
            };

            if store.compare_and_set(&next, policy.version).await? {
                next.version = policy.version + 1;
                tracing::info!(
                    owner = owner_id,
                    period_end = %next.period_end,
                    "calculation period rolled over"
                );
                return Ok(ResolvedPolicy {
                    rolled_over: Some(next.period_end),
                    policy: next,
                });
            }

            tracing::debug!(owner = owner_id, attempt, "rollover lost race, reloading");
        }

        Err(GateError::contended(owner_id, self.settings.max_attempts))
    }

    pub async fn evaluate(&self, identity: &Identity) -> GateResult<(Evaluation, ResolvedPolicy)> {
        let resolved = self.resolve(identity, Utc::now()).await?;
        let policy = &resolved.policy;
        let limit = self.limit_for(policy);

        let evaluation = if policy.can_consume(limit) {
            Evaluation::allowed(policy.remaining(limit))
        } else {
            Evaluation::denied(EvaluationReason::QuotaExhausted {
                reset_at: policy.period_end,
            })
        };

        Ok((evaluation, resolved))
    }

    /// Tiêu một calculation credit. Unlimited không tăng `used`.
    pub async fn consume(&self, identity: &Identity) -> GateResult<QuotaDecision> {
        self.consume_at(identity, Utc::now()).await
    }

    pub async fn consume_at(&self, identity: &Identity, now: DateTime<Utc>) -> GateResult<QuotaDecision> {
        let store = self.store_for(identity);
        let owner_id = identity.owner_id();
        let mut rolled_over = None;

        for attempt in 1..=self.settings.max_attempts {
            let resolved = self.resolve(identity, now).await?;
            rolled_over = rolled_over.or(resolved.rolled_over);
            let policy = resolved.policy;

            match self.limit_for(&policy) {
                TierLimit::Unlimited => {
                    return Ok(QuotaDecision {
                        outcome: ConsumeOutcome::new_charge(),
                        policy,
                        rolled_over,
                    });
                }
                limit if !policy.can_consume(limit) => {
                    return Ok(QuotaDecision {
                        outcome: ConsumeOutcome::denied(DenyReason::QuotaExhausted {
                            reset_at: policy.period_end,
                        }),
                        policy,
                        rolled_over,
                    });
                }
                _ => {}
            }

            let mut next = policy.clone();
            next.used += 1;
            if store.compare_and_set(&next, policy.version).await? {
                next.version = policy.version + 1;
                return Ok(QuotaDecision {
                    outcome: ConsumeOutcome::new_charge(),
                    policy: next,
                    rolled_over,
                });
            }

            tracing::warn!(owner = owner_id, attempt, "CAS conflict on calculation policy, retrying");
            tokio::task::yield_now().await;
        }

        Err(GateError::contended(owner_id, self.settings.max_attempts))
    }

    /// Áp dụng thay đổi lên policy của authenticated owner
    pub async fn patch<F>(&self, identity: &Identity, apply: F) -> GateResult<CalculationPolicy>
    where
        F: Fn(&mut CalculationPolicy) + Send + Sync,
    {
        if identity.is_anonymous() {
            return Err(GateError::AuthenticationRequired(identity.to_string()));
        }

        for _ in 0..self.settings.max_attempts {
            let current = self.resolve(identity, Utc::now()).await?.policy;
            let mut next = current.clone();
            apply(&mut next);

            if self.durable.compare_and_set(&next, current.version).await? {
                next.version = current.version + 1;
                return Ok(next);
            }
        }

        Err(GateError::contended(identity.owner_id(), self.settings.max_attempts))
    }

    pub async fn set_tier(&self, identity: &Identity, tier: &str) -> GateResult<CalculationPolicy> {
        if !self.settings.tiers.contains(tier) {
            return Err(CoreError::UnknownTier(tier.to_string()).into());
        }
        let tier = tier.to_lowercase();
        self.patch(identity, move |policy| policy.tier = tier.clone())
            .await
    }

    pub async fn set_unlimited_override(
        &self,
        identity: &Identity,
        unlimited: bool,
    ) -> GateResult<CalculationPolicy> {
        self.patch(identity, move |policy| policy.unlimited_override = unlimited)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use creditgate_core::Remaining;
    use creditgate_persistence::init_in_memory;

    fn settings() -> QuotaSettings {
        QuotaSettings {
            tiers: TierTable::new()
                .with_tier("anonymous", TierLimit::Limited(1))
                .with_tier("free", TierLimit::Limited(2))
                .with_tier("enterprise", TierLimit::Unlimited),
            cadence: Cadence::days(30).unwrap(),
            default_tier: "free".to_string(),
            anonymous_tier: "anonymous".to_string(),
            max_attempts: 5,
        }
    }

    async fn service() -> (CalculationCreditService, Arc<SqlitePolicyStore>) {
        let pool = init_in_memory().await.unwrap();
        let durable = Arc::new(SqlitePolicyStore::new(pool));
        let service = CalculationCreditService::new(
            durable.clone(),
            Arc::new(SessionPolicyStore::new()),
            settings(),
        );
        (service, durable)
    }

    fn user() -> Identity {
        Identity::authenticated("user_1").unwrap()
    }

    #[tokio::test]
    async fn test_policy_created_lazily() {
        let (service, durable) = service().await;
        assert!(durable.load("user_1").await.unwrap().is_none());

        let (evaluation, resolved) = service.evaluate(&user()).await.unwrap();
        assert!(evaluation.allowed);
        assert_eq!(evaluation.remaining, Remaining::Count(2));
        assert_eq!(resolved.policy.tier, "free");
        assert!(durable.load("user_1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_consume_until_exhausted() {
        let (service, _) = service().await;
        let identity = user();

        assert!(service.consume(&identity).await.unwrap().outcome.is_new_charge());
        assert!(service.consume(&identity).await.unwrap().outcome.is_new_charge());

        let decision = service.consume(&identity).await.unwrap();
        match decision.outcome.deny_reason() {
            Some(DenyReason::QuotaExhausted { reset_at }) => {
                assert_eq!(*reset_at, decision.policy.period_end)
            }
            other => panic!("expected quota exhausted, got {:?}", other),
        }
        assert_eq!(decision.policy.used, 2);

        let (evaluation, _) = service.evaluate(&identity).await.unwrap();
        assert!(!evaluation.allowed);
    }

    #[tokio::test]
    async fn test_anonymous_uses_session_store() {
        let (service, durable) = service().await;
        let anon = Identity::anonymous("sess_1").unwrap();

        assert!(service.consume(&anon).await.unwrap().outcome.is_consumed());
        assert!(!service.consume(&anon).await.unwrap().outcome.is_consumed());
        assert!(durable.load("sess_1").await.unwrap().is_none());

        assert!(matches!(
            service.set_tier(&anon, "free").await,
            Err(GateError::AuthenticationRequired(_))
        ));
    }

    #[tokio::test]
    async fn test_rollover_resets_used() {
        let (service, durable) = service().await;
        let identity = user();
        let cadence = settings().cadence;

        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let mut stale = CalculationPolicy::open("user_1", "free", start, cadence).unwrap();
        stale.used = 2;
        durable.create(&stale).await.unwrap();

        let now = stale.period_end + Duration::hours(1);
        let resolved = service.resolve(&identity, now).await.unwrap();
        assert_eq!(resolved.policy.used, 0);
        assert_eq!(resolved.policy.period_end, stale.period_end + cadence.as_duration());
        assert_eq!(resolved.rolled_over, Some(resolved.policy.period_end));

        // Lần resolve thứ hai không roll nữa
        let again = service.resolve(&identity, now).await.unwrap();
        assert_eq!(again.rolled_over, None);
        assert_eq!(again.policy.version, resolved.policy.version);
    }

    #[tokio::test]
    async fn test_unlimited_never_increments() {
        let (service, _) = service().await;
        let identity = user();

        service.set_unlimited_override(&identity, true).await.unwrap();
        for _ in 0..5 {
            let decision = service.consume(&identity).await.unwrap();
            assert!(decision.outcome.is_new_charge());
            assert_eq!(decision.policy.used, 0);
        }

        let (evaluation, _) = service.evaluate(&identity).await.unwrap();
        assert_eq!(evaluation.remaining, Remaining::Unlimited);
        assert_eq!(evaluation.reason, EvaluationReason::Unlimited);
    }

    #[tokio::test]
    async fn test_set_tier() {
        let (service, _) = service().await;
        let identity = user();

        let policy = service.set_tier(&identity, "Enterprise").await.unwrap();
        assert_eq!(policy.tier, "enterprise");
        assert_eq!(service.limit_for(&policy), TierLimit::Unlimited);

        let err = service.set_tier(&identity, "gold").await.unwrap_err();
        assert!(matches!(err, GateError::Core(CoreError::UnknownTier(_))));
    }

    #[tokio::test]
    async fn test_unknown_stored_tier_denies() {
        let (service, durable) = service().await;
        let cadence = settings().cadence;
        durable
            .create(&CalculationPolicy::open("user_1", "legacy", Utc::now(), cadence).unwrap())
            .await
            .unwrap();

        let decision = service.consume(&user()).await.unwrap();
        assert!(!decision.outcome.is_consumed());
    }

    #[tokio::test]
    async fn test_session_store_compare_and_set() {
        let store = SessionPolicyStore::new();
        let policy =
            CalculationPolicy::open("anon_1", "anonymous", Utc::now(), Cadence::days(1).unwrap())
                .unwrap();

        assert!(store.create(&policy).await.unwrap());
        assert!(!store.create(&policy).await.unwrap());

        let mut next = policy.clone();
        next.used = 1;
        assert!(store.compare_and_set(&next, 0).await.unwrap());
        assert!(!store.compare_and_set(&next, 0).await.unwrap());

        let stored = store.load("anon_1").await.unwrap().unwrap();
        assert_eq!(stored.version, 1);
        assert_eq!(stored.used, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_session_store_evicts_expired_sessions() {
        let store = SessionPolicyStore::new();
        let day = Cadence::days(1).unwrap();
        let long_ago = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();

        for i in 0..3 {
            let stale = CalculationPolicy::open(&format!("anon_old_{}", i), "anonymous", long_ago, day)
                .unwrap();
            assert!(store.create(&stale).await.unwrap());
        }
        // Mỗi create chỉ giữ lại session của chính nó trong số các session hết hạn
        assert_eq!(store.len(), 1);

        let fresh = CalculationPolicy::open("anon_new", "anonymous", Utc::now(), day).unwrap();
        assert!(store.create(&fresh).await.unwrap());
        assert_eq!(store.len(), 1);
        assert!(store.load("anon_old_2").await.unwrap().is_none());
        assert!(store.load("anon_new").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_evict_expired_keeps_requested_owner() {
        let store = SessionPolicyStore::new();
        let day = Cadence::days(1).unwrap();
        let now = Utc::now();

        let live = CalculationPolicy::open("anon_live", "anonymous", now, day).unwrap();
        store.create(&live).await.unwrap();

        let later = now + Duration::days(2);
        assert_eq!(store.evict_expired(later, "anon_live").unwrap(), 0);
        assert_eq!(store.evict_expired(later, "someone_else").unwrap(), 1);
        assert!(store.is_empty());
    }
}
