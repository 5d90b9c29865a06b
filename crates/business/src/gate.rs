//! Entitlement Gate
//!
//! Điểm vào duy nhất cho mọi quyết định credit. Không có state toàn cục:
//! caller giữ một `EntitlementGate` và gọi `evaluate` lại sau mỗi `consume`.
//!
//! `consume` không bao giờ trả lỗi: lỗi hạ tầng thành `Denied{TransientFailure}`.

use crate::config::GateConfig;
use crate::debiter::{BalanceDebiter, DebitOutcome, DebiterStrategy};
use crate::error::{GateError, GateResult};
use crate::quota::{
    CalculationCreditService, PolicyStore, QuotaSettings, SessionPolicyStore, SqlitePolicyStore,
};
use crate::services::ServiceContext;
use creditgate_core::{
    present, CalculationPolicy, ConsumeOutcome, CreditEvent, CreditFlavor, DenyReason, Evaluation,
    EvaluationReason, Identity, PresentedRecord, Record, Remaining, UnlockFact, ViewCredit,
};
use creditgate_persistence::{RecordRepo, UnlockRepo, ViewCreditRepo};
use std::sync::Arc;

pub struct EntitlementGate {
    ctx: ServiceContext,
    debiter: Arc<dyn BalanceDebiter>,
    quota: CalculationCreditService,
    config: GateConfig,
}

impl EntitlementGate {
    /// Tạo gate, chọn debiter theo `debiter.mode` (dò backend nếu `auto`)
    pub async fn new(ctx: ServiceContext, config: GateConfig) -> GateResult<Self> {
        config.validate()?;
        let strategy = DebiterStrategy::resolve(config.debiter.mode, ctx.pool()).await;
        tracing::info!(?strategy, "entitlement gate ready");
        let debiter = strategy.build(config.debiter.max_cas_attempts);
        Self::with_debiter(ctx, config, debiter)
    }

    /// Tạo gate với debiter cho trước
    pub fn with_debiter(
        ctx: ServiceContext,
        config: GateConfig,
        debiter: Arc<dyn BalanceDebiter>,
    ) -> GateResult<Self> {
        let settings = QuotaSettings {
            tiers: config.tier_table(),
            cadence: config.cadence()?,
            default_tier: config.quota.default_tier.clone(),
            anonymous_tier: config.quota.anonymous_tier.clone(),
            max_attempts: config.debiter.max_cas_attempts.max(1),
        };
        let durable: Arc<dyn PolicyStore> = Arc::new(SqlitePolicyStore::new(ctx.pool().clone()));
        let session: Arc<dyn PolicyStore> = Arc::new(SessionPolicyStore::new());

        Ok(Self {
            quota: CalculationCreditService::new(durable, session, settings),
            ctx,
            debiter,
            config,
        })
    }

    pub fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn debiter_name(&self) -> &str {
        self.debiter.name()
    }

    pub fn quota(&self) -> &CalculationCreditService {
        &self.quota
    }

    // ========================================================================
    // evaluate / consume
    // ========================================================================

    /// Read-only: identity có thể consume flavor này không
    pub async fn evaluate(&self, identity: &Identity, flavor: CreditFlavor) -> GateResult<Evaluation> {
        match flavor {
            CreditFlavor::RecordUnlock => self.evaluate_unlock(identity).await,
            CreditFlavor::Calculation => {
                let (evaluation, resolved) = self.quota.evaluate(identity).await?;
                if let Some(period_end) = resolved.rolled_over {
                    self.ctx.record_event(|id| {
                        CreditEvent::period_rolled_over(id, identity.owner_id(), period_end)
                    });
                }
                Ok(evaluation)
            }
        }
    }

    async fn evaluate_unlock(&self, identity: &Identity) -> GateResult<Evaluation> {
        if identity.is_anonymous() {
            return Ok(Evaluation::denied(EvaluationReason::SignInRequired));
        }

        let remaining = ViewCreditRepo::get(self.ctx.pool(), identity.owner_id())
            .await?
            .map(|row| row.remaining())
            .unwrap_or(0);

        if remaining > 0 {
            Ok(Evaluation::allowed(Remaining::Count(remaining)))
        } else {
            Ok(Evaluation::denied(EvaluationReason::InsufficientCredits))
        }
    }

    /// Tiêu một credit cho `resource_key` (record ID hoặc tên tool).
    ///
    /// Gọi tối đa một lần cho mỗi ý định của user.
    pub async fn consume(
        &self,
        identity: &Identity,
        resource_key: &str,
        flavor: CreditFlavor,
    ) -> ConsumeOutcome {
        let outcome = match flavor {
            CreditFlavor::RecordUnlock => self.consume_unlock(identity, resource_key).await,
            CreditFlavor::Calculation => self.consume_calculation(identity, resource_key).await,
        };

        if let Some(reason) = outcome.deny_reason() {
            tracing::info!(
                owner = identity.owner_id(),
                resource = resource_key,
                flavor = %flavor,
                reason = reason.as_str(),
                "consume denied"
            );
            self.ctx.record_event(|id| {
                CreditEvent::consume_denied(id, identity.owner_id(), flavor, resource_key, reason)
            });
        }

        outcome
    }

    async fn consume_unlock(&self, identity: &Identity, record_id: &str) -> ConsumeOutcome {
        if identity.is_anonymous() {
            return ConsumeOutcome::denied(DenyReason::SignInRequired);
        }
        let owner_id = identity.owner_id();
        let pool = self.ctx.pool();

        // Fact có trước mọi thay đổi balance
        match UnlockRepo::exists(pool, owner_id, record_id).await {
            Ok(true) => {
                tracing::debug!(owner = owner_id, record = record_id, "record already unlocked");
                return ConsumeOutcome::already_owned();
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(owner = owner_id, record = record_id, error = %e, "unlock lookup failed");
                return ConsumeOutcome::denied(DenyReason::transient(e.to_string()));
            }
        }

        let fact = UnlockFact::new(owner_id, record_id);
        match self.debiter.debit_and_record(pool, &fact).await {
            Ok(DebitOutcome::Charged { remaining }) => {
                tracing::info!(
                    owner = owner_id,
                    record = record_id,
                    remaining,
                    debiter = self.debiter.name(),
                    "record unlocked"
                );
                self.ctx
                    .record_event(|id| CreditEvent::record_unlocked(id, owner_id, record_id));
                ConsumeOutcome::new_charge()
            }
            Ok(DebitOutcome::AlreadyOwned) => ConsumeOutcome::already_owned(),
            Ok(DebitOutcome::Insufficient) => {
                // Một request song song có thể vừa ghi fact cho cùng cặp
                match UnlockRepo::exists(pool, owner_id, record_id).await {
                    Ok(true) => ConsumeOutcome::already_owned(),
                    Ok(false) => ConsumeOutcome::denied(DenyReason::InsufficientCredits),
                    Err(e) => {
                        tracing::warn!(
                            owner = owner_id,
                            record = record_id,
                            error = %e,
                            "unlock re-check failed after insufficient debit"
                        );
                        ConsumeOutcome::denied(DenyReason::InsufficientCredits)
                    }
                }
            }
            Err(e) => {
                tracing::warn!(owner = owner_id, record = record_id, error = %e, "debit failed");
                ConsumeOutcome::denied(DenyReason::transient(e.to_string()))
            }
        }
    }

    async fn consume_calculation(&self, identity: &Identity, tool: &str) -> ConsumeOutcome {
        let owner_id = identity.owner_id();

        match self.quota.consume(identity).await {
            Ok(decision) => {
                if let Some(period_end) = decision.rolled_over {
                    self.ctx
                        .record_event(|id| CreditEvent::period_rolled_over(id, owner_id, period_end));
                }
                if decision.outcome.is_new_charge() {
                    tracing::debug!(owner = owner_id, tool, used = decision.policy.used, "calculation consumed");
                    self.ctx
                        .record_event(|id| CreditEvent::calculation_consumed(id, owner_id, tool));
                }
                decision.outcome
            }
            Err(e) => {
                tracing::warn!(owner = owner_id, tool, error = %e, "calculation consume failed");
                ConsumeOutcome::denied(DenyReason::transient(e.to_string()))
            }
        }
    }

    // ========================================================================
    // Provisioning & grants
    // ========================================================================

    fn require_authenticated<'a>(&self, identity: &'a Identity) -> GateResult<&'a str> {
        if identity.is_anonymous() {
            return Err(GateError::AuthenticationRequired(identity.to_string()));
        }
        Ok(identity.owner_id())
    }

    /// Tạo balance với allocation ban đầu; gọi lại không thay đổi gì
    pub async fn provision_owner(&self, identity: &Identity) -> GateResult<ViewCredit> {
        let owner_id = self.require_authenticated(identity)?;
        let initial = self.config.credits.initial_allocation;

        if ViewCreditRepo::create(self.ctx.pool(), owner_id, initial).await? {
            tracing::info!(owner = owner_id, allocated = initial, "owner provisioned");
            if initial > 0 {
                self.ctx
                    .record_event(|id| CreditEvent::credits_granted(id, owner_id, initial));
            }
        }

        self.view_credit(identity)
            .await?
            .ok_or_else(|| GateError::OwnerNotFound(owner_id.to_string()))
    }

    /// Cộng `amount` vào allocation (purchase)
    pub async fn grant_view_credits(&self, identity: &Identity, amount: i64) -> GateResult<ViewCredit> {
        let owner_id = self.require_authenticated(identity)?;
        if amount <= 0 {
            return Err(GateError::InvalidGrant(amount));
        }

        let row = ViewCreditRepo::grant(self.ctx.pool(), owner_id, amount)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    GateError::OwnerNotFound(owner_id.to_string())
                } else {
                    e.into()
                }
            })?;

        tracing::info!(owner = owner_id, amount, allocated = row.allocated, "view credits granted");
        self.ctx
            .record_event(|id| CreditEvent::credits_granted(id, owner_id, amount));

        Ok(row.into())
    }

    pub async fn set_tier(&self, identity: &Identity, tier: &str) -> GateResult<CalculationPolicy> {
        let policy = self.quota.set_tier(identity, tier).await?;
        tracing::info!(owner = identity.owner_id(), tier = %policy.tier, "tier changed");
        Ok(policy)
    }

    pub async fn set_unlimited_override(
        &self,
        identity: &Identity,
        unlimited: bool,
    ) -> GateResult<CalculationPolicy> {
        let policy = self.quota.set_unlimited_override(identity, unlimited).await?;
        tracing::info!(owner = identity.owner_id(), unlimited, "unlimited override changed");
        Ok(policy)
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn view_credit(&self, identity: &Identity) -> GateResult<Option<ViewCredit>> {
        if identity.is_anonymous() {
            return Ok(None);
        }
        Ok(ViewCreditRepo::get(self.ctx.pool(), identity.owner_id())
            .await?
            .map(ViewCredit::from))
    }

    /// Policy của chu kỳ hiện tại (tạo nếu chưa có)
    pub async fn calculation_policy(&self, identity: &Identity) -> GateResult<CalculationPolicy> {
        let (_, resolved) = self.quota.evaluate(identity).await?;
        Ok(resolved.policy)
    }

    pub async fn unlocked_records(&self, identity: &Identity) -> GateResult<Vec<UnlockFact>> {
        if identity.is_anonymous() {
            return Ok(Vec::new());
        }
        let rows = UnlockRepo::list_by_owner(self.ctx.pool(), identity.owner_id()).await?;
        Ok(rows.into_iter().map(UnlockFact::from).collect())
    }

    pub async fn is_unlocked(&self, identity: &Identity, record_id: &str) -> GateResult<bool> {
        if identity.is_anonymous() {
            return Ok(false);
        }
        Ok(UnlockRepo::exists(self.ctx.pool(), identity.owner_id(), record_id).await?)
    }

    /// Record qua presenter: rõ nếu đã unlock, che nếu chưa
    pub async fn present_record(
        &self,
        identity: &Identity,
        record_id: &str,
    ) -> GateResult<PresentedRecord> {
        let row = RecordRepo::get(self.ctx.pool(), record_id)
            .await
            .map_err(|e| {
                if e.is_not_found() {
                    GateError::RecordNotFound(record_id.to_string())
                } else {
                    e.into()
                }
            })?;
        let record = Record::try_from(row)?;
        let unlocked = self.is_unlocked(identity, record_id).await?;

        Ok(present(&record, unlocked))
    }
}
