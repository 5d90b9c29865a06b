//! Balance debiters - trừ một view credit và ghi UnlockFact trong cùng transaction.
//!
//! - `AtomicDebiter`: `UPDATE ... WHERE used < allocated RETURNING *`
//! - `CasDebiter`: read-modify-write có version guard, retry giới hạn
//! - `FallbackDebiter`: atomic trước, CAS khi atomic lỗi hạ tầng
//!
//! Insufficient là kết quả, không phải lỗi, nên không kích hoạt fallback.

use crate::config::DebiterMode;
use crate::error::{GateError, GateResult};
use async_trait::async_trait;
use creditgate_core::UnlockFact;
use creditgate_persistence::{sqlite_version, UnlockRepo, ViewCreditRepo};
use sqlx::SqlitePool;
use std::sync::Arc;

/// Phiên bản SQLite đầu tiên hỗ trợ `RETURNING`
const RETURNING_MIN_VERSION: (u32, u32, u32) = (3, 35, 0);

/// Kết quả của một lần debit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebitOutcome {
    /// Đã trừ credit và ghi fact
    Charged { remaining: i64 },
    /// Fact đã có (insert song song), debit đã rollback
    AlreadyOwned,
    /// `remaining == 0`, không có gì thay đổi
    Insufficient,
}

/// Chiến lược trừ credit.
///
/// Implementations phải đảm bảo: fact chỉ tồn tại khi debit đã commit cùng nó.
#[async_trait]
pub trait BalanceDebiter: Send + Sync {
    fn name(&self) -> &str;

    async fn debit_and_record(&self, pool: &SqlitePool, fact: &UnlockFact)
        -> GateResult<DebitOutcome>;
}

// ============================================================================
// Atomic
// ============================================================================

pub struct AtomicDebiter;

#[async_trait]
impl BalanceDebiter for AtomicDebiter {
    fn name(&self) -> &str {
        "atomic"
    }

    async fn debit_and_record(
        &self,
        pool: &SqlitePool,
        fact: &UnlockFact,
    ) -> GateResult<DebitOutcome> {
        let mut tx = pool.begin().await?;

        let Some(row) = ViewCreditRepo::increment_used_checked(&mut tx, &fact.owner_id).await?
        else {
            tx.rollback().await?;
            return Ok(DebitOutcome::Insufficient);
        };

        match UnlockRepo::insert(&mut tx, fact).await {
            Ok(()) => {}
            Err(e) if e.is_unique_violation() => {
                tx.rollback().await?;
                return Ok(DebitOutcome::AlreadyOwned);
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;

        Ok(DebitOutcome::Charged {
            remaining: row.remaining(),
        })
    }
}

// ============================================================================
// Compare-and-swap
// ============================================================================

pub struct CasDebiter {
    max_attempts: u32,
}

impl CasDebiter {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }
}

#[async_trait]
impl BalanceDebiter for CasDebiter {
    fn name(&self) -> &str {
        "cas"
    }

    async fn debit_and_record(
        &self,
        pool: &SqlitePool,
        fact: &UnlockFact,
    ) -> GateResult<DebitOutcome> {
        let owner_id = fact.owner_id.as_str();

        for attempt in 1..=self.max_attempts {
            let Some(row) = ViewCreditRepo::get(pool, owner_id).await? else {
                return Ok(DebitOutcome::Insufficient);
            };
            if row.remaining() <= 0 {
                return Ok(DebitOutcome::Insufficient);
            }

            let mut tx = pool.begin().await?;

            let swapped =
                ViewCreditRepo::compare_and_set_used(&mut tx, owner_id, row.version, row.used + 1)
                    .await?;
            if !swapped {
                tx.rollback().await?;
                tracing::warn!(
                    owner = owner_id,
                    attempt,
                    expected_version = row.version,
                    "CAS conflict on view credits, retrying"
                );
                tokio::task::yield_now().await;
                continue;
            }

            match UnlockRepo::insert(&mut tx, fact).await {
                Ok(()) => {}
                Err(e) if e.is_unique_violation() => {
                    tx.rollback().await?;
                    return Ok(DebitOutcome::AlreadyOwned);
                }
                Err(e) => return Err(e.into()),
            }

            tx.commit().await?;

            return Ok(DebitOutcome::Charged {
                remaining: row.remaining() - 1,
            });
        }

        Err(GateError::contended(owner_id, self.max_attempts))
    }
}

// ============================================================================
// Fallback composition
// ============================================================================

/// Primary (thường là atomic) với CAS làm đường dự phòng
pub struct FallbackDebiter {
    primary: Box<dyn BalanceDebiter>,
    fallback: CasDebiter,
}

impl FallbackDebiter {
    pub fn new(primary: Box<dyn BalanceDebiter>, fallback: CasDebiter) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl BalanceDebiter for FallbackDebiter {
    fn name(&self) -> &str {
        "atomic+cas"
    }

    async fn debit_and_record(
        &self,
        pool: &SqlitePool,
        fact: &UnlockFact,
    ) -> GateResult<DebitOutcome> {
        match self.primary.debit_and_record(pool, fact).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                tracing::warn!(
                    owner = %fact.owner_id,
                    record = %fact.record_id,
                    primary = self.primary.name(),
                    error = %e,
                    "primary debit failed, falling back to CAS"
                );
                self.fallback.debit_and_record(pool, fact).await
            }
        }
    }
}

// ============================================================================
// Strategy selection
// ============================================================================

/// Debiter được chọn một lần khi khởi tạo gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebiterStrategy {
    AtomicWithFallback,
    CasOnly,
}

impl DebiterStrategy {
    /// Dò backend: atomic chỉ khi SQLite hỗ trợ `RETURNING`
    pub async fn detect(pool: &SqlitePool) -> Self {
        match sqlite_version(pool).await {
            Ok(version) if version >= RETURNING_MIN_VERSION => {
                tracing::debug!(?version, "backend supports atomic increment-and-check");
                DebiterStrategy::AtomicWithFallback
            }
            Ok(version) => {
                tracing::info!(?version, "backend lacks RETURNING, using CAS debiter");
                DebiterStrategy::CasOnly
            }
            Err(e) => {
                tracing::warn!(error = %e, "capability check failed, using CAS debiter");
                DebiterStrategy::CasOnly
            }
        }
    }

    /// Mode từ config; `Auto` thì detect
    pub async fn resolve(mode: DebiterMode, pool: &SqlitePool) -> Self {
        match mode {
            DebiterMode::Auto => Self::detect(pool).await,
            DebiterMode::Atomic => DebiterStrategy::AtomicWithFallback,
            DebiterMode::Cas => DebiterStrategy::CasOnly,
        }
    }

    pub fn build(self, max_cas_attempts: u32) -> Arc<dyn BalanceDebiter> {
        match self {
            DebiterStrategy::AtomicWithFallback => Arc::new(FallbackDebiter::new(
                Box::new(AtomicDebiter),
                CasDebiter::new(max_cas_attempts),
            )),
            DebiterStrategy::CasOnly => Arc::new(CasDebiter::new(max_cas_attempts)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use creditgate_persistence::init_in_memory;

    struct BrokenDebiter;

    #[async_trait]
    impl BalanceDebiter for BrokenDebiter {
        fn name(&self) -> &str {
            "broken"
        }

        async fn debit_and_record(
            &self,
            _pool: &SqlitePool,
            _fact: &UnlockFact,
        ) -> GateResult<DebitOutcome> {
            Err(GateError::Internal("primitive unavailable".to_string()))
        }
    }

    async fn pool_with_balance(allocated: i64) -> SqlitePool {
        let pool = init_in_memory().await.unwrap();
        ViewCreditRepo::create(&pool, "user_1", allocated).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_atomic_debit_charges_and_records() {
        let pool = pool_with_balance(2).await;

        let outcome = AtomicDebiter
            .debit_and_record(&pool, &UnlockFact::new("user_1", "INV_001"))
            .await
            .unwrap();
        assert_eq!(outcome, DebitOutcome::Charged { remaining: 1 });
        assert!(UnlockRepo::exists(&pool, "user_1", "INV_001").await.unwrap());
    }

    #[tokio::test]
    async fn test_atomic_duplicate_rolls_back_debit() {
        let pool = pool_with_balance(2).await;
        let fact = UnlockFact::new("user_1", "INV_001");

        AtomicDebiter.debit_and_record(&pool, &fact).await.unwrap();
        let outcome = AtomicDebiter.debit_and_record(&pool, &fact).await.unwrap();
        assert_eq!(outcome, DebitOutcome::AlreadyOwned);

        let row = ViewCreditRepo::get(&pool, "user_1").await.unwrap().unwrap();
        assert_eq!(row.used, 1);
    }

    #[tokio::test]
    async fn test_atomic_insufficient_leaves_no_fact() {
        let pool = pool_with_balance(0).await;

        let outcome = AtomicDebiter
            .debit_and_record(&pool, &UnlockFact::new("user_1", "INV_001"))
            .await
            .unwrap();
        assert_eq!(outcome, DebitOutcome::Insufficient);
        assert!(!UnlockRepo::exists(&pool, "user_1", "INV_001").await.unwrap());
    }

    #[tokio::test]
    async fn test_cas_debit() {
        let pool = pool_with_balance(1).await;
        let debiter = CasDebiter::new(3);

        let outcome = debiter
            .debit_and_record(&pool, &UnlockFact::new("user_1", "INV_001"))
            .await
            .unwrap();
        assert_eq!(outcome, DebitOutcome::Charged { remaining: 0 });

        let outcome = debiter
            .debit_and_record(&pool, &UnlockFact::new("user_1", "INV_002"))
            .await
            .unwrap();
        assert_eq!(outcome, DebitOutcome::Insufficient);

        let row = ViewCreditRepo::get(&pool, "user_1").await.unwrap().unwrap();
        assert_eq!(row.used, 1);
        assert_eq!(row.version, 1);
    }

    #[tokio::test]
    async fn test_cas_unknown_owner_is_insufficient() {
        let pool = init_in_memory().await.unwrap();
        let outcome = CasDebiter::new(1)
            .debit_and_record(&pool, &UnlockFact::new("ghost", "INV_001"))
            .await
            .unwrap();
        assert_eq!(outcome, DebitOutcome::Insufficient);
    }

    #[tokio::test]
    async fn test_fallback_uses_cas_when_primary_fails() {
        let pool = pool_with_balance(1).await;
        let debiter = FallbackDebiter::new(Box::new(BrokenDebiter), CasDebiter::new(3));

        let outcome = debiter
            .debit_and_record(&pool, &UnlockFact::new("user_1", "INV_001"))
            .await
            .unwrap();
        assert_eq!(outcome, DebitOutcome::Charged { remaining: 0 });
        assert!(UnlockRepo::exists(&pool, "user_1", "INV_001").await.unwrap());
    }

    #[tokio::test]
    async fn test_strategy_resolution() {
        let pool = init_in_memory().await.unwrap();

        assert_eq!(
            DebiterStrategy::resolve(DebiterMode::Cas, &pool).await,
            DebiterStrategy::CasOnly
        );
        assert_eq!(
            DebiterStrategy::resolve(DebiterMode::Atomic, &pool).await,
            DebiterStrategy::AtomicWithFallback
        );
        // sqlx bundles a recent SQLite
        assert_eq!(
            DebiterStrategy::detect(&pool).await,
            DebiterStrategy::AtomicWithFallback
        );

        assert_eq!(DebiterStrategy::CasOnly.build(2).name(), "cas");
        assert_eq!(DebiterStrategy::AtomicWithFallback.build(2).name(), "atomic+cas");
    }
}
