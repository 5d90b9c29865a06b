//! Client-side helpers quanh `EntitlementGate::consume`
//!
//! - `SingleFlight`: mỗi control chỉ có một consume đang chạy
//! - `ShadowBalance`: số dư hiển thị lạc quan, luôn reconcile với kết quả thật
//! - `ConsumeController`: ghép hai thứ trên với gate

use crate::gate::EntitlementGate;
use creditgate_core::{ConsumeOutcome, CreditFlavor, Evaluation, Identity, Remaining};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ============================================================================
// SingleFlight
// ============================================================================

/// Registry các control đang in-flight
#[derive(Clone, Default)]
pub struct SingleFlight {
    active: Arc<Mutex<HashSet<String>>>,
}

fn lock_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bắt đầu flight cho `key`; `None` nếu đang có flight khác
    pub fn try_begin(&self, key: &str) -> Option<FlightGuard> {
        let mut active = lock_recover(&self.active);
        if !active.insert(key.to_string()) {
            return None;
        }
        Some(FlightGuard {
            key: key.to_string(),
            active: Arc::clone(&self.active),
        })
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        lock_recover(&self.active).contains(key)
    }
}

/// Kết thúc flight khi bị drop
#[must_use = "the flight ends when the guard is dropped"]
pub struct FlightGuard {
    key: String,
    active: Arc<Mutex<HashSet<String>>>,
}

impl FlightGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        lock_recover(&self.active).remove(&self.key);
    }
}

// ============================================================================
// ShadowBalance
// ============================================================================

/// Số dư trước khi reserve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub struct Reservation {
    before: Remaining,
}

impl Reservation {
    pub fn before(&self) -> Remaining {
        self.before
    }
}

/// Bản ghi reconcile gửi cho callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub optimistic: Remaining,
    pub settled: Remaining,
    pub outcome: ConsumeOutcome,
    /// Optimistic decrement đã bị hoàn lại
    pub rolled_back: bool,
}

type ReconcileCallback = Box<dyn Fn(&Reconciliation) + Send + Sync>;

/// Số dư hiển thị phía client.
///
/// Không bao giờ được dùng để quyết định có gọi `consume` lần nữa hay không.
pub struct ShadowBalance {
    displayed: Mutex<Remaining>,
    on_reconcile: Option<ReconcileCallback>,
}

impl ShadowBalance {
    pub fn new(initial: Remaining) -> Self {
        Self {
            displayed: Mutex::new(initial),
            on_reconcile: None,
        }
    }

    pub fn on_reconcile<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Reconciliation) + Send + Sync + 'static,
    {
        self.on_reconcile = Some(Box::new(callback));
        self
    }

    pub fn displayed(&self) -> Remaining {
        *lock_recover(&self.displayed)
    }

    /// Ghi đè bằng giá trị authoritative
    pub fn set(&self, authoritative: Remaining) {
        *lock_recover(&self.displayed) = authoritative;
    }

    /// Giảm lạc quan một đơn vị
    pub fn reserve(&self) -> Reservation {
        let mut displayed = lock_recover(&self.displayed);
        let before = *displayed;
        if let Remaining::Count(n) = before {
            *displayed = Remaining::Count((n - 1).max(0));
        }
        Reservation { before }
    }

    /// Chốt số dư sau consume.
    ///
    /// `authoritative` (từ `evaluate`) thắng nếu có. Nếu không có, giữ
    /// decrement khi consume thực sự trừ credit, ngược lại hoàn về trước reserve.
    pub fn reconcile(
        &self,
        reservation: Reservation,
        outcome: &ConsumeOutcome,
        authoritative: Option<Remaining>,
    ) -> Reconciliation {
        let record = {
            let mut displayed = lock_recover(&self.displayed);
            let optimistic = *displayed;
            let charged = outcome.is_new_charge();

            let settled = match authoritative {
                Some(value) => value,
                None if charged => optimistic,
                None => reservation.before,
            };
            *displayed = settled;

            Reconciliation {
                optimistic,
                settled,
                outcome: outcome.clone(),
                rolled_back: !charged && settled == reservation.before,
            }
        };

        if let Some(callback) = &self.on_reconcile {
            callback(&record);
        }
        record
    }
}

// ============================================================================
// ConsumeController
// ============================================================================

/// Kết quả của một lần bấm control
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerResult {
    /// Control đang bận với consume trước đó
    Busy,
    Completed {
        outcome: ConsumeOutcome,
        /// Trạng thái sau consume; `None` nếu refresh lỗi
        refreshed: Option<Evaluation>,
    },
}

/// Control gọi consume: single-flight, shadow balance, refresh sau mỗi lần
pub struct ConsumeController {
    gate: Arc<EntitlementGate>,
    flights: SingleFlight,
    shadow: Arc<ShadowBalance>,
}

impl ConsumeController {
    pub fn new(gate: Arc<EntitlementGate>, shadow: Arc<ShadowBalance>) -> Self {
        Self {
            gate,
            flights: SingleFlight::new(),
            shadow,
        }
    }

    pub fn flights(&self) -> &SingleFlight {
        &self.flights
    }

    pub fn shadow(&self) -> &ShadowBalance {
        &self.shadow
    }

    pub fn control_key(identity: &Identity, resource_key: &str, flavor: CreditFlavor) -> String {
        format!("{}:{}:{}", flavor, identity.owner_id(), resource_key)
    }

    pub async fn trigger(
        &self,
        identity: &Identity,
        resource_key: &str,
        flavor: CreditFlavor,
    ) -> TriggerResult {
        let key = Self::control_key(identity, resource_key, flavor);
        let Some(_flight) = self.flights.try_begin(&key) else {
            tracing::debug!(control = %key, "consume already in flight");
            return TriggerResult::Busy;
        };

        let reservation = self.shadow.reserve();
        let outcome = self.gate.consume(identity, resource_key, flavor).await;

        let refreshed = match self.gate.evaluate(identity, flavor).await {
            Ok(evaluation) => Some(evaluation),
            Err(e) => {
                tracing::warn!(control = %key, error = %e, "refresh after consume failed");
                None
            }
        };

        self.shadow.reconcile(
            reservation,
            &outcome,
            refreshed.as_ref().map(|e| e.remaining),
        );

        TriggerResult::Completed { outcome, refreshed }
    }
}
