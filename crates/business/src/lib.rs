//! # Creditgate Business
//!
//! Business logic layer:
//! - `EntitlementGate`: evaluate / consume cho view credits và calculation quota
//! - `debiter`: atomic và CAS debit paths
//! - `quota`: calculation policies theo chu kỳ
//! - `client`: single-flight, shadow balance, consume controller
//! - `catalog`: investor record catalog

pub mod catalog;
pub mod client;
pub mod config;
pub mod debiter;
pub mod error;
pub mod gate;
pub mod quota;
pub mod services;

pub use catalog::CatalogService;
pub use client::{
    ConsumeController, FlightGuard, Reconciliation, Reservation, ShadowBalance, SingleFlight,
    TriggerResult,
};
pub use config::{ConfigError, DebiterMode, GateConfig, TierConfig};
pub use debiter::{
    AtomicDebiter, BalanceDebiter, CasDebiter, DebitOutcome, DebiterStrategy, FallbackDebiter,
};
pub use error::{GateError, GateResult};
pub use gate::EntitlementGate;
pub use quota::{
    CalculationCreditService, PolicyStore, QuotaDecision, ResolvedPolicy, SessionPolicyStore,
    SqlitePolicyStore,
};
pub use services::ServiceContext;
