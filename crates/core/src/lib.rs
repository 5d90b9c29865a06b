//! # Creditgate Core
//!
//! Domain types cho entitlement engine:
//! - `Identity`: anonymous (session) hoặc authenticated
//! - `ViewCredit`, `UnlockFact`: view credits và unlock ledger
//! - `CalculationPolicy`, `TierTable`, `Cadence`: quota theo chu kỳ
//! - `Evaluation`, `ConsumeOutcome`, `DenyReason`: kết quả của gate
//! - `masking`: presenter che thông tin record chưa unlock

pub mod credit;
pub mod decision;
pub mod error;
pub mod event;
pub mod identity;
pub mod masking;
pub mod policy;
pub mod record;
pub mod unlock;

pub use credit::{CreditFlavor, ViewCredit};
pub use decision::{ConsumeOutcome, DenyReason, Evaluation, EvaluationReason, Remaining};
pub use error::{CoreError, CoreResult};
pub use event::{CreditEvent, CreditEventType};
pub use identity::{Identity, IdentityKind};
pub use masking::{mask_name, present, redact_text};
pub use policy::{Cadence, CalculationPolicy, TierLimit, TierTable, MAX_CADENCE_DAYS};
pub use record::{PresentedRecord, Record, RecordFilter, RecordPage};
pub use unlock::UnlockFact;
