//! # Creditgate Calc
//!
//! Financial calculators, chạy sau khi gate đã consume một calculation credit:
//! - `IrrSolver`: IRR bằng bisection trên [-0.99, 1000]
//! - `tools::npv`, `tools::moic`: closed-form trên `Decimal`
//!
//! Các hàm đều thuần túy, không chạm vào credit state.

pub mod error;
pub mod irr;
pub mod tools;

pub use error::{CalcError, CalcResult};
pub use irr::{validate_flows, IrrResult, IrrSolver, RATE_LOWER_BOUND, RATE_UPPER_BOUND};
pub use tools::{moic, npv, validate_moic, validate_rate};
