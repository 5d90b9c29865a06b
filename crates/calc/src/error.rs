//! Calculator errors

use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CalcError {
    #[error("At least two cash flows are required, got {0}")]
    InsufficientFlows(usize),

    #[error("Initial cash flow must be a negative outflow, got {0}")]
    InvalidInitialFlow(f64),

    #[error("Cash flows contain no positive inflow")]
    NoPositiveFlow,

    #[error("Cash flow at t={0} is not a finite number")]
    NonFiniteFlow(usize),

    #[error("Invalid discount rate: {0}")]
    InvalidRate(String),

    #[error("Invested capital must be positive, got {0}")]
    InvalidInvestment(Decimal),

    #[error("Returned value must not be negative, got {0}")]
    InvalidReturn(Decimal),

    #[error("Arithmetic overflow")]
    Overflow,

    #[error("Invalid solver configuration: {0}")]
    InvalidSolverConfig(String),
}

pub type CalcResult<T> = Result<T, CalcError>;
