//! CLI command handlers

pub mod calc;
pub mod entitlement;
pub mod history;
pub mod owner;
pub mod record;
