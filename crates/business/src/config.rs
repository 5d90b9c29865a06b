//! Gate configuration
//!
//! Mọi giá trị đều có default; file TOML chỉ cần ghi đè phần muốn đổi.
//!
//! ```toml
//! [credits]
//! initial_allocation = 3
//!
//! [debiter]
//! mode = "auto"
//!
//! [quota]
//! cadence_days = 30
//! default_tier = "free"
//!
//! [quota.tiers.free]
//! limit = 5
//!
//! [quota.tiers.enterprise]
//! unlimited = true
//! ```

use creditgate_core::{Cadence, TierLimit, TierTable, MAX_CADENCE_DAYS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;

/// Configuration loading errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration cho EntitlementGate và calculators
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default)]
    pub credits: CreditsConfig,
    #[serde(default)]
    pub debiter: DebiterConfig,
    #[serde(default)]
    pub quota: QuotaConfig,
    #[serde(default)]
    pub solver: SolverConfig,
}

/// View credits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditsConfig {
    /// Allocation khi provision owner mới
    #[serde(default = "default_initial_allocation")]
    pub initial_allocation: i64,
}

/// Chọn debiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebiterMode {
    /// Dò khả năng của backend
    #[default]
    Auto,
    /// Atomic increment-and-check, CAS khi lỗi
    Atomic,
    /// Chỉ CAS
    Cas,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebiterConfig {
    #[serde(default)]
    pub mode: DebiterMode,

    /// Số lần thử CAS tối đa trước khi trả về TransientFailure
    #[serde(default = "default_max_cas_attempts")]
    pub max_cas_attempts: u32,
}

/// Tier entry: đúng một trong `limit` / `unlimited`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TierConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub unlimited: bool,
}

impl TierConfig {
    pub fn limited(limit: u32) -> Self {
        Self {
            limit: Some(limit),
            unlimited: false,
        }
    }

    pub fn unlimited() -> Self {
        Self {
            limit: None,
            unlimited: true,
        }
    }

    fn to_limit(&self) -> Option<TierLimit> {
        match (self.limit, self.unlimited) {
            (Some(n), false) => Some(TierLimit::Limited(n)),
            (None, true) => Some(TierLimit::Unlimited),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaConfig {
    #[serde(default = "default_cadence_days")]
    pub cadence_days: u32,

    /// Tier cho authenticated owner mới
    #[serde(default = "default_tier")]
    pub default_tier: String,

    /// Tier cho anonymous session
    #[serde(default = "default_anonymous_tier")]
    pub anonymous_tier: String,

    #[serde(default = "default_tiers")]
    pub tiers: BTreeMap<String, TierConfig>,
}

/// IRR solver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Early-exit khi |NPV| nhỏ hơn giá trị này
    #[serde(default = "default_npv_tolerance")]
    pub npv_tolerance: f64,
}

// Default value functions for serde
fn default_initial_allocation() -> i64 {
    3
}

fn default_max_cas_attempts() -> u32 {
    5
}

fn default_cadence_days() -> u32 {
    30
}

fn default_tier() -> String {
    "free".to_string()
}

fn default_anonymous_tier() -> String {
    "anonymous".to_string()
}

fn default_tiers() -> BTreeMap<String, TierConfig> {
    BTreeMap::from([
        ("anonymous".to_string(), TierConfig::limited(3)),
        ("free".to_string(), TierConfig::limited(5)),
        ("pro".to_string(), TierConfig::limited(50)),
        ("enterprise".to_string(), TierConfig::unlimited()),
    ])
}

fn default_max_iterations() -> u32 {
    100
}

fn default_npv_tolerance() -> f64 {
    1e-7
}

impl Default for CreditsConfig {
    fn default() -> Self {
        Self {
            initial_allocation: default_initial_allocation(),
        }
    }
}

impl Default for DebiterConfig {
    fn default() -> Self {
        Self {
            mode: DebiterMode::default(),
            max_cas_attempts: default_max_cas_attempts(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            cadence_days: default_cadence_days(),
            default_tier: default_tier(),
            anonymous_tier: default_anonymous_tier(),
            tiers: default_tiers(),
        }
    }
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            npv_tolerance: default_npv_tolerance(),
        }
    }
}

impl GateConfig {
    /// Load configuration từ TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load configuration từ TOML string
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: GateConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.credits.initial_allocation < 0 {
            return Err(ConfigError::Validation(format!(
                "credits.initial_allocation must be >= 0, got {}",
                self.credits.initial_allocation
            )));
        }

        if self.debiter.max_cas_attempts == 0 {
            return Err(ConfigError::Validation(
                "debiter.max_cas_attempts must be >= 1".to_string(),
            ));
        }

        if self.quota.cadence_days == 0 || self.quota.cadence_days > MAX_CADENCE_DAYS {
            return Err(ConfigError::Validation(format!(
                "quota.cadence_days must be between 1 and {}, got {}",
                MAX_CADENCE_DAYS, self.quota.cadence_days
            )));
        }

        for (name, tier) in &self.quota.tiers {
            if tier.to_limit().is_none() {
                return Err(ConfigError::Validation(format!(
                    "tier '{}' must set exactly one of `limit` or `unlimited`",
                    name
                )));
            }
        }

        let tiers = self.tier_table();
        for (key, tier) in [
            ("quota.default_tier", &self.quota.default_tier),
            ("quota.anonymous_tier", &self.quota.anonymous_tier),
        ] {
            if !tiers.contains(tier) {
                return Err(ConfigError::Validation(format!(
                    "{} '{}' is not a configured tier",
                    key, tier
                )));
            }
        }

        if self.solver.max_iterations == 0 {
            return Err(ConfigError::Validation(
                "solver.max_iterations must be >= 1".to_string(),
            ));
        }

        if !(self.solver.npv_tolerance.is_finite() && self.solver.npv_tolerance >= 0.0) {
            return Err(ConfigError::Validation(format!(
                "solver.npv_tolerance must be a non-negative number, got {}",
                self.solver.npv_tolerance
            )));
        }

        Ok(())
    }

    /// Bảng tier -> limit; bỏ qua entry không hợp lệ
    pub fn tier_table(&self) -> TierTable {
        let mut table = TierTable::new();
        for (name, tier) in &self.quota.tiers {
            if let Some(limit) = tier.to_limit() {
                table.insert(name, limit);
            }
        }
        table
    }

    pub fn cadence(&self) -> ConfigResult<Cadence> {
        Cadence::days(self.quota.cadence_days)
            .map_err(|e| ConfigError::Validation(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GateConfig::default();
        assert_eq!(config.credits.initial_allocation, 3);
        assert_eq!(config.debiter.mode, DebiterMode::Auto);
        assert_eq!(config.debiter.max_cas_attempts, 5);
        assert_eq!(config.quota.cadence_days, 30);
        assert_eq!(config.solver.max_iterations, 100);
        assert!(config.validate().is_ok());

        let tiers = config.tier_table();
        assert_eq!(tiers.get("free"), Some(TierLimit::Limited(5)));
        assert_eq!(tiers.get("enterprise"), Some(TierLimit::Unlimited));
    }

    #[test]
    fn test_partial_toml() {
        let config = GateConfig::from_toml_str(
            r#"
            [credits]
            initial_allocation = 10

            [debiter]
            mode = "cas"
            "#,
        )
        .unwrap();

        assert_eq!(config.credits.initial_allocation, 10);
        assert_eq!(config.debiter.mode, DebiterMode::Cas);
        assert_eq!(config.debiter.max_cas_attempts, 5);
        assert_eq!(config.quota.default_tier, "free");
    }

    #[test]
    fn test_custom_tiers() {
        let config = GateConfig::from_toml_str(
            r#"
            [quota]
            default_tier = "basic"
            anonymous_tier = "basic"

            [quota.tiers.basic]
            limit = 2

            [quota.tiers.vip]
            unlimited = true
            "#,
        )
        .unwrap();

        let tiers = config.tier_table();
        assert_eq!(tiers.len(), 2);
        assert_eq!(tiers.get("basic"), Some(TierLimit::Limited(2)));
        assert!(!tiers.contains("free"));
    }

    #[test]
    fn test_validation_errors() {
        let err = GateConfig::from_toml_str("[quota]\ncadence_days = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        let err = GateConfig::from_toml_str("[quota]\ncadence_days = 200000000").unwrap_err();
        assert!(err.to_string().contains("cadence_days"));
        assert!(GateConfig::from_toml_str("[quota]\ncadence_days = 36500").is_ok());

        let err = GateConfig::from_toml_str("[quota]\ndefault_tier = \"gold\"").unwrap_err();
        assert!(err.to_string().contains("gold"));

        let err = GateConfig::from_toml_str(
            "[quota.tiers.free]\nlimit = 5\nunlimited = true",
        )
        .unwrap_err();
        assert!(err.to_string().contains("exactly one"));

        let err = GateConfig::from_toml_str("[debiter]\nmax_cas_attempts = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));

        assert!(matches!(
            GateConfig::from_toml_str("credits = 3").unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creditgate.toml");
        std::fs::write(&path, "[solver]\nmax_iterations = 60\n").unwrap();

        let config = GateConfig::from_file(&path).unwrap();
        assert_eq!(config.solver.max_iterations, 60);

        let missing = GateConfig::from_file(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::NotFound(_)));
    }
}
