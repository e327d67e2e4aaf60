//! Application configuration.
//!
//! Behavior lives in the YAML file; the environment carries only
//! credentials and endpoint overrides. Parsed once at startup with
//! explicit validation errors.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("environment variable '{0}' not set")]
    EnvVarMissing(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Market universe file read by the default loader.
    #[serde(default = "default_markets_file")]
    pub markets_file: PathBuf,

    /// Directory holding per-market risk-off records.
    #[serde(default = "default_risk_state_dir")]
    pub risk_state_dir: PathBuf,

    /// Trade-log output (JSON lines).
    #[serde(default = "default_trade_log_file")]
    pub trade_log_file: PathBuf,

    /// Reward/position snapshot output (JSON lines).
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: PathBuf,

    #[serde(default)]
    pub streams: StreamsConfig,

    #[serde(default)]
    pub cadence: CadenceConfig,

    #[serde(default)]
    pub tuning: EngineTuning,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_markets_file() -> PathBuf {
    PathBuf::from("markets.yaml")
}

fn default_risk_state_dir() -> PathBuf {
    PathBuf::from("state/risk_off")
}

fn default_trade_log_file() -> PathBuf {
    PathBuf::from("logs/fills.jsonl")
}

fn default_snapshot_file() -> PathBuf {
    PathBuf::from("logs/snapshots.jsonl")
}

/// WebSocket endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamsConfig {
    #[serde(default = "default_market_ws_url")]
    pub market_ws_url: String,

    #[serde(default = "default_user_ws_url")]
    pub user_ws_url: String,
}

fn default_market_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}

fn default_user_ws_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/user".to_string()
}

impl Default for StreamsConfig {
    fn default() -> Self {
        Self {
            market_ws_url: default_market_ws_url(),
            user_ws_url: default_user_ws_url(),
        }
    }
}

/// Periodic-loop cadences, in seconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CadenceConfig {
    #[serde(default = "default_pull_secs")]
    pub pull_secs: u64,

    #[serde(default = "default_registry_secs")]
    pub registry_secs: u64,

    #[serde(default = "default_snapshot_secs")]
    pub snapshot_secs: u64,
}

fn default_pull_secs() -> u64 {
    10
}

fn default_registry_secs() -> u64 {
    60
}

fn default_snapshot_secs() -> u64 {
    300
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            pull_secs: default_pull_secs(),
            registry_secs: default_registry_secs(),
            snapshot_secs: default_snapshot_secs(),
        }
    }
}

/// Every constant the quote engine and reconciler consume, named and
/// overridable. Defaults are the reference values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EngineTuning {
    /// Absolute cap on accumulated shares per token.
    #[serde(default = "default_hard_share_cap")]
    pub hard_share_cap: f64,

    /// Replace a resting buy when its price drifts beyond this.
    #[serde(default = "default_buy_replace_price_tol")]
    pub buy_replace_price_tol: f64,

    /// Replace a resting buy when its size drifts beyond this fraction.
    #[serde(default = "default_buy_replace_size_frac")]
    pub buy_replace_size_frac: f64,

    /// Replace a resting sell when its price drifts beyond this.
    #[serde(default = "default_sell_replace_price_tol")]
    pub sell_replace_price_tol: f64,

    /// Replace a resting sell when its size drifts beyond this fraction.
    #[serde(default = "default_sell_replace_size_frac")]
    pub sell_replace_size_frac: f64,

    /// Below this bid the low-price multiplier kicks in.
    #[serde(default = "default_low_price_cutoff")]
    pub low_price_cutoff: f64,

    /// Factor (>= 1) applied to sub-cutoff bids before tick rounding.
    #[serde(default = "default_low_price_multiplier")]
    pub low_price_multiplier: f64,

    /// Merge complementary pairs once both legs hold this many shares.
    #[serde(default = "default_merge_min_shares")]
    pub merge_min_shares: f64,

    /// Minimum gap between actions driven by book-only triggers.
    #[serde(default = "default_book_trigger_min_interval_secs")]
    pub book_trigger_min_interval_secs: u64,

    /// Pending trade-intent expiry.
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,

    /// Deadline on every exchange call.
    #[serde(default = "default_exchange_timeout_secs")]
    pub exchange_timeout_secs: u64,
}

fn default_hard_share_cap() -> f64 {
    250.0
}

fn default_buy_replace_price_tol() -> f64 {
    0.015
}

fn default_buy_replace_size_frac() -> f64 {
    0.25
}

fn default_sell_replace_price_tol() -> f64 {
    0.05
}

fn default_sell_replace_size_frac() -> f64 {
    0.30
}

fn default_low_price_cutoff() -> f64 {
    0.10
}

fn default_low_price_multiplier() -> f64 {
    1.05
}

fn default_merge_min_shares() -> f64 {
    20.0
}

fn default_book_trigger_min_interval_secs() -> u64 {
    30
}

fn default_pending_ttl_secs() -> u64 {
    60
}

fn default_exchange_timeout_secs() -> u64 {
    10
}

impl Default for EngineTuning {
    fn default() -> Self {
        Self {
            hard_share_cap: default_hard_share_cap(),
            buy_replace_price_tol: default_buy_replace_price_tol(),
            buy_replace_size_frac: default_buy_replace_size_frac(),
            sell_replace_price_tol: default_sell_replace_price_tol(),
            sell_replace_size_frac: default_sell_replace_size_frac(),
            low_price_cutoff: default_low_price_cutoff(),
            low_price_multiplier: default_low_price_multiplier(),
            merge_min_shares: default_merge_min_shares(),
            book_trigger_min_interval_secs: default_book_trigger_min_interval_secs(),
            pending_ttl_secs: default_pending_ttl_secs(),
            exchange_timeout_secs: default_exchange_timeout_secs(),
        }
    }
}

impl EngineTuning {
    fn validate(&self) -> Result<()> {
        if self.hard_share_cap <= 0.0 {
            return Err(ConfigError::Validation(
                "tuning.hard_share_cap must be greater than 0".to_string(),
            ));
        }
        if self.buy_replace_price_tol <= 0.0 || self.sell_replace_price_tol <= 0.0 {
            return Err(ConfigError::Validation(
                "tuning replacement price tolerances must be greater than 0".to_string(),
            ));
        }
        if self.buy_replace_size_frac <= 0.0 || self.sell_replace_size_frac <= 0.0 {
            return Err(ConfigError::Validation(
                "tuning replacement size fractions must be greater than 0".to_string(),
            ));
        }
        if self.low_price_multiplier < 1.0 {
            return Err(ConfigError::Validation(
                "tuning.low_price_multiplier must be at least 1".to_string(),
            ));
        }
        if self.low_price_cutoff <= 0.0 || self.low_price_cutoff >= 1.0 {
            return Err(ConfigError::Validation(
                "tuning.low_price_cutoff must be between 0 and 1".to_string(),
            ));
        }
        if self.merge_min_shares <= 0.0 {
            return Err(ConfigError::Validation(
                "tuning.merge_min_shares must be greater than 0".to_string(),
            ));
        }
        if self.exchange_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "tuning.exchange_timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            markets_file: default_markets_file(),
            risk_state_dir: default_risk_state_dir(),
            trade_log_file: default_trade_log_file(),
            snapshot_file: default_snapshot_file(),
            streams: StreamsConfig::default(),
            cadence: CadenceConfig::default(),
            tuning: EngineTuning::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let body = std::fs::read_to_string(path)?;
        let config: AppConfig = serde_yaml::from_str(&body)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::Validation(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }
        if self.cadence.pull_secs == 0 || self.cadence.registry_secs == 0 {
            return Err(ConfigError::Validation(
                "cadence intervals must be greater than 0".to_string(),
            ));
        }
        self.tuning.validate()
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration:");
        info!("  Log level: {}", self.log_level);
        info!("  Markets file: {}", self.markets_file.display());
        info!("  Risk state dir: {}", self.risk_state_dir.display());
        info!(
            "  Cadences: pull {}s, registry {}s, snapshot {}s",
            self.cadence.pull_secs, self.cadence.registry_secs, self.cadence.snapshot_secs
        );
        info!(
            "  Tuning: hard cap {} shares, buy tol {}/{}, sell tol {}/{}",
            self.tuning.hard_share_cap,
            self.tuning.buy_replace_price_tol,
            self.tuning.buy_replace_size_frac,
            self.tuning.sell_replace_price_tol,
            self.tuning.sell_replace_size_frac
        );
    }
}

/// Private-stream credentials, environment-only.
#[derive(Debug, Clone)]
pub struct ApiCredentials {
    pub api_key: String,
    pub secret: String,
    pub passphrase: String,
}

impl ApiCredentials {
    /// Required env vars: `MM_API_KEY`, `MM_API_SECRET`, `MM_API_PASSPHRASE`.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let var = |name: &str| {
            std::env::var(name).map_err(|_| ConfigError::EnvVarMissing(name.to_string()))
        };
        Ok(Self {
            api_key: var("MM_API_KEY")?,
            secret: var("MM_API_SECRET")?,
            passphrase: var("MM_API_PASSPHRASE")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_reference_values() {
        let tuning = EngineTuning::default();
        assert_eq!(tuning.hard_share_cap, 250.0);
        assert_eq!(tuning.buy_replace_price_tol, 0.015);
        assert_eq!(tuning.sell_replace_price_tol, 0.05);
        assert_eq!(tuning.merge_min_shares, 20.0);
        assert_eq!(tuning.book_trigger_min_interval_secs, 30);
    }

    #[test]
    fn empty_yaml_yields_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        config.validate().unwrap();
        assert_eq!(config.cadence.pull_secs, 10);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn bad_multiplier_fails_validation() {
        let config: AppConfig =
            serde_yaml::from_str("tuning:\n  low_price_multiplier: 0.9\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn bad_log_level_fails_validation() {
        let config: AppConfig = serde_yaml::from_str("log_level: noisy\n").unwrap();
        assert!(config.validate().is_err());
    }
}
