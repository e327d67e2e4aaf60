//! Market definitions and per-market trading parameters.
//!
//! These records come from the market universe collaborator and are
//! read-only inside the core. Parsing happens once at load; anything
//! missing or out of range disables the market instead of crashing.

use serde::{Deserialize, Serialize};

/// A binary-outcome market: two complementary tokens against stablecoin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub condition_id: String,
    pub token_a: String,
    pub token_b: String,
    #[serde(default)]
    pub neg_risk: bool,
    /// Minimum price increment (0.001, 0.01, ...).
    pub tick_size: f64,
    /// Minimum order notional in stablecoin.
    pub min_size: f64,
    /// Refuse to buy when best_ask - best_bid exceeds this.
    pub max_spread: f64,
    /// Named risk bundle; the global default applies when absent.
    #[serde(default)]
    pub strategy_profile: Option<StrategyProfile>,
}

impl Market {
    /// The complementary token, if `token` belongs to this market.
    pub fn reverse(&self, token: &str) -> Option<&str> {
        if token == self.token_a {
            Some(&self.token_b)
        } else if token == self.token_b {
            Some(&self.token_a)
        } else {
            None
        }
    }

    pub fn tokens(&self) -> [&str; 2] {
        [&self.token_a, &self.token_b]
    }

    /// Structural sanity used at registry load time.
    pub fn is_well_formed(&self) -> bool {
        !self.condition_id.is_empty()
            && !self.token_a.is_empty()
            && !self.token_b.is_empty()
            && self.token_a != self.token_b
            && self.tick_size > 0.0
            && self.tick_size < 1.0
            && self.min_size > 0.0
            && self.max_spread > 0.0
    }
}

/// Named bundle of risk thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyProfile {
    Conservative,
    Default,
    Aggressive,
}

impl Default for StrategyProfile {
    fn default() -> Self {
        StrategyProfile::Default
    }
}

/// Risk thresholds keyed by [`StrategyProfile`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StrategyParameters {
    /// Percent PnL below which stop-loss trips (negative, e.g. -15.0).
    pub stop_loss_threshold: f64,
    /// Percent above average entry at which the take-profit ask rests.
    pub take_profit_threshold: f64,
    /// Refuse to buy (and trip risk-off) above this volatility reading.
    pub volatility_threshold: f64,
    /// Stop-loss only fires while the spread is at most this wide.
    pub spread_threshold: f64,
    /// Risk-off pause length.
    pub sleep_period_hours: f64,
}

impl StrategyParameters {
    pub fn is_well_formed(&self) -> bool {
        self.stop_loss_threshold < 0.0
            && self.take_profit_threshold > 0.0
            && self.volatility_threshold > 0.0
            && self.spread_threshold > 0.0
            && self.sleep_period_hours > 0.0
    }
}

/// Per-market notional limits, in stablecoin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TradeConfig {
    /// Notional of each incremental buy.
    pub trade_size: f64,
    /// Cap on accumulated position notional.
    pub max_size: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl TradeConfig {
    pub fn is_well_formed(&self) -> bool {
        self.trade_size > 0.0 && self.max_size >= self.trade_size
    }
}
