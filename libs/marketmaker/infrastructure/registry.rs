//! Live market registry.
//!
//! Markets, per-market trade configs, and strategy-profile parameters
//! arrive from the external universe loader through [`MarketSource`].
//! The core holds a read-only resolved view and refreshes it on the slow
//! cadence; a refresh reports the subscription-set diff and which
//! markets materially changed.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::domain::market::{Market, StrategyParameters, StrategyProfile, TradeConfig};

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid universe: {0}")]
    Validation(String),
}

/// Raw universe as produced by the loader collaborator.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketUniverse {
    #[serde(default)]
    pub default_profile: StrategyProfile,
    pub profiles: HashMap<StrategyProfile, StrategyParameters>,
    pub markets: Vec<MarketRow>,
}

/// One market row: definition plus its trade config.
#[derive(Debug, Clone, Deserialize)]
pub struct MarketRow {
    #[serde(flatten)]
    pub market: Market,
    pub trade: TradeConfig,
}

/// Fully resolved view of one market.
#[derive(Debug, Clone)]
pub struct MarketEntry {
    pub market: Market,
    pub trade: TradeConfig,
    pub params: StrategyParameters,
}

impl MarketEntry {
    pub fn is_enabled(&self) -> bool {
        self.trade.enabled
    }
}

/// Diff produced by a refresh; drives resubscription and triggers.
#[derive(Debug, Default, Clone)]
pub struct RegistryDiff {
    pub added_tokens: Vec<String>,
    pub removed_tokens: Vec<String>,
    pub changed_markets: Vec<String>,
}

impl RegistryDiff {
    pub fn is_empty(&self) -> bool {
        self.added_tokens.is_empty()
            && self.removed_tokens.is_empty()
            && self.changed_markets.is_empty()
    }
}

#[async_trait]
pub trait MarketSource: Send + Sync {
    async fn load(&self) -> Result<MarketUniverse, RegistryError>;
}

/// YAML-file universe source, the default collaborator wiring.
pub struct FileMarketSource {
    path: PathBuf,
}

impl FileMarketSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MarketSource for FileMarketSource {
    async fn load(&self) -> Result<MarketUniverse, RegistryError> {
        let body = tokio::fs::read_to_string(&self.path).await?;
        let universe: MarketUniverse = serde_yaml::from_str(&body)?;
        Ok(universe)
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, MarketEntry>,
    token_to_condition: HashMap<String, String>,
}

#[derive(Default)]
pub struct MarketRegistry {
    inner: RwLock<Inner>,
}

pub type SharedRegistry = Arc<MarketRegistry>;

impl MarketRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve and install a fresh universe.
    ///
    /// A market with a broken definition or missing profile parameters is
    /// installed disabled (configuration failures never crash the core).
    /// Returns the diff against the previous view.
    pub fn refresh(&self, universe: MarketUniverse) -> RegistryDiff {
        let mut entries = HashMap::new();
        let mut token_to_condition = HashMap::new();

        for row in universe.markets {
            let MarketRow { market, mut trade } = row;

            let profile = market.strategy_profile.unwrap_or(universe.default_profile);
            let params = match universe.profiles.get(&profile) {
                Some(p) if p.is_well_formed() => *p,
                _ => {
                    warn!(
                        "[Registry] {}: profile {:?} missing or malformed, disabling",
                        market.condition_id, profile
                    );
                    trade.enabled = false;
                    universe
                        .profiles
                        .get(&profile)
                        .copied()
                        .unwrap_or(FAILSAFE_PARAMS)
                }
            };

            if !market.is_well_formed() || !trade.is_well_formed() {
                warn!(
                    "[Registry] {}: malformed definition, disabling",
                    market.condition_id
                );
                trade.enabled = false;
            }

            if trade.enabled {
                token_to_condition.insert(market.token_a.clone(), market.condition_id.clone());
                token_to_condition.insert(market.token_b.clone(), market.condition_id.clone());
            }
            entries.insert(
                market.condition_id.clone(),
                MarketEntry {
                    market,
                    trade,
                    params,
                },
            );
        }

        let mut inner = self.inner.write();
        let diff = diff_views(&inner.entries, &entries);
        inner.entries = entries;
        inner.token_to_condition = token_to_condition;
        diff
    }

    pub fn entry(&self, condition_id: &str) -> Option<MarketEntry> {
        self.inner.read().entries.get(condition_id).cloned()
    }

    pub fn condition_for_token(&self, token_id: &str) -> Option<String> {
        self.inner.read().token_to_condition.get(token_id).cloned()
    }

    pub fn entry_for_token(&self, token_id: &str) -> Option<MarketEntry> {
        let inner = self.inner.read();
        let condition = inner.token_to_condition.get(token_id)?;
        inner.entries.get(condition).cloned()
    }

    /// Tokens of all enabled markets: the public-stream subscription set.
    pub fn subscription_tokens(&self) -> Vec<String> {
        let inner = self.inner.read();
        let mut tokens: Vec<String> = inner.token_to_condition.keys().cloned().collect();
        tokens.sort();
        tokens
    }

    pub fn enabled_markets(&self) -> Vec<MarketEntry> {
        self.inner
            .read()
            .entries
            .values()
            .filter(|e| e.is_enabled())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }
}

/// Parameters attached to disabled markets whose profile is missing; the
/// values are never used for quoting because the market stays disabled.
const FAILSAFE_PARAMS: StrategyParameters = StrategyParameters {
    stop_loss_threshold: -100.0,
    take_profit_threshold: 100.0,
    volatility_threshold: 0.0,
    spread_threshold: 0.0,
    sleep_period_hours: 24.0,
};

fn diff_views(
    old: &HashMap<String, MarketEntry>,
    new: &HashMap<String, MarketEntry>,
) -> RegistryDiff {
    let tokens = |entries: &HashMap<String, MarketEntry>| -> HashSet<String> {
        entries
            .values()
            .filter(|e| e.is_enabled())
            .flat_map(|e| e.market.tokens().map(str::to_string))
            .collect()
    };

    let old_tokens = tokens(old);
    let new_tokens = tokens(new);

    let mut changed_markets = Vec::new();
    for (condition_id, entry) in new {
        match old.get(condition_id) {
            None => changed_markets.push(condition_id.clone()),
            Some(previous) => {
                if entry_changed(previous, entry) {
                    changed_markets.push(condition_id.clone());
                }
            }
        }
    }
    for condition_id in old.keys() {
        if !new.contains_key(condition_id) {
            changed_markets.push(condition_id.clone());
        }
    }

    RegistryDiff {
        added_tokens: new_tokens.difference(&old_tokens).cloned().collect(),
        removed_tokens: old_tokens.difference(&new_tokens).cloned().collect(),
        changed_markets,
    }
}

fn entry_changed(a: &MarketEntry, b: &MarketEntry) -> bool {
    a.trade.enabled != b.trade.enabled
        || (a.trade.trade_size - b.trade.trade_size).abs() > f64::EPSILON
        || (a.trade.max_size - b.trade.max_size).abs() > f64::EPSILON
        || (a.market.tick_size - b.market.tick_size).abs() > f64::EPSILON
        || (a.market.max_spread - b.market.max_spread).abs() > f64::EPSILON
        || (a.market.min_size - b.market.min_size).abs() > f64::EPSILON
        || (a.params.take_profit_threshold - b.params.take_profit_threshold).abs() > f64::EPSILON
        || (a.params.stop_loss_threshold - b.params.stop_loss_threshold).abs() > f64::EPSILON
        || (a.params.volatility_threshold - b.params.volatility_threshold).abs() > f64::EPSILON
}
