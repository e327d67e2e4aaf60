//! Risk-off evaluation for a token with an open position.

use crate::domain::market::StrategyParameters;
use crate::domain::orderbook::TopOfBook;
use crate::domain::position::Position;
use crate::infrastructure::risk_registry::RiskOffReason;

#[derive(Debug, Clone, Copy)]
pub struct RiskInputs {
    pub position: Position,
    pub top: TopOfBook,
    pub volatility: f64,
}

/// Decide whether to trip risk-off.
///
/// Stop-loss: mark-to-mid PnL below the (negative) threshold, but only
/// while the spread is tight enough for the mid to mean something.
/// Volatility: reading above the profile threshold.
pub fn evaluate_risk(inputs: &RiskInputs, params: &StrategyParameters) -> Option<RiskOffReason> {
    let avg_price = inputs.position.avg_price()?;

    if let (Some(mid), Some(spread)) = (inputs.top.mid(), inputs.top.spread()) {
        let pnl_pct = (mid - avg_price) / avg_price * 100.0;
        if pnl_pct < params.stop_loss_threshold && spread <= params.spread_threshold {
            return Some(RiskOffReason::StopLoss);
        }
    }

    if inputs.volatility > params.volatility_threshold {
        return Some(RiskOffReason::Volatility);
    }

    None
}
