//! Quote computation for one token of one market.

use crate::domain::market::{Market, StrategyParameters, TradeConfig};
use crate::domain::orderbook::TopOfBook;
use crate::domain::position::Position;
use crate::infrastructure::config::EngineTuning;

use super::tick::{round_down_to_tick, round_up_to_tick};

/// One desired resting order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub price: f64,
    pub size: f64,
}

impl Quote {
    pub fn notional(&self) -> f64 {
        self.price * self.size
    }
}

/// Desired state for both sides of a token.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DesiredQuotes {
    pub buy: Option<Quote>,
    pub sell: Option<Quote>,
}

/// Everything the engine sees for one token. Plain values only; callers
/// snapshot the stores first and release their locks.
#[derive(Debug, Clone)]
pub struct QuoteInputs<'a> {
    pub top: TopOfBook,
    pub position: Position,
    /// Position in the complementary token (self-hedge guard).
    pub reverse_position: Position,
    pub market: &'a Market,
    pub params: &'a StrategyParameters,
    pub trade: &'a TradeConfig,
    pub tuning: &'a EngineTuning,
    pub volatility: f64,
    pub risk_off: bool,
}

/// Compute desired quotes.
///
/// The bid tracks the (tick-rounded) best bid, nudged by the low-price
/// multiplier below the cutoff. The ask is always the take-profit price
/// derived from the average entry, never the volatile best ask.
pub fn desired_quotes(inputs: &QuoteInputs<'_>) -> DesiredQuotes {
    DesiredQuotes {
        buy: desired_buy(inputs),
        sell: desired_sell(inputs),
    }
}

fn desired_buy(inputs: &QuoteInputs<'_>) -> Option<Quote> {
    let market = inputs.market;
    let trade = inputs.trade;
    let tuning = inputs.tuning;

    if !trade.enabled || inputs.risk_off {
        return None;
    }

    // Inventory gates: notional headroom, absolute share cap, and no
    // buying while the complementary leg carries inventory.
    let position_notional = inputs.position.notional();
    if position_notional >= trade.max_size {
        return None;
    }
    if inputs.position.size >= tuning.hard_share_cap {
        return None;
    }
    if inputs.reverse_position.size > market.min_size {
        return None;
    }

    // Market-state gates.
    let spread = inputs.top.spread()?;
    if spread > market.max_spread {
        return None;
    }
    if inputs.volatility > inputs.params.volatility_threshold {
        return None;
    }

    let best_bid = inputs.top.bid_price()?;
    let mut price = round_down_to_tick(best_bid, market.tick_size);
    if price < tuning.low_price_cutoff {
        price = round_down_to_tick(price * tuning.low_price_multiplier, market.tick_size);
    }
    price = price.clamp(market.tick_size, 1.0 - market.tick_size);

    let headroom = trade.max_size - position_notional;
    let notional = trade.trade_size.min(headroom);
    let size = notional / price;

    let quote = Quote { price, size };
    if quote.notional() < market.min_size {
        return None;
    }
    Some(quote)
}

fn desired_sell(inputs: &QuoteInputs<'_>) -> Option<Quote> {
    let market = inputs.market;
    let avg_price = inputs.position.avg_price()?;

    let take_profit =
        avg_price * (1.0 + inputs.params.take_profit_threshold / 100.0);
    let price = round_up_to_tick(take_profit, market.tick_size)
        .clamp(market.tick_size, 1.0 - market.tick_size);

    let quote = Quote {
        price,
        size: inputs.position.size,
    };
    if quote.notional() < market.min_size {
        return None;
    }
    Some(quote)
}
