//! Pure decision functions: given snapshots of book, account, and
//! parameters, decide the desired quotes, the per-side order actions,
//! and whether to trip risk-off. No I/O, no locks, no clocks.

pub mod diff;
pub mod quotes;
pub mod risk;
pub mod tick;

pub use diff::{side_action, SideAction, SideThresholds};
pub use quotes::{desired_quotes, DesiredQuotes, Quote, QuoteInputs};
pub use risk::{evaluate_risk, RiskInputs};
pub use tick::{round_down_to_tick, round_up_to_tick};
