//! Automated market-making core for a binary-outcome prediction exchange.
//!
//! Layout follows a domain / infrastructure / application split:
//! - `domain`: order book, position, and market parameter types.
//! - `infrastructure`: shared stores, persistence, configuration, the
//!   exchange-client interface, and sinks.
//! - `application`: the pure quote and risk engines, the per-market
//!   reconciler, stream handlers, the periodic scheduler, and wiring.

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::core::TradingCore;
pub use infrastructure::config::AppConfig;
pub use infrastructure::logging::{init_tracing, init_tracing_with_level};
