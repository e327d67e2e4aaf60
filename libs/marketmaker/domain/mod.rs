//! Domain entities: order books, positions, markets.

pub mod market;
pub mod orderbook;
pub mod position;

pub use market::{Market, StrategyParameters, StrategyProfile, TradeConfig};
pub use orderbook::{Book, BookSide, PriceLevel, TopOfBook};
pub use position::{OpenOrder, Position, Side};
