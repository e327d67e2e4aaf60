//! Stream handlers for the public market channel and the private user
//! channel.

pub mod events;
pub mod market_ws;
pub mod user_ws;

pub use market_ws::{spawn_market_stream, MarketStreamConsumer};
pub use user_ws::{spawn_user_stream, UserStreamConsumer};
