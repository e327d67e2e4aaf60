//! Shared state, persistence, configuration, and collaborator interfaces.

pub mod account;
pub mod books;
pub mod config;
pub mod exchange;
pub mod logging;
pub mod pending;
pub mod registry;
pub mod risk_registry;
pub mod sinks;
pub mod volatility;

pub use account::{AccountState, SharedAccount, SideOrders};
pub use books::{BookStore, SharedBooks};
pub use config::{ApiCredentials, AppConfig, ConfigError, EngineTuning};
pub use exchange::{
    DryRunExchange, ExchangeClient, ExchangeError, OpenOrderRecord, OrderAck, OrderRequest,
    PositionRecord, SharedExchange,
};
pub use pending::PendingIntents;
pub use registry::{
    FileMarketSource, MarketEntry, MarketRegistry, MarketSource, MarketUniverse, RegistryDiff,
    RegistryError,
};
pub use risk_registry::{RiskOffReason, RiskOffRecord, RiskOffRegistry};
pub use sinks::{
    FillRecord, JsonlSink, NullSink, PositionSnapshotRecord, RewardSnapshotRecord, SnapshotSink,
    TradeLog,
};
pub use volatility::{VolatilitySource, VolatilityTable};
