//! Caches the latest price per symbol, refreshing from an external
//! market-data collaborator with single-flight coalescing (spec §4.2).

mod monitor;
mod source;

pub use monitor::{PriceMonitor, PriceReading};
pub use source::{MarketDataSource, StaticPriceFeed};
