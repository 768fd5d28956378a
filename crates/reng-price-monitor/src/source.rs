use async_trait::async_trait;
use rust_decimal::Decimal;

/// An external market-data collaborator. Modeled as a trait object the same
/// way the teacher's `broker-trait` crate abstracts a concrete broker
/// connector, so the core never depends on a specific exchange client.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn get_price(&self, symbol: &str) -> anyhow::Result<Decimal>;
}

/// An in-memory test double backing unit tests; no real exchange connector
/// ships with this engine (out of scope per spec §4.2.1).
#[derive(Default)]
pub struct StaticPriceFeed {
    prices: dashmap::DashMap<String, Decimal>,
    fail_symbols: dashmap::DashSet<String>,
}

impl StaticPriceFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, symbol: impl Into<String>, price: Decimal) {
        self.prices.insert(symbol.into(), price);
    }

    pub fn fail(&self, symbol: impl Into<String>) {
        self.fail_symbols.insert(symbol.into());
    }

    pub fn unfail(&self, symbol: &str) {
        self.fail_symbols.remove(symbol);
    }
}

#[async_trait]
impl MarketDataSource for StaticPriceFeed {
    async fn get_price(&self, symbol: &str) -> anyhow::Result<Decimal> {
        if self.fail_symbols.contains(symbol) {
            anyhow::bail!("no quote available for {symbol}");
        }
        self.prices
            .get(symbol)
            .map(|p| *p)
            .ok_or_else(|| anyhow::anyhow!("unknown symbol {symbol}"))
    }
}
