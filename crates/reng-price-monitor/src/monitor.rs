use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use reng_types::EngineError;
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::source::MarketDataSource;

#[derive(Debug, Clone)]
struct CacheEntry {
    price: Decimal,
    fetched_at: DateTime<Utc>,
}

/// A price reading returned to callers, flagged stale when served past the
/// fresh TTL but still within the wider stale-but-usable window.
#[derive(Debug, Clone)]
pub struct PriceReading {
    pub price: Decimal,
    pub fetched_at: DateTime<Utc>,
    pub stale: bool,
}

/// Maintains `symbol -> (price, fetched_at)` (spec §4.2). Reads are
/// lock-free via `DashMap`; refreshes are single-flight per symbol via a
/// per-symbol `tokio::sync::Mutex` so at most one fetch per symbol is ever
/// in flight.
pub struct PriceMonitor {
    source: Arc<dyn MarketDataSource>,
    cache: DashMap<String, CacheEntry>,
    inflight: DashMap<String, Arc<Mutex<()>>>,
    fresh_ttl: Duration,
    stale_window: Duration,
}

impl PriceMonitor {
    pub fn new(source: Arc<dyn MarketDataSource>, fresh_ttl: Duration, stale_window: Duration) -> Self {
        Self {
            source,
            cache: DashMap::new(),
            inflight: DashMap::new(),
            fresh_ttl,
            stale_window,
        }
    }

    fn symbol_lock(&self, symbol: &str) -> Arc<Mutex<()>> {
        self.inflight
            .entry(symbol.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Read the cached price, refreshing from the collaborator if stale
    /// beyond `fresh_ttl`. Falls back to a stale-but-usable reading within
    /// `stale_window` if the refresh fails; fails with
    /// `UPSTREAM_UNAVAILABLE` only once no usable cached value remains.
    pub async fn get_latest(&self, symbol: &str) -> Result<PriceReading, EngineError> {
        if let Some(entry) = self.cache.get(symbol) {
            let age = Utc::now() - entry.fetched_at;
            if age < chrono::Duration::from_std(self.fresh_ttl).unwrap_or_default() {
                return Ok(PriceReading {
                    price: entry.price,
                    fetched_at: entry.fetched_at,
                    stale: false,
                });
            }
        }

        let lock = self.symbol_lock(symbol);
        let _guard = lock.lock().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(entry) = self.cache.get(symbol) {
            let age = Utc::now() - entry.fetched_at;
            if age < chrono::Duration::from_std(self.fresh_ttl).unwrap_or_default() {
                return Ok(PriceReading {
                    price: entry.price,
                    fetched_at: entry.fetched_at,
                    stale: false,
                });
            }
        }

        match self.source.get_price(symbol).await {
            Ok(price) => {
                let fetched_at = Utc::now();
                self.cache.insert(symbol.to_string(), CacheEntry { price, fetched_at });
                Ok(PriceReading { price, fetched_at, stale: false })
            }
            Err(err) => {
                if let Some(entry) = self.cache.get(symbol) {
                    let age = Utc::now() - entry.fetched_at;
                    if age < chrono::Duration::from_std(self.stale_window).unwrap_or_default() {
                        tracing::warn!(symbol, %err, "serving stale price after failed refresh");
                        return Ok(PriceReading {
                            price: entry.price,
                            fetched_at: entry.fetched_at,
                            stale: true,
                        });
                    }
                }
                Err(EngineError::UpstreamUnavailable(format!("{symbol}: {err}")))
            }
        }
    }

    /// Force a refresh regardless of TTL.
    pub async fn prime(&self, symbol: &str) -> Result<PriceReading, EngineError> {
        let lock = self.symbol_lock(symbol);
        let _guard = lock.lock().await;
        let price = self
            .source
            .get_price(symbol)
            .await
            .map_err(|e| EngineError::UpstreamUnavailable(format!("{symbol}: {e}")))?;
        let fetched_at = Utc::now();
        self.cache.insert(symbol.to_string(), CacheEntry { price, fetched_at });
        Ok(PriceReading { price, fetched_at, stale: false })
    }

    pub fn clear(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StaticPriceFeed;
    use rust_decimal_macros::dec;

    fn monitor(feed: Arc<StaticPriceFeed>) -> PriceMonitor {
        PriceMonitor::new(feed, Duration::from_secs(10), Duration::from_secs(60))
    }

    #[tokio::test]
    async fn fresh_fetch_populates_cache() {
        let feed = Arc::new(StaticPriceFeed::new());
        feed.set("ETH-PERP", dec!(2000));
        let monitor = monitor(feed);

        let reading = monitor.get_latest("ETH-PERP").await.unwrap();
        assert_eq!(reading.price, dec!(2000));
        assert!(!reading.stale);
    }

    #[tokio::test]
    async fn serves_stale_within_window_when_upstream_fails() {
        let feed = Arc::new(StaticPriceFeed::new());
        feed.set("ETH-PERP", dec!(2000));
        let monitor = PriceMonitor::new(
            feed.clone(),
            Duration::from_millis(0),
            Duration::from_secs(60),
        );

        monitor.get_latest("ETH-PERP").await.unwrap();
        feed.fail("ETH-PERP");

        let reading = monitor.get_latest("ETH-PERP").await.unwrap();
        assert!(reading.stale);
        assert_eq!(reading.price, dec!(2000));
    }

    #[tokio::test]
    async fn fails_when_no_cache_and_upstream_down() {
        let feed = Arc::new(StaticPriceFeed::new());
        feed.fail("ETH-PERP");
        let monitor = monitor(feed);

        let err = monitor.get_latest("ETH-PERP").await.unwrap_err();
        assert!(matches!(err, EngineError::UpstreamUnavailable(_)));
    }
}
