use std::collections::VecDeque;

use async_trait::async_trait;
use reng_types::gating::Candidate;
use tokio::sync::Mutex;

/// The periodic admission loop's only external collaborator: asked once per
/// tick for a candidate, which may be absent (spec §4.7 step 1). Modeled as
/// a trait object the same way `reng-price-monitor::MarketDataSource`
/// abstracts its own external collaborator, so this crate never names a
/// concrete strategy/signal engine.
#[async_trait]
pub trait SignalSource: Send + Sync {
    async fn next_candidate(&self) -> anyhow::Result<Option<Candidate>>;
}

/// An in-memory test double: candidates are pushed ahead of time and popped
/// in FIFO order, `None` once drained. No real strategy engine ships with
/// this crate (out of scope, the same way `reng-price-monitor` ships no
/// real exchange connector).
#[derive(Default)]
pub struct QueueSignalSource {
    queue: Mutex<VecDeque<Candidate>>,
}

impl QueueSignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, candidate: Candidate) {
        self.queue.lock().await.push_back(candidate);
    }
}

#[async_trait]
impl SignalSource for QueueSignalSource {
    async fn next_candidate(&self) -> anyhow::Result<Option<Candidate>> {
        Ok(self.queue.lock().await.pop_front())
    }
}
