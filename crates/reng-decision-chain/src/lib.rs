//! Decision-chain monitor (spec §4.3): an ordered, queryable audit record
//! of every admission attempt, layered over `reng-persistence`'s
//! append-only chain/step store with a metrics and replay read-model.

mod metrics;
mod monitor;
mod replay;

pub use metrics::ChainMetrics;
pub use monitor::DecisionChainMonitor;
pub use replay::{ChainReplay, ReplayStep};
