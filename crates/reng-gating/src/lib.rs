//! Gating engine (spec §4.4): a total function over (candidate,
//! world-state) evaluating six rules in fixed order, stopping at the
//! first rejection.

mod counters;
mod engine;
mod rules;

pub use counters::GatingCounters;
pub use engine::GatingEngine;
pub use rules::RULES;
