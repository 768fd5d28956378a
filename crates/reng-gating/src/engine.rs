use reng_types::{
    gating::{Candidate, GatingRejection, GatingWorldView},
    EngineConfig,
};

use crate::counters::GatingCounters;
use crate::rules::RULES;

/// Gating is a total function over `(candidate, world-state) -> Admit |
/// Reject` (spec §4.4). Rules run in the fixed order in [`crate::rules`];
/// the first rejection short-circuits evaluation, mirroring the
/// sequential guard-clause style of the teacher's risk checks.
pub struct GatingEngine {
    config: EngineConfig,
    counters: GatingCounters,
}

impl GatingEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            counters: GatingCounters::new(),
        }
    }

    pub fn counters(&self) -> &GatingCounters {
        &self.counters
    }

    /// Evaluate every rule in order; on the first rejection, record it in
    /// the process-wide counters and return it.
    pub fn evaluate(&self, candidate: &Candidate, world: &GatingWorldView) -> Result<(), GatingRejection> {
        for rule in RULES {
            if let Err(rejection) = rule(candidate, world, &self.config) {
                self.counters.record(&candidate.symbol, &rejection);
                return Err(rejection);
            }
        }
        Ok(())
    }
}
