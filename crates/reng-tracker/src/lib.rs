//! Recommendation lifecycle tracking: ACTIVE -> CLOSED/EXPIRED state
//! machine, periodic exit evaluation, and startup rehydration (spec §4.5).

mod exits;
mod state;
mod tracker;

pub use exits::evaluate_exit;
pub use state::ActiveSet;
pub use tracker::Tracker;
