use std::sync::atomic::{AtomicU32, Ordering};

use chrono::Utc;

static SEQUENCE: AtomicU32 = AtomicU32::new(0);

/// A monotonic, timestamp-prefixed opaque identifier.
///
/// IDs never collide within a process: the millisecond timestamp gives
/// rough ordering and a process-wide sequence counter breaks ties between
/// IDs minted in the same millisecond.
pub fn new_id(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let seq = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}_{millis}_{seq:06}")
}

/// Synthetic id used for GATED monitoring snapshots, which never correspond
/// to an admitted recommendation.
pub fn new_gated_id() -> String {
    format!("GATED|{}", new_id("gate"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_even_in_same_millisecond() {
        let ids: Vec<String> = (0..50).map(|_| new_id("rec")).collect();
        let unique: std::collections::HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn gated_id_has_prefix() {
        assert!(new_gated_id().starts_with("GATED|"));
    }
}
