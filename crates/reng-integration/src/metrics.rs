use std::collections::VecDeque;
use std::time::Instant;

/// Structured telemetry for the admission loop, modeled directly on
/// `trading-agent::metrics::AgentMetrics` (spec §4.7.1): cycle counts,
/// per-stage durations, skipped-overrun counts, and a rolling window.
///
/// The teacher's rolling window tracks trade win/loss because execution and
/// outcome happen in the same loop. Here admission and closure are two
/// separate loops (Integration admits, Tracker closes) — the admission loop
/// never observes a trade's eventual outcome — so the window tracks the
/// admit/reject ratio over the last 20 candidates instead, the nearest
/// within-scope analogue (see DESIGN.md).
pub struct IntegrationMetrics {
    pub cycles_run: u64,
    pub candidates_scanned: u64,
    pub candidates_null: u64,
    pub admitted: u64,
    pub rejected: u64,
    pub overruns_skipped: u64,

    pub last_scan_duration_ms: u64,
    pub last_gate_duration_ms: u64,
    pub last_persist_duration_ms: u64,
    pub last_total_duration_ms: u64,

    recent_admissions: VecDeque<bool>,
    log_interval_cycles: u64,
}

impl IntegrationMetrics {
    pub fn new(log_interval_cycles: u64) -> Self {
        Self {
            cycles_run: 0,
            candidates_scanned: 0,
            candidates_null: 0,
            admitted: 0,
            rejected: 0,
            overruns_skipped: 0,
            last_scan_duration_ms: 0,
            last_gate_duration_ms: 0,
            last_persist_duration_ms: 0,
            last_total_duration_ms: 0,
            recent_admissions: VecDeque::with_capacity(20),
            log_interval_cycles,
        }
    }

    pub fn start_timer() -> Instant {
        Instant::now()
    }

    pub fn record_scan_duration(&mut self, start: Instant) {
        self.last_scan_duration_ms = start.elapsed().as_millis() as u64;
    }

    pub fn record_gate_duration(&mut self, start: Instant) {
        self.last_gate_duration_ms = start.elapsed().as_millis() as u64;
    }

    pub fn record_persist_duration(&mut self, start: Instant) {
        self.last_persist_duration_ms = start.elapsed().as_millis() as u64;
    }

    pub fn record_overrun_skipped(&mut self) {
        self.overruns_skipped += 1;
    }

    pub fn record_candidate(&mut self) {
        self.candidates_scanned += 1;
    }

    pub fn record_null_candidate(&mut self) {
        self.candidates_null += 1;
    }

    pub fn record_admission(&mut self, admitted: bool) {
        if admitted {
            self.admitted += 1;
        } else {
            self.rejected += 1;
        }
        self.recent_admissions.push_back(admitted);
        if self.recent_admissions.len() > 20 {
            self.recent_admissions.pop_front();
        }
    }

    /// Rolling admit rate over the last 20 candidates (0-100%).
    pub fn recent_admission_rate(&self) -> f64 {
        if self.recent_admissions.is_empty() {
            return 0.0;
        }
        let admits = self.recent_admissions.iter().filter(|&&a| a).count() as f64;
        (admits / self.recent_admissions.len() as f64) * 100.0
    }

    pub fn overall_admission_rate(&self) -> f64 {
        let total = self.admitted + self.rejected;
        if total == 0 {
            return 0.0;
        }
        (self.admitted as f64 / total as f64) * 100.0
    }

    pub fn finish_cycle(&mut self, cycle_start: Instant) {
        self.last_total_duration_ms = cycle_start.elapsed().as_millis() as u64;
        self.cycles_run += 1;

        if self.log_interval_cycles > 0 && self.cycles_run.is_multiple_of(self.log_interval_cycles) {
            self.log_metrics();
        }
    }

    pub fn log_metrics(&self) {
        tracing::info!(
            cycles = self.cycles_run,
            candidates_scanned = self.candidates_scanned,
            candidates_null = self.candidates_null,
            admitted = self.admitted,
            rejected = self.rejected,
            overruns_skipped = self.overruns_skipped,
            overall_admission_rate = format!("{:.1}%", self.overall_admission_rate()),
            recent_admission_rate = format!("{:.1}%", self.recent_admission_rate()),
            last_cycle_ms = self.last_total_duration_ms,
            last_scan_ms = self.last_scan_duration_ms,
            last_gate_ms = self.last_gate_duration_ms,
            last_persist_ms = self.last_persist_duration_ms,
            "Integration cycle metrics"
        );
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "cycles_run": self.cycles_run,
            "candidates_scanned": self.candidates_scanned,
            "candidates_null": self.candidates_null,
            "admitted": self.admitted,
            "rejected": self.rejected,
            "overruns_skipped": self.overruns_skipped,
        })
    }

    /// Full snapshot for the monitoring API (spec §4.8), unlike [`to_json`]
    /// which only persists the restart-durable counters.
    pub fn snapshot_json(&self) -> serde_json::Value {
        serde_json::json!({
            "cycles_run": self.cycles_run,
            "candidates_scanned": self.candidates_scanned,
            "candidates_null": self.candidates_null,
            "admitted": self.admitted,
            "rejected": self.rejected,
            "overruns_skipped": self.overruns_skipped,
            "overall_admission_rate": self.overall_admission_rate(),
            "recent_admission_rate": self.recent_admission_rate(),
            "last_scan_duration_ms": self.last_scan_duration_ms,
            "last_gate_duration_ms": self.last_gate_duration_ms,
            "last_persist_duration_ms": self.last_persist_duration_ms,
            "last_total_duration_ms": self.last_total_duration_ms,
        })
    }

    pub fn restore_from_json(&mut self, json: &serde_json::Value) {
        if let Some(v) = json.get("cycles_run").and_then(|v| v.as_u64()) {
            self.cycles_run = v;
        }
        if let Some(v) = json.get("candidates_scanned").and_then(|v| v.as_u64()) {
            self.candidates_scanned = v;
        }
        if let Some(v) = json.get("candidates_null").and_then(|v| v.as_u64()) {
            self.candidates_null = v;
        }
        if let Some(v) = json.get("admitted").and_then(|v| v.as_u64()) {
            self.admitted = v;
        }
        if let Some(v) = json.get("rejected").and_then(|v| v.as_u64()) {
            self.rejected = v;
        }
        if let Some(v) = json.get("overruns_skipped").and_then(|v| v.as_u64()) {
            self.overruns_skipped = v;
        }
        tracing::info!(cycles = self.cycles_run, "Restored integration metrics from persisted state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_admission_rate_tracks_last_twenty() {
        let mut metrics = IntegrationMetrics::new(0);
        for _ in 0..15 {
            metrics.record_admission(true);
        }
        for _ in 0..5 {
            metrics.record_admission(false);
        }
        assert!((metrics.recent_admission_rate() - 75.0).abs() < 1e-9);
        assert!((metrics.overall_admission_rate() - 75.0).abs() < 1e-9);
    }

    #[test]
    fn json_round_trips() {
        let mut metrics = IntegrationMetrics::new(0);
        metrics.record_admission(true);
        metrics.record_overrun_skipped();
        let json = metrics.to_json();

        let mut restored = IntegrationMetrics::new(0);
        restored.restore_from_json(&json);
        assert_eq!(restored.admitted, 1);
        assert_eq!(restored.overruns_skipped, 1);
    }
}
