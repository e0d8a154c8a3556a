//! Engine metrics for decisions, mutations, and closure caching.
//!
//! Metrics go through the `metrics` facade. Without an installed recorder
//! every call is a no-op, so the engine records unconditionally and the host
//! decides whether to export.
//!
//! # Example
//!
//! ```rust
//! use warden_core::telemetry::metrics::{DecisionMetrics, MutationMetrics};
//!
//! DecisionMetrics::record(true, 0.000_012);
//! MutationMetrics::record("add_grouping", "applied");
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use std::time::Instant;

/// Register all metric descriptions with the installed recorder.
pub fn register_metric_descriptions() {
    describe_counter!(
        "warden_decisions_total",
        "Total enforcement decisions by outcome"
    );
    describe_histogram!(
        "warden_decision_duration_seconds",
        "Enforcement decision latency in seconds"
    );
    describe_counter!(
        "warden_mutations_total",
        "Policy mutations by kind and outcome"
    );
    describe_counter!(
        "warden_closure_cache_total",
        "Ancestor closure cache lookups by result"
    );
    describe_counter!("warden_errors_total", "Total engine errors by code");
}

/// Decision counters and latency.
pub struct DecisionMetrics;

impl DecisionMetrics {
    pub fn record(allowed: bool, duration_seconds: f64) {
        let decision = if allowed { "allow" } else { "deny" };
        counter!("warden_decisions_total", "decision" => decision).increment(1);
        histogram!("warden_decision_duration_seconds").record(duration_seconds);
    }

    /// Start timing a decision.
    pub fn start() -> DecisionTimer {
        DecisionTimer {
            start: Instant::now(),
        }
    }
}

/// Timer for a single decision.
pub struct DecisionTimer {
    start: Instant,
}

impl DecisionTimer {
    /// Finish timing and record the outcome. Returns the elapsed seconds.
    pub fn finish(self, allowed: bool) -> f64 {
        let elapsed = self.start.elapsed().as_secs_f64();
        DecisionMetrics::record(allowed, elapsed);
        elapsed
    }
}

/// Mutation outcomes: `applied`, `noop`, `rejected`, `rolled_back`.
pub struct MutationMetrics;

impl MutationMetrics {
    pub fn record(kind: &'static str, outcome: &'static str) {
        counter!("warden_mutations_total", "kind" => kind, "outcome" => outcome).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        register_metric_descriptions();
        DecisionMetrics::record(false, 0.001);
        MutationMetrics::record("remove_permission", "noop");

        let elapsed = DecisionMetrics::start().finish(true);
        assert!(elapsed >= 0.0);
    }
}
