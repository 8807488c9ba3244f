//! Metrics and observability utilities
//!
//! Provides metric descriptions and recording helpers for the influence
//! pipeline. The engine only talks to the `metrics` facade; drivers decide
//! whether a recorder is installed.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all influence engine metrics
pub const METRICS_PREFIX: &str = "sinf";

/// Buckets for stage and worker durations (in seconds)
pub const STAGE_BUCKETS: &[f64] = &[
    0.010,  // 10ms
    0.050,  // 50ms
    0.100,  // 100ms
    0.500,  // 500ms
    1.000,  // 1s
    5.000,  // 5s
    15.00,  // 15s
    60.00,  // 1m
    300.0,  // 5m
    1800.0, // 30m
];

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_edges_scored_total", METRICS_PREFIX),
        Unit::Count,
        "Total distinct edges that received an influence score"
    );

    describe_counter!(
        format!("{}_transitions_total", METRICS_PREFIX),
        Unit::Count,
        "Timeframe transitions visited, by outcome (scored or skipped)"
    );

    describe_counter!(
        format!("{}_nodes_aggregated_total", METRICS_PREFIX),
        Unit::Count,
        "Total node influence summaries produced"
    );

    describe_histogram!(
        format!("{}_worker_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Wall time of a single partition worker"
    );

    describe_histogram!(
        format!("{}_stage_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Wall time of a pipeline stage"
    );

    describe_gauge!(
        format!("{}_workers_active", METRICS_PREFIX),
        Unit::Count,
        "Partition workers currently running"
    );

    tracing::debug!("Metrics registered");
}

/// Helper to time a pipeline stage
pub struct StageTimer {
    start: Instant,
    stage: &'static str,
}

impl StageTimer {
    /// Start timing a stage
    pub fn start(stage: &'static str) -> Self {
        Self {
            start: Instant::now(),
            stage,
        }
    }

    /// Record stage completion, returning the elapsed seconds
    pub fn finish(self) -> f64 {
        let duration = self.start.elapsed().as_secs_f64();

        histogram!(
            format!("{}_stage_duration_seconds", METRICS_PREFIX),
            "stage" => self.stage
        )
        .record(duration);

        duration
    }
}

/// Record a finished partition worker
pub fn record_worker(stage: &'static str, duration_secs: f64) {
    histogram!(
        format!("{}_worker_duration_seconds", METRICS_PREFIX),
        "stage" => stage
    )
    .record(duration_secs);
}

/// Track the number of running workers
pub fn set_active_workers(count: usize) {
    gauge!(format!("{}_workers_active", METRICS_PREFIX)).set(count as f64);
}

/// Record transition outcomes of one edge
pub fn record_transitions(scored: u64, skipped: u64) {
    if scored > 0 {
        counter!(
            format!("{}_transitions_total", METRICS_PREFIX),
            "outcome" => "scored"
        )
        .increment(scored);
    }
    if skipped > 0 {
        counter!(
            format!("{}_transitions_total", METRICS_PREFIX),
            "outcome" => "skipped"
        )
        .increment(skipped);
    }
}

/// Record edges scored by one worker
pub fn record_edges_scored(count: usize) {
    counter!(format!("{}_edges_scored_total", METRICS_PREFIX)).increment(count as u64);
}

/// Record node summaries produced by one worker
pub fn record_nodes_aggregated(count: usize) {
    counter!(format!("{}_nodes_aggregated_total", METRICS_PREFIX)).increment(count as u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in STAGE_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_stage_timer() {
        let timer = StageTimer::start("edges");
        std::thread::sleep(std::time::Duration::from_millis(5));
        let elapsed = timer.finish();
        assert!(elapsed >= 0.005);
    }

    #[test]
    fn test_recording_without_recorder() {
        // No recorder installed: calls are no-ops
        register_metrics();
        record_transitions(3, 1);
        record_edges_scored(10);
        record_nodes_aggregated(4);
        set_active_workers(2);
        record_worker("nodes", 0.01);
    }
}
