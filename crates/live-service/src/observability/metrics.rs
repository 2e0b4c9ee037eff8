//! Metrics definitions for the live call service.
//!
//! All metrics follow Prometheus naming conventions:
//! - `live_` prefix
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Cardinality
//!
//! Labels are bounded:
//! - `call_type`: 2 values (user_call, group_call)
//! - `reason`: 3 values (rejected, hangup, missed)
//! - `operation`: bounded by store/adapter methods (~15 values)
//! - `kind`: 2 values (user, group)

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Initialize Prometheus metrics recorder and return the handle
/// for serving metrics via HTTP.
///
/// Must be called before any metrics are recorded.
///
/// # Errors
///
/// Returns error if Prometheus recorder fails to install (e.g., already installed).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        // Cache latency buckets - p99 target 10ms
        .set_buckets_for_metric(
            Matcher::Prefix("live_cache".to_string()),
            &[
                0.001, 0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000,
            ],
        )
        .map_err(|e| format!("Failed to set cache latency buckets: {e}"))?
        // Signaling API calls cross the network to the media cluster
        .set_buckets_for_metric(
            Matcher::Prefix("live_signaling".to_string()),
            &[
                0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000,
            ],
        )
        .map_err(|e| format!("Failed to set signaling latency buckets: {e}"))?
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

// ============================================================================
// Call Lifecycle Metrics (Counters)
// ============================================================================

/// Record a created call.
///
/// Metric: `live_calls_created_total`
/// Labels: `call_type`
pub fn record_call_created(call_type: &str) {
    counter!("live_calls_created_total", "call_type" => call_type.to_string()).increment(1);
}

/// Record a call torn down.
///
/// Metric: `live_calls_ended_total`
/// Labels: `reason` (rejected, hangup, missed)
pub fn record_call_ended(reason: &str) {
    counter!("live_calls_ended_total", "reason" => reason.to_string()).increment(1);
}

/// Record a successful join.
///
/// Metric: `live_joins_total`
/// Labels: `call_type`
pub fn record_join(call_type: &str) {
    counter!("live_joins_total", "call_type" => call_type.to_string()).increment(1);
}

// ============================================================================
// Latency Metrics (Histograms)
// ============================================================================

/// Record cache operation latency.
///
/// Metric: `live_cache_latency_seconds`
/// Labels: `operation`
pub fn record_cache_latency(operation: &str, duration: Duration) {
    histogram!("live_cache_latency_seconds", "operation" => operation.to_string())
        .record(duration.as_secs_f64());
}

/// Record signaling API call latency.
///
/// Metric: `live_signaling_latency_seconds`
/// Labels: `operation`
pub fn record_signaling_latency(operation: &str, duration: Duration) {
    histogram!("live_signaling_latency_seconds", "operation" => operation.to_string())
        .record(duration.as_secs_f64());
}

// ============================================================================
// Operational Metrics
// ============================================================================

/// Record a failed push delivery.
///
/// Metric: `live_push_failures_total`
///
/// Push is fire-and-forget; this counter is the only trace a failed
/// delivery leaves besides the warning log.
pub fn record_push_failure() {
    counter!("live_push_failures_total").increment(1);
}

/// Set the number of armed ring timers.
///
/// Metric: `live_ring_timers_active`
pub fn set_ring_timers_active(count: usize) {
    // usize to f64 conversion is safe for realistic timer counts
    #[allow(clippy::cast_precision_loss)]
    gauge!("live_ring_timers_active").set(count as f64);
}

/// Record a stale presence pointer removed on read.
///
/// Metric: `live_stale_pointers_repaired_total`
/// Labels: `kind` (user, group)
pub fn record_stale_pointer_repaired(kind: &str) {
    counter!("live_stale_pointers_repaired_total", "kind" => kind.to_string()).increment(1);
}
