//! Observability for the live call service.
//!
//! All instrumentation uses `#[instrument(skip_all)]` with explicit field
//! allow-listing. Room ids and user ids are logged; tokens, secrets and
//! cache URLs never are.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `live_calls_created_total` | Counter | `call_type` |
//! | `live_calls_ended_total` | Counter | `reason` |
//! | `live_joins_total` | Counter | `call_type` |
//! | `live_cache_latency_seconds` | Histogram | `operation` |
//! | `live_signaling_latency_seconds` | Histogram | `operation` |
//! | `live_push_failures_total` | Counter | none |
//! | `live_ring_timers_active` | Gauge | none |
//! | `live_stale_pointers_repaired_total` | Counter | `kind` |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::init_metrics_recorder;
