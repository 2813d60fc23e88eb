//! Metrics instrumentation for the sink.
//!
//! Uses the `metrics` crate for backend-agnostic collection. The embedding
//! daemon is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `telemetry_sink_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_bytes` suffix for size metrics

use metrics::{counter, gauge, histogram};

/// Record an event entering the middleware chain.
pub fn record_event_received() {
    counter!("telemetry_sink_events_received_total").increment(1);
}

/// Record an event landing in the staging buffer.
pub fn record_event_buffered() {
    counter!("telemetry_sink_events_buffered_total").increment(1);
}

/// Record an event suppressed as a duplicate.
pub fn record_dedup_dropped() {
    counter!("telemetry_sink_dedup_dropped_total").increment(1);
}

/// Set the number of idempotency keys currently tracked.
pub fn set_dedup_tracked(count: usize) {
    gauge!("telemetry_sink_dedup_tracked_keys").set(count as f64);
}

/// Record an event admitted by the rate limiter, with its byte cost.
pub fn record_rate_limit_admitted(bytes: usize) {
    counter!("telemetry_sink_rate_limit_admitted_total").increment(1);
    counter!("telemetry_sink_rate_limit_bytes_total").increment(bytes as u64);
}

/// Record an event denied by the rate limiter.
pub fn record_rate_limited() {
    counter!("telemetry_sink_rate_limited_total").increment(1);
}

/// Record an evicted event spilled synchronously to the journal.
pub fn record_overflow_spill() {
    counter!("telemetry_sink_overflow_spills_total").increment(1);
}

/// Record a flush attempt.
pub fn record_flush() {
    counter!("telemetry_sink_flushes_total").increment(1);
}

/// Record a failed flush.
pub fn record_flush_error() {
    counter!("telemetry_sink_flush_errors_total").increment(1);
}

/// Record the size of a flushed batch.
pub fn record_flush_batch_size(count: usize) {
    histogram!("telemetry_sink_flush_batch_size").record(count as f64);
}

/// Set the current staging buffer occupancy.
pub fn set_buffer_len(count: usize) {
    gauge!("telemetry_sink_buffer_events").set(count as f64);
}
