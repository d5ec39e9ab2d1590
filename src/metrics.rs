// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the revision store.
//!
//! Uses the `metrics` crate for backend-agnostic collection. The hosting
//! process chooses the exporter (Prometheus, OTEL, etc.); without an
//! installed recorder every call here is a no-op.
//!
//! # Metric Naming Convention
//! - `rev_store_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: put, post, remove, get, bulk_docs
//! - `kind`: write, delete
//! - `error`: short error code (conflict, not_found, ...)

use metrics::{counter, gauge, histogram};
use std::time::Instant;

/// Record one committed revision-tree edit.
pub fn record_write_committed(deleted: bool) {
    let kind = if deleted { "delete" } else { "write" };
    counter!(
        "rev_store_writes_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record a write slot rejected before or during tree application.
pub fn record_write_rejected(error: &str) {
    counter!(
        "rev_store_writes_rejected_total",
        "error" => error.to_string()
    )
    .increment(1);
}

/// Record change events fanned out to live subscribers.
pub fn record_changes_delivered(count: usize) {
    if count == 0 {
        return;
    }
    counter!("rev_store_changes_delivered_total").increment(count as u64);
}

/// Record a new change feed subscription.
pub fn record_feed_opened(continuous: bool) {
    let mode = if continuous { "continuous" } else { "backlog" };
    counter!(
        "rev_store_feeds_opened_total",
        "mode" => mode.to_string()
    )
    .increment(1);
}

/// Record an explicit feed cancellation.
pub fn record_feed_cancelled() {
    counter!("rev_store_feeds_cancelled_total").increment(1);
}

/// Gauge: databases currently held by the registry.
pub fn set_open_databases(count: usize) {
    gauge!("rev_store_open_databases").set(count as f64);
}

/// Gauge: live (non-deleted) documents in one database.
pub fn set_doc_count(db: &str, count: u64) {
    gauge!(
        "rev_store_doc_count",
        "db" => db.to_string()
    )
    .set(count as f64);
}

/// A timing guard that records operation latency on drop.
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer.
    pub fn new(operation: &'static str) -> Self {
        Self { operation, start: Instant::now() }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        histogram!(
            "rev_store_operation_seconds",
            "operation" => self.operation.to_string()
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without an installed recorder these are no-ops; the tests only
    // prove the recording paths don't panic.

    #[test]
    fn test_record_writes() {
        record_write_committed(false);
        record_write_committed(true);
        record_write_rejected("conflict");
        record_write_rejected("doc_validation");
    }

    #[test]
    fn test_record_feed_activity() {
        record_changes_delivered(0);
        record_changes_delivered(3);
        record_feed_opened(true);
        record_feed_opened(false);
        record_feed_cancelled();
    }

    #[test]
    fn test_gauges() {
        set_open_databases(2);
        set_doc_count("metrics-db", 41);
    }

    #[test]
    fn test_latency_timer_records_on_drop() {
        let timer = LatencyTimer::new("put");
        drop(timer);
    }
}
