// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the tree sync engine.
//!
//! Uses the `metrics` crate facade; the host application installs whatever
//! exporter it wants. Nothing is recorded when no recorder is installed.
//!
//! # Metric Naming Convention
//! - `tree_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: get_node, list_children, add_file, move_node, ...
//! - `status`: success, error, noop
//! - `op`: insert, update, delete (change feed)

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::storage::traits::{ChangeOp, HousekeepingStats};

/// Record a finished engine operation
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "tree_sync_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "tree_sync_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Set number of cells in the registry
pub fn set_registry_nodes(count: usize) {
    gauge!("tree_sync_registry_nodes").set(count as f64);
}

/// Set engine state (numeric, see `EngineState::as_gauge`)
pub fn set_engine_state(state: &str, value: u8) {
    gauge!("tree_sync_engine_state").set(value as f64);
    counter!(
        "tree_sync_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// CHANGE FEED - Poll loop progress
// ═══════════════════════════════════════════════════════════════════════════

/// Record one poll iteration and how many entries it fetched
pub fn record_poll_batch(entries: usize) {
    counter!("tree_sync_poll_iterations_total").increment(1);
    histogram!("tree_sync_poll_batch_size").record(entries as f64);
}

/// Record a change entry applied to the registry
pub fn record_change_applied(op: ChangeOp) {
    let op = match op {
        ChangeOp::Insert => "insert",
        ChangeOp::Update => "update",
        ChangeOp::Delete => "delete",
    };
    counter!("tree_sync_changes_applied_total", "op" => op).increment(1);
}

/// Set the highest change version applied
pub fn set_change_watermark(version: i64) {
    gauge!("tree_sync_change_watermark").set(version as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// HOUSEKEEPING - Orphan reaping and journal pruning
// ═══════════════════════════════════════════════════════════════════════════

/// Record rows reaped by one housekeeping pass
pub fn record_housekeeping(stats: &HousekeepingStats) {
    counter!("tree_sync_housekeeping_runs_total").increment(1);
    counter!("tree_sync_orphaned_nodes_reaped_total").increment(stats.orphaned_nodes);
    counter!("tree_sync_orphaned_payloads_reaped_total").increment(stats.orphaned_payloads);
    counter!("tree_sync_changes_pruned_total").increment(stats.pruned_changes);
}

// ═══════════════════════════════════════════════════════════════════════════
// ERRORS - Categorized error counters for alerting
// ═══════════════════════════════════════════════════════════════════════════

/// Record an error with category for alerting
pub fn record_error(component: &str, operation: &str, error_type: &str) {
    counter!(
        "tree_sync_errors_total",
        "component" => component.to_string(),
        "operation" => operation.to_string(),
        "error_type" => error_type.to_string()
    )
    .increment(1);
}

/// Record a failed store attempt that the retry layer saw
pub fn record_retry(operation: &str) {
    counter!(
        "tree_sync_store_retries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// STARTUP - Timing for cold start monitoring
// ═══════════════════════════════════════════════════════════════════════════

/// Record startup phase duration
pub fn record_startup_phase(phase: &str, duration: Duration) {
    histogram!(
        "tree_sync_startup_seconds",
        "phase" => phase.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record total startup time
pub fn record_startup_total(duration: Duration) {
    histogram!("tree_sync_startup_total_seconds").record(duration.as_secs_f64());
}

/// Records operation latency when dropped.
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}
