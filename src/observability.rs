use std::net::SocketAddr;

use crate::model::PushEvent;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: cell edit commits. Labels: status.
pub const EDITS_TOTAL: &str = "rategrid_edits_total";

/// Histogram: remote apply latency in seconds.
pub const EDIT_APPLY_DURATION_SECONDS: &str = "rategrid_edit_apply_duration_seconds";

/// Counter: failed applies rolled back to the pre-edit value.
pub const EDIT_ROLLBACKS_TOTAL: &str = "rategrid_edit_rollbacks_total";

/// Counter: bulk operations. Labels: phase (validate/execute), status.
pub const BULK_OPS_TOTAL: &str = "rategrid_bulk_ops_total";

/// Counter: cells written by successful bulk operations.
pub const BULK_CELLS_TOTAL: &str = "rategrid_bulk_cells_total";

/// Counter: bulk validations that degraded to a local estimate.
pub const BULK_VALIDATION_FALLBACKS_TOTAL: &str = "rategrid_bulk_validation_fallbacks_total";

/// Counter: push events consumed. Labels: event.
pub const PUSH_EVENTS_TOTAL: &str = "rategrid_push_events_total";

/// Counter: push-event fields buffered behind an in-flight edit.
pub const PUSH_BUFFERED_TOTAL: &str = "rategrid_push_buffered_total";

/// Histogram: window load/reload latency in seconds.
pub const WINDOW_LOAD_DURATION_SECONDS: &str = "rategrid_window_load_duration_seconds";

/// Counter: manual sync triggers sent to the channel manager.
pub const SYNC_TRIGGERS_TOTAL: &str = "rategrid_sync_triggers_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: cells currently awaiting sync confirmation.
pub const CELLS_PENDING: &str = "rategrid_cells_pending";

/// Counter: stream reconnect attempts.
pub const STREAM_RECONNECTS_TOTAL: &str = "rategrid_stream_reconnects_total";

/// Counter: cell errors cleared by the reaper after the display TTL.
pub const ERRORS_REAPED_TOTAL: &str = "rategrid_errors_reaped_total";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("failed to install Prometheus metrics exporter");
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
}

/// Map a push event to a short label for metrics.
pub fn event_label(event: &PushEvent) -> &'static str {
    match event {
        PushEvent::Connected { .. } => "connected",
        PushEvent::AvailabilityUpdated { .. } => "availability_updated",
        PushEvent::SyncCompleted { .. } => "sync_completed",
        PushEvent::BulkUpdateCompleted { .. } => "bulk_update_completed",
        PushEvent::Heartbeat { .. } => "heartbeat",
        PushEvent::Error { .. } => "error",
    }
}
