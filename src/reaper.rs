use std::sync::Arc;

use tracing::info;

use crate::engine::GridEngine;

/// Background task that clears surfaced cell errors once their display
/// TTL has passed, restoring the cell's pending/synced status.
pub async fn run_reaper(engine: Arc<GridEngine>, config: crate::config::SyncConfig) {
    let ttl = config.error_display_ttl;
    let mut interval = tokio::time::interval(ttl / 2);
    loop {
        interval.tick().await;
        let cleared = engine.clear_expired_errors(ttl).await;
        if !cleared.is_empty() {
            metrics::counter!(crate::observability::ERRORS_REAPED_TOTAL)
                .increment(cleared.len() as u64);
            info!("cleared {} expired cell error(s)", cleared.len());
        }
    }
}
