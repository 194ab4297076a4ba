//! Event reconciler: folds server-pushed mutations into the same cell
//! space local edits target. The load-bearing rule: a pushed value for a
//! field currently mid-edit is buffered, never applied over the user's
//! in-flight change; it lands when the cell returns to idle. Idle cells
//! take pushed values immediately, last write wins by arrival order —
//! the external system is the source of truth once it speaks.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::model::*;
use crate::notify::{GridChange, WindowEvent};
use crate::observability;

use super::GridEngine;

impl GridEngine {
    /// Merge one push event. Events for rooms or dates outside the loaded
    /// window are ignored — the next window load covers them.
    pub async fn apply_push_event(&self, event: PushEvent) {
        metrics::counter!(
            observability::PUSH_EVENTS_TOTAL,
            "event" => observability::event_label(&event)
        )
        .increment(1);

        match event {
            PushEvent::Connected { session_id, .. } => {
                info!("push stream session established: {session_id}");
            }
            PushEvent::Heartbeat { .. } => {
                // Normally consumed by the stream supervisor's timer.
                debug!("heartbeat");
            }
            PushEvent::Error { message, .. } => {
                warn!("push stream reported error: {message}");
            }
            PushEvent::AvailabilityUpdated {
                room_id,
                date,
                changes,
                ..
            } => {
                self.merge_cell(room_id, date, &changes).await;
            }
            PushEvent::BulkUpdateCompleted {
                room_ids,
                range,
                changes,
                ..
            } => {
                for room_id in room_ids {
                    for date in range.iter() {
                        self.merge_cell(room_id, date, &changes).await;
                    }
                    self.notify
                        .send(room_id, GridChange::RangeChanged { room_id, range });
                }
            }
            PushEvent::SyncCompleted { range, at } => {
                self.sweep_sync_completed(range, at).await;
            }
        }
    }

    async fn merge_cell(&self, room_id: RoomId, date: NaiveDate, changes: &[FieldEdit]) {
        let Ok(rs) = self.room_state(room_id) else {
            debug!("push event for room {room_id} outside the grid");
            return;
        };
        let mut guard = rs.write().await;
        let Some(cell) = guard.cells.get_mut(&date) else {
            debug!("push event for {date} outside the window");
            return;
        };

        let mut applied = 0usize;
        let mut buffered = 0usize;
        for change in changes {
            match &cell.active {
                // The user's in-flight edit on this field wins for now;
                // the pushed value lands once the cell is idle again.
                Some(active) if active.field == change.kind() => {
                    cell.buffer(change.clone());
                    buffered += 1;
                }
                _ => {
                    cell.state.apply(change);
                    applied += 1;
                }
            }
        }
        if applied > 0 {
            // The external system confirmed these values — propagation done.
            cell.state.sync_pending = false;
            cell.state.sync_status = SyncStatus::Synced;
            cell.state.sync_error = None;
            cell.error_at = None;
        }
        drop(guard);

        if buffered > 0 {
            metrics::counter!(observability::PUSH_BUFFERED_TOTAL).increment(buffered as u64);
        }
        if applied > 0 {
            self.notify
                .send(room_id, GridChange::CellChanged { room_id, date });
        }
    }

    /// The channel manager finished a sync pass: metadata only, no values
    /// touched, so this applies even to cells mid-edit.
    async fn sweep_sync_completed(&self, range: Option<DateRange>, at: DateTime<Utc>) {
        *self.last_global_sync.write().await = Some(at);

        let window = self.index().await.range();
        let swept = range.unwrap_or(window);

        for entry in self.rooms.iter() {
            let room_id = *entry.key();
            let rs = entry.value().clone();
            let mut guard = rs.write().await;
            let mut touched = false;
            for (date, cell) in guard.cells.iter_mut() {
                if !swept.contains(*date) {
                    continue;
                }
                if cell.state.sync_pending
                    || cell.state.sync_error.is_some()
                    || cell.state.sync_status != SyncStatus::Synced
                {
                    cell.state.sync_pending = false;
                    cell.state.sync_status = SyncStatus::Synced;
                    cell.state.sync_error = None;
                    cell.error_at = None;
                    touched = true;
                }
            }
            drop(guard);
            if touched {
                self.notify
                    .send(room_id, GridChange::RangeChanged { room_id, range: swept });
            }
        }

        info!("sync completed for {} .. {}", swept.from, swept.to);
        self.notify.send_window(WindowEvent::SyncStatusChanged);
    }
}
