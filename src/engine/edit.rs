//! Per-cell edit state machine: idle → editing → updating → idle, with
//! optimistic local application and rollback on remote failure. At most
//! one in-flight edit per cell; the remote apply never runs under the
//! room lock.

use chrono::{NaiveDate, Utc};
use tracing::debug;

use crate::limits::{truncate_utf8, MAX_SYNC_ERROR_LEN};
use crate::model::*;
use crate::notify::GridChange;

use super::{EngineError, GridEngine};

impl GridEngine {
    /// idle → editing. Returns the current confirmed value (the rollback
    /// target) for the host's input control.
    pub async fn begin_edit(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        field: FieldKind,
    ) -> Result<FieldEdit, EngineError> {
        if field.is_restriction() {
            return Err(EngineError::InvalidValue("restrictions commit on toggle"));
        }
        let rs = self.room_state(room_id)?;
        let mut guard = rs.write().await;
        let cell = guard
            .cells
            .get_mut(&date)
            .ok_or(EngineError::CellNotFound { room_id, date })?;
        if cell.bulk_locked {
            return Err(EngineError::BulkInFlight { room_id, date });
        }
        if let Some(active) = &cell.active {
            return Err(match active.phase {
                EditPhase::Updating => EngineError::ApplyInFlight { room_id, date },
                EditPhase::Editing => EngineError::EditConflict {
                    room_id,
                    date,
                    field: active.field,
                },
            });
        }

        let current = cell.state.value_of(field);
        cell.active = Some(ActiveEdit {
            field,
            phase: EditPhase::Editing,
            rollback: current.clone(),
        });
        Ok(current)
    }

    /// editing → idle, discarding the pending value. No remote call.
    pub async fn cancel_edit(&self, room_id: RoomId, date: NaiveDate) -> Result<(), EngineError> {
        let rs = self.room_state(room_id)?;
        let mut guard = rs.write().await;
        let cell = guard
            .cells
            .get_mut(&date)
            .ok_or(EngineError::CellNotFound { room_id, date })?;
        match &cell.active {
            Some(active) if active.phase == EditPhase::Editing => {
                cell.active = None;
                let drained = cell.drain_buffered();
                drop(guard);
                if drained > 0 {
                    self.notify.send(room_id, GridChange::CellChanged { room_id, date });
                }
                Ok(())
            }
            Some(_) => Err(EngineError::ApplyInFlight { room_id, date }),
            None => Err(EngineError::InvalidValue("no edit in progress")),
        }
    }

    /// editing → updating → idle | rollback. The cell takes the value
    /// optimistically before the remote apply resolves.
    pub async fn commit_edit(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        value: FieldEdit,
    ) -> Result<(), EngineError> {
        value.validate().map_err(EngineError::InvalidValue)?;
        let rs = self.room_state(room_id)?;
        let rollback;
        {
            let mut guard = rs.write().await;
            let cell = guard
                .cells
                .get_mut(&date)
                .ok_or(EngineError::CellNotFound { room_id, date })?;
            let active = cell
                .active
                .as_mut()
                .ok_or(EngineError::InvalidValue("no edit in progress"))?;
            if active.phase != EditPhase::Editing {
                return Err(EngineError::ApplyInFlight { room_id, date });
            }
            if active.field != value.kind() {
                return Err(EngineError::InvalidValue("value does not match the edited field"));
            }
            rollback = active.rollback.clone();
            active.phase = EditPhase::Updating;
            cell.state.apply(&value);
        }
        self.notify.send(room_id, GridChange::CellChanged { room_id, date });
        self.dispatch_apply(room_id, date, value, rollback).await
    }

    /// Arrival/departure restrictions flip and commit in one step — no
    /// intermediate editing phase. Returns the new value.
    pub async fn toggle_restriction(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        field: FieldKind,
    ) -> Result<bool, EngineError> {
        if !field.is_restriction() {
            return Err(EngineError::InvalidValue("not a restriction field"));
        }
        let rs = self.room_state(room_id)?;
        let (value, rollback);
        {
            let mut guard = rs.write().await;
            let cell = guard
                .cells
                .get_mut(&date)
                .ok_or(EngineError::CellNotFound { room_id, date })?;
            if cell.bulk_locked {
                return Err(EngineError::BulkInFlight { room_id, date });
            }
            if let Some(active) = &cell.active {
                return Err(match active.phase {
                    EditPhase::Updating => EngineError::ApplyInFlight { room_id, date },
                    EditPhase::Editing => EngineError::EditConflict {
                        room_id,
                        date,
                        field: active.field,
                    },
                });
            }

            let current = cell.state.value_of(field);
            let next = match &current {
                FieldEdit::ClosedToArrival(b) => FieldEdit::ClosedToArrival(!b),
                FieldEdit::ClosedToDeparture(b) => FieldEdit::ClosedToDeparture(!b),
                _ => unreachable!("guarded by is_restriction"),
            };
            cell.active = Some(ActiveEdit {
                field,
                phase: EditPhase::Updating,
                rollback: current.clone(),
            });
            cell.state.apply(&next);
            rollback = current;
            value = next;
        }
        self.notify.send(room_id, GridChange::CellChanged { room_id, date });
        let toggled_to = matches!(
            value,
            FieldEdit::ClosedToArrival(true) | FieldEdit::ClosedToDeparture(true)
        );
        self.dispatch_apply(room_id, date, value, rollback).await?;
        Ok(toggled_to)
    }

    /// Run the remote apply for an `updating` cell and resolve the slot.
    /// The call is never cancelled — its outcome is always awaited and
    /// applied, unless the window generation moved on underneath it.
    async fn dispatch_apply(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        value: FieldEdit,
        rollback: FieldEdit,
    ) -> Result<(), EngineError> {
        let generation = self.generation();
        let start = std::time::Instant::now();
        let result = self.backend.apply_change(room_id, date, value).await;
        metrics::histogram!(crate::observability::EDIT_APPLY_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());

        if generation != self.generation() {
            debug!("discarding apply response for a stale window (room {room_id} {date})");
            return Ok(());
        }
        let Ok(rs) = self.room_state(room_id) else {
            return Ok(());
        };
        let mut guard = rs.write().await;
        let Some(cell) = guard.cells.get_mut(&date) else {
            return Ok(());
        };

        let failure = match result {
            Ok(outcome) if outcome.success => None,
            Ok(outcome) => Some(outcome.message.unwrap_or_else(|| "update rejected".into())),
            Err(e) => Some(e.to_string()),
        };

        match failure {
            None => {
                cell.active = None;
                cell.state.sync_pending = true;
                cell.state.sync_status = SyncStatus::Unsynced;
                cell.state.sync_error = None;
                cell.error_at = None;
                // If the server already pushed a later value for this cell
                // while we were updating, it wins now.
                cell.drain_buffered();
                drop(guard);
                metrics::counter!(crate::observability::EDITS_TOTAL, "status" => "ok").increment(1);
                self.notify.send(room_id, GridChange::CellChanged { room_id, date });
                Ok(())
            }
            Some(mut message) => {
                cell.state.apply(&rollback);
                cell.active = None;
                // Drain first — buffered server values supersede the
                // rollback, but the surfaced error must survive the drain.
                cell.drain_buffered();
                truncate_utf8(&mut message, MAX_SYNC_ERROR_LEN);
                cell.state.sync_status = SyncStatus::Error;
                cell.state.sync_error = Some(message.clone());
                cell.error_at = Some(Utc::now());
                drop(guard);
                metrics::counter!(crate::observability::EDITS_TOTAL, "status" => "error").increment(1);
                metrics::counter!(crate::observability::EDIT_ROLLBACKS_TOTAL).increment(1);
                self.notify.send(room_id, GridChange::CellChanged { room_id, date });
                Err(EngineError::ApplyFailed { message })
            }
        }
    }
}
