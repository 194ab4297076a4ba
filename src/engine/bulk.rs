//! Bulk edit engine: validate-then-execute over a rectangular
//! room × date × field selection. Execution is atomic at the remote
//! boundary — on failure no local cell is mutated, the engine never
//! guesses which subset succeeded server-side.

use tracing::{debug, warn};

use crate::limits::MAX_BULK_ROOMS;
use crate::model::*;
use crate::notify::GridChange;

use super::{EngineError, GridEngine};

impl GridEngine {
    /// Client-side bounds, then remote conflict/warning analysis. An
    /// unreachable validator degrades to a local rooms × days estimate
    /// flagged `estimated` — unless strict validation is configured, in
    /// which case execution stays blocked.
    pub async fn validate_bulk(&self, selection: &BulkSelection) -> Result<BulkValidation, EngineError> {
        self.check_bulk_bounds(selection)?;

        match self.backend.validate_bulk(selection).await {
            Ok(validation) => {
                metrics::counter!(
                    crate::observability::BULK_OPS_TOTAL,
                    "phase" => "validate", "status" => "ok"
                )
                .increment(1);
                Ok(validation)
            }
            Err(e) if self.config.strict_bulk_validation => {
                metrics::counter!(
                    crate::observability::BULK_OPS_TOTAL,
                    "phase" => "validate", "status" => "error"
                )
                .increment(1);
                Err(EngineError::ValidationUnavailable { message: e.to_string() })
            }
            Err(e) => {
                warn!("bulk validator unreachable, degrading to local estimate: {e}");
                metrics::counter!(crate::observability::BULK_VALIDATION_FALLBACKS_TOTAL).increment(1);
                Ok(BulkValidation {
                    is_valid: true,
                    total_cells: selection.room_ids.len() * selection.range.days(),
                    conflicts: Vec::new(),
                    warnings: Vec::new(),
                    estimated: true,
                })
            }
        }
    }

    fn check_bulk_bounds(&self, selection: &BulkSelection) -> Result<(), EngineError> {
        if selection.room_ids.is_empty() {
            return Err(EngineError::InvalidValue("bulk selection has no rooms"));
        }
        if selection.changes.is_empty() {
            return Err(EngineError::InvalidValue("bulk selection has no changes"));
        }
        for change in &selection.changes {
            change.validate().map_err(EngineError::InvalidValue)?;
        }
        if selection.range.days() > self.config.max_bulk_span_days {
            return Err(EngineError::LimitExceeded("bulk date span too wide"));
        }
        if selection.room_ids.len() > MAX_BULK_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms in bulk selection"));
        }
        for &room_id in &selection.room_ids {
            if !self.rooms.contains_key(&room_id) {
                return Err(EngineError::RoomNotFound(room_id));
            }
        }
        Ok(())
    }

    /// Validate, mark every target cell bulk-locked, apply remotely as one
    /// unit, then write the new values locally only on success.
    pub async fn execute_bulk(&self, selection: BulkSelection) -> Result<BulkOutcome, EngineError> {
        let validation = self.validate_bulk(&selection).await?;
        if !validation.is_valid || !validation.conflicts.is_empty() {
            metrics::counter!(
                crate::observability::BULK_OPS_TOTAL,
                "phase" => "execute", "status" => "rejected"
            )
            .increment(1);
            return Err(EngineError::BulkRejected {
                conflicts: validation.conflicts,
            });
        }

        // Room locks in sorted id order, the same discipline everywhere a
        // multi-room operation takes more than one lock.
        let mut room_ids = selection.room_ids.clone();
        room_ids.sort_unstable();
        room_ids.dedup();

        let mut guards = Vec::with_capacity(room_ids.len());
        for &room_id in &room_ids {
            let rs = self.room_state(room_id)?;
            guards.push((room_id, rs.write_owned().await));
        }

        // No target cell may be mid-edit or claimed by another bulk op.
        for (room_id, guard) in &guards {
            for date in selection.range.iter() {
                let Some(cell) = guard.cells.get(&date) else {
                    continue;
                };
                if cell.bulk_locked {
                    return Err(EngineError::BulkInFlight { room_id: *room_id, date });
                }
                if let Some(active) = &cell.active {
                    return Err(match active.phase {
                        EditPhase::Updating => EngineError::ApplyInFlight { room_id: *room_id, date },
                        EditPhase::Editing => EngineError::EditConflict {
                            room_id: *room_id,
                            date,
                            field: active.field,
                        },
                    });
                }
            }
        }
        for (_, guard) in &mut guards {
            for date in selection.range.iter() {
                if let Some(cell) = guard.cells.get_mut(&date) {
                    cell.bulk_locked = true;
                }
            }
        }
        let generation = self.generation();
        drop(guards);

        let result = self.backend.apply_bulk(&selection).await;

        if generation != self.generation() {
            // The window was reloaded wholesale mid-flight; the fresh cells
            // already reflect the server, including this bulk's outcome.
            debug!("discarding bulk response for a stale window");
            return result.map_err(|e| EngineError::BulkApplyFailed { message: e.to_string() });
        }

        let mut guards = Vec::with_capacity(room_ids.len());
        for &room_id in &room_ids {
            let rs = self.room_state(room_id)?;
            guards.push((room_id, rs.write_owned().await));
        }

        match result {
            Ok(outcome) => {
                let mut written = 0u64;
                for (_, guard) in &mut guards {
                    for date in selection.range.iter() {
                        let Some(cell) = guard.cells.get_mut(&date) else {
                            continue;
                        };
                        for change in &selection.changes {
                            cell.state.apply(change);
                        }
                        cell.state.sync_pending = true;
                        cell.state.sync_status = SyncStatus::Unsynced;
                        cell.state.sync_error = None;
                        cell.error_at = None;
                        cell.bulk_locked = false;
                        written += 1;
                    }
                }
                drop(guards);
                metrics::counter!(
                    crate::observability::BULK_OPS_TOTAL,
                    "phase" => "execute", "status" => "ok"
                )
                .increment(1);
                metrics::counter!(crate::observability::BULK_CELLS_TOTAL).increment(written);
                for &room_id in &room_ids {
                    self.notify.send(
                        room_id,
                        GridChange::RangeChanged {
                            room_id,
                            range: selection.range,
                        },
                    );
                }
                Ok(outcome)
            }
            Err(e) => {
                // Unlock only — values stay byte-identical to pre-attempt.
                for (_, guard) in &mut guards {
                    for date in selection.range.iter() {
                        if let Some(cell) = guard.cells.get_mut(&date) {
                            cell.bulk_locked = false;
                        }
                    }
                }
                drop(guards);
                metrics::counter!(
                    crate::observability::BULK_OPS_TOTAL,
                    "phase" => "execute", "status" => "error"
                )
                .increment(1);
                Err(EngineError::BulkApplyFailed { message: e.to_string() })
            }
        }
    }
}
