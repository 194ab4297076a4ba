//! Sync status aggregation: pure reads derived from the current cells,
//! plus the manual sync trigger that scopes its request to the minimal
//! pending range instead of the whole window.

use std::collections::HashSet;
use std::time::Duration;

use chrono::{NaiveDate, TimeDelta, Utc};
use tracing::info;

use crate::model::*;
use crate::notify::GridChange;

use super::{EngineError, GridEngine};

impl GridEngine {
    /// Recompute sync health from the cells. Holds no state of its own and
    /// can never disagree with the cells it summarizes.
    pub async fn sync_snapshot(&self) -> SyncSnapshot {
        let index = self.index().await;
        let mut pending_count = 0;
        let mut synced_count = 0;
        let mut error_count = 0;
        let mut seen: HashSet<ChannelRef> = HashSet::new();
        let mut erring: HashSet<ChannelRef> = HashSet::new();

        for room in index.rooms() {
            let Ok(rs) = self.room_state(room.room_id) else {
                continue;
            };
            let guard = rs.read().await;
            for cell in guard.cells.values() {
                match cell.state.sync_status {
                    SyncStatus::Synced => synced_count += 1,
                    SyncStatus::Unsynced => pending_count += 1,
                    SyncStatus::Error => error_count += 1,
                }
                for channel in &cell.state.mapped_channels {
                    seen.insert(channel.clone());
                    if cell.state.sync_status == SyncStatus::Error {
                        erring.insert(channel.clone());
                    }
                }
            }
        }

        metrics::gauge!(crate::observability::CELLS_PENDING).set(pending_count as f64);

        let mut healthy_channels: Vec<ChannelRef> =
            seen.difference(&erring).cloned().collect();
        let mut error_channels: Vec<ChannelRef> = erring.into_iter().collect();
        healthy_channels.sort_by_key(|c| c.channel_id);
        error_channels.sort_by_key(|c| c.channel_id);

        SyncSnapshot {
            pending_count,
            synced_count,
            error_count,
            last_global_sync: *self.last_global_sync.read().await,
            healthy_channels,
            error_channels,
        }
    }

    /// The minimal contiguous date span covering every cell still awaiting
    /// sync confirmation; `None` when nothing is pending.
    pub async fn pending_date_range(&self) -> Option<DateRange> {
        let mut min: Option<NaiveDate> = None;
        let mut max: Option<NaiveDate> = None;
        for entry in self.rooms.iter() {
            let rs = entry.value().clone();
            let guard = rs.read().await;
            for (date, cell) in &guard.cells {
                if !cell.state.sync_pending {
                    continue;
                }
                min = Some(min.map_or(*date, |m| m.min(*date)));
                max = Some(max.map_or(*date, |m| m.max(*date)));
            }
        }
        Some(DateRange::new(min?, max?))
    }

    /// Trigger the external channel-manager sync. Scoped to the pending
    /// range unless forced; returns `None` without a remote call when
    /// nothing is pending and the push is not forced.
    pub async fn request_sync(
        &self,
        force_all: bool,
        run_async: bool,
    ) -> Result<Option<SyncOutcome>, EngineError> {
        let scope = if force_all {
            self.index().await.range()
        } else {
            match self.pending_date_range().await {
                Some(range) => range,
                None => return Ok(None),
            }
        };

        info!("requesting channel sync for {} .. {}", scope.from, scope.to);
        metrics::counter!(crate::observability::SYNC_TRIGGERS_TOTAL).increment(1);
        let outcome = self
            .backend
            .trigger_sync(SyncRequest {
                scope: Some(scope),
                force_all,
                run_async,
            })
            .await?;
        Ok(Some(outcome))
    }

    /// The remote side's own pending count, unfiltered passthrough.
    pub async fn remote_pending_count(&self) -> Result<u64, EngineError> {
        Ok(self.backend.pending_count(self.property_id()).await?)
    }

    pub async fn remote_pending_range(&self) -> Result<Option<DateRange>, EngineError> {
        Ok(self.backend.pending_range(self.property_id()).await?)
    }

    fn property_id(&self) -> Option<PropertyId> {
        match &self.filter {
            RoomFilter::Property(id) => Some(*id),
            RoomFilter::Rooms(_) => None,
        }
    }

    /// Clear surfaced cell errors older than the display TTL. Called by
    /// the reaper; returns the cells it touched.
    pub async fn clear_expired_errors(&self, ttl: Duration) -> Vec<(RoomId, NaiveDate)> {
        let ttl = TimeDelta::from_std(ttl).unwrap_or_else(|_| TimeDelta::zero());
        let cutoff = Utc::now() - ttl;
        let mut cleared = Vec::new();

        for entry in self.rooms.iter() {
            let room_id = *entry.key();
            let rs = entry.value().clone();
            let mut guard = rs.write().await;
            for (date, cell) in guard.cells.iter_mut() {
                let Some(at) = cell.error_at else { continue };
                if at > cutoff {
                    continue;
                }
                cell.error_at = None;
                cell.state.sync_error = None;
                cell.state.sync_status = if cell.state.sync_pending {
                    SyncStatus::Unsynced
                } else {
                    SyncStatus::Synced
                };
                cleared.push((room_id, *date));
            }
        }

        for &(room_id, date) in &cleared {
            self.notify.send(room_id, GridChange::CellChanged { room_id, date });
        }
        if !cleared.is_empty() {
            self.notify.send_window(crate::notify::WindowEvent::SyncStatusChanged);
        }
        cleared
    }
}
