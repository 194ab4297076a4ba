mod bulk;
mod edit;
mod error;
mod reconcile;
mod status;

pub use error::EngineError;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::backend::InventoryBackend;
use crate::config::SyncConfig;
use crate::grid::{ColumnGeometry, GridIndex};
use crate::layout::{layout_spans, SpanShape};
use crate::limits::*;
use crate::model::*;
use crate::notify::{ChangeHub, WindowEvent};

pub type SharedRoomState = Arc<RwLock<RoomInventory>>;

/// The availability-grid synchronization engine. One instance per grid
/// session; cells are the only shared mutable resource, guarded by one
/// writer lock per room. Remote calls never run under a lock.
pub struct GridEngine {
    pub(super) rooms: DashMap<RoomId, SharedRoomState>,
    index: RwLock<Arc<GridIndex>>,
    pub(super) backend: Arc<dyn InventoryBackend>,
    pub notify: Arc<ChangeHub>,
    pub(super) config: SyncConfig,
    filter: RoomFilter,
    /// Bumped on every window (re)load; responses carrying a stale
    /// generation are discarded instead of mutating fresh cells.
    generation: AtomicU64,
    pub(super) last_global_sync: RwLock<Option<DateTime<Utc>>>,
}

impl GridEngine {
    /// Fetch the initial snapshot and build the grid.
    pub async fn load(
        backend: Arc<dyn InventoryBackend>,
        notify: Arc<ChangeHub>,
        config: SyncConfig,
        range: DateRange,
        filter: RoomFilter,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidValue)?;

        let engine = Self {
            rooms: DashMap::new(),
            index: RwLock::new(Arc::new(GridIndex::new(range, &[]))),
            backend,
            notify,
            config,
            filter,
            generation: AtomicU64::new(0),
            last_global_sync: RwLock::new(None),
        };
        engine.load_window(range).await?;
        Ok(engine)
    }

    /// Re-fetch a window and replace rooms, cells, spans, and the index
    /// wholesale. Cells are never individually deleted — a window shift is
    /// always a full replacement.
    pub async fn load_window(&self, range: DateRange) -> Result<(), EngineError> {
        if range.days() > MAX_WINDOW_DAYS {
            return Err(EngineError::LimitExceeded("window too wide"));
        }

        let start = std::time::Instant::now();
        let snapshot = self.backend.fetch_snapshot(range, &self.filter).await?;
        if snapshot.rooms.len() > MAX_ROOMS_PER_GRID {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }

        let index = GridIndex::new(range, &snapshot.rooms);

        let mut fresh: Vec<(RoomId, SharedRoomState)> = Vec::with_capacity(index.room_count());
        for room in index.rooms() {
            let mut inv = RoomInventory::new(room.clone());
            for date in range.iter() {
                inv.cells.insert(date, Cell::new(CellState::default()));
            }
            fresh.push((room.room_id, Arc::new(RwLock::new(inv))));
        }
        let by_id: std::collections::HashMap<RoomId, usize> = fresh
            .iter()
            .enumerate()
            .map(|(i, (rid, _))| (*rid, i))
            .collect();

        for record in snapshot.cells {
            let Some(&i) = by_id.get(&record.room_id) else {
                debug!("snapshot cell for unknown room {}", record.room_id);
                continue;
            };
            if !range.contains(record.date) {
                debug!("snapshot cell outside window: {}", record.date);
                continue;
            }
            let mut inv = fresh[i].1.try_write().expect("install: uncontended write");
            inv.cells.insert(record.date, Cell::new(record.state));
        }

        for span in snapshot.spans {
            let Some(&i) = by_id.get(&span.room_id) else {
                debug!("snapshot span for unknown room {}", span.room_id);
                continue;
            };
            let mut inv = fresh[i].1.try_write().expect("install: uncontended write");
            inv.insert_span(span);
        }

        // New generation first, so late apply responses from the old window
        // see themselves stale before the fresh cells land.
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.rooms.clear();
        for (rid, inv) in fresh {
            self.rooms.insert(rid, inv);
        }
        *self.index.write().await = Arc::new(index);

        metrics::histogram!(crate::observability::WINDOW_LOAD_DURATION_SECONDS)
            .record(start.elapsed().as_secs_f64());
        info!(
            days = range.days(),
            rooms = self.rooms.len(),
            "window loaded {} .. {}",
            range.from,
            range.to
        );
        self.notify.send_window(WindowEvent::WindowLoaded);
        Ok(())
    }

    /// Reload the current window. Run after a stream reconnect: missed
    /// events are never replayed, convergence comes from re-reading.
    pub async fn resync(&self) -> Result<(), EngineError> {
        let range = self.index.read().await.range();
        self.load_window(range).await
    }

    pub async fn index(&self) -> Arc<GridIndex> {
        self.index.read().await.clone()
    }

    pub(super) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(super) fn room_state(&self, room_id: RoomId) -> Result<SharedRoomState, EngineError> {
        self.rooms
            .get(&room_id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::RoomNotFound(room_id))
    }

    /// Confirmed state of one cell, as the host renders it.
    pub async fn cell_state(&self, room_id: RoomId, date: NaiveDate) -> Result<CellState, EngineError> {
        let rs = self.room_state(room_id)?;
        let guard = rs.read().await;
        guard
            .cells
            .get(&date)
            .map(|c| c.state.clone())
            .ok_or(EngineError::CellNotFound { room_id, date })
    }

    /// Open / blocked / occupied for one room-night.
    pub async fn day_status(&self, room_id: RoomId, date: NaiveDate) -> Result<DayStatus, EngineError> {
        let rs = self.room_state(room_id)?;
        let guard = rs.read().await;
        Ok(guard.day_status(date))
    }

    /// Project every visible reservation span to drawable shapes.
    pub async fn span_shapes(&self, geom: &ColumnGeometry) -> Vec<SpanShape> {
        let index = self.index.read().await.clone();
        let mut shapes = Vec::new();
        for room in index.rooms() {
            let Some(entry) = self.rooms.get(&room.room_id) else {
                continue;
            };
            let rs = entry.value().clone();
            let guard = rs.read().await;
            shapes.extend(layout_spans(&index, geom, &guard.spans));
        }
        shapes
    }
}
