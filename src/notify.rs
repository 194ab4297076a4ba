use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::{DateRange, RoomId};

/// What changed, at cell granularity. Hosts subscribe per visible room
/// and repaint only what moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridChange {
    CellChanged { room_id: RoomId, date: NaiveDate },
    /// A contiguous run of cells changed at once (bulk apply, sync sweep).
    RangeChanged { room_id: RoomId, range: DateRange },
    SpansChanged { room_id: RoomId },
    RoomChanged { room_id: RoomId },
}

/// Window-level notifications, one channel for the whole grid session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowEvent {
    /// The window was loaded or reloaded wholesale (shift, resync).
    WindowLoaded,
    SyncStatusChanged,
}

/// Broadcast hub for grid changes, one channel per room plus a
/// window-level channel.
pub struct ChangeHub {
    channels: DashMap<RoomId, broadcast::Sender<GridChange>>,
    window: broadcast::Sender<WindowEvent>,
    capacity: usize,
}

impl ChangeHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            channels: DashMap::new(),
            window: broadcast::channel(capacity).0,
            capacity,
        }
    }

    /// Subscribe to changes for a room. Creates the channel if needed.
    pub fn subscribe(&self, room_id: RoomId) -> broadcast::Receiver<GridChange> {
        let sender = self
            .channels
            .entry(room_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        sender.subscribe()
    }

    /// Send a room change. No-op if nobody is listening.
    pub fn send(&self, room_id: RoomId, change: GridChange) {
        if let Some(sender) = self.channels.get(&room_id) {
            let _ = sender.send(change);
        }
    }

    pub fn subscribe_window(&self) -> broadcast::Receiver<WindowEvent> {
        self.window.subscribe()
    }

    pub fn send_window(&self, event: WindowEvent) {
        let _ = self.window.send(event);
    }

    /// Remove a room channel (e.g. when the window shifts away from it).
    #[allow(dead_code)]
    pub fn remove(&self, room_id: &RoomId) {
        self.channels.remove(room_id);
    }
}
