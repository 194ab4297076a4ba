//! Grid coordinate model: a contiguous date range × an ordered room list,
//! with O(1) offset lookups. Pixel geometry is deliberately a separate,
//! derived concern so a window resize never touches the index.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::model::{DateRange, RoomColumn, RoomId};

/// Stable mapping from dates to column offsets and rooms to row offsets.
/// Deterministic for a given input: dates ascend day by day, rooms keep
/// their catalog order (duplicates dropped, first occurrence wins).
#[derive(Debug, Clone)]
pub struct GridIndex {
    range: DateRange,
    dates: Vec<NaiveDate>,
    rooms: Vec<RoomColumn>,
    room_offsets: HashMap<RoomId, usize>,
}

impl GridIndex {
    pub fn new(range: DateRange, rooms: &[RoomColumn]) -> Self {
        let dates: Vec<NaiveDate> = range.iter().collect();

        let mut ordered = Vec::with_capacity(rooms.len());
        let mut room_offsets = HashMap::with_capacity(rooms.len());
        for room in rooms {
            if room_offsets.contains_key(&room.room_id) {
                continue;
            }
            room_offsets.insert(room.room_id, ordered.len());
            ordered.push(room.clone());
        }

        Self {
            range,
            dates,
            rooms: ordered,
            room_offsets,
        }
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn days(&self) -> usize {
        self.dates.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn cell_count(&self) -> usize {
        self.days() * self.room_count()
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn rooms(&self) -> &[RoomColumn] {
        &self.rooms
    }

    /// Column offset of a date, `None` outside the window.
    pub fn date_offset(&self, date: NaiveDate) -> Option<usize> {
        let off = date.signed_duration_since(self.range.from).num_days();
        if off < 0 || off as usize >= self.dates.len() {
            return None;
        }
        Some(off as usize)
    }

    /// Row offset of a room, `None` for rooms outside this grid.
    pub fn room_offset(&self, room_id: RoomId) -> Option<usize> {
        self.room_offsets.get(&room_id).copied()
    }

    pub fn date_at(&self, offset: usize) -> Option<NaiveDate> {
        self.dates.get(offset).copied()
    }
}

/// Pixel geometry derived from the index plus a cell width. Recomputed on
/// resize without rebuilding the index.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnGeometry {
    pub cell_width_px: f32,
}

impl ColumnGeometry {
    pub fn new(cell_width_px: f32) -> Self {
        debug_assert!(cell_width_px > 0.0, "cell width must be positive");
        Self { cell_width_px }
    }

    /// Left pixel edge of a column.
    pub fn column_left(&self, offset: usize) -> f32 {
        offset as f32 * self.cell_width_px
    }

    /// Horizontal midpoint of a column.
    pub fn column_mid(&self, offset: usize) -> f32 {
        self.column_left(offset) + self.cell_width_px / 2.0
    }

    /// Total row width for `days` columns.
    pub fn row_width(&self, days: usize) -> f32 {
        days as f32 * self.cell_width_px
    }
}
