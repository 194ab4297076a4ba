use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::*;

pub type RoomId = u32;
pub type PropertyId = u32;
pub type ReservationId = u64;

/// Inclusive day range — the only time granularity the grid knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

// Wire data is untrusted; an inverted range is rejected at the codec
// boundary instead of reaching the reconciler.
impl<'de> Deserialize<'de> for DateRange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            from: NaiveDate,
            to: NaiveDate,
        }
        let raw = Raw::deserialize(deserializer)?;
        if raw.from > raw.to {
            return Err(serde::de::Error::custom("date range from is after to"));
        }
        Ok(DateRange { from: raw.from, to: raw.to })
    }
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Self {
        debug_assert!(from <= to, "DateRange from must not be after to");
        Self { from, to }
    }

    /// Inclusive day count; an inverted range counts as empty.
    pub fn days(&self) -> usize {
        if self.from > self.to {
            return 0;
        }
        self.to.signed_duration_since(self.from).num_days() as usize + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    /// Strictly increasing dates, both ends included.
    pub fn iter(&self) -> impl Iterator<Item = NaiveDate> {
        self.from.iter_days().take(self.days())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomColumn {
    pub room_id: RoomId,
    pub room_number: String,
    pub category_id: u32,
    pub max_occupancy: u8,
    pub is_operational: bool,
    pub is_out_of_order: bool,
}

/// A distribution channel a cell is mapped to (OTA, GDS, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelRef {
    pub channel_id: u32,
    pub code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Synced,
    Unsynced,
    Error,
}

/// The confirmed, wire-facing slice of a cell. This is what snapshot
/// fetches deliver and what the host renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellState {
    pub is_available: bool,
    pub rate: Option<f64>,
    pub min_stay: u32,
    pub closed_to_arrival: bool,
    pub closed_to_departure: bool,
    pub mapped_channels: Vec<ChannelRef>,
    pub sync_status: SyncStatus,
    pub sync_pending: bool,
    pub sync_error: Option<String>,
}

impl Default for CellState {
    fn default() -> Self {
        Self {
            is_available: true,
            rate: None,
            min_stay: 1,
            closed_to_arrival: false,
            closed_to_departure: false,
            mapped_channels: Vec::new(),
            sync_status: SyncStatus::Synced,
            sync_pending: false,
            sync_error: None,
        }
    }
}

impl CellState {
    /// Current value of one field as a tagged edit.
    pub fn value_of(&self, kind: FieldKind) -> FieldEdit {
        match kind {
            FieldKind::Rate => FieldEdit::Rate(self.rate),
            FieldKind::Availability => FieldEdit::Availability(self.is_available),
            FieldKind::MinStay => FieldEdit::MinStay(self.min_stay),
            FieldKind::ClosedToArrival => FieldEdit::ClosedToArrival(self.closed_to_arrival),
            FieldKind::ClosedToDeparture => FieldEdit::ClosedToDeparture(self.closed_to_departure),
        }
    }

    pub fn apply(&mut self, edit: &FieldEdit) {
        match edit {
            FieldEdit::Rate(v) => self.rate = *v,
            FieldEdit::Availability(v) => self.is_available = *v,
            FieldEdit::MinStay(v) => self.min_stay = *v,
            FieldEdit::ClosedToArrival(v) => self.closed_to_arrival = *v,
            FieldEdit::ClosedToDeparture(v) => self.closed_to_departure = *v,
        }
    }
}

// ── Field edits ──────────────────────────────────────────────────

/// One editable cell field plus its new value. Every mutation path —
/// single edits, bulk changes, reconciled push events — speaks this type,
/// so the state machine never branches on field names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldEdit {
    /// `None` clears the override (fall back to the category rate).
    Rate(Option<f64>),
    Availability(bool),
    MinStay(u32),
    ClosedToArrival(bool),
    ClosedToDeparture(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Rate,
    Availability,
    MinStay,
    ClosedToArrival,
    ClosedToDeparture,
}

impl FieldKind {
    /// Restrictions commit on toggle, with no intermediate editing phase.
    pub fn is_restriction(&self) -> bool {
        matches!(self, FieldKind::ClosedToArrival | FieldKind::ClosedToDeparture)
    }
}

impl FieldEdit {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldEdit::Rate(_) => FieldKind::Rate,
            FieldEdit::Availability(_) => FieldKind::Availability,
            FieldEdit::MinStay(_) => FieldKind::MinStay,
            FieldEdit::ClosedToArrival(_) => FieldKind::ClosedToArrival,
            FieldEdit::ClosedToDeparture(_) => FieldKind::ClosedToDeparture,
        }
    }

    /// Field-specific coercion rules.
    pub fn validate(&self) -> Result<(), &'static str> {
        match self {
            FieldEdit::Rate(Some(r)) => {
                if !r.is_finite() || *r < 0.0 {
                    return Err("rate must be a non-negative number");
                }
                if *r > MAX_NIGHTLY_RATE {
                    return Err("rate exceeds maximum");
                }
                Ok(())
            }
            FieldEdit::MinStay(n) => {
                if *n == 0 {
                    return Err("min_stay must be at least 1");
                }
                if *n > MAX_MIN_STAY {
                    return Err("min_stay exceeds maximum");
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

// ── Live cells ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditPhase {
    Editing,
    Updating,
}

/// The one in-flight edit a cell may carry.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveEdit {
    pub field: FieldKind,
    pub phase: EditPhase,
    /// Last confirmed value, restored if the remote apply fails.
    pub rollback: FieldEdit,
}

/// A cell as the engine holds it: confirmed state plus the edit slot,
/// remote values buffered behind an in-flight edit, and bookkeeping the
/// host never sees.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub state: CellState,
    pub active: Option<ActiveEdit>,
    /// Push-event values held back while `active` is set; one per field,
    /// latest wins.
    pub buffered: Vec<FieldEdit>,
    /// When a surfaced error was attached (the reaper clears it after the TTL).
    pub error_at: Option<DateTime<Utc>>,
    /// Set while a bulk operation covering this cell is in flight.
    pub bulk_locked: bool,
}

impl Cell {
    pub fn new(state: CellState) -> Self {
        Self {
            state,
            active: None,
            buffered: Vec::new(),
            error_at: None,
            bulk_locked: false,
        }
    }

    /// Hold a remote value for later, replacing any earlier buffered value
    /// for the same field.
    pub fn buffer(&mut self, edit: FieldEdit) {
        let kind = edit.kind();
        if let Some(existing) = self.buffered.iter_mut().find(|e| e.kind() == kind) {
            *existing = edit;
        } else {
            self.buffered.push(edit);
        }
    }

    /// Apply everything buffered while an edit was in flight. The remote
    /// system spoke after the edit, so applied values count as confirmed.
    /// Returns how many fields changed.
    pub fn drain_buffered(&mut self) -> usize {
        if self.buffered.is_empty() {
            return 0;
        }
        let drained: Vec<FieldEdit> = self.buffered.drain(..).collect();
        for edit in &drained {
            self.state.apply(edit);
        }
        self.state.sync_pending = false;
        self.state.sync_status = SyncStatus::Synced;
        self.state.sync_error = None;
        self.error_at = None;
        drained.len()
    }
}

// ── Reservations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Tentative,
    Confirmed,
    CheckedIn,
    CheckedOut,
    NoShow,
}

impl ReservationStatus {
    /// Active stays occupy their room; finished or failed ones do not.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ReservationStatus::Tentative | ReservationStatus::Confirmed | ReservationStatus::CheckedIn
        )
    }
}

/// A reservation's footprint on one room. `check_out_date` is exclusive —
/// the departure night is not consumed. Owned by the reservation
/// subsystem; the engine only reads and renders these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationSpan {
    pub reservation_id: ReservationId,
    pub room_id: RoomId,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub status: ReservationStatus,
    pub guest_name: String,
    /// False when this segment is the continuation of a room move.
    pub is_arrival: bool,
    pub is_departure: bool,
}

impl ReservationSpan {
    pub fn nights(&self) -> i64 {
        self.check_out_date
            .signed_duration_since(self.check_in_date)
            .num_days()
    }

    /// True if the guest sleeps in the room on `date`.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.check_in_date <= date && date < self.check_out_date
    }
}

/// Why a room-night is unavailable — occupancy and manual blocking are
/// distinct and must not be conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DayStatus {
    Open,
    Blocked,
    Occupied,
}

// ── Per-room state ───────────────────────────────────────────────

/// Everything the engine tracks for one room: its column, the cells of
/// the loaded window, and the reservation spans overlapping it.
#[derive(Debug, Clone)]
pub struct RoomInventory {
    pub room: RoomColumn,
    pub cells: BTreeMap<NaiveDate, Cell>,
    /// Sorted by check-in date; per room, spans never overlap.
    pub spans: Vec<ReservationSpan>,
}

impl RoomInventory {
    pub fn new(room: RoomColumn) -> Self {
        Self {
            room,
            cells: BTreeMap::new(),
            spans: Vec::new(),
        }
    }

    /// Insert a span maintaining check-in order.
    pub fn insert_span(&mut self, span: ReservationSpan) {
        let pos = self
            .spans
            .binary_search_by_key(&span.check_in_date, |s| s.check_in_date)
            .unwrap_or_else(|e| e);
        self.spans.insert(pos, span);
    }

    /// The active span whose stay includes `date`, if any.
    pub fn span_covering(&self, date: NaiveDate) -> Option<&ReservationSpan> {
        // Spans are check-in sorted; everything starting after `date` can't cover it.
        let right = self.spans.partition_point(|s| s.check_in_date <= date);
        self.spans[..right]
            .iter()
            .rev()
            .find(|s| s.status.is_active() && s.covers(date))
    }

    pub fn day_status(&self, date: NaiveDate) -> DayStatus {
        if self.span_covering(date).is_some() {
            return DayStatus::Occupied;
        }
        match self.cells.get(&date) {
            Some(cell) if !cell.state.is_available => DayStatus::Blocked,
            _ => DayStatus::Open,
        }
    }
}

// ── Push events ──────────────────────────────────────────────────

/// Server-to-client push stream events. The stream is a liveness
/// optimization, not a durable log — on reconnect the window is
/// re-fetched instead of replaying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PushEvent {
    Connected {
        session_id: Ulid,
        at: DateTime<Utc>,
    },
    AvailabilityUpdated {
        room_id: RoomId,
        date: NaiveDate,
        changes: Vec<FieldEdit>,
        at: DateTime<Utc>,
    },
    SyncCompleted {
        /// Absent means the whole window.
        range: Option<DateRange>,
        at: DateTime<Utc>,
    },
    BulkUpdateCompleted {
        room_ids: Vec<RoomId>,
        range: DateRange,
        changes: Vec<FieldEdit>,
        at: DateTime<Utc>,
    },
    Heartbeat {
        at: DateTime<Utc>,
    },
    Error {
        message: String,
        at: DateTime<Utc>,
    },
}

impl PushEvent {
    /// Wire helpers for JSON transports.
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ── Remote DTOs ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellRecord {
    pub room_id: RoomId,
    pub date: NaiveDate,
    pub state: CellState,
}

/// Full-window read delivered by the snapshot fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSnapshot {
    pub rooms: Vec<RoomColumn>,
    pub cells: Vec<CellRecord>,
    pub spans: Vec<ReservationSpan>,
    pub fetched_at: DateTime<Utc>,
}

/// Which rooms a grid session covers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RoomFilter {
    Property(PropertyId),
    Rooms(Vec<RoomId>),
}

/// A rectangular room × date × field change, consumed once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkSelection {
    pub room_ids: Vec<RoomId>,
    pub range: DateRange,
    pub changes: Vec<FieldEdit>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkConflict {
    pub room_id: RoomId,
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkValidation {
    pub is_valid: bool,
    pub total_cells: usize,
    pub conflicts: Vec<BulkConflict>,
    pub warnings: Vec<String>,
    /// True when the validator was unreachable and the counts are a local
    /// rooms × days estimate with no conflict analysis behind them.
    pub estimated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub updated_cells: u64,
    pub created_cells: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    pub success: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRequest {
    pub scope: Option<DateRange>,
    pub force_all: bool,
    pub run_async: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SyncOutcome {
    Queued { job_id: Ulid },
    Completed { synced_cells: u64 },
}

/// Derived sync health, recomputed from the cells on demand — never
/// authoritative, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncSnapshot {
    pub pending_count: usize,
    pub synced_count: usize,
    pub error_count: usize,
    pub last_global_sync: Option<DateTime<Utc>>,
    pub healthy_channels: Vec<ChannelRef>,
    pub error_channels: Vec<ChannelRef>,
}

impl SyncSnapshot {
    /// `synced / (synced + pending + error)`; 1.0 for an empty grid.
    pub fn sync_rate(&self) -> f64 {
        let total = self.synced_count + self.pending_count + self.error_count;
        if total == 0 {
            return 1.0;
        }
        self.synced_count as f64 / total as f64
    }
}
