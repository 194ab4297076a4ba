//! The seams to the remote collaborators: the inventory REST backend and
//! the channel-manager sync endpoints. The engine only ever talks to
//! these traits; hosts supply the transport.

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::*;

#[derive(Debug)]
pub enum BackendError {
    /// Transport-level failure; the endpoint never answered.
    Unreachable(String),
    /// The endpoint answered with an error status.
    Remote { status: u16, message: String },
    /// The answer could not be decoded.
    Decode(String),
    Unauthorized,
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendError::Unreachable(msg) => write!(f, "backend unreachable: {msg}"),
            BackendError::Remote { status, message } => {
                write!(f, "backend error {status}: {message}")
            }
            BackendError::Decode(msg) => write!(f, "backend response malformed: {msg}"),
            BackendError::Unauthorized => write!(f, "backend rejected credentials"),
        }
    }
}

impl std::error::Error for BackendError {}

/// The single declared source of the auth token — no ambient storage
/// lookups, no fallback key scanning. Injected into backend impls and
/// `EventTransport::connect`.
pub trait AuthProvider: Send + Sync {
    fn token(&self) -> Option<String>;
}

/// A fixed token, for tests and CLIs.
pub struct StaticToken(pub String);

impl AuthProvider for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Remote inventory operations consumed by the engine. All calls are the
/// engine's only suspension points besides the push stream.
#[async_trait]
pub trait InventoryBackend: Send + Sync {
    /// Full-window read, used on load and on reconnect-resync.
    async fn fetch_snapshot(
        &self,
        range: DateRange,
        filter: &RoomFilter,
    ) -> Result<GridSnapshot, BackendError>;

    /// Apply one field change to one cell.
    async fn apply_change(
        &self,
        room_id: RoomId,
        date: NaiveDate,
        change: FieldEdit,
    ) -> Result<ApplyOutcome, BackendError>;

    /// Conflict/warning analysis for a bulk selection, before execution.
    async fn validate_bulk(&self, selection: &BulkSelection) -> Result<BulkValidation, BackendError>;

    /// Atomic server-side bulk apply — a single unit, never cell-by-cell.
    async fn apply_bulk(&self, selection: &BulkSelection) -> Result<BulkOutcome, BackendError>;

    /// How many cells the remote side still considers unpushed.
    async fn pending_count(&self, property_id: Option<PropertyId>) -> Result<u64, BackendError>;

    /// The remote side's own pending date range, if any.
    async fn pending_range(
        &self,
        property_id: Option<PropertyId>,
    ) -> Result<Option<DateRange>, BackendError>;

    /// Kick the external channel-manager sync for a scope the engine decides.
    async fn trigger_sync(&self, request: SyncRequest) -> Result<SyncOutcome, BackendError>;
}
