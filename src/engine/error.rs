use chrono::NaiveDate;

use crate::backend::BackendError;
use crate::model::{BulkConflict, FieldKind, RoomId};

#[derive(Debug)]
pub enum EngineError {
    RoomNotFound(RoomId),
    CellNotFound { room_id: RoomId, date: NaiveDate },
    /// Another field on the cell is already mid-edit.
    EditConflict { room_id: RoomId, date: NaiveDate, field: FieldKind },
    /// A remote apply for this cell is still outstanding.
    ApplyInFlight { room_id: RoomId, date: NaiveDate },
    /// The cell belongs to a bulk selection whose apply has not settled.
    BulkInFlight { room_id: RoomId, date: NaiveDate },
    InvalidValue(&'static str),
    LimitExceeded(&'static str),
    /// Bulk validation reported conflicts; execution is blocked.
    BulkRejected { conflicts: Vec<BulkConflict> },
    /// The remote apply failed; the cell was rolled back.
    ApplyFailed { message: String },
    /// The bulk apply failed as a whole; no local cell was touched.
    BulkApplyFailed { message: String },
    /// Strict mode: the validator was unreachable, execution stays blocked.
    ValidationUnavailable { message: String },
    Backend(BackendError),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::RoomNotFound(id) => write!(f, "room not found: {id}"),
            EngineError::CellNotFound { room_id, date } => {
                write!(f, "no cell for room {room_id} on {date}")
            }
            EngineError::EditConflict { room_id, date, field } => {
                write!(f, "room {room_id} {date}: {field:?} already being edited")
            }
            EngineError::ApplyInFlight { room_id, date } => {
                write!(f, "room {room_id} {date}: apply still in flight")
            }
            EngineError::BulkInFlight { room_id, date } => {
                write!(f, "room {room_id} {date}: cell locked by a bulk operation")
            }
            EngineError::InvalidValue(msg) => write!(f, "invalid value: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::BulkRejected { conflicts } => {
                write!(f, "bulk edit rejected: {} conflict(s)", conflicts.len())
            }
            EngineError::ApplyFailed { message } => write!(f, "apply failed: {message}"),
            EngineError::BulkApplyFailed { message } => write!(f, "bulk apply failed: {message}"),
            EngineError::ValidationUnavailable { message } => {
                write!(f, "bulk validation unavailable: {message}")
            }
            EngineError::Backend(e) => write!(f, "backend: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<BackendError> for EngineError {
    fn from(e: BackendError) -> Self {
        EngineError::Backend(e)
    }
}
