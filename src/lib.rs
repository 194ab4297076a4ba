pub mod backend;
pub mod config;
pub mod engine;
pub mod grid;
pub mod layout;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod reaper;
pub mod stream;

pub use backend::{AuthProvider, BackendError, InventoryBackend};
pub use config::SyncConfig;
pub use engine::{EngineError, GridEngine};
pub use grid::{ColumnGeometry, GridIndex};
pub use layout::{layout_spans, SpanShape};
pub use stream::{ConnectionState, EventTransport, StreamError};
