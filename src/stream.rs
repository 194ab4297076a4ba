//! Push-stream supervisor: owns the transport connection lifecycle
//! (disconnected → connecting → connected), the heartbeat inactivity
//! timer, and the bounded fixed-interval reconnect schedule. Feeds every
//! received event to the reconciler.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::backend::AuthProvider;
use crate::config::SyncConfig;
use crate::engine::GridEngine;
use crate::model::PushEvent;

#[derive(Debug)]
pub enum StreamError {
    Connect(String),
    Transport(String),
    Closed,
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::Connect(msg) => write!(f, "stream connect failed: {msg}"),
            StreamError::Transport(msg) => write!(f, "stream transport error: {msg}"),
            StreamError::Closed => write!(f, "stream closed"),
        }
    }
}

impl std::error::Error for StreamError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

pub type EventStream = BoxStream<'static, Result<PushEvent, StreamError>>;

/// The server-to-client push transport. Hosts implement this over
/// whatever wire they have (SSE, WebSocket); the engine only sees the
/// event stream.
#[async_trait]
pub trait EventTransport: Send + Sync {
    async fn connect(&self, auth: &dyn AuthProvider) -> Result<EventStream, StreamError>;
}

/// Watch channel the host observes connection state through.
pub fn connection_watch() -> (watch::Sender<ConnectionState>, watch::Receiver<ConnectionState>) {
    watch::channel(ConnectionState::Disconnected)
}

/// Run the stream until the reconnect budget is spent. Returns after
/// publishing `Disconnected`; a manual reconnect is re-running this.
pub async fn run_supervisor(
    engine: Arc<GridEngine>,
    transport: Arc<dyn EventTransport>,
    auth: Arc<dyn AuthProvider>,
    config: SyncConfig,
    state: watch::Sender<ConnectionState>,
) {
    let mut attempts: u32 = 0;
    let mut had_session = false;

    loop {
        let _ = state.send(ConnectionState::Connecting);
        match open_session(&engine, transport.as_ref(), auth.as_ref(), had_session).await {
            Ok(stream) => {
                attempts = 0;
                had_session = true;
                let _ = state.send(ConnectionState::Connected);
                info!("push stream connected");
                pump(&engine, stream, config.heartbeat_timeout).await;
                let _ = state.send(ConnectionState::Error);
            }
            Err(e) => {
                warn!("push stream connect failed: {e}");
                let _ = state.send(ConnectionState::Error);
            }
        }

        attempts += 1;
        metrics::counter!(crate::observability::STREAM_RECONNECTS_TOTAL).increment(1);
        if attempts >= config.max_reconnect_attempts {
            warn!("reconnect attempts exhausted, parking disconnected");
            let _ = state.send(ConnectionState::Disconnected);
            return;
        }
        tokio::time::sleep(config.reconnect_interval).await;
    }
}

/// Connect, and on a *re*connect re-fetch the window first: the stream
/// never replays missed events, convergence comes from re-reading.
async fn open_session(
    engine: &GridEngine,
    transport: &dyn EventTransport,
    auth: &dyn AuthProvider,
    resync: bool,
) -> Result<EventStream, StreamError> {
    let stream = transport.connect(auth).await?;
    if resync {
        engine
            .resync()
            .await
            .map_err(|e| StreamError::Connect(format!("resync failed: {e}")))?;
    }
    Ok(stream)
}

/// Read events until the transport fails, closes, or goes quiet past the
/// heartbeat timeout. Any event resets the timer; heartbeats carry
/// nothing else.
async fn pump(engine: &GridEngine, mut stream: EventStream, heartbeat: Duration) {
    loop {
        match timeout(heartbeat, stream.next()).await {
            Ok(Some(Ok(PushEvent::Heartbeat { .. }))) => continue,
            Ok(Some(Ok(event))) => engine.apply_push_event(event).await,
            Ok(Some(Err(e))) => {
                warn!("push stream transport error: {e}");
                return;
            }
            Ok(None) => {
                info!("push stream closed by server");
                return;
            }
            Err(_) => {
                warn!("no event within the heartbeat timeout");
                return;
            }
        }
    }
}
