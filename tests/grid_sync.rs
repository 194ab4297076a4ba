//! End-to-end: a grid engine fed by a scripted push transport, driven
//! through the stream supervisor exactly as a host would run it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::channel::mpsc::{self, UnboundedSender};
use futures::StreamExt;
use tokio::time::timeout;
use ulid::Ulid;

use rategrid::backend::{AuthProvider, BackendError, InventoryBackend, StaticToken};
use rategrid::model::*;
use rategrid::notify::{ChangeHub, WindowEvent};
use rategrid::stream::{run_supervisor, ConnectionState, EventStream, EventTransport, StreamError};
use rategrid::{GridEngine, SyncConfig};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn column(room_id: RoomId) -> RoomColumn {
    RoomColumn {
        room_id,
        room_number: room_id.to_string(),
        category_id: 1,
        max_occupancy: 2,
        is_operational: true,
        is_out_of_order: false,
    }
}

struct CountingBackend {
    rooms: Vec<RoomId>,
    fetches: AtomicUsize,
}

impl CountingBackend {
    fn new(rooms: &[RoomId]) -> Arc<Self> {
        Arc::new(Self {
            rooms: rooms.to_vec(),
            fetches: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl InventoryBackend for CountingBackend {
    async fn fetch_snapshot(
        &self,
        _range: DateRange,
        _filter: &RoomFilter,
    ) -> Result<GridSnapshot, BackendError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(GridSnapshot {
            rooms: self.rooms.iter().map(|&r| column(r)).collect(),
            cells: Vec::new(),
            spans: Vec::new(),
            fetched_at: Utc::now(),
        })
    }

    async fn apply_change(
        &self,
        _room_id: RoomId,
        _date: NaiveDate,
        _change: FieldEdit,
    ) -> Result<ApplyOutcome, BackendError> {
        Ok(ApplyOutcome {
            success: true,
            message: None,
        })
    }

    async fn validate_bulk(&self, selection: &BulkSelection) -> Result<BulkValidation, BackendError> {
        Ok(BulkValidation {
            is_valid: true,
            total_cells: selection.room_ids.len() * selection.range.days(),
            conflicts: Vec::new(),
            warnings: Vec::new(),
            estimated: false,
        })
    }

    async fn apply_bulk(&self, selection: &BulkSelection) -> Result<BulkOutcome, BackendError> {
        Ok(BulkOutcome {
            updated_cells: (selection.room_ids.len() * selection.range.days()) as u64,
            created_cells: 0,
        })
    }

    async fn pending_count(&self, _property_id: Option<PropertyId>) -> Result<u64, BackendError> {
        Ok(0)
    }

    async fn pending_range(
        &self,
        _property_id: Option<PropertyId>,
    ) -> Result<Option<DateRange>, BackendError> {
        Ok(None)
    }

    async fn trigger_sync(&self, _request: SyncRequest) -> Result<SyncOutcome, BackendError> {
        Ok(SyncOutcome::Queued { job_id: Ulid::new() })
    }
}

type EventSender = UnboundedSender<Result<PushEvent, StreamError>>;

/// Hands out pre-scripted sessions, one per connect; connects fail once
/// the script runs dry, which lets the supervisor drain its reconnect
/// budget and return.
struct ScriptedTransport {
    sessions: StdMutex<VecDeque<EventStream>>,
    connects: AtomicUsize,
}

impl ScriptedTransport {
    fn new(session_count: usize) -> (Arc<Self>, Vec<EventSender>) {
        let mut sessions = VecDeque::new();
        let mut senders = Vec::new();
        for _ in 0..session_count {
            let (tx, rx) = mpsc::unbounded();
            let stream: EventStream = rx.boxed();
            sessions.push_back(stream);
            senders.push(tx);
        }
        (
            Arc::new(Self {
                sessions: StdMutex::new(sessions),
                connects: AtomicUsize::new(0),
            }),
            senders,
        )
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn connect(&self, _auth: &dyn AuthProvider) -> Result<EventStream, StreamError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.sessions
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| StreamError::Connect("no server".into()))
    }
}

fn test_config() -> SyncConfig {
    SyncConfig {
        reconnect_interval: Duration::from_millis(10),
        max_reconnect_attempts: 3,
        heartbeat_timeout: Duration::from_millis(500),
        ..SyncConfig::default()
    }
}

async fn load_engine(backend: Arc<CountingBackend>, config: SyncConfig) -> Arc<GridEngine> {
    let notify = Arc::new(ChangeHub::new(config.event_channel_capacity));
    Arc::new(
        GridEngine::load(
            backend,
            notify,
            config,
            DateRange::new(d("2025-09-10"), d("2025-09-16")),
            RoomFilter::Property(1),
        )
        .await
        .unwrap(),
    )
}

fn auth() -> Arc<dyn AuthProvider> {
    Arc::new(StaticToken("test-token".into()))
}

fn push(tx: &EventSender, event: PushEvent) {
    tx.unbounded_send(Ok(event)).unwrap();
}

#[tokio::test]
async fn pushed_events_land_in_grid_cells() {
    init_tracing();
    let backend = CountingBackend::new(&[101, 102]);
    let config = test_config();
    let engine = load_engine(backend, config.clone()).await;
    let (transport, senders) = ScriptedTransport::new(1);

    let (state_tx, state_rx) = rategrid::stream::connection_watch();
    let supervisor = tokio::spawn(run_supervisor(
        engine.clone(),
        transport,
        auth(),
        config,
        state_tx,
    ));

    let mut changes = engine.notify.subscribe(101);
    push(
        &senders[0],
        PushEvent::AvailabilityUpdated {
            room_id: 101,
            date: d("2025-09-12"),
            changes: vec![FieldEdit::Rate(Some(210.0)), FieldEdit::Availability(false)],
            at: Utc::now(),
        },
    );

    timeout(Duration::from_secs(5), changes.recv()).await.unwrap().unwrap();
    let cell = engine.cell_state(101, d("2025-09-12")).await.unwrap();
    assert_eq!(cell.rate, Some(210.0));
    assert!(!cell.is_available);
    assert_eq!(cell.sync_status, SyncStatus::Synced);

    drop(senders);
    timeout(Duration::from_secs(5), supervisor).await.unwrap().unwrap();
    assert_eq!(*state_rx.borrow(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn reconnect_refetches_the_window_instead_of_replaying() {
    init_tracing();
    let backend = CountingBackend::new(&[101]);
    let config = test_config();
    let engine = load_engine(backend.clone(), config.clone()).await;
    let (transport, mut senders) = ScriptedTransport::new(2);

    let (state_tx, _state_rx) = rategrid::stream::connection_watch();
    let supervisor = tokio::spawn(run_supervisor(
        engine.clone(),
        transport.clone(),
        auth(),
        config,
        state_tx,
    ));

    // First session dies; the supervisor must re-read the window before
    // consuming the second session.
    let mut window_rx = engine.notify.subscribe_window();
    senders.remove(0);
    assert_eq!(
        timeout(Duration::from_secs(5), window_rx.recv()).await.unwrap().unwrap(),
        WindowEvent::WindowLoaded
    );
    assert_eq!(backend.fetches.load(Ordering::SeqCst), 2); // initial load + resync

    // The second session is live: events still flow.
    let mut changes = engine.notify.subscribe(101);
    push(
        &senders[0],
        PushEvent::AvailabilityUpdated {
            room_id: 101,
            date: d("2025-09-11"),
            changes: vec![FieldEdit::MinStay(3)],
            at: Utc::now(),
        },
    );
    timeout(Duration::from_secs(5), changes.recv()).await.unwrap().unwrap();
    assert_eq!(engine.cell_state(101, d("2025-09-11")).await.unwrap().min_stay, 3);
    assert_eq!(transport.connects.load(Ordering::SeqCst), 2);

    drop(senders);
    timeout(Duration::from_secs(5), supervisor).await.unwrap().unwrap();
}

#[tokio::test]
async fn heartbeats_keep_the_session_alive() {
    init_tracing();
    let backend = CountingBackend::new(&[101]);
    let config = SyncConfig {
        heartbeat_timeout: Duration::from_millis(200),
        ..test_config()
    };
    let engine = load_engine(backend, config.clone()).await;
    let (transport, senders) = ScriptedTransport::new(1);

    let (state_tx, _state_rx) = rategrid::stream::connection_watch();
    let supervisor = tokio::spawn(run_supervisor(
        engine.clone(),
        transport.clone(),
        auth(),
        config,
        state_tx,
    ));

    // Quiet except for heartbeats, for well past the timeout.
    for _ in 0..5 {
        tokio::time::sleep(Duration::from_millis(50)).await;
        push(&senders[0], PushEvent::Heartbeat { at: Utc::now() });
    }
    let mut changes = engine.notify.subscribe(101);
    push(
        &senders[0],
        PushEvent::AvailabilityUpdated {
            room_id: 101,
            date: d("2025-09-10"),
            changes: vec![FieldEdit::Availability(false)],
            at: Utc::now(),
        },
    );
    timeout(Duration::from_secs(5), changes.recv()).await.unwrap().unwrap();

    // Still the original session — heartbeats reset the inactivity timer.
    assert_eq!(transport.connects.load(Ordering::SeqCst), 1);

    drop(senders);
    timeout(Duration::from_secs(5), supervisor).await.unwrap().unwrap();
}

#[tokio::test]
async fn silence_past_the_heartbeat_timeout_reconnects() {
    init_tracing();
    let backend = CountingBackend::new(&[101]);
    let config = SyncConfig {
        heartbeat_timeout: Duration::from_millis(50),
        ..test_config()
    };
    let engine = load_engine(backend.clone(), config.clone()).await;
    let (transport, senders) = ScriptedTransport::new(2);

    let (state_tx, _state_rx) = rategrid::stream::connection_watch();
    let supervisor = tokio::spawn(run_supervisor(
        engine.clone(),
        transport.clone(),
        auth(),
        config,
        state_tx,
    ));

    // Say nothing on session one; the timer must trip and roll over to
    // session two, resyncing on the way.
    let mut window_rx = engine.notify.subscribe_window();
    assert_eq!(
        timeout(Duration::from_secs(5), window_rx.recv()).await.unwrap().unwrap(),
        WindowEvent::WindowLoaded
    );
    assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
    assert_eq!(backend.fetches.load(Ordering::SeqCst), 2);

    drop(senders);
    timeout(Duration::from_secs(5), supervisor).await.unwrap().unwrap();
}

#[tokio::test]
async fn reconnect_budget_exhausts_to_disconnected() {
    init_tracing();
    let backend = CountingBackend::new(&[101]);
    let config = SyncConfig {
        max_reconnect_attempts: 2,
        ..test_config()
    };
    let engine = load_engine(backend, config.clone()).await;
    let (transport, _senders) = ScriptedTransport::new(0); // every connect fails

    let (state_tx, state_rx) = rategrid::stream::connection_watch();
    timeout(
        Duration::from_secs(5),
        run_supervisor(engine, transport.clone(), auth(), config, state_tx),
    )
    .await
    .unwrap();

    assert_eq!(*state_rx.borrow(), ConnectionState::Disconnected);
    assert_eq!(transport.connects.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn sync_completed_over_the_stream_settles_a_pending_edit() {
    init_tracing();
    let backend = CountingBackend::new(&[101]);
    let config = test_config();
    let engine = load_engine(backend, config.clone()).await;
    let (transport, senders) = ScriptedTransport::new(1);

    let (state_tx, _state_rx) = rategrid::stream::connection_watch();
    let supervisor = tokio::spawn(run_supervisor(
        engine.clone(),
        transport,
        auth(),
        config,
        state_tx,
    ));

    engine.begin_edit(101, d("2025-09-12"), FieldKind::Rate).await.unwrap();
    engine
        .commit_edit(101, d("2025-09-12"), FieldEdit::Rate(Some(275.0)))
        .await
        .unwrap();
    assert_eq!(engine.sync_snapshot().await.pending_count, 1);

    let mut window_rx = engine.notify.subscribe_window();
    let at = Utc::now();
    push(&senders[0], PushEvent::SyncCompleted { range: None, at });
    assert_eq!(
        timeout(Duration::from_secs(5), window_rx.recv()).await.unwrap().unwrap(),
        WindowEvent::SyncStatusChanged
    );

    let status = engine.sync_snapshot().await;
    assert_eq!(status.pending_count, 0);
    assert_eq!(status.error_count, 0);
    assert_eq!(status.last_global_sync, Some(at));
    assert_eq!(
        engine.cell_state(101, d("2025-09-12")).await.unwrap().rate,
        Some(275.0)
    );

    drop(senders);
    timeout(Duration::from_secs(5), supervisor).await.unwrap().unwrap();
}
