// Fakes shared by the live view integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pitchwire_app::guard::SessionGuard;
use pitchwire_app::snapshot::SnapshotSource;
use pitchwire_app::view::{self, ViewCommand, ViewDeps, ViewUpdate};
use pitchwire_core::channel::{Connector, FrameSource, ReconnectPolicy};
use pitchwire_core::error::{ChannelError, FetchError};
use pitchwire_core::projection::MatchPage;
use pitchwire_core::protocol::{ChannelState, MatchId, MatchSnapshot, MatchStatus, User};
use pitchwire_core::session::{MemoryBackend, SessionStore};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

pub fn alice() -> User {
    User {
        user_id: "u1".into(),
        username: "alice".into(),
        is_admin: true,
    }
}

pub fn snapshot(id: &str, status: MatchStatus) -> MatchSnapshot {
    MatchSnapshot {
        match_id: MatchId::new(id),
        team1_name: "Lions".into(),
        team2_name: "Tigers".into(),
        team1_score: 0,
        team2_score: 0,
        team1_overs: 0.0,
        team2_overs: 0.0,
        status,
        stadium_name: "Eden".into(),
        striker: None,
        non_striker: None,
        team1_players: vec![],
        team2_players: vec![],
    }
}

/// Snapshot source with canned results per match id.
#[derive(Default)]
pub struct FakeSnapshots {
    results: Mutex<HashMap<String, Result<MatchSnapshot, FetchError>>>,
    calls: AtomicUsize,
    /// When set, every fetch waits for a permit before answering.
    gate: Option<Arc<Notify>>,
}

impl FakeSnapshots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        FakeSnapshots {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn with(self, id: &str, result: Result<MatchSnapshot, FetchError>) -> Self {
        self.results.lock().unwrap().insert(id.to_string(), result);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for FakeSnapshots {
    async fn fetch(&self, match_id: &MatchId) -> Result<MatchSnapshot, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.results
            .lock()
            .unwrap()
            .get(match_id.as_str())
            .cloned()
            .unwrap_or(Err(FetchError::Status(404)))
    }
}

/// Test-side end of one scripted connection.
pub struct ServerFeed {
    tx: mpsc::UnboundedSender<Option<Result<String, ChannelError>>>,
}

impl ServerFeed {
    pub fn push(&self, json: &str) {
        let _ = self.tx.send(Some(Ok(json.to_string())));
    }

    pub fn fail(&self, message: &str) {
        let _ = self.tx.send(Some(Err(ChannelError::Transport(message.into()))));
    }

    pub fn close(&self) {
        let _ = self.tx.send(None);
    }
}

/// Connector that hands out pre-registered connections in order and refuses
/// once they run out.
#[derive(Default)]
pub struct FakeConnector {
    sessions: Mutex<VecDeque<mpsc::UnboundedReceiver<Option<Result<String, ChannelError>>>>>,
    attempts: AtomicUsize,
    closed: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the next connection the client will get.
    pub fn accept_next(&self) -> ServerFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.lock().unwrap().push_back(rx);
        ServerFeed { tx }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Connections the client closed from its side.
    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for FakeConnector {
    async fn connect(&self) -> Result<Box<dyn FrameSource>, ChannelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.sessions.lock().unwrap().pop_front();
        match next {
            Some(rx) => Ok(Box::new(FakeSource {
                rx,
                closed: Arc::clone(&self.closed),
            })),
            None => Err(ChannelError::Connect {
                url: "ws://fake/api/matches/summary".into(),
                message: "connection refused".into(),
            }),
        }
    }
}

struct FakeSource {
    rx: mpsc::UnboundedReceiver<Option<Result<String, ChannelError>>>,
    closed: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSource for FakeSource {
    async fn next_frame(&mut self) -> Option<Result<String, ChannelError>> {
        match self.rx.recv().await {
            Some(frame) => frame,
            // Test dropped its feed: hold the connection open.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// A running live view plus the handles a test drives it with.
pub struct Harness {
    pub session: Arc<SessionStore>,
    pub snapshots: Arc<FakeSnapshots>,
    pub connector: Arc<FakeConnector>,
    pub cmd_tx: mpsc::Sender<ViewCommand>,
    pub ui_rx: mpsc::Receiver<ViewUpdate>,
    pub task: JoinHandle<anyhow::Result<()>>,
}

impl Harness {
    /// Start a view over `session`. The store is not initialized here so
    /// tests can observe the resolving phase.
    pub fn start(
        session: SessionStore,
        snapshots: FakeSnapshots,
        connector: Arc<FakeConnector>,
    ) -> Self {
        let session = Arc::new(session);
        let snapshots = Arc::new(snapshots);
        let deps = ViewDeps {
            snapshots: Arc::clone(&snapshots) as Arc<dyn SnapshotSource>,
            connector: Arc::clone(&connector) as Arc<dyn Connector>,
            reconnect: ReconnectPolicy::default(),
        };
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let (ui_tx, ui_rx) = mpsc::channel(64);
        let guard = SessionGuard::new(session.subscribe());
        let task = tokio::spawn(view::run(deps, guard, cmd_rx, ui_tx));
        Harness {
            session,
            snapshots,
            connector,
            cmd_tx,
            ui_rx,
            task,
        }
    }

    pub async fn show(&self, id: &str) {
        self.cmd_tx
            .send(ViewCommand::Show(MatchId::new(id)))
            .await
            .unwrap();
    }

    /// Next update matching `pred`, skipping the rest. Fails the test if
    /// nothing matches within a minute of (virtual) time.
    pub async fn wait_for(&mut self, mut pred: impl FnMut(&ViewUpdate) -> bool) -> ViewUpdate {
        let wait = async {
            loop {
                match self.ui_rx.recv().await {
                    Some(update) if pred(&update) => return update,
                    Some(_) => continue,
                    None => panic!("live view stopped"),
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(60), wait)
            .await
            .expect("timed out waiting for view update")
    }

    /// Next `Ready` page.
    pub async fn ready_page(&mut self) -> MatchPage {
        match self
            .wait_for(|u| matches!(u, ViewUpdate::Page(p) if matches!(**p, MatchPage::Ready { .. })))
            .await
        {
            ViewUpdate::Page(page) => *page,
            _ => unreachable!(),
        }
    }

    /// Wait until the view has both a ready page and an open channel, in
    /// either order. Returns the latest ready page.
    pub async fn ready_and_open(&mut self) -> MatchPage {
        let mut page = None;
        let mut open = false;
        while page.is_none() || !open {
            let update = self
                .wait_for(|u| {
                    matches!(u, ViewUpdate::Page(_) | ViewUpdate::Channel(ChannelState::Open))
                })
                .await;
            match update {
                ViewUpdate::Page(p) if matches!(*p, MatchPage::Ready { .. }) => page = Some(*p),
                ViewUpdate::Channel(_) => open = true,
                _ => {}
            }
        }
        page.expect("loop exits only with a page")
    }

    pub async fn channel_state(&mut self, state: ChannelState) {
        self.wait_for(|u| *u == ViewUpdate::Channel(state.clone()))
            .await;
    }

    /// Close the view and wait for its loop to exit.
    pub async fn close(self) -> (Arc<FakeSnapshots>, Arc<FakeConnector>) {
        let Harness {
            snapshots,
            connector,
            cmd_tx,
            mut ui_rx,
            task,
            ..
        } = self;
        cmd_tx.send(ViewCommand::Close).await.unwrap();
        let drain = async { while ui_rx.recv().await.is_some() {} };
        let (_, result) = tokio::join!(drain, task);
        result.unwrap().unwrap();
        (snapshots, connector)
    }
}

pub fn signed_in() -> SessionStore {
    let store = SessionStore::new(Box::new(MemoryBackend::with_user(alice())));
    store.initialize();
    store
}

pub fn signed_out() -> SessionStore {
    let store = SessionStore::new(Box::new(MemoryBackend::new()));
    store.initialize();
    store
}
