// Live match view: the per-view event loop.
//
// Owns the snapshot for one viewed match and wires the guard, the snapshot
// loader and the push channel together. Everything that mutates view state
// runs on this task; the fetch and the channel report back through a single
// feed of generation-tagged events.
//
// **Generation check**: each activation bumps `generation`. Events carrying
// an older generation come from a fetch or channel that has since been torn
// down and are discarded, so a late response can never touch the current
// view.

use std::sync::Arc;

use pitchwire_core::channel::{ChannelHandle, Connector, ReconnectPolicy};
use pitchwire_core::error::LiveError;
use pitchwire_core::merge;
use pitchwire_core::projection::{self, MatchPage};
use pitchwire_core::protocol::{ChannelState, FeedEvent, MatchId, MatchSnapshot};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::guard::{Access, SessionGuard};
use crate::snapshot::SnapshotSource;

/// Collaborators a live view needs.
#[derive(Clone)]
pub struct ViewDeps {
    pub snapshots: Arc<dyn SnapshotSource>,
    pub connector: Arc<dyn Connector>,
    pub reconnect: ReconnectPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewCommand {
    /// Navigate to a match. Re-showing the current match is a no-op.
    Show(MatchId),
    /// Deactivate the view and stop the event loop.
    Close,
}

/// What the front end should render next.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    Redirect(&'static str),
    Page(Box<MatchPage>),
    Channel(ChannelState),
}

/// Everything tied to one (user, match) activation.
struct Activation {
    user_id: String,
    match_id: MatchId,
    channel: ChannelHandle,
    fetch: JoinHandle<()>,
}

struct LiveView {
    deps: ViewDeps,
    feed_tx: mpsc::Sender<FeedEvent>,
    ui_tx: mpsc::Sender<ViewUpdate>,
    access: Access,
    target: Option<MatchId>,
    generation: u64,
    activation: Option<Activation>,
    snapshot: Option<MatchSnapshot>,
    error: Option<String>,
    loading: bool,
}

impl LiveView {
    fn new(deps: ViewDeps, feed_tx: mpsc::Sender<FeedEvent>, ui_tx: mpsc::Sender<ViewUpdate>) -> Self {
        LiveView {
            deps,
            feed_tx,
            ui_tx,
            access: Access::Pending,
            target: None,
            generation: 0,
            activation: None,
            snapshot: None,
            error: None,
            loading: true,
        }
    }

    async fn on_access(&mut self, access: Access) {
        self.access = access;
        self.reconcile().await;
    }

    async fn show(&mut self, match_id: MatchId) {
        if self.target.as_ref() == Some(&match_id) {
            return;
        }
        info!("Showing match {}", match_id);
        self.target = Some(match_id);
        self.reconcile().await;
    }

    /// Bring the activation in line with the current access decision and
    /// target match.
    async fn reconcile(&mut self) {
        match self.access.clone() {
            Access::Pending => {
                self.send(ViewUpdate::Page(Box::new(MatchPage::Loading))).await;
            }
            Access::Redirect(route) => {
                info!("{}, redirecting to {}", LiveError::AuthRequired, route);
                self.teardown().await;
                self.send(ViewUpdate::Redirect(route)).await;
            }
            Access::Granted(user) => {
                let Some(target) = self.target.clone() else {
                    return;
                };
                let current = self
                    .activation
                    .as_ref()
                    .is_some_and(|a| a.user_id == user.user_id && a.match_id == target);
                if current {
                    return;
                }
                self.teardown().await;
                self.activate(user.user_id, target).await;
            }
        }
    }

    async fn activate(&mut self, user_id: String, match_id: MatchId) {
        self.generation += 1;
        let generation = self.generation;
        info!(
            "Activating live view for match {} (gen: {})",
            match_id, generation
        );

        self.snapshot = None;
        self.error = None;
        self.loading = true;

        let fetch = {
            let snapshots = Arc::clone(&self.deps.snapshots);
            let tx = self.feed_tx.clone();
            let match_id = match_id.clone();
            tokio::spawn(async move {
                let result = snapshots.fetch(&match_id).await;
                let _ = tx.send(FeedEvent::Snapshot { generation, result }).await;
            })
        };

        let channel = ChannelHandle::open(
            Arc::clone(&self.deps.connector),
            match_id.clone(),
            self.deps.reconnect.clone(),
            generation,
            self.feed_tx.clone(),
        );

        self.activation = Some(Activation {
            user_id,
            match_id,
            channel,
            fetch,
        });
        self.publish_page().await;
    }

    /// Cancel the fetch, close the channel and invalidate anything still in
    /// flight for the old activation.
    async fn teardown(&mut self) {
        let Some(activation) = self.activation.take() else {
            return;
        };
        info!(
            "Tearing down live view for match {} (gen: {})",
            activation.match_id,
            activation.channel.generation()
        );
        activation.fetch.abort();
        activation.channel.close().await;
        self.generation += 1;
        self.snapshot = None;
        self.error = None;
        self.loading = true;
    }

    async fn handle_feed(&mut self, event: FeedEvent) {
        if event.generation() != self.generation {
            debug!(
                "Ignoring stale feed event (gen {} != current {})",
                event.generation(),
                self.generation
            );
            return;
        }

        match event {
            FeedEvent::Snapshot { result, .. } => {
                self.loading = false;
                match result {
                    Ok(snapshot) => {
                        info!("Loaded snapshot for match {}", snapshot.match_id);
                        self.snapshot = Some(snapshot);
                        self.error = None;
                    }
                    Err(e) => {
                        let err = LiveError::from(e);
                        warn!("{}", err);
                        self.snapshot = None;
                        self.error = err.banner().map(str::to_string);
                    }
                }
                self.publish_page().await;
            }
            FeedEvent::Channel { state, .. } => {
                self.send(ViewUpdate::Channel(state)).await;
            }
            FeedEvent::Update { update, .. } => match self.snapshot.as_mut() {
                Some(snapshot) => {
                    merge::apply(snapshot, &update);
                    self.publish_page().await;
                }
                None => {
                    debug!(
                        "Dropping update for match {}: no snapshot loaded",
                        update.match_id
                    );
                }
            },
        }
    }

    async fn publish_page(&self) {
        let page = projection::page(self.loading, self.snapshot.as_ref(), self.error.as_deref());
        self.send(ViewUpdate::Page(Box::new(page))).await;
    }

    async fn send(&self, update: ViewUpdate) {
        let _ = self.ui_tx.send(update).await;
    }
}

/// Run a live view until `ViewCommand::Close` arrives or the command
/// channel closes. The view is torn down before returning.
pub async fn run(
    deps: ViewDeps,
    mut guard: SessionGuard,
    mut cmd_rx: mpsc::Receiver<ViewCommand>,
    ui_tx: mpsc::Sender<ViewUpdate>,
) -> anyhow::Result<()> {
    info!("Live view event loop started");

    let (feed_tx, mut feed_rx) = mpsc::channel(256);
    let mut view = LiveView::new(deps, feed_tx, ui_tx);
    view.on_access(guard.current()).await;

    // Once the session store is dropped the last decision stands.
    let mut guard_open = true;

    loop {
        tokio::select! {
            access = guard.changed(), if guard_open => {
                match access {
                    Some(access) => view.on_access(access).await,
                    None => {
                        debug!("Session store closed");
                        guard_open = false;
                    }
                }
            }
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ViewCommand::Show(match_id)) => view.show(match_id).await,
                    Some(ViewCommand::Close) | None => {
                        view.teardown().await;
                        break;
                    }
                }
            }
            Some(event) = feed_rx.recv() => {
                view.handle_feed(event).await;
            }
        }
    }

    info!("Live view event loop stopped");
    Ok(())
}
