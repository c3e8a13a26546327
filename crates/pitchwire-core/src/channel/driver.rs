// Async driver for the push channel.
//
// Runs a `ChannelMachine` against a real (or fake) transport: feeds it
// frames, timer expiries and shutdown, and carries out the actions it
// returns. Every event sent upstream is tagged with the generation the
// channel was opened under.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::machine::{ChannelAction, ChannelInput, ChannelMachine, ReconnectPolicy};
use super::transport::{Connector, FrameSource};
use crate::error::{ChannelError, LiveError};
use crate::protocol::{FeedEvent, MatchId};

/// How long `ChannelHandle::close` waits for the driver to finish its close
/// handshake before aborting it.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Owner of a running push channel. Dropping the handle also shuts the
/// channel down, since the driver treats a dropped shutdown sender the same
/// as an explicit close.
pub struct ChannelHandle {
    generation: u64,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    /// Spawn a driver for `match_id`. Must be called from within a tokio
    /// runtime.
    pub fn open(
        connector: Arc<dyn Connector>,
        match_id: MatchId,
        policy: ReconnectPolicy,
        generation: u64,
        tx: mpsc::Sender<FeedEvent>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let machine = ChannelMachine::new(match_id, policy);
        let task = tokio::spawn(run(connector, machine, generation, tx, shutdown_rx));
        ChannelHandle {
            generation,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Tear the channel down: cancel any pending reconnect and close the
    /// transport. Returns once the driver has exited.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            match tokio::time::timeout(CLOSE_GRACE, task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Push channel task failed: {}", e),
                Err(_) => {
                    warn!("Push channel did not close within {:?}, aborting", CLOSE_GRACE);
                    abort.abort();
                }
            }
        }
    }
}

/// Drive `machine` until it is torn down.
pub async fn run(
    connector: Arc<dyn Connector>,
    mut machine: ChannelMachine,
    generation: u64,
    tx: mpsc::Sender<FeedEvent>,
    shutdown: oneshot::Receiver<()>,
) {
    let mut shutdown = Shutdown::new(shutdown);
    let mut pending = VecDeque::from([ChannelInput::Activate]);
    let mut source: Option<Box<dyn FrameSource>> = None;
    let mut reconnect_at: Option<Instant> = None;

    loop {
        let input = match pending.pop_front() {
            Some(input) => input,
            None => next_input(&mut shutdown, &mut source, reconnect_at).await,
        };
        if input == ChannelInput::ReconnectDue {
            reconnect_at = None;
        }

        let before = machine.state().clone();
        let actions = machine.handle(input);

        if machine.state() != &before && !machine.is_torn_down() {
            let event = FeedEvent::Channel {
                generation,
                state: machine.state().clone(),
            };
            if !deliver(&tx, event, &mut shutdown).await {
                pending.push_front(ChannelInput::Teardown);
            }
        }

        for action in actions {
            match action {
                ChannelAction::Connect => {
                    let result = tokio::select! {
                        biased;
                        _ = shutdown.wait() => {
                            pending.push_front(ChannelInput::Teardown);
                            continue;
                        }
                        result = connector.connect() => result,
                    };
                    match result {
                        Ok(connected) => {
                            source = Some(connected);
                            pending.push_back(ChannelInput::Established);
                        }
                        Err(e) => {
                            let failure = LiveError::ChannelFailure(e);
                            pending.push_back(ChannelInput::TransportError(failure.to_string()));
                        }
                    }
                }
                ChannelAction::Forward(update) => {
                    let event = FeedEvent::Update { generation, update };
                    if !deliver(&tx, event, &mut shutdown).await {
                        pending.push_front(ChannelInput::Teardown);
                    }
                }
                ChannelAction::ScheduleReconnect(delay) => {
                    reconnect_at = Some(Instant::now() + delay);
                }
                ChannelAction::CancelReconnect => {
                    reconnect_at = None;
                }
                ChannelAction::CloseTransport => {
                    if let Some(mut open) = source.take() {
                        open.close().await;
                    }
                }
            }
        }

        if machine.is_torn_down() {
            debug!("Push channel driver for match {} exiting", machine.match_id());
            break;
        }
    }
}

/// The shutdown signal. A oneshot receiver must not be polled again once it
/// has resolved, so the outcome is latched and later waits return at once.
struct Shutdown {
    rx: oneshot::Receiver<()>,
    fired: bool,
}

impl Shutdown {
    fn new(rx: oneshot::Receiver<()>) -> Self {
        Shutdown { rx, fired: false }
    }

    /// Resolves on an explicit close or when the handle is dropped.
    async fn wait(&mut self) {
        if !self.fired {
            let _ = (&mut self.rx).await;
            self.fired = true;
        }
    }
}

/// Send `event` upstream unless shutdown arrives first; a full feed must
/// not keep the driver from seeing its own teardown. Returns `false` when
/// the driver should tear down instead.
async fn deliver(tx: &mpsc::Sender<FeedEvent>, event: FeedEvent, shutdown: &mut Shutdown) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.wait() => false,
        sent = tx.send(event) => {
            if sent.is_err() {
                debug!("Feed receiver gone, tearing down push channel");
            }
            sent.is_ok()
        }
    }
}

/// Wait for whichever comes first: shutdown, a frame on the open transport,
/// or the reconnect timer. Shutdown wins ties.
async fn next_input(
    shutdown: &mut Shutdown,
    source: &mut Option<Box<dyn FrameSource>>,
    reconnect_at: Option<Instant>,
) -> ChannelInput {
    tokio::select! {
        biased;
        _ = shutdown.wait() => ChannelInput::Teardown,
        frame = next_frame(source) => match frame {
            Some(Ok(text)) => ChannelInput::Frame(text),
            Some(Err(e)) => ChannelInput::TransportError(LiveError::ChannelFailure(e).to_string()),
            None => ChannelInput::ClosedByPeer,
        },
        _ = reconnect_timer(reconnect_at) => ChannelInput::ReconnectDue,
    }
}

async fn next_frame(source: &mut Option<Box<dyn FrameSource>>) -> Option<Result<String, ChannelError>> {
    match source {
        Some(open) => open.next_frame().await,
        None => std::future::pending().await,
    }
}

async fn reconnect_timer(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
