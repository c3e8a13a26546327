// Push channel lifecycle as an explicit state machine.
//
// `ChannelMachine::handle` is a pure transition function: it takes one input
// (a transport event, a timer firing, a teardown request) and returns the
// actions the driver must perform. It never touches a socket or a clock,
// so every transition is testable on its own.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::LiveError;
use crate::protocol::{ChannelState, CloseReason, MatchId, PartialUpdate};

/// Reconnect delay of the live feed unless configured otherwise.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

/// How long to wait before reconnecting after the channel closes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same delay every time, retried forever.
    Fixed(Duration),
    /// `initial`, doubling per consecutive failure, capped at `max`. The
    /// count resets once a connection opens.
    Exponential { initial: Duration, max: Duration },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed(DEFAULT_RECONNECT_DELAY)
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            ReconnectPolicy::Fixed(delay) => *delay,
            ReconnectPolicy::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(*max)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelInput {
    /// Authorization is confirmed and the target match is known.
    Activate,
    /// The transport finished its handshake.
    Established,
    /// A text frame arrived.
    Frame(String),
    /// Connect failed or the open transport errored.
    TransportError(String),
    /// The server closed the connection cleanly.
    ClosedByPeer,
    /// The reconnect timer fired.
    ReconnectDue,
    /// The owning view deactivated.
    Teardown,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelAction {
    Connect,
    Forward(PartialUpdate),
    ScheduleReconnect(Duration),
    CancelReconnect,
    CloseTransport,
}

#[derive(Debug)]
pub struct ChannelMachine {
    match_id: MatchId,
    policy: ReconnectPolicy,
    state: ChannelState,
    /// Consecutive closes since the channel was last OPEN.
    failures: u32,
}

impl ChannelMachine {
    pub fn new(match_id: MatchId, policy: ReconnectPolicy) -> Self {
        ChannelMachine {
            match_id,
            policy,
            state: ChannelState::Idle,
            failures: 0,
        }
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    pub fn match_id(&self) -> &MatchId {
        &self.match_id
    }

    /// Once torn down the machine ignores every input.
    pub fn is_torn_down(&self) -> bool {
        self.state == ChannelState::Closed(CloseReason::Teardown)
    }

    pub fn handle(&mut self, input: ChannelInput) -> Vec<ChannelAction> {
        if self.is_torn_down() {
            debug!(?input, "channel torn down, ignoring input");
            return Vec::new();
        }

        match input {
            ChannelInput::Teardown => {
                info!("Tearing down push channel for match {}", self.match_id);
                self.state = ChannelState::Closed(CloseReason::Teardown);
                vec![ChannelAction::CancelReconnect, ChannelAction::CloseTransport]
            }
            ChannelInput::Activate if self.state == ChannelState::Idle => self.connect(),
            ChannelInput::ReconnectDue if matches!(self.state, ChannelState::Closed(_)) => {
                self.connect()
            }
            ChannelInput::Established if self.state == ChannelState::Connecting => {
                info!("Push channel open for match {}", self.match_id);
                self.state = ChannelState::Open;
                self.failures = 0;
                Vec::new()
            }
            ChannelInput::Frame(text) if self.state == ChannelState::Open => {
                self.accept_frame(&text)
                    .map(ChannelAction::Forward)
                    .into_iter()
                    .collect()
            }
            ChannelInput::TransportError(message) if self.state.is_active() => {
                warn!("Push channel error: {}", message);
                self.close(CloseReason::Error(message))
            }
            ChannelInput::ClosedByPeer if self.state.is_active() => {
                info!("Push channel closed by server");
                self.close(CloseReason::Normal)
            }
            other => {
                debug!(input = ?other, state = ?self.state, "ignoring channel input");
                Vec::new()
            }
        }
    }

    fn connect(&mut self) -> Vec<ChannelAction> {
        self.state = ChannelState::Connecting;
        vec![ChannelAction::Connect]
    }

    fn close(&mut self, reason: CloseReason) -> Vec<ChannelAction> {
        self.state = ChannelState::Closed(reason);
        self.failures = self.failures.saturating_add(1);
        let delay = self.policy.delay(self.failures);
        info!("Reconnecting push channel in {:?}", delay);
        vec![
            ChannelAction::CloseTransport,
            ChannelAction::ScheduleReconnect(delay),
        ]
    }

    /// Parse a frame and keep it only if it targets our match. Bad frames
    /// are logged and dropped; they never affect channel health.
    fn accept_frame(&self, text: &str) -> Option<PartialUpdate> {
        let update: PartialUpdate = match serde_json::from_str(text) {
            Ok(update) => update,
            Err(e) => {
                warn!("Discarding push frame: {}", LiveError::MalformedPushFrame(e));
                return None;
            }
        };

        if update.match_id != self.match_id {
            debug!(
                "Dropping update for match {} (viewing {})",
                update.match_id, self.match_id
            );
            return None;
        }

        Some(update)
    }
}
