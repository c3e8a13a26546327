// Wire and inter-task message types shared by the live match core.
//
// Everything the backend sends (snapshots, partial updates, users) and
// everything the push channel and snapshot loader send to the live view
// (`FeedEvent`) is defined here.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::FetchError;

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Unique key of a match. Push frames carry it so that a shared broadcast
/// topic can be filtered down to the match being viewed.
///
/// The backend emits string ids; integer ids are accepted and normalized to
/// their decimal form so both compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct MatchId(String);

impl MatchId {
    pub fn new(id: impl Into<String>) -> Self {
        MatchId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MatchId {
    fn from(id: &str) -> Self {
        MatchId(id.to_string())
    }
}

impl<'de> Deserialize<'de> for MatchId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Number(u64),
        }

        match RawId::deserialize(deserializer)? {
            RawId::Text(text) => Ok(MatchId(text)),
            RawId::Number(n) => Ok(MatchId(n.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Match state
// ---------------------------------------------------------------------------

/// Lifecycle status of a match. Parsing is case-insensitive; statuses the
/// client does not know are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MatchStatus {
    Scheduled,
    Ongoing,
    Completed,
    Abandoned,
    Other(String),
}

impl MatchStatus {
    pub fn as_str(&self) -> &str {
        match self {
            MatchStatus::Scheduled => "SCHEDULED",
            MatchStatus::Ongoing => "ONGOING",
            MatchStatus::Completed => "COMPLETED",
            MatchStatus::Abandoned => "ABANDONED",
            MatchStatus::Other(raw) => raw,
        }
    }
}

impl From<String> for MatchStatus {
    fn from(raw: String) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "SCHEDULED" => MatchStatus::Scheduled,
            "ONGOING" => MatchStatus::Ongoing,
            "COMPLETED" => MatchStatus::Completed,
            "ABANDONED" => MatchStatus::Abandoned,
            _ => MatchStatus::Other(raw),
        }
    }
}

impl From<MatchStatus> for String {
    fn from(status: MatchStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One batter's line on the scorecard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLine {
    pub player_id: String,
    pub player_name: String,
    #[serde(default)]
    pub runs: u32,
    #[serde(default)]
    pub balls: u32,
    #[serde(default)]
    pub wicket: bool,
}

/// Full authoritative state of a match, as returned by `GET /matches/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub match_id: MatchId,
    pub team1_name: String,
    pub team2_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub team1_score: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub team2_score: u32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub team1_overs: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub team2_overs: f64,
    pub status: MatchStatus,
    #[serde(default, deserialize_with = "null_as_default")]
    pub stadium_name: String,
    #[serde(default)]
    pub striker: Option<String>,
    #[serde(default)]
    pub non_striker: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub team1_players: Vec<PlayerLine>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub team2_players: Vec<PlayerLine>,
}

/// Sparse patch pushed over the live channel. `None` means "field absent".
///
/// `striker` and `non_striker` are nullable on the snapshot, so the patch
/// distinguishes an absent key (`None`) from an explicit `null`
/// (`Some(None)`), which clears the field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialUpdate {
    pub match_id: MatchId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team1_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team2_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team1_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team2_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team1_overs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team2_overs: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<MatchStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stadium_name: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub striker: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub non_striker: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team1_players: Option<Vec<PlayerLine>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub team2_players: Option<Vec<PlayerLine>>,
}

impl PartialUpdate {
    /// An update for `match_id` that touches no fields.
    pub fn new(match_id: MatchId) -> Self {
        PartialUpdate {
            match_id,
            team1_name: None,
            team2_name: None,
            team1_score: None,
            team2_score: None,
            team1_overs: None,
            team2_overs: None,
            status: None,
            stadium_name: None,
            striker: None,
            non_striker: None,
            team1_players: None,
            team2_players: None,
        }
    }
}

/// Treats an explicit `null` like a missing key. The backend sends nulls for
/// scores and venue before a match starts.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Marks a key as present even when its value is `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub is_admin: bool,
}

/// The ambient identity as seen by the session guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityState {
    pub identity: Option<User>,
    /// `true` until the session store has finished its startup check.
    pub resolving: bool,
}

impl IdentityState {
    pub fn resolving() -> Self {
        IdentityState {
            identity: None,
            resolving: true,
        }
    }

    pub fn resolved(identity: Option<User>) -> Self {
        IdentityState {
            identity,
            resolving: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Push channel status and feed events
// ---------------------------------------------------------------------------

/// Why the push channel left the OPEN/CONNECTING states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Transport error or failed connect attempt.
    Error(String),
    /// Clean close from either side.
    Normal,
    /// The owning view deactivated. Terminal.
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    Connecting,
    Open,
    Closed(CloseReason),
}

impl ChannelState {
    /// CONNECTING or OPEN: a transport exists or is being established.
    pub fn is_active(&self) -> bool {
        matches!(self, ChannelState::Connecting | ChannelState::Open)
    }
}

/// Events delivered to a live view by the tasks it spawned. Each carries the
/// generation of the activation that produced it; the view drops events
/// from any generation other than its current one.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Snapshot {
        generation: u64,
        result: Result<MatchSnapshot, FetchError>,
    },
    Channel {
        generation: u64,
        state: ChannelState,
    },
    Update {
        generation: u64,
        update: PartialUpdate,
    },
}

impl FeedEvent {
    pub fn generation(&self) -> u64 {
        match self {
            FeedEvent::Snapshot { generation, .. }
            | FeedEvent::Channel { generation, .. }
            | FeedEvent::Update { generation, .. } => *generation,
        }
    }
}
