// Presentation-only fields derived from the current match state.
//
// Pure functions: nothing here mutates the snapshot or performs I/O. The
// live view recomputes the projection after every state change.

use crate::protocol::{MatchId, MatchSnapshot, MatchStatus, PlayerLine};

/// Shown in place of an unknown striker or non-striker.
pub const NO_PLAYER: &str = "N/A";

/// Shown in place of an empty player list.
pub const NO_PLAYER_DATA: &str = "No player data available";

#[derive(Debug, Clone, PartialEq)]
pub struct SideView {
    pub name: String,
    pub score: u32,
    pub overs_label: String,
    pub players: Vec<PlayerLine>,
    /// `Some(NO_PLAYER_DATA)` when `players` is empty.
    pub placeholder: Option<&'static str>,
}

/// The current-delivery panel. Only present while the match is live.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentDelivery {
    pub striker: String,
    pub non_striker: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchView {
    pub match_id: MatchId,
    pub is_live: bool,
    pub status_label: String,
    pub team1: SideView,
    pub team2: SideView,
    pub venue: String,
    pub current: Option<CurrentDelivery>,
}

/// What a live match page shows, given the view's loading and error state.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchPage {
    Loading,
    NotFound { error: Option<String> },
    Ready { view: MatchView, error: Option<String> },
}

pub fn is_live(snapshot: &MatchSnapshot) -> bool {
    snapshot.status == MatchStatus::Ongoing
}

pub fn project(snapshot: &MatchSnapshot) -> MatchView {
    let live = is_live(snapshot);
    MatchView {
        match_id: snapshot.match_id.clone(),
        is_live: live,
        status_label: snapshot.status.to_string(),
        team1: side(
            &snapshot.team1_name,
            snapshot.team1_score,
            snapshot.team1_overs,
            &snapshot.team1_players,
        ),
        team2: side(
            &snapshot.team2_name,
            snapshot.team2_score,
            snapshot.team2_overs,
            &snapshot.team2_players,
        ),
        venue: snapshot.stadium_name.clone(),
        current: live.then(|| CurrentDelivery {
            striker: player_or_placeholder(snapshot.striker.as_deref()),
            non_striker: player_or_placeholder(snapshot.non_striker.as_deref()),
        }),
    }
}

pub fn page(loading: bool, snapshot: Option<&MatchSnapshot>, error: Option<&str>) -> MatchPage {
    let error = error.map(str::to_string);
    match (loading, snapshot) {
        (true, _) => MatchPage::Loading,
        (false, None) => MatchPage::NotFound { error },
        (false, Some(snapshot)) => MatchPage::Ready {
            view: project(snapshot),
            error,
        },
    }
}

fn side(name: &str, score: u32, overs: f64, players: &[PlayerLine]) -> SideView {
    SideView {
        name: name.to_string(),
        score,
        overs_label: format!("{overs} overs"),
        players: players.to_vec(),
        placeholder: players.is_empty().then_some(NO_PLAYER_DATA),
    }
}

fn player_or_placeholder(name: Option<&str>) -> String {
    match name {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => NO_PLAYER.to_string(),
    }
}
