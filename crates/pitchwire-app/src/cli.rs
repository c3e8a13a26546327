use clap::{Parser, Subcommand};
use pitchwire_core::projection::{MatchPage, MatchView, SideView};

#[derive(Debug, Parser)]
#[clap(name = "pitchwire", version)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and remember the session
    Login { username: String, password: String },

    /// Register a new account and sign in
    Signup {
        username: String,
        full_name: String,
        password: String,
    },

    /// Forget the stored session
    Logout,

    /// Follow a match live until Ctrl+C
    Watch { match_id: String },
}

/// One-line rendering of a live match page.
pub fn scoreboard(page: &MatchPage) -> String {
    match page {
        MatchPage::Loading => "Loading match details...".to_string(),
        MatchPage::NotFound { error } => match error {
            Some(error) => format!("Match not found ({error})"),
            None => "Match not found".to_string(),
        },
        MatchPage::Ready { view, error } => {
            let mut line = match_line(view);
            if let Some(error) = error {
                line.push_str(&format!(" [{error}]"));
            }
            line
        }
    }
}

fn match_line(view: &MatchView) -> String {
    let badge = if view.is_live { "LIVE " } else { "" };
    let mut line = format!(
        "{badge}{} vs {} @ {} [{}]",
        side_line(&view.team1),
        side_line(&view.team2),
        view.venue,
        view.status_label
    );
    if let Some(current) = &view.current {
        line.push_str(&format!(
            " | striker: {}, non-striker: {}",
            current.striker, current.non_striker
        ));
    }
    line
}

fn side_line(side: &SideView) -> String {
    format!("{} {} ({})", side.name, side.score, side.overs_label)
}
