// Error taxonomy for the live match core.

use thiserror::Error;

/// Why the one-shot snapshot fetch failed. Messages are kept as strings so
/// results can travel through feed channels and be compared in tests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("server responded with status {0}")]
    Status(u16),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("malformed snapshot body: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// The four failure classes of a live view. Only `SnapshotFetchFailed`
/// reaches the user; the rest are recovered where they occur.
#[derive(Debug, Error)]
pub enum LiveError {
    #[error("authentication required")]
    AuthRequired,

    #[error("failed to load match details: {0}")]
    SnapshotFetchFailed(#[from] FetchError),

    #[error("malformed push frame: {0}")]
    MalformedPushFrame(#[source] serde_json::Error),

    #[error("push channel failure: {0}")]
    ChannelFailure(#[from] ChannelError),
}

/// Banner text shown when the snapshot cannot be loaded.
pub const SNAPSHOT_ERROR_BANNER: &str = "Failed to load match details";

impl LiveError {
    /// Text to show the user, if this failure is user-visible at all.
    pub fn banner(&self) -> Option<&'static str> {
        match self {
            LiveError::SnapshotFetchFailed(_) => Some(SNAPSHOT_ERROR_BANNER),
            LiveError::AuthRequired
            | LiveError::MalformedPushFrame(_)
            | LiveError::ChannelFailure(_) => None,
        }
    }
}
