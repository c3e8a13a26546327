// One-shot snapshot fetch.

use std::time::Duration;

use async_trait::async_trait;
use pitchwire_core::error::FetchError;
use pitchwire_core::protocol::{MatchId, MatchSnapshot};
use tracing::{info, warn};

/// Source of the authoritative match state.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self, match_id: &MatchId) -> Result<MatchSnapshot, FetchError>;
}

/// Fetches `GET {base}/matches/{id}` over HTTP.
pub struct HttpSnapshotLoader {
    http: reqwest::Client,
    base_url: String,
}

impl HttpSnapshotLoader {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        Ok(Self::with_client(http, base_url))
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        HttpSnapshotLoader { http, base_url }
    }

    /// `{base}/matches/{id}` with the id percent-encoded as a single path
    /// segment.
    fn url(&self, match_id: &MatchId) -> Result<reqwest::Url, FetchError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| FetchError::Transport(format!("invalid base URL {}: {e}", self.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| FetchError::Transport(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .push("matches")
            .push(match_id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotLoader {
    async fn fetch(&self, match_id: &MatchId) -> Result<MatchSnapshot, FetchError> {
        let url = self.url(match_id)?;
        info!("Fetching snapshot from {}", url);

        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            warn!("Snapshot fetch for match {} returned {}", match_id, status);
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| FetchError::Transport(e.to_string()))?;
        serde_json::from_slice(&body).map_err(|e| FetchError::Malformed(e.to_string()))
    }
}
