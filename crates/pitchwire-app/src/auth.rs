// Login, signup and logout against the backend's user endpoints.
//
// A successful call writes the user into the session store, which in turn
// wakes every session guard watching it.

use std::sync::Arc;
use std::time::Duration;

use pitchwire_core::protocol::User;
use pitchwire_core::session::{SessionError, SessionStore};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Role attached to every self-service registration.
const SIGNUP_PLAYER_ROLE: &str = "BATSMAN";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server rejected the request with status {0}")]
    Rejected(u16),

    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("failed to store session: {0}")]
    Session(#[from] SessionError),
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignupRequest<'a> {
    username: &'a str,
    full_name: &'a str,
    password: &'a str,
    player_role: &'a str,
}

#[derive(Deserialize)]
struct UserResponse {
    #[serde(deserialize_with = "string_or_number")]
    user_id: String,
    username: String,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
    })
}

pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    session: Arc<SessionStore>,
}

impl AuthClient {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        session: Arc<SessionStore>,
    ) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(AuthClient {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
        })
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let body = LoginRequest { username, password };
        let user = self.post_user("users/login", &body).await?;
        info!("Logged in as {}", user.username);
        Ok(user)
    }

    pub async fn signup(
        &self,
        username: &str,
        full_name: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let body = SignupRequest {
            username,
            full_name,
            password,
            player_role: SIGNUP_PLAYER_ROLE,
        };
        let user = self.post_user("users/register", &body).await?;
        info!("Registered and logged in as {}", user.username);
        Ok(user)
    }

    /// Forget the signed-in user. Local only; the backend keeps no session.
    pub fn logout(&self) -> Result<(), AuthError> {
        self.session.clear()?;
        info!("Logged out");
        Ok(())
    }

    async fn post_user<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<User, AuthError> {
        let url = format!("{}/{}", self.base_url, path);
        let response = self.http.post(&url).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!("{} returned {}", url, status);
            return Err(AuthError::Rejected(status.as_u16()));
        }

        let body = response.bytes().await?;
        let parsed: UserResponse = serde_json::from_slice(&body)?;
        // The backend reports no roles; every signed-in user administers.
        let user = User {
            user_id: parsed.user_id,
            username: parsed.username,
            is_admin: true,
        };
        self.session.set(user.clone())?;
        Ok(user)
    }
}
