// Injectable session store.
//
// Holds the signed-in user, persists it through a pluggable backend, and
// publishes every change on a `watch` channel so the session guard can
// re-evaluate access whenever the identity or its loading flag changes.

use std::sync::Mutex;

use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::protocol::{IdentityState, User};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("stored session is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("failed to prepare session storage: {0}")]
    Io(#[from] std::io::Error),
}

/// Persistence for the signed-in user.
pub trait SessionBackend: Send + Sync {
    fn load(&self) -> Result<Option<User>, SessionError>;
    fn save(&self, user: &User) -> Result<(), SessionError>;
    fn remove(&self) -> Result<(), SessionError>;
}

/// Process-local backend; nothing survives a restart.
#[derive(Default)]
pub struct MemoryBackend {
    user: Mutex<Option<User>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that already holds `user`, as if restored from disk.
    pub fn with_user(user: User) -> Self {
        MemoryBackend {
            user: Mutex::new(Some(user)),
        }
    }
}

impl SessionBackend for MemoryBackend {
    fn load(&self) -> Result<Option<User>, SessionError> {
        Ok(self.user.lock().expect("session mutex poisoned").clone())
    }

    fn save(&self, user: &User) -> Result<(), SessionError> {
        *self.user.lock().expect("session mutex poisoned") = Some(user.clone());
        Ok(())
    }

    fn remove(&self) -> Result<(), SessionError> {
        *self.user.lock().expect("session mutex poisoned") = None;
        Ok(())
    }
}

/// The ambient identity. Starts out resolving; `initialize()` restores the
/// persisted user and marks the identity resolved.
pub struct SessionStore {
    backend: Box<dyn SessionBackend>,
    state: watch::Sender<IdentityState>,
}

impl SessionStore {
    pub fn new(backend: Box<dyn SessionBackend>) -> Self {
        let (state, _) = watch::channel(IdentityState::resolving());
        SessionStore { backend, state }
    }

    /// Restore the persisted user. A backend that cannot be read is treated
    /// as "signed out" so the guard can still resolve and redirect.
    pub fn initialize(&self) {
        let identity = match self.backend.load() {
            Ok(user) => user,
            Err(e) => {
                warn!("Failed to restore session, treating as signed out: {}", e);
                None
            }
        };
        match &identity {
            Some(user) => info!("Restored session for {}", user.username),
            None => info!("No stored session"),
        }
        self.state.send_replace(IdentityState::resolved(identity));
    }

    pub fn get(&self) -> Option<User> {
        self.state.borrow().identity.clone()
    }

    pub fn current(&self) -> IdentityState {
        self.state.borrow().clone()
    }

    /// Persist `user` and publish it. The in-memory identity only changes
    /// once the backend write succeeds.
    pub fn set(&self, user: User) -> Result<(), SessionError> {
        self.backend.save(&user)?;
        self.state.send_replace(IdentityState::resolved(Some(user)));
        Ok(())
    }

    /// Forget the signed-in user.
    pub fn clear(&self) -> Result<(), SessionError> {
        self.backend.remove()?;
        self.state.send_replace(IdentityState::resolved(None));
        Ok(())
    }

    /// Change notifications for the identity. The receiver sees the current
    /// value immediately and every later change.
    pub fn subscribe(&self) -> watch::Receiver<IdentityState> {
        self.state.subscribe()
    }
}
