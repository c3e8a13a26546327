// Session guard for protected views.
//
// Maps the ambient identity onto one of three outcomes and re-evaluates
// whenever the session store publishes a change.

use pitchwire_core::protocol::{IdentityState, User};
use tokio::sync::watch;

/// Where unauthenticated callers are sent.
pub const LOGIN_ROUTE: &str = "/login";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    /// Identity is still resolving; render nothing protected yet.
    Pending,
    /// No identity; navigate here and render nothing further.
    Redirect(&'static str),
    Granted(User),
}

pub fn evaluate(identity: &IdentityState) -> Access {
    if identity.resolving {
        return Access::Pending;
    }
    match &identity.identity {
        Some(user) => Access::Granted(user.clone()),
        None => Access::Redirect(LOGIN_ROUTE),
    }
}

/// Follows a session store's identity and reports access decisions.
pub struct SessionGuard {
    identity: watch::Receiver<IdentityState>,
}

impl SessionGuard {
    pub fn new(identity: watch::Receiver<IdentityState>) -> Self {
        SessionGuard { identity }
    }

    /// Decision for the identity as it stands now. Marks it as seen.
    pub fn current(&mut self) -> Access {
        evaluate(&self.identity.borrow_and_update())
    }

    /// Wait for the identity or its loading flag to change, then return the
    /// new decision. `None` once the session store is gone.
    pub async fn changed(&mut self) -> Option<Access> {
        self.identity.changed().await.ok()?;
        Some(self.current())
    }
}
