// SQLite persistence for the signed-in session.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::protocol::User;
use crate::session::{SessionBackend, SessionError};

/// Single-row table holding the signed-in user as JSON.
pub struct SqliteSessionBackend {
    conn: Mutex<Connection>,
}

impl SqliteSessionBackend {
    /// Open (or create) the session database at `path`, creating parent
    /// directories as needed. Pass `":memory:"` for an ephemeral database.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        if path != Path::new(":memory:") {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;

             CREATE TABLE IF NOT EXISTS session (
                 id        INTEGER PRIMARY KEY CHECK (id = 1),
                 user_json TEXT NOT NULL,
                 saved_at  TEXT NOT NULL
             );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Panics if the mutex is poisoned.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("session database mutex poisoned")
    }

    /// When the stored session was written. `None` if there is no row or
    /// the timestamp does not parse.
    fn saved_at(&self) -> Result<Option<chrono::DateTime<chrono::Utc>>, SessionError> {
        let raw: Option<String> = self
            .conn()
            .query_row("SELECT saved_at FROM session WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        Ok(raw
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&chrono::Utc)))
    }
}

impl SessionBackend for SqliteSessionBackend {
    fn load(&self) -> Result<Option<User>, SessionError> {
        let json: Option<String> = self
            .conn()
            .query_row("SELECT user_json FROM session WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;

        let Some(json) = json else {
            return Ok(None);
        };
        let user: User = serde_json::from_str(&json)?;
        match self.saved_at()? {
            Some(at) => debug!("Restored session for {} saved at {}", user.username, at),
            None => debug!("Restored session for {} with no valid timestamp", user.username),
        }
        Ok(Some(user))
    }

    fn save(&self, user: &User) -> Result<(), SessionError> {
        let json = serde_json::to_string(user)?;
        let now = chrono::Utc::now().to_rfc3339();
        self.conn().execute(
            "INSERT OR REPLACE INTO session (id, user_json, saved_at) VALUES (1, ?1, ?2)",
            params![json, now],
        )?;
        Ok(())
    }

    fn remove(&self) -> Result<(), SessionError> {
        self.conn().execute("DELETE FROM session", [])?;
        Ok(())
    }
}
