// Configuration loading and parsing (client.toml).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::channel::ReconnectPolicy;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Why `client.toml` could not be turned into a `Config`.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `config/client.toml` is missing or unreadable.
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    /// Not valid TOML, or a section has the wrong shape.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Parsed, but a value is unusable (bad URL scheme, zero delay, ...).
    /// `field` is the dotted TOML key, e.g. `reconnect.delay_ms`.
    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    /// First-run copy from `defaults/` into `config/` failed.
    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Assembled Config
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "client.toml";

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub reconnect: ReconnectPolicy,
    /// SQLite file backing the session store.
    pub session_path: PathBuf,
    pub log_filter: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// REST root, e.g. `http://localhost:5000/api`.
    pub api_base_url: String,
    /// Broadcast endpoint of the live push channel.
    pub push_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ---------------------------------------------------------------------------
// client.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
struct ClientFile {
    server: ServerConfig,
    #[serde(default)]
    reconnect: ReconnectSection,
    #[serde(default)]
    session: SessionSection,
    #[serde(default)]
    logging: LoggingSection,
}

#[derive(Debug, Clone, Deserialize)]
struct ReconnectSection {
    #[serde(default = "default_policy")]
    policy: String,
    #[serde(default = "default_delay_ms")]
    delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    max_delay_ms: u64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        ReconnectSection {
            policy: default_policy(),
            delay_ms: default_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SessionSection {
    path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
struct LoggingSection {
    #[serde(default = "default_log_filter")]
    filter: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection {
            filter: default_log_filter(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_policy() -> String {
    "fixed".to_string()
}

fn default_delay_ms() -> u64 {
    3000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_log_filter() -> String {
    "pitchwire=info,warn".to_string()
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/client.toml` relative to `base_dir`.
///
/// Does not copy defaults; prefer `load_config()`.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    parse_config(&text, &path)
}

/// Parse and validate config text. `path` is only used for error messages.
pub fn parse_config(text: &str, path: &Path) -> Result<Config, ConfigError> {
    let file: ClientFile = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;

    validate_server(&file.server)?;
    let reconnect = reconnect_policy(&file.reconnect)?;
    let session_path = match file.session.path {
        Some(path) => path,
        None => default_session_path(),
    };

    Ok(Config {
        server: file.server,
        reconnect,
        session_path,
        log_filter: file.logging.filter,
    })
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files and
/// never overwrites a file the user already has in `config/`.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        // An installed client may ship only config/; that is fine as long as
        // one of the two exists.
        if config_dir.exists() {
            return Ok(vec![]);
        }
        return Err(copy_error(format!(
            "neither defaults/ nor config/ directory found in {}; \
             run from the project root or ensure defaults/ is present",
            base_dir.display()
        )));
    }

    std::fs::create_dir_all(&config_dir)
        .map_err(|e| copy_error(format!("failed to create config directory: {e}")))?;
    let entries = std::fs::read_dir(&defaults_dir)
        .map_err(|e| copy_error(format!("failed to read defaults directory: {e}")))?;

    let mut copied = Vec::new();
    for entry in entries {
        let source = entry
            .map_err(|e| copy_error(format!("failed to read defaults entry: {e}")))?
            .path();
        let Some(file_name) = source.file_name().filter(|_| source.is_file()) else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }

        let target = config_dir.join(file_name);
        if copy_default(&source, &target)? {
            info!("Copied default {} to {}", source.display(), target.display());
            copied.push(target);
        }
    }

    Ok(copied)
}

/// Copy one default into place. `Ok(false)` when the target already exists;
/// `create_new` makes the existence check and the create a single step.
fn copy_default(source: &Path, target: &Path) -> Result<bool, ConfigError> {
    let mut dest = match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(target)
    {
        Ok(dest) => dest,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => {
            return Err(copy_error(format!(
                "failed to create {}: {e}",
                target.display()
            )))
        }
    };

    let content = std::fs::read(source)
        .map_err(|e| copy_error(format!("failed to read {}: {e}", source.display())))?;
    std::io::Write::write_all(&mut dest, &content)
        .map_err(|e| copy_error(format!("failed to write {}: {e}", target.display())))?;
    Ok(true)
}

fn copy_error(message: String) -> ConfigError {
    ConfigError::DefaultsCopyError { message }
}

/// Loads config relative to the current working directory, copying
/// defaults first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn default_session_path() -> PathBuf {
    match directories::ProjectDirs::from("", "", "pitchwire") {
        Some(dirs) => dirs.data_dir().join("session.db"),
        None => PathBuf::from("session.db"),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if !has_scheme(&server.api_base_url, &["http://", "https://"]) {
        return Err(ConfigError::ValidationError {
            field: "server.api_base_url".into(),
            message: format!("must be an http(s) URL, got {:?}", server.api_base_url),
        });
    }

    if !has_scheme(&server.push_url, &["ws://", "wss://"]) {
        return Err(ConfigError::ValidationError {
            field: "server.push_url".into(),
            message: format!("must be a ws(s) URL, got {:?}", server.push_url),
        });
    }

    if server.request_timeout_secs == 0 {
        return Err(ConfigError::ValidationError {
            field: "server.request_timeout_secs".into(),
            message: "must be greater than 0".into(),
        });
    }

    Ok(())
}

fn has_scheme(url: &str, schemes: &[&str]) -> bool {
    schemes
        .iter()
        .any(|scheme| url.len() > scheme.len() && url.starts_with(scheme))
}

fn reconnect_policy(section: &ReconnectSection) -> Result<ReconnectPolicy, ConfigError> {
    if section.delay_ms == 0 {
        return Err(ConfigError::ValidationError {
            field: "reconnect.delay_ms".into(),
            message: "must be greater than 0".into(),
        });
    }

    let delay = Duration::from_millis(section.delay_ms);
    match section.policy.as_str() {
        "fixed" => Ok(ReconnectPolicy::Fixed(delay)),
        "exponential" => {
            if section.max_delay_ms < section.delay_ms {
                return Err(ConfigError::ValidationError {
                    field: "reconnect.max_delay_ms".into(),
                    message: format!(
                        "must be >= delay_ms ({}), got {}",
                        section.delay_ms, section.max_delay_ms
                    ),
                });
            }
            Ok(ReconnectPolicy::Exponential {
                initial: delay,
                max: Duration::from_millis(section.max_delay_ms),
            })
        }
        other => Err(ConfigError::ValidationError {
            field: "reconnect.policy".into(),
            message: format!("must be \"fixed\" or \"exponential\", got {other:?}"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
