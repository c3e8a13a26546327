// pitchwire entry point.
//
// Startup sequence:
// 1. Parse the command line
// 2. Load config (copying defaults on first run)
// 3. Initialize tracing (log to file, stdout is for the scoreboard)
// 4. Open the session database and restore the stored session
// 5. Run the requested command

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pitchwire_app::auth::AuthClient;
use pitchwire_app::cli::{self, Cli, Command};
use pitchwire_app::guard::SessionGuard;
use pitchwire_app::snapshot::HttpSnapshotLoader;
use pitchwire_app::view::{self, ViewCommand, ViewDeps, ViewUpdate};
use pitchwire_core::channel::WsConnector;
use pitchwire_core::config::{self, Config};
use pitchwire_core::db::SqliteSessionBackend;
use pitchwire_core::protocol::MatchId;
use pitchwire_core::session::SessionStore;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = config::load_config().context("failed to load configuration")?;

    init_tracing(&config.log_filter)?;
    info!("pitchwire starting up");
    info!(
        "Config loaded: api={}, push={}, reconnect={:?}",
        config.server.api_base_url, config.server.push_url, config.reconnect
    );

    let backend = SqliteSessionBackend::open(&config.session_path)
        .with_context(|| format!("failed to open session database {}", config.session_path.display()))?;
    let session = Arc::new(SessionStore::new(Box::new(backend)));
    session.initialize();

    let auth = AuthClient::new(
        config.server.api_base_url.clone(),
        config.server.request_timeout(),
        Arc::clone(&session),
    )
    .context("failed to build HTTP client")?;

    match cli.command {
        Command::Login { username, password } => {
            let user = auth.login(&username, &password).await.context("login failed")?;
            println!("Logged in as {}", user.username);
        }
        Command::Signup {
            username,
            full_name,
            password,
        } => {
            let user = auth
                .signup(&username, &full_name, &password)
                .await
                .context("signup failed")?;
            println!("Signed up and logged in as {}", user.username);
        }
        Command::Logout => {
            auth.logout().context("logout failed")?;
            println!("Logged out");
        }
        Command::Watch { match_id } => {
            watch(&config, &session, MatchId::new(match_id)).await?;
        }
    }

    info!("pitchwire shut down cleanly");
    Ok(())
}

/// Follow one match, printing a scoreboard line per page update, until
/// Ctrl+C or a redirect to login.
async fn watch(config: &Config, session: &SessionStore, match_id: MatchId) -> anyhow::Result<()> {
    let snapshots = HttpSnapshotLoader::new(
        config.server.api_base_url.clone(),
        config.server.request_timeout(),
    )
    .context("failed to build HTTP client")?;

    let deps = ViewDeps {
        snapshots: Arc::new(snapshots),
        connector: Arc::new(WsConnector::new(config.server.push_url.clone())),
        reconnect: config.reconnect.clone(),
    };

    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (ui_tx, mut ui_rx) = mpsc::channel(256);

    let guard = SessionGuard::new(session.subscribe());
    let view_handle = tokio::spawn(async move {
        if let Err(e) = view::run(deps, guard, cmd_rx, ui_tx).await {
            error!("Live view error: {}", e);
        }
    });

    cmd_tx
        .send(ViewCommand::Show(match_id))
        .await
        .context("live view stopped before start")?;

    let mut last_line = String::new();
    loop {
        tokio::select! {
            update = ui_rx.recv() => match update {
                Some(ViewUpdate::Page(page)) => {
                    let line = cli::scoreboard(&page);
                    if line != last_line {
                        println!("{line}");
                        last_line = line;
                    }
                }
                Some(ViewUpdate::Channel(state)) => {
                    info!("Push channel state: {:?}", state);
                }
                Some(ViewUpdate::Redirect(route)) => {
                    println!("Not logged in (redirect to {route}); run `pitchwire login` first");
                    break;
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, closing live view");
                break;
            }
        }
    }

    let _ = cmd_tx.send(ViewCommand::Close).await;
    // Keep draining so the view never blocks on a full UI channel while it
    // tears down.
    let drain = async { while ui_rx.recv().await.is_some() {} };
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), async {
        tokio::join!(drain, view_handle)
    })
    .await;

    Ok(())
}

/// Initialize tracing to log to a file (stdout carries the scoreboard).
///
/// `RUST_LOG` overrides the `[logging] filter` from client.toml.
fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let log_path = log_dir.join("pitchwire.log");

    // Append: a `login` followed by a `watch` are separate processes and
    // both runs belong in the same log.
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open log file {}", log_path.display()))?;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    // Single-threaded runtime, so no thread ids.
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
