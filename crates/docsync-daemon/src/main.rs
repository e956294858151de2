//! docsync Daemon - Background synchronization service
//!
//! This binary keeps one local folder and one repository folder in sync:
//! - Loads and validates the YAML configuration
//! - Opens the SQLite state store and the directory-backed repository
//! - Watches the local folder and feeds the coalescing event queue
//! - Drives the orchestrator from the poll and debounce timers
//! - Shuts down gracefully on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! The daemon builds a `SyncOrchestrator` over the configured adapters and
//! hands it to the scheduler loop. The loop is controlled by a
//! `CancellationToken` that is triggered on receipt of SIGTERM or SIGINT;
//! a pass running at that moment is cancelled at its next checkpoint.
//! With `--once` a single full pass runs and its outcome becomes the exit
//! status.

use std::{path::PathBuf, process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use docsync_cache::{DatabasePool, SqliteStateStore};
use docsync_conflict::ConflictPolicy;
use docsync_core::{
    config::{expand_tilde, Config, LoggingConfig},
    domain::SyncEvent,
    ports::{ILocalEventSource, IRemoteRepository, IStateStore},
};
use docsync_remote::DirectoryRepository;
use docsync_sync::{
    CoalescingEventQueue, FileWatcher, LocalFileSystemAdapter, LogNotifier, SyncContext,
    SyncOrchestrator, SyncSettings,
};

// ============================================================================
// Command line
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "docsyncd",
    version,
    about = "Keeps a local folder and a document repository folder in sync"
)]
struct Cli {
    /// Use alternate config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run a single full pass and exit
    #[arg(long)]
    once: bool,

    /// Verbose output (-v debug, -vv trace); overrides logging.level
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Loads the configuration, failing on every validation error at once
fn load_config(path: Option<&PathBuf>) -> Result<(Config, PathBuf)> {
    let (config, path) = match path {
        Some(path) => (
            Config::load(path)
                .with_context(|| format!("Failed to load config file {}", path.display()))?,
            path.clone(),
        ),
        None => {
            let path = Config::default_path();
            (Config::load_or_default(&path), path)
        }
    };

    let errors = config.validate();
    if !errors.is_empty() {
        let listed: Vec<String> = errors.iter().map(ToString::to_string).collect();
        anyhow::bail!("Invalid configuration:\n  {}", listed.join("\n  "));
    }
    Ok((config, path))
}

// ============================================================================
// Logging
// ============================================================================

/// Directive used when `RUST_LOG` is not set
fn log_directive(logging: &LoggingConfig, verbose: u8) -> String {
    match verbose {
        0 => logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

fn init_tracing(logging: &LoggingConfig, verbose: u8) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_directive(logging, verbose)));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);

    if logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ============================================================================
// DaemonService
// ============================================================================

/// Adapters and orchestrator of the synchronized folder
struct DaemonService {
    orchestrator: Arc<SyncOrchestrator>,
    /// Filled by the file watcher, drained by watcher passes
    queue: Arc<CoalescingEventQueue>,
    /// SQLite pool, closed on shutdown
    db_pool: DatabasePool,
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the adapters and initializes the orchestrator
    async fn new(config: &Config, shutdown: CancellationToken) -> Result<Self> {
        let settings = SyncSettings::from_config(config).context("Invalid sync settings")?;
        let policy = ConflictPolicy::from_config(&config.conflicts);

        let local_root = settings.local_root.as_path().to_path_buf();
        tokio::fs::create_dir_all(&local_root)
            .await
            .with_context(|| format!("Failed to create local root {}", local_root.display()))?;

        let db_path = expand_tilde(&config.state.database);
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let db_pool = DatabasePool::new(&db_path)
            .await
            .context("Failed to open state database")?;
        let state = Arc::new(SqliteStateStore::new(db_pool.pool().clone()));
        info!(database = %db_path.display(), "State store opened");

        let repository_root = config
            .repository
            .root
            .as_deref()
            .map(expand_tilde)
            .context("repository.root is not configured")?;
        let remote = DirectoryRepository::new(&repository_root).with_context(|| {
            format!("Failed to open repository at {}", repository_root.display())
        })?;
        info!(repository = %repository_root.display(), "Repository opened");

        let queue = Arc::new(CoalescingEventQueue::new());
        let ctx = Arc::new(SyncContext::new(
            settings,
            policy,
            Arc::new(remote) as Arc<dyn IRemoteRepository>,
            state as Arc<dyn IStateStore>,
            Arc::new(LocalFileSystemAdapter::new()),
            Arc::clone(&queue) as Arc<dyn ILocalEventSource>,
            Arc::new(LogNotifier::new()),
        ));

        let orchestrator = Arc::new(SyncOrchestrator::new(ctx));
        orchestrator
            .initialize()
            .await
            .context("Failed to initialize orchestrator")?;

        Ok(Self {
            orchestrator,
            queue,
            db_pool,
            shutdown,
        })
    }

    /// Runs one full pass; `true` on success
    async fn sync_once(&self) -> bool {
        self.orchestrator.sync().await
    }

    /// Watches the local root and runs passes until shutdown
    async fn run(&self) -> Result<()> {
        let local_root = self
            .orchestrator
            .context()
            .settings
            .local_root
            .as_path()
            .to_path_buf();
        let mut watcher =
            FileWatcher::new(Arc::clone(&self.queue)).context("Failed to start file watcher")?;
        watcher.watch(&local_root)?;

        let reporter = tokio::spawn(report_events(self.orchestrator.subscribe()));

        Arc::clone(&self.orchestrator)
            .run(self.queue.activity(), self.shutdown.clone())
            .await;

        drop(watcher);
        reporter.abort();
        info!("Sync loop terminated");
        Ok(())
    }

    async fn close(self) {
        self.db_pool.close().await;
    }
}

/// Logs pass outcomes published by the orchestrator
async fn report_events(mut events: tokio::sync::broadcast::Receiver<SyncEvent>) {
    use tokio::sync::broadcast::error::RecvError;

    loop {
        match events.recv().await {
            Ok(SyncEvent::SyncCompleted { kind, success: false }) => {
                warn!(kind = %kind, "Pass did not complete, retrying on next trigger");
            }
            Ok(SyncEvent::SyncException { level, kind, message }) => {
                warn!(level = ?level, kind = ?kind, "{message}");
            }
            Ok(_) => {}
            Err(RecvError::Lagged(missed)) => warn!(missed, "Event reporter lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let (config, config_path) = load_config(cli.config.as_ref())?;
    init_tracing(&config.logging, cli.verbose);

    info!(config_path = %config_path.display(), "docsync daemon starting (docsyncd)");

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(&config, shutdown_token).await?;

    let code = if cli.once {
        if service.sync_once().await {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        }
    } else {
        match service.run().await {
            Ok(()) => {
                info!("docsync daemon shut down gracefully");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!(error = %e, "docsync daemon exiting with error");
                ExitCode::FAILURE
            }
        }
    };

    service.close().await;
    Ok(code)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use docsync_core::{config::ConfigBuilder, domain::SyncStatus};
    use tempfile::TempDir;

    use super::*;

    fn test_config(dir: &TempDir) -> Config {
        let repository = dir.path().join("share");
        std::fs::create_dir_all(repository.join("Shared")).unwrap();
        ConfigBuilder::new()
            .sync_local_root(dir.path().join("local"))
            .sync_remote_root("/Shared")
            .sync_user_name("alice")
            .state_database(dir.path().join("state").join("state.db"))
            .repository_root(repository)
            .build()
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from(["docsyncd", "--config", "/etc/docsync.yaml", "--once", "-vv"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/docsync.yaml")));
        assert!(cli.once);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::try_parse_from(["docsyncd"]).unwrap();
        assert!(cli.config.is_none());
        assert!(!cli.once);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_log_directive_prefers_verbosity() {
        let logging = LoggingConfig {
            level: "warn".to_string(),
            format: "text".to_string(),
        };
        assert_eq!(log_directive(&logging, 0), "warn");
        assert_eq!(log_directive(&logging, 1), "debug");
        assert_eq!(log_directive(&logging, 3), "trace");
    }

    #[test]
    fn test_load_config_reports_all_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "sync:\n  poll_interval: 0\n  max_retries: 0\nlogging:\n  format: xml\n",
        )
        .unwrap();

        let err = load_config(Some(&path)).unwrap_err().to_string();
        assert!(err.contains("sync.poll_interval"), "{err}");
        assert!(err.contains("sync.max_retries"), "{err}");
        assert!(err.contains("logging.format"), "{err}");
    }

    #[test]
    fn test_load_config_missing_explicit_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(load_config(Some(&dir.path().join("absent.yaml"))).is_err());
    }

    #[tokio::test]
    async fn test_service_requires_repository_root() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        config.repository.root = None;

        let err = DaemonService::new(&config, CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("repository.root"));
    }

    #[tokio::test]
    async fn test_single_pass_downloads_repository_content() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        std::fs::write(dir.path().join("share/Shared/report.txt"), "quarterly").unwrap();

        let service = DaemonService::new(&config, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(service.orchestrator.status(), SyncStatus::Idle);
        assert!(service.sync_once().await);

        let local = std::fs::read_to_string(dir.path().join("local/report.txt")).unwrap();
        assert_eq!(local, "quarterly");
        service.close().await;
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let shutdown = CancellationToken::new();
        let service = DaemonService::new(&config, shutdown.clone()).await.unwrap();

        let stopper = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                shutdown.cancel();
            })
        };
        tokio::time::timeout(std::time::Duration::from_secs(10), service.run())
            .await
            .expect("daemon did not stop")
            .unwrap();
        stopper.await.unwrap();
        service.close().await;
    }
}
