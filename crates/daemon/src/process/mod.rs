pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::Instrument;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use service::{Config, DirectoryError, PrincipalDirectory};

const FINAL_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle for gracefully shutting down the daemon service.
pub struct ShutdownHandle {
    graceful_waiter: JoinHandle<()>,
    shutdown_tx: watch::Sender<()>,
    shutdown_rx: watch::Receiver<()>,
}

impl ShutdownHandle {
    /// Block until shutdown is requested (signal or [`ShutdownHandle::shutdown`]),
    /// then wait for the directory's background task to wind down.
    ///
    /// Returns false if the background task did not stop in time.
    pub async fn wait(mut self, directory: &PrincipalDirectory) -> bool {
        tokio::select! {
            _ = &mut self.graceful_waiter => {}
            _ = self.shutdown_rx.changed() => {}
        }
        // a programmatic shutdown leaves the signal listener behind
        self.graceful_waiter.abort();
        let _ = self.shutdown_tx.send(());

        if timeout(FINAL_SHUTDOWN_TIMEOUT, directory.join())
            .await
            .is_err()
        {
            tracing::error!(
                "Failed to shut down within {} seconds",
                FINAL_SHUTDOWN_TIMEOUT.as_secs()
            );
            return false;
        }
        tracing::info!("shutdown complete");
        true
    }

    /// Trigger shutdown programmatically.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Name of the daily-rotated log file under `--log-dir`.
const LOG_FILE_PREFIX: &str = "warden.log";

/// `--log-level` as the default directive, `RUST_LOG` on top.
fn level_filter(level: tracing::Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Initialize logging, panic handler, and build info reporting.
/// Returns guards that must be kept alive for the duration of the program.
///
/// Stdout always gets a compact layer. With `log_dir` set, a second,
/// ANSI-free layer writes to a daily-rotated file and records span close
/// timings, which covers each initial load and reload span. A log directory
/// that cannot be created disables the file layer and is reported once the
/// subscriber is up.
pub fn init_logging(config: &Config) -> Vec<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::fmt::format::FmtSpan;

    let mut guards = Vec::new();

    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    guards.push(stdout_guard);
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_filter(level_filter(config.log_level));

    let mut log_dir_error = None;
    let file_layer = config.log_dir.as_ref().and_then(|log_dir| {
        if let Err(e) = std::fs::create_dir_all(log_dir) {
            log_dir_error = Some((log_dir.clone(), e));
            return None;
        }
        let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
        let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
        guards.push(file_guard);

        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_span_events(FmtSpan::CLOSE)
                .with_filter(level_filter(config.log_level)),
        )
    });

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .init();

    if let Some((log_dir, e)) = log_dir_error {
        tracing::warn!(
            log_dir = %log_dir.display(),
            error = %e,
            "failed to create log directory, logging to stdout only"
        );
    }

    utils::register_panic_logger();
    utils::report_build_info(&config.source);

    guards
}

/// Load the directory and start its background reload task, returning the directory handle.
///
/// Use this when embedding the directory in another process; the caller keeps
/// the `ShutdownHandle` and decides when to stop.
pub async fn start_service(
    config: &Config,
) -> Result<(Arc<PrincipalDirectory>, ShutdownHandle), StartError> {
    let (graceful_waiter, shutdown_tx, shutdown_rx) = utils::graceful_shutdown_blocker()?;

    let directory = match PrincipalDirectory::start(config, shutdown_rx.clone()).await {
        Ok(directory) => Arc::new(directory),
        Err(e) => {
            graceful_waiter.abort();
            return Err(e.into());
        }
    };
    tracing::info!(
        origin = directory.origin(),
        principals = directory.len(),
        "principal directory is live"
    );

    Ok((
        directory,
        ShutdownHandle {
            graceful_waiter,
            shutdown_tx,
            shutdown_rx,
        },
    ))
}

/// Run the daemon until SIGINT/SIGTERM.
pub async fn spawn_service(config: &Config) {
    let _guards = init_logging(config);

    // every event of this run carries the source it serves
    let span = tracing::info_span!("warden", origin = %config.source.origin());
    let stopped = async {
        let (directory, shutdown) = match start_service(config).await {
            Ok(started) => started,
            Err(e) => {
                tracing::error!("error starting principal directory: {}", e);
                std::process::exit(3);
            }
        };
        shutdown.wait(&directory).await
    }
    .instrument(span)
    .await;

    if !stopped {
        std::process::exit(4);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error("failed to install signal handlers: {0}")]
    Signals(#[from] std::io::Error),

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}
