use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::source::DEFAULT_TABLE;

/// Where principals are loaded from. Exactly one source per directory.
#[derive(Debug, Clone)]
pub enum SourceConfig {
    /// A JSON object of `"name:secret" -> [address patterns]`, watched for writes
    File { path: PathBuf },
    /// A Postgres table of `username, password[, addresses]` rows,
    ///  reloaded on `NOTIFY users_data_updates`
    Database {
        url: Url,
        /// defaults to `users` when not set
        table: Option<String>,
    },
}

impl SourceConfig {
    /// Where principals come from, without credentials from the connection string.
    ///
    /// Matches the origin the built source reports.
    pub fn origin(&self) -> String {
        match self {
            SourceConfig::File { path } => format!("auth file {}", path.display()),
            SourceConfig::Database { table, .. } => {
                format!("table {}", table.as_deref().unwrap_or(DEFAULT_TABLE))
            }
        }
    }
}

/// Backoff applied by the supervisor when a background watch/listen task fails.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    // source configuration
    pub source: SourceConfig,
    /// retry policy for the background reload task
    pub reconnect: ReconnectConfig,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn new(source: SourceConfig) -> Self {
        Self {
            source,
            reconnect: ReconnectConfig::default(),
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}
