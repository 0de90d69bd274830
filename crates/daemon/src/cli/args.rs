use std::path::PathBuf;
use std::time::Duration;

pub use clap::Parser;
use url::Url;

use service::{Config, ReconnectConfig, SourceConfig};

/// Warden - live directory of authentication principals
#[derive(Parser, Debug)]
#[command(name = "warden", author, version, about, long_about = None)]
pub struct Args {
    /// JSON auth file mapping "name:secret" to allowed address patterns
    #[arg(long, conflicts_with = "database_url", required_unless_present = "database_url")]
    pub auth_file: Option<PathBuf>,

    /// Postgres connection string for the principal table
    #[arg(long, env = "WARDEN_DATABASE_URL")]
    pub database_url: Option<Url>,

    /// Table holding username, password and optional addresses columns
    #[arg(long, requires = "database_url")]
    pub table: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Initial delay before restarting a failed watch/listen task
    #[arg(long, default_value_t = 1_000)]
    pub min_backoff_ms: u64,

    /// Upper bound for the restart delay
    #[arg(long, default_value_t = 60_000)]
    pub max_backoff_ms: u64,
}

impl Args {
    pub fn into_config(self) -> anyhow::Result<Config> {
        let source = match (self.auth_file, self.database_url) {
            (Some(path), _) => SourceConfig::File { path },
            (None, Some(url)) => SourceConfig::Database {
                url,
                table: self.table,
            },
            (None, None) => anyhow::bail!("either --auth-file or --database-url is required"),
        };

        let min_backoff = Duration::from_millis(self.min_backoff_ms);
        Ok(Config {
            source,
            reconnect: ReconnectConfig {
                min_backoff,
                max_backoff: Duration::from_millis(self.max_backoff_ms).max(min_backoff),
            },
            log_level: self.log_level,
            log_dir: self.log_dir,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_file_config() {
        let args = Args::try_parse_from(["warden", "--auth-file", "/etc/warden/users.json"]).unwrap();
        let config = args.into_config().unwrap();
        match config.source {
            SourceConfig::File { path } => assert_eq!(path, PathBuf::from("/etc/warden/users.json")),
            other => panic!("expected file source, got {other:?}"),
        }
        assert_eq!(config.log_level, tracing::Level::INFO);
        assert_eq!(config.reconnect.min_backoff, Duration::from_secs(1));
        assert_eq!(config.reconnect.max_backoff, Duration::from_secs(60));
    }

    #[test]
    fn test_database_config() {
        let args = Args::try_parse_from([
            "warden",
            "--database-url",
            "postgres://warden@localhost/auth",
            "--table",
            "accounts",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let config = args.into_config().unwrap();
        match config.source {
            SourceConfig::Database { url, table } => {
                assert_eq!(url.scheme(), "postgres");
                assert_eq!(table.as_deref(), Some("accounts"));
            }
            other => panic!("expected database source, got {other:?}"),
        }
        assert_eq!(config.log_level, tracing::Level::DEBUG);
    }

    #[test]
    fn test_sources_are_mutually_exclusive() {
        let result = Args::try_parse_from([
            "warden",
            "--auth-file",
            "users.json",
            "--database-url",
            "postgres://localhost/auth",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_table_requires_database() {
        let result =
            Args::try_parse_from(["warden", "--auth-file", "users.json", "--table", "users"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_database_url_is_rejected() {
        let result = Args::try_parse_from(["warden", "--database-url", "not a url"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_max_backoff_never_below_min() {
        let args = Args::try_parse_from([
            "warden",
            "--auth-file",
            "users.json",
            "--min-backoff-ms",
            "5000",
            "--max-backoff-ms",
            "100",
        ])
        .unwrap();
        let config = args.into_config().unwrap();
        assert_eq!(config.reconnect.max_backoff, Duration::from_secs(5));
    }
}
