//! Principal sources.
//!
//! A source knows how to derive the full list of principals from somewhere
//! (a JSON file, a Postgres table) and publish it into a [`PrincipalSet`] in
//! one swap. It also knows how to wait for changes and reload until shutdown.
//!
//! Reload failures never touch the published snapshot: a source stages the
//! complete list first and only calls [`PrincipalSet::replace_all`] once
//! every entry parsed and compiled.
//!
//! [`PrincipalSet`]: common::principal_set::PrincipalSet
//! [`PrincipalSet::replace_all`]: common::principal_set::PrincipalSet::replace_all

mod database;
mod file;

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::watch;

use common::principal::CredentialError;

pub use database::{validate_table_name, DatabaseSource, UserRow, DEFAULT_TABLE, NOTIFY_CHANNEL};
pub use file::FileSource;

#[async_trait]
pub trait PrincipalSource: Send + Sync {
    /// Human readable origin used in logs and errors. Never includes credentials.
    fn origin(&self) -> String;

    /// Read the source and publish a fresh snapshot.
    ///
    /// Returns the number of principals in the published snapshot.
    async fn load(&self) -> Result<usize, SourceError>;

    /// Wait for changes and reload on each one until `shutdown` fires.
    ///
    /// Reload failures are logged and swallowed; only failures of the
    /// watch itself are returned.
    async fn watch(&self, shutdown: watch::Receiver<()>) -> Result<(), SourceError>;

    /// [`PrincipalSource::load`], logging the outcome instead of returning it.
    async fn reload(&self) {
        match self.load().await {
            Ok(count) => {
                tracing::info!(origin = %self.origin(), count, "principals reloaded");
            }
            Err(e) => {
                tracing::warn!(
                    origin = %self.origin(),
                    error = %e,
                    "failed to reload principals, keeping previous snapshot"
                );
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("auth file path is not set")]
    MissingPath,

    #[error("auth file path {0:?} does not name a file")]
    NotAFile(PathBuf),

    #[error("failed to read auth file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in auth file {path:?}: {source}")]
    InvalidJson {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid principal in {origin}: {source}")]
    InvalidPrincipal {
        origin: String,
        #[source]
        source: CredentialError,
    },

    #[error("invalid table name: {0:?}")]
    InvalidTableName(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("file watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("file watch on directory {0:?} was lost")]
    WatchLost(PathBuf),
}
