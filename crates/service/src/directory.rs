use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use common::principal::Principal;
use common::principal_set::PrincipalSet;

use crate::config::{Config, ReconnectConfig, SourceConfig};
use crate::source::{DatabaseSource, FileSource, PrincipalSource, SourceError};
use crate::supervisor::supervise;

/// Live directory of principals backed by exactly one source.
///
/// Construction performs the initial load synchronously and fails if it
/// fails. The source's watch/listen loop then runs in the background under
/// the supervisor, replacing the snapshot on every change, until the
/// shutdown signal fires.
pub struct PrincipalDirectory {
    principals: PrincipalSet,
    origin: String,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PrincipalDirectory {
    pub async fn start(
        config: &Config,
        shutdown: watch::Receiver<()>,
    ) -> Result<Self, DirectoryError> {
        let principals = PrincipalSet::new();
        let source: Arc<dyn PrincipalSource> = match &config.source {
            SourceConfig::File { path } => {
                Arc::new(FileSource::new(path.clone(), principals.clone())?)
            }
            SourceConfig::Database { url, table } => Arc::new(DatabaseSource::new(
                url.clone(),
                table.as_deref(),
                principals.clone(),
            )?),
        };

        Self::with_source(principals, source, config.reconnect.clone(), shutdown).await
    }

    /// Start a directory over a caller-built source.
    ///
    /// `principals` must be the set the source publishes into.
    pub async fn with_source(
        principals: PrincipalSet,
        source: Arc<dyn PrincipalSource>,
        reconnect: ReconnectConfig,
        shutdown: watch::Receiver<()>,
    ) -> Result<Self, DirectoryError> {
        let origin = source.origin();
        let count = source
            .load()
            .await
            .map_err(|source| DirectoryError::InitialLoad {
                origin: origin.clone(),
                source,
            })?;
        tracing::info!(origin = %origin, count, "loaded principals");

        let task = tokio::spawn(supervise(
            origin.clone(),
            reconnect,
            shutdown,
            move |shutdown| {
                let source = source.clone();
                async move { source.watch(shutdown).await }
            },
        ));

        Ok(Self {
            principals,
            origin,
            task: Mutex::new(Some(task)),
        })
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Principal>> {
        self.principals.get(name)
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }

    /// Names in the current snapshot, sorted.
    pub fn names(&self) -> Vec<String> {
        self.principals.snapshot().names()
    }

    /// Fails closed: unknown principals, wrong secrets and unlisted addresses are all rejected.
    pub fn authorize(&self, name: &str, secret: &str, address: &str) -> bool {
        self.lookup(name)
            .map(|principal| principal.authorize(secret, address))
            .unwrap_or(false)
    }

    /// Wait for the background reload task to finish after shutdown was signalled.
    pub async fn join(&self) {
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::error!(origin = %self.origin, error = %e, "background reload task panicked");
            }
        }
    }
}

impl std::fmt::Debug for PrincipalDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrincipalDirectory")
            .field("origin", &self.origin)
            .field("principals", &self.principals.len())
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("invalid source configuration: {0}")]
    Config(#[from] SourceError),

    #[error("initial load from {origin} failed: {source}")]
    InitialLoad {
        origin: String,
        #[source]
        source: SourceError,
    },
}
