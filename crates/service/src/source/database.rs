use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use sqlx::postgres::{PgConnection, PgListener, PgRow};
use sqlx::{Connection, Row};
use tokio::sync::watch;
use url::Url;

use common::principal::{compile_address_patterns, AddressMatcher, CredentialError, Principal};
use common::principal_set::PrincipalSet;

use super::{PrincipalSource, SourceError};

/// Table queried when none is configured.
pub const DEFAULT_TABLE: &str = "users";

/// Channel the database raises on insert/update/delete of the principal table.
pub const NOTIFY_CHANNEL: &str = "users_data_updates";

const ADDRESSES_COLUMN: &str = "addresses";

fn table_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("table name pattern must compile")
    })
}

/// Table names are interpolated into SQL text, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<(), SourceError> {
    if table_name_pattern().is_match(table) {
        Ok(())
    } else {
        Err(SourceError::InvalidTableName(table.to_string()))
    }
}

/// One row of the principal table.
#[derive(Debug, Clone)]
pub struct UserRow {
    pub username: String,
    pub password: String,
    /// `None` when the table has no `addresses` column; a NULL
    ///  array in an existing column reads as an empty list.
    pub addresses: Option<Vec<String>>,
}

impl UserRow {
    fn from_row(row: &PgRow, with_addresses: bool) -> Result<Self, sqlx::Error> {
        let addresses = if with_addresses {
            let list: Option<Vec<String>> = row.try_get(ADDRESSES_COLUMN)?;
            Some(list.unwrap_or_default())
        } else {
            None
        };
        Ok(Self {
            username: row.try_get("username")?,
            password: row.try_get("password")?,
            addresses,
        })
    }

    /// Without an addresses column every principal may connect from anywhere.
    pub fn into_principal(self) -> Result<Principal, CredentialError> {
        if self.username.is_empty() {
            return Err(CredentialError::EmptyName);
        }
        let matchers = match self.addresses {
            Some(patterns) => compile_address_patterns(&patterns)?,
            None => vec![AddressMatcher::AllowAll],
        };
        Ok(Principal::new(self.username, self.password, matchers))
    }
}

/// Principals loaded from a Postgres table, reloaded on `NOTIFY users_data_updates`.
///
/// Each reload opens its own short-lived query connection; the listen loop
/// keeps a second, dedicated connection blocked on notifications. A dropped
/// listen connection is followed by a full reload once it re-attaches.
#[derive(Debug, Clone)]
pub struct DatabaseSource {
    url: Url,
    table: String,
    principals: PrincipalSet,
}

impl DatabaseSource {
    pub fn new(
        url: Url,
        table: Option<&str>,
        principals: PrincipalSet,
    ) -> Result<Self, SourceError> {
        let table = table.unwrap_or(DEFAULT_TABLE);
        validate_table_name(table)?;
        Ok(Self {
            url,
            table: table.to_string(),
            principals,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Schema shape is checked on every reload so adding or dropping the
    /// `addresses` column takes effect on the next notification.
    async fn has_addresses_column(&self, conn: &mut PgConnection) -> Result<bool, sqlx::Error> {
        // unquoted identifiers are folded to lower case by postgres
        sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM information_schema.columns
                WHERE table_schema = ANY(current_schemas(false))
                  AND table_name = $1
                  AND column_name = $2
            )
            "#,
        )
        .bind(self.table.to_lowercase())
        .bind(ADDRESSES_COLUMN)
        .fetch_one(conn)
        .await
    }

    async fn fetch_rows(&self, conn: &mut PgConnection) -> Result<Vec<UserRow>, sqlx::Error> {
        let with_addresses = self.has_addresses_column(conn).await?;
        let query = if with_addresses {
            format!("SELECT username, password, addresses FROM {}", self.table)
        } else {
            format!("SELECT username, password FROM {}", self.table)
        };
        tracing::debug!(table = %self.table, with_addresses, "querying principals");

        let rows = sqlx::query(&query).fetch_all(conn).await?;
        rows.iter()
            .map(|row| UserRow::from_row(row, with_addresses))
            .collect()
    }

    async fn read(&self) -> Result<Vec<Principal>, SourceError> {
        let mut conn = PgConnection::connect(self.url.as_str()).await?;
        let rows = self.fetch_rows(&mut conn).await;
        if let Err(e) = conn.close().await {
            tracing::debug!(error = %e, "failed to close query connection cleanly");
        }

        rows?
            .into_iter()
            .map(|row| {
                row.into_principal()
                    .map_err(|source| SourceError::InvalidPrincipal {
                        origin: self.origin(),
                        source,
                    })
            })
            .collect()
    }
}

#[async_trait]
impl PrincipalSource for DatabaseSource {
    fn origin(&self) -> String {
        format!("table {}", self.table)
    }

    async fn load(&self) -> Result<usize, SourceError> {
        let principals = self.read().await?;
        Ok(self.principals.replace_all(principals))
    }

    async fn watch(&self, mut shutdown: watch::Receiver<()>) -> Result<(), SourceError> {
        let mut listener = PgListener::connect(self.url.as_str()).await?;
        listener.listen(NOTIFY_CHANNEL).await?;
        tracing::info!(channel = NOTIFY_CHANNEL, table = %self.table, "listening for principal updates");

        // pick up changes committed while no listener was attached
        self.reload().await;

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::debug!(channel = NOTIFY_CHANNEL, "principal listener shutting down");
                    if let Err(e) = listener.unlisten_all().await {
                        tracing::debug!(error = %e, "failed to unlisten cleanly");
                    }
                    return Ok(());
                }
                // `None` means the listen connection dropped and was re-established;
                // notifications raised in between are lost
                received = listener.try_recv() => match received? {
                    Some(notification) => {
                        tracing::debug!(
                            channel = notification.channel(),
                            payload = notification.payload(),
                            "received principal update notification"
                        );
                        self.reload().await;
                    }
                    None => {
                        tracing::warn!(
                            channel = NOTIFY_CHANNEL,
                            table = %self.table,
                            "listen connection lost, reloading to catch up on missed changes"
                        );
                        self.reload().await;
                    }
                },
            }
        }
    }
}
