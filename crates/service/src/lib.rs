//! Hot-reloading principal directory.
//!
//! This crate wires the principal set from `common` to a concrete source:
//! - File source (JSON auth file, reloaded on filesystem write events)
//! - Database source (Postgres table, reloaded on `NOTIFY users_data_updates`)
//! - Supervisor (restarts a failed watch/listen loop with exponential backoff)
//! - Directory (initial load, background reloads, lookups for the auth path)

pub mod config;
pub mod directory;
pub mod source;
pub mod supervisor;

// Re-export key types for convenience
pub use config::{Config, ReconnectConfig, SourceConfig};
pub use directory::{DirectoryError, PrincipalDirectory};
pub use source::{DatabaseSource, FileSource, PrincipalSource, SourceError};
