pub mod process;

// Re-exports for consumers embedding the directory
pub use process::{spawn_service, start_service, ShutdownHandle, StartError};
pub use service::{Config as ServiceConfig, PrincipalDirectory};
