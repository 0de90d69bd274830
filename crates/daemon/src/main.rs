//! Warden daemon - keeps a principal directory live from a JSON auth file
//! or a Postgres table until SIGINT/SIGTERM.

mod cli;

use cli::{Args, Parser};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Args::parse().into_config()?;
    warden_daemon::spawn_service(&config).await;
    Ok(())
}
