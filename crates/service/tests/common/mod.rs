//! Shared test utilities for source and directory integration tests
#![allow(dead_code)]

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

/// The two-principal auth file used throughout the tests
pub const ALICE_AND_BOB: &str = r#"{"alice:secret1": ["10\\.0\\.0\\.1", "*"], "bob:secret2": []}"#;

/// Addresses probed when comparing matcher behaviour
pub const PROBE_ADDRESSES: [&str; 6] = [
    "10.0.0.1:5000",
    "10.0.0.2:5000",
    "192.168.1.7:22",
    "[::1]:8080",
    "",
    "garbage",
];

/// Write `contents` to a fresh auth file inside a temporary directory
pub fn auth_file(contents: &str) -> (PathBuf, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("users.json");
    std::fs::write(&path, contents).unwrap();
    (path, temp_dir)
}

/// Poll `condition` until it holds or `timeout` elapses
pub async fn eventually<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

/// Await `future`, failing the test if it takes longer than `timeout`
pub async fn within<F: Future>(timeout: Duration, future: F) -> F::Output {
    tokio::time::timeout(timeout, future)
        .await
        .expect("operation timed out")
}
