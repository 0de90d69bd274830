//! Shared helpers for principal set integration tests
#![allow(dead_code)]

use common::principal::Principal;

/// Addresses probed when comparing matcher behaviour between snapshots
pub const PROBE_ADDRESSES: [&str; 6] = [
    "10.0.0.1:5000",
    "10.0.0.2:5000",
    "192.168.1.7:22",
    "[::1]:8080",
    "",
    "garbage",
];

/// A generation of `count` principals whose secrets all carry the generation tag
pub fn generation(tag: usize, count: usize) -> Vec<Principal> {
    (0..count)
        .map(|i| {
            Principal::from_entry(&format!("user{i}:gen-{tag}"), ["*"])
                .expect("valid generated principal")
        })
        .collect()
}

pub fn principal(token: &str, patterns: &[&str]) -> Principal {
    Principal::from_entry(token, patterns.iter().copied()).expect("valid principal")
}
