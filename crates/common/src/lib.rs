/**
 * Authentication principals.
 *  - name / secret pairs parsed from "name:secret" tokens
 *  - compiled address matchers deciding which
 *    remote addresses a principal may connect from
 */
pub mod principal;
/**
 * Concurrent, snapshot-swapping index of principals.
 * Readers always see one complete generation;
 *  reloads publish a new generation in a single swap.
 */
pub mod principal_set;

pub mod prelude {
    pub use crate::principal::{
        compile_address_patterns, parse_auth, AddressMatcher, CredentialError, Principal,
    };
    pub use crate::principal_set::{PrincipalSet, Snapshot};
}
