//! # Principals
//!
//! A principal is an authentication identity: a name, an opaque secret, and
//! the list of remote-address matchers it is allowed to connect from.
//!
//! ## Address rules
//!
//! - `""` or `"*"` compile to [`AddressMatcher::AllowAll`]
//! - anything else is a regular expression searched within the remote address
//! - a principal with **no** matchers rejects every address
//!
//! Secrets are compared as-is; they are never hashed or cached here.

mod credentials;
mod matcher;

pub use credentials::parse_auth;
pub use matcher::{compile_address_patterns, AddressMatcher};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CredentialError {
    #[error("invalid name:secret string: missing ':' separator")]
    MissingSeparator,
    #[error("invalid name:secret string: empty name")]
    EmptyName,
    #[error("invalid address pattern {pattern:?}: {source}")]
    InvalidAddressPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// An authentication identity.
#[derive(Clone)]
pub struct Principal {
    name: String,
    secret: String,
    address_matchers: Vec<AddressMatcher>,
}

impl Principal {
    pub fn new(
        name: impl Into<String>,
        secret: impl Into<String>,
        address_matchers: Vec<AddressMatcher>,
    ) -> Self {
        Self {
            name: name.into(),
            secret: secret.into(),
            address_matchers,
        }
    }

    /// Build a principal from a `name:secret` token and its raw address patterns.
    pub fn from_entry<I, S>(token: &str, patterns: I) -> Result<Self, CredentialError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let (name, secret) = parse_auth(token)?;
        let address_matchers = compile_address_patterns(patterns)?;
        Ok(Self::new(name, secret, address_matchers))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn address_matchers(&self) -> &[AddressMatcher] {
        &self.address_matchers
    }

    /// Whether `address` is accepted by any of this principal's matchers.
    pub fn has_access(&self, address: &str) -> bool {
        self.address_matchers.iter().any(|m| m.matches(address))
    }

    /// Secret and address check in one call.
    pub fn authorize(&self, secret: &str, address: &str) -> bool {
        self.secret == secret && self.has_access(address)
    }
}

// secrets stay out of logs
impl std::fmt::Debug for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Principal")
            .field("name", &self.name)
            .field("secret", &"<redacted>")
            .field(
                "address_matchers",
                &self
                    .address_matchers
                    .iter()
                    .map(AddressMatcher::as_str)
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}
