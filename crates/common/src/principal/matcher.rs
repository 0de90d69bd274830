use regex::Regex;

use super::CredentialError;

/// Pattern strings that grant access from any address.
const ALLOW_ALL_PATTERNS: [&str; 2] = ["", "*"];

/// A compiled predicate over a remote address string.
#[derive(Debug, Clone)]
pub enum AddressMatcher {
    /// Accepts every address, including empty and malformed ones.
    AllowAll,
    /// Accepts addresses in which the expression finds a match.
    Pattern(Regex),
}

impl AddressMatcher {
    /// Compile a single pattern. `""` and `"*"` become [`AddressMatcher::AllowAll`].
    pub fn compile(pattern: &str) -> Result<Self, CredentialError> {
        if ALLOW_ALL_PATTERNS.contains(&pattern) {
            return Ok(AddressMatcher::AllowAll);
        }
        Regex::new(pattern)
            .map(AddressMatcher::Pattern)
            .map_err(|source| CredentialError::InvalidAddressPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn matches(&self, address: &str) -> bool {
        match self {
            AddressMatcher::AllowAll => true,
            AddressMatcher::Pattern(re) => re.is_match(address),
        }
    }

    pub fn is_allow_all(&self) -> bool {
        matches!(self, AddressMatcher::AllowAll)
    }

    /// The source text of this matcher, `*` for allow-all.
    pub fn as_str(&self) -> &str {
        match self {
            AddressMatcher::AllowAll => "*",
            AddressMatcher::Pattern(re) => re.as_str(),
        }
    }
}

impl std::fmt::Display for AddressMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compile every pattern in order.
///
/// One malformed pattern fails the whole list, so a principal is never
/// published with only part of its address rules.
pub fn compile_address_patterns<I, S>(patterns: I) -> Result<Vec<AddressMatcher>, CredentialError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|pattern| AddressMatcher::compile(pattern.as_ref()))
        .collect()
}
