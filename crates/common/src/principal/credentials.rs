use super::CredentialError;

/// Split a `name:secret` token on the first colon.
///
/// The secret keeps any further colons verbatim. A token without a
/// colon, or with nothing before it, is rejected.
pub fn parse_auth(token: &str) -> Result<(&str, &str), CredentialError> {
    match token.split_once(':') {
        Some((name, _)) if name.is_empty() => Err(CredentialError::EmptyName),
        Some((name, secret)) => Ok((name, secret)),
        None => Err(CredentialError::MissingSeparator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auth_splits_on_first_colon() {
        let (name, secret) = parse_auth("alice:s3:cr:et").unwrap();
        assert_eq!(name, "alice");
        assert_eq!(secret, "s3:cr:et");
    }

    #[test]
    fn test_parse_auth_allows_empty_secret() {
        let (name, secret) = parse_auth("bob:").unwrap();
        assert_eq!(name, "bob");
        assert_eq!(secret, "");
    }

    #[test]
    fn test_parse_auth_rejects_missing_colon() {
        assert_eq!(parse_auth("alice"), Err(CredentialError::MissingSeparator));
        assert_eq!(parse_auth(""), Err(CredentialError::MissingSeparator));
    }

    #[test]
    fn test_parse_auth_rejects_empty_name() {
        assert_eq!(parse_auth(":secret"), Err(CredentialError::EmptyName));
    }
}
