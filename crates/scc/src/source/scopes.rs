//! Token scope checks for connection validation.

use regex::Regex;

use super::errors::{Result, SourceError};

/// Split a comma-separated scope header (`X-OAuth-Scopes`) into scopes.
#[must_use]
pub fn parse_scopes(header: &str) -> Vec<String> {
    header
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Check that every required scope pattern matches at least one granted scope.
///
/// Patterns are regular expressions matched anywhere in the scope name, so
/// `(admin|read):org` accepts `admin:org` and `read:org` but not `write:org`.
/// A pattern that fails to compile is a verification error.
pub fn check_scopes<S: AsRef<str>>(granted: &[String], required: &[S]) -> Result<()> {
    let mut missing = Vec::new();
    for pattern in required {
        let pattern = pattern.as_ref();
        let re = Regex::new(pattern).map_err(|e| {
            SourceError::verification(format!("failed to compile regexp: {e}"))
        })?;
        if !granted.iter().any(|scope| re.is_match(scope)) {
            missing.push(pattern.to_string());
        }
    }

    if missing.is_empty() {
        return Ok(());
    }

    tracing::debug!(
        "Token scopes {:?} do not satisfy required {:?}",
        granted,
        missing
    );
    Err(SourceError::verification(format!(
        "github access token is missing scopes: required [{}], provided [{}]",
        missing.join(", "),
        granted.join(", ")
    )))
}
