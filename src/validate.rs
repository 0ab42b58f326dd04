//! Input validation for keys, tags and timestamps.
//!
//! The store accepts any non-empty key, but a key that could never be an
//! environment variable name (`=` or NUL inside, surrounding whitespace)
//! is almost always a parsing mistake upstream, so it is rejected here.

use crate::error::{Error, Result};

/// Validate an environment variable name.
///
/// # Errors
///
/// Returns `InvalidArgument` if the key is empty or malformed.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("key must not be empty".to_string()));
    }
    if key.trim() != key {
        return Err(Error::InvalidArgument(format!(
            "key '{key}' has leading or trailing whitespace"
        )));
    }
    if key.contains('=') || key.contains('\0') {
        return Err(Error::InvalidArgument(format!(
            "key '{}' contains '=' or NUL",
            key.escape_debug()
        )));
    }
    Ok(())
}

/// Validate a caller-supplied tag name.
///
/// # Errors
///
/// Returns `InvalidArgument` if the tag is blank or has control characters.
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.trim().is_empty() {
        return Err(Error::InvalidArgument("tag must not be empty".to_string()));
    }
    if tag.chars().any(char::is_control) {
        return Err(Error::InvalidArgument(format!(
            "tag '{}' contains control characters",
            tag.escape_debug()
        )));
    }
    Ok(())
}

/// Parse an RFC 3339 timestamp and restate it in UTC with millisecond
/// precision, the shape every writer stores.
///
/// # Errors
///
/// Returns `InvalidArgument` if the timestamp does not parse.
pub fn normalize_timestamp(timestamp: &str) -> Result<String> {
    chrono::DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| {
            parsed
                .with_timezone(&chrono::Utc)
                .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
        })
        .map_err(|e| Error::InvalidArgument(format!("invalid timestamp '{timestamp}': {e}")))
}
