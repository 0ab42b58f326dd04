//! History record model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Physical layout a store was created with.
///
/// A store holds exactly one dialect for its whole life, except for the
/// one-way conversion from `Versioned` to `Tagged`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dialect {
    /// One live row per `(key, tag)`; writes overwrite in place.
    #[default]
    Tagged,
    /// Append-only rows with a per-key version counter.
    Versioned,
}

impl Dialect {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Tagged => "tagged",
            Self::Versioned => "versioned",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tagged" | "tag" | "upsert" => Ok(Self::Tagged),
            "versioned" | "version" | "append" | "legacy" => Ok(Self::Versioned),
            other => Err(format!(
                "unknown store mode '{other}' (expected 'tagged' or 'versioned')"
            )),
        }
    }
}

/// Audit semantics of a versioned write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Created,
    Updated,
    Deleted,
}

impl Action {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Self::Created),
            "updated" => Ok(Self::Updated),
            "deleted" => Ok(Self::Deleted),
            other => Err(format!("unknown action '{other}'")),
        }
    }
}

/// A single entry of the history table.
///
/// `version` and `action` are only populated by versioned stores; tag-only
/// rows in a versioned store carry `version: None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: i64,
    pub key: String,
    pub value: String,
    /// RFC 3339 timestamp with offset, set by the writer.
    pub timestamp: String,
    pub tag: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Which caller produced the row (display only).
    pub source: String,
}

/// Input for an append to a versioned store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRecord {
    pub key: String,
    pub value: String,
    pub timestamp: String,
    pub action: Action,
    pub source: String,
}

impl NewRecord {
    /// Create a record stamped with the current time.
    #[must_use]
    pub fn now(key: &str, value: &str, action: Action, source: &str) -> Self {
        Self {
            key: key.to_string(),
            value: value.to_string(),
            timestamp: now_timestamp(),
            action,
            source: source.to_string(),
        }
    }
}

/// A key/value pair resolved under a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaggedValue {
    pub key: String,
    pub value: String,
}

/// Current UTC time as an RFC 3339 string with millisecond precision.
///
/// Fixed width and `Z` suffix keep lexicographic order equal to time order.
#[must_use]
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
