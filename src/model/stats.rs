//! Aggregate statistics returned by the query engine.

use serde::{Deserialize, Serialize};

use super::TaggedValue;

/// Row count, distinct keys and timestamp range over a set of rows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_records: u64,
    pub unique_keys: u64,
    pub oldest_timestamp: Option<String>,
    pub newest_timestamp: Option<String>,
}

impl HistoryStats {
    /// Returns true if no rows were counted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.total_records == 0
    }
}

/// Statistics scoped to one tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagStats {
    pub tag: String,
    #[serde(flatten)]
    pub stats: HistoryStats,
    /// Resolved pairs under the tag; only filled for single-tag lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<TaggedValue>>,
}

/// Statistics scoped to one version number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStats {
    pub version: i64,
    #[serde(flatten)]
    pub stats: HistoryStats,
}
