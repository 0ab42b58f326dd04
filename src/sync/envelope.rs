//! JSON snapshot envelope.
//!
//! The exchange format for one tagged snapshot:
//!
//! ```json
//! {"tag":"v1","timestamp":"2024-05-01T10:00:00.000Z","items":[{"key":"A","value":"1"}]}
//! ```
//!
//! Items with a `null` value are carried through and skipped on apply.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::model::now_timestamp;
use crate::storage::{BatchUpsert, HistoryStore};
use crate::sync::file::atomic_write;

/// One key/value pair of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvelopeItem {
    pub key: String,
    #[serde(default)]
    pub value: Option<String>,
}

/// A tagged snapshot as exchanged between stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    /// Tag to apply under; `None` lets the receiving store pick `auto-<N>`.
    #[serde(default)]
    pub tag: Option<String>,
    pub timestamp: String,
    #[serde(default)]
    pub items: Vec<EnvelopeItem>,
}

impl SnapshotEnvelope {
    /// Build an envelope from the live values of `tag`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store query fails.
    pub fn from_store(store: &HistoryStore, tag: &str) -> Result<Self> {
        let items = store
            .get_tagged_values(tag)?
            .into_iter()
            .map(|(key, value)| EnvelopeItem {
                key,
                value: Some(value),
            })
            .collect();

        Ok(Self {
            tag: Some(tag.to_string()),
            timestamp: now_timestamp(),
            items,
        })
    }

    /// Number of items with a value.
    #[must_use]
    pub fn value_count(&self) -> usize {
        self.items.iter().filter(|i| i.value.is_some()).count()
    }

    /// Write as pretty JSON, atomically.
    ///
    /// # Errors
    ///
    /// Returns `Json` or `Io` on failure.
    pub fn write(&self, path: &Path) -> Result<()> {
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        atomic_write(path, &content)?;
        debug!(path = %path.display(), items = self.items.len(), "Envelope written");
        Ok(())
    }

    /// Read an envelope from disk.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read or `Json` if it is malformed.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Upsert the envelope's values into `store` as one snapshot.
    ///
    /// Applying the same envelope twice leaves the store unchanged.
    ///
    /// # Errors
    ///
    /// Propagates validation and storage errors; nothing is written on error.
    pub fn apply(&self, store: &mut HistoryStore, source: &str) -> Result<BatchUpsert> {
        store.batch_upsert_tagged_values(
            self.items.iter().map(|i| (i.key.as_str(), i.value.as_deref())),
            self.tag.as_deref(),
            source,
        )
    }
}
