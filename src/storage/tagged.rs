//! Upsert engine: tagged snapshots that overwrite instead of duplicating.
//!
//! A snapshot is a set of key/value pairs written under one tag in one
//! transaction. Writing the same `(key, tag)` again updates the row in
//! place. Works on both dialects; in a versioned store the rows carry no
//! version and never touch the per-key counter.

use crate::error::{Error, Result};
use crate::model::{now_timestamp, Dialect};
use crate::storage::autotag::next_auto_tag;
use crate::storage::HistoryStore;
use crate::validate::{validate_key, validate_tag};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, trace};

/// Outcome of a batch upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchUpsert {
    /// Tag the batch was written under (generated if none was supplied).
    pub tag: String,
    pub auto_generated: bool,
    /// Pairs written (inserted or overwritten).
    pub written: usize,
    /// Pairs skipped because they had no value.
    pub skipped: usize,
}

/// Insert or overwrite the row for `(key, tag)`.
pub(crate) fn upsert_tagged_row(
    conn: &Connection,
    dialect: Dialect,
    key: &str,
    value: &str,
    tag: &str,
    timestamp: &str,
    source: &str,
) -> rusqlite::Result<()> {
    match dialect {
        Dialect::Tagged => {
            conn.prepare_cached(
                "INSERT INTO env_history (key, value, timestamp, tag, source)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(key, tag) DO UPDATE SET
                    value = excluded.value,
                    timestamp = excluded.timestamp",
            )?
            .execute(rusqlite::params![key, value, timestamp, tag, source])?;
        }
        Dialect::Versioned => {
            // No unique (key, tag) index here: update the newest match, if any.
            let updated = conn
                .prepare_cached(
                    "UPDATE env_history SET value = ?1, timestamp = ?2
                     WHERE id = (SELECT MAX(id) FROM env_history WHERE key = ?3 AND tag = ?4)",
                )?
                .execute(rusqlite::params![value, timestamp, key, tag])?;
            if updated == 0 {
                conn.prepare_cached(
                    "INSERT INTO env_history (key, value, timestamp, version, action, source, tag)
                     VALUES (?1, ?2, ?3, NULL, NULL, ?4, ?5)",
                )?
                .execute(rusqlite::params![key, value, timestamp, source, tag])?;
            }
        }
    }
    trace!(key, tag, "Upserted tagged value");
    Ok(())
}

impl HistoryStore {
    /// Write a snapshot of values under `tag`, all or nothing.
    ///
    /// With `tag = None` the next `auto-<N>` tag is generated inside the
    /// same transaction. Pairs whose value is `None` are skipped. An
    /// existing row for `(key, tag)` has its value and timestamp replaced.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a bad key or tag, or when no unused
    /// auto tag number is left (nothing is written), `StoreClosed`, or a
    /// storage error (the whole batch is rolled back).
    pub fn batch_upsert_tagged_values<I, K, V>(
        &mut self,
        values: I,
        tag: Option<&str>,
        source: &str,
    ) -> Result<BatchUpsert>
    where
        I: IntoIterator<Item = (K, Option<V>)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        const OP: &str = "batch_upsert_tagged_values";
        self.conn(OP)?;
        if let Some(tag) = tag {
            validate_tag(tag)?;
        }

        let mut pairs = Vec::new();
        let mut skipped = 0;
        for (key, value) in values {
            let key = key.as_ref();
            validate_key(key)?;
            match value {
                Some(value) => pairs.push((key.to_string(), value.as_ref().to_string())),
                None => skipped += 1,
            }
        }

        let dialect = self.dialect();
        let timestamp = now_timestamp();
        let context = tag.map_or_else(|| "tag=<auto>".to_string(), |t| format!("tag={t}"));

        let resolved = self.mutate(OP, &context, |tx| {
            let resolved = match tag {
                Some(tag) => tag.to_string(),
                None => match next_auto_tag(tx)? {
                    Some(generated) => generated,
                    None => return Ok(None),
                },
            };
            for (key, value) in &pairs {
                upsert_tagged_row(tx, dialect, key, value, &resolved, &timestamp, source)?;
            }
            Ok(Some(resolved))
        })?;
        let Some(resolved) = resolved else {
            return Err(Error::InvalidArgument(
                "auto tag numbers are exhausted; pass an explicit tag".to_string(),
            ));
        };

        debug!(
            tag = %resolved,
            written = pairs.len(),
            skipped,
            "Snapshot written"
        );

        Ok(BatchUpsert {
            tag: resolved,
            auto_generated: tag.is_none(),
            written: pairs.len(),
            skipped,
        })
    }

    /// Insert or overwrite one value under a tag.
    ///
    /// Used by pull/sync flows that must not duplicate a tagged snapshot
    /// when run again.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument`, `StoreClosed`, or a storage error.
    pub fn upsert_tagged_value(
        &mut self,
        key: &str,
        value: &str,
        tag: &str,
        source: &str,
    ) -> Result<()> {
        const OP: &str = "upsert_tagged_value";
        self.conn(OP)?;
        validate_key(key)?;
        validate_tag(tag)?;

        let dialect = self.dialect();
        let timestamp = now_timestamp();
        self.mutate(OP, &format!("key={key} tag={tag}"), |tx| {
            upsert_tagged_row(tx, dialect, key, value, tag, &timestamp, source)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn some(values: &BTreeMap<String, String>) -> impl Iterator<Item = (&String, Option<&String>)> {
        values.iter().map(|(k, v)| (k, Some(v)))
    }

    #[test]
    fn test_snapshot_roundtrip() {
        for dialect in [Dialect::Tagged, Dialect::Versioned] {
            let mut store = HistoryStore::open_memory(dialect).unwrap();
            let values = map(&[("A", "x"), ("B", ""), ("C", "with spaces = ok")]);

            let outcome = store
                .batch_upsert_tagged_values(some(&values), Some("v1"), "tag")
                .unwrap();
            assert_eq!(outcome.tag, "v1");
            assert!(!outcome.auto_generated);
            assert_eq!(outcome.written, 3);

            assert_eq!(store.get_tagged_values("v1").unwrap(), values, "{dialect}");
        }
    }

    #[test]
    fn test_repeat_snapshot_is_idempotent() {
        for dialect in [Dialect::Tagged, Dialect::Versioned] {
            let mut store = HistoryStore::open_memory(dialect).unwrap();
            let values = map(&[("A", "x"), ("B", "y")]);

            store
                .batch_upsert_tagged_values(some(&values), Some("v1"), "pull")
                .unwrap();
            store
                .batch_upsert_tagged_values(some(&values), Some("v1"), "pull")
                .unwrap();

            assert_eq!(store.get_tagged_values("v1").unwrap(), values);
            assert_eq!(store.get_tag_stats("v1").unwrap().stats.total_records, 2, "{dialect}");
        }
    }

    #[test]
    fn test_partial_overwrite_leaves_other_keys() {
        let mut store = HistoryStore::open_memory(Dialect::Tagged).unwrap();
        store
            .batch_upsert_tagged_values([("A", Some("x")), ("B", Some("y"))], Some("v1"), "tag")
            .unwrap();
        store
            .batch_upsert_tagged_values([("A", Some("z"))], Some("v1"), "tag")
            .unwrap();

        assert_eq!(store.get_tagged_values("v1").unwrap(), map(&[("A", "z"), ("B", "y")]));
        assert_eq!(store.get_stats().unwrap().total_records, 2);
    }

    #[test]
    fn test_overwrite_keeps_row_id() {
        let mut store = HistoryStore::open_memory(Dialect::Tagged).unwrap();
        store.upsert_tagged_value("A", "1", "v1", "pull").unwrap();
        let before = store.get_history_by_tag("v1", None).unwrap();
        store.upsert_tagged_value("A", "2", "v1", "pull").unwrap();
        let after = store.get_history_by_tag("v1", None).unwrap();

        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 1);
        assert_eq!(before[0].id, after[0].id);
        assert_eq!(after[0].value, "2");
    }

    #[test]
    fn test_auto_tags_increase() {
        let mut store = HistoryStore::open_memory(Dialect::Tagged).unwrap();
        let mut tags = Vec::new();
        for i in 0..4 {
            let value = i.to_string();
            let outcome = store
                .batch_upsert_tagged_values([("A", Some(value.as_str()))], None, "tag")
                .unwrap();
            assert!(outcome.auto_generated);
            tags.push(outcome.tag);
        }
        assert_eq!(tags, vec!["auto-1", "auto-2", "auto-3", "auto-4"]);
    }

    #[test]
    fn test_auto_tag_ignores_malformed_tags() {
        let mut store = HistoryStore::open_memory(Dialect::Tagged).unwrap();
        store.upsert_tagged_value("A", "1", "auto-7", "tag").unwrap();
        store.upsert_tagged_value("A", "1", "auto-latest", "tag").unwrap();
        store.upsert_tagged_value("A", "1", "auto-99x", "tag").unwrap();

        let outcome = store
            .batch_upsert_tagged_values([("A", Some("2"))], None, "tag")
            .unwrap();
        assert_eq!(outcome.tag, "auto-8");
    }

    #[test]
    fn test_exhausted_auto_tags_write_nothing() {
        let mut store = HistoryStore::open_memory(Dialect::Tagged).unwrap();
        let top = "auto-18446744073709551615";
        store.upsert_tagged_value("A", "old", top, "tag").unwrap();

        let err = store
            .batch_upsert_tagged_values([("A", Some("new")), ("B", Some("x"))], None, "tag")
            .unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));

        assert_eq!(store.get_tagged_values(top).unwrap(), map(&[("A", "old")]));
        assert_eq!(store.get_stats().unwrap().total_records, 1);

        // An explicit tag still works
        let outcome = store
            .batch_upsert_tagged_values([("B", Some("x"))], Some("manual"), "tag")
            .unwrap();
        assert_eq!(outcome.written, 1);
    }

    #[test]
    fn test_missing_values_are_skipped() {
        let mut store = HistoryStore::open_memory(Dialect::Tagged).unwrap();
        let outcome = store
            .batch_upsert_tagged_values(
                [("A", Some("x")), ("B", None), ("C", Some("z"))],
                Some("v1"),
                "tag",
            )
            .unwrap();

        assert_eq!(outcome.written, 2);
        assert_eq!(outcome.skipped, 1);
        assert_eq!(store.get_tagged_values("v1").unwrap(), map(&[("A", "x"), ("C", "z")]));
    }

    #[test]
    fn test_invalid_key_writes_nothing() {
        let mut store = HistoryStore::open_memory(Dialect::Tagged).unwrap();
        let err = store
            .batch_upsert_tagged_values([("A", Some("x")), ("", Some("y"))], Some("v1"), "tag")
            .unwrap_err();

        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(store.get_tagged_values("v1").unwrap().is_empty());
    }

    #[test]
    fn test_failed_batch_rolls_back() {
        let mut store = HistoryStore::open_memory(Dialect::Tagged).unwrap();
        store.upsert_tagged_value("A", "old", "v1", "tag").unwrap();

        // Make every write of key 'B' fail inside the engine.
        store
            .conn("test")
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER reject_b BEFORE INSERT ON env_history
                 WHEN NEW.key = 'B'
                 BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
            )
            .unwrap();

        let err = store
            .batch_upsert_tagged_values([("A", Some("new")), ("B", Some("y"))], Some("v1"), "tag")
            .unwrap_err();
        assert!(err.to_string().contains("batch_upsert_tagged_values"));
        assert_eq!(store.get_tagged_values("v1").unwrap(), map(&[("A", "old")]));
    }

    #[test]
    fn test_tagged_rows_do_not_touch_versions() {
        let mut store = HistoryStore::open_memory(Dialect::Versioned).unwrap();
        store
            .add_record("A", "1", &now_timestamp(), crate::model::Action::Created, "init")
            .unwrap();
        store
            .batch_upsert_tagged_values([("A", Some("snap"))], Some("v1"), "tag")
            .unwrap();

        let next = store
            .add_record("A", "2", &now_timestamp(), crate::model::Action::Updated, "set")
            .unwrap();
        assert_eq!(next.version, Some(2));
        assert_eq!(store.get_latest_version("A").unwrap().unwrap().value, "2");
    }
}
