//! Append/versioning engine (versioned dialect only).
//!
//! Every write appends a row. Each key carries its own counter: a new
//! row gets `1 + max(version)` for that key, computed inside the write
//! transaction. Tag-only rows have no version and leave the counter alone.

use crate::error::Result;
use crate::model::{now_timestamp, Action, Dialect, HistoryRecord, HistoryStats, NewRecord, VersionStats};
use crate::storage::query::{fetch_record, map_record, record_columns, stamp_bounds};
use crate::storage::HistoryStore;
use crate::validate::{normalize_timestamp, validate_key, validate_tag};
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, trace};

/// Append `record` with the next version for its key.
fn insert_versioned(conn: &Connection, record: &NewRecord) -> rusqlite::Result<HistoryRecord> {
    let current: i64 = conn
        .prepare_cached("SELECT COALESCE(MAX(version), 0) FROM env_history WHERE key = ?1")?
        .query_row([&record.key], |row| row.get(0))?;
    let version = current + 1;

    conn.prepare_cached(
        "INSERT INTO env_history (key, value, timestamp, version, action, source, tag)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
    )?
    .execute(rusqlite::params![
        record.key,
        record.value,
        record.timestamp,
        version,
        record.action.as_str(),
        record.source,
    ])?;

    trace!(key = %record.key, version, "Appended version");
    Ok(HistoryRecord {
        id: conn.last_insert_rowid(),
        key: record.key.clone(),
        value: record.value.clone(),
        timestamp: record.timestamp.clone(),
        tag: None,
        version: Some(version),
        action: Some(record.action),
        source: record.source.clone(),
    })
}

/// Action of the newest version of `key`, if it has one.
fn latest_action(conn: &Connection, key: &str) -> rusqlite::Result<Option<Action>> {
    let action: Option<Option<String>> = conn
        .prepare_cached(
            "SELECT action FROM env_history
             WHERE key = ?1 AND version IS NOT NULL
             ORDER BY version DESC LIMIT 1",
        )?
        .query_row([key], |row| row.get(0))
        .optional()?;

    action
        .flatten()
        .map(|name| {
            name.parse::<Action>().map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
            })
        })
        .transpose()
}

/// Checked copy of `record` with its stamp restated in UTC.
fn prepare_record(record: &NewRecord) -> Result<NewRecord> {
    validate_key(&record.key)?;
    Ok(NewRecord {
        timestamp: normalize_timestamp(&record.timestamp)?,
        ..record.clone()
    })
}

impl HistoryStore {
    /// Append a new version of `key`.
    ///
    /// The stored stamp is `timestamp` converted to UTC, so history sorts
    /// by instant whatever offset the caller used.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` on a tagged store, `InvalidArgument`
    /// for a bad key or timestamp, or a storage error.
    pub fn add_record(
        &mut self,
        key: &str,
        value: &str,
        timestamp: &str,
        action: Action,
        source: &str,
    ) -> Result<HistoryRecord> {
        let record = NewRecord {
            key: key.to_string(),
            value: value.to_string(),
            timestamp: timestamp.to_string(),
            action,
            source: source.to_string(),
        };
        let mut inserted = self.append("add_record", std::slice::from_ref(&record))?;
        Ok(inserted.remove(0))
    }

    /// Append a batch in one transaction.
    ///
    /// Versions are computed row by row inside the transaction, so two
    /// entries for the same key get consecutive versions.
    ///
    /// # Errors
    ///
    /// As for [`HistoryStore::add_record`]; a failure writes nothing.
    pub fn add_records(&mut self, batch: &[NewRecord]) -> Result<Vec<HistoryRecord>> {
        self.append("add_records", batch)
    }

    fn append(&mut self, op: &'static str, batch: &[NewRecord]) -> Result<Vec<HistoryRecord>> {
        self.require_dialect(op, Dialect::Versioned)?;
        let batch = batch
            .iter()
            .map(prepare_record)
            .collect::<Result<Vec<_>>>()?;

        let context = match batch.as_slice() {
            [single] => format!("key={}", single.key),
            _ => format!("records={}", batch.len()),
        };
        let inserted = self.mutate(op, &context, |tx| {
            batch.iter().map(|record| insert_versioned(tx, record)).collect()
        })?;

        debug!(op, records = batch.len(), "Appended history");
        Ok(inserted)
    }

    /// Append `value` as the next version of `key`, as `set` does.
    ///
    /// The action is `created` when the key has no live version (none yet,
    /// or the newest is a deletion) and `updated` otherwise. The check and
    /// the append share one write transaction.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` on a tagged store, `InvalidArgument`
    /// for a bad key, or a storage error.
    pub fn set_versioned_value(
        &mut self,
        key: &str,
        value: &str,
        source: &str,
    ) -> Result<HistoryRecord> {
        const OP: &str = "set_versioned_value";
        self.require_dialect(OP, Dialect::Versioned)?;
        validate_key(key)?;

        let record = self.mutate(OP, &format!("key={key}"), |tx| {
            let action = match latest_action(tx, key)? {
                None | Some(Action::Deleted) => Action::Created,
                Some(_) => Action::Updated,
            };
            insert_versioned(tx, &NewRecord::now(key, value, action, source))
        })?;

        debug!(key, version = ?record.version, action = ?record.action, "Value set");
        Ok(record)
    }

    /// Append a `deleted` version with an empty value.
    ///
    /// Returns `None` and writes nothing when `key` has no live version.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` on a tagged store, `InvalidArgument`
    /// for a bad key, or a storage error.
    pub fn delete_versioned_value(
        &mut self,
        key: &str,
        source: &str,
    ) -> Result<Option<HistoryRecord>> {
        const OP: &str = "delete_versioned_value";
        self.require_dialect(OP, Dialect::Versioned)?;
        validate_key(key)?;

        let record = self.mutate(OP, &format!("key={key}"), |tx| {
            match latest_action(tx, key)? {
                None | Some(Action::Deleted) => Ok(None),
                Some(_) => {
                    let record = NewRecord::now(key, "", Action::Deleted, source);
                    insert_versioned(tx, &record).map(Some)
                }
            }
        })?;

        match &record {
            Some(record) => debug!(key, version = ?record.version, "Value deleted"),
            None => debug!(key, "Nothing to delete"),
        }
        Ok(record)
    }

    /// Row with the highest version for `key`, or `None`.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` on a tagged store, or a storage error.
    pub fn get_latest_version(&self, key: &str) -> Result<Option<HistoryRecord>> {
        const OP: &str = "get_latest_version";
        self.require_dialect(OP, Dialect::Versioned)?;
        let sql = format!(
            "SELECT {} FROM env_history
             WHERE key = ?1 AND version IS NOT NULL
             ORDER BY version DESC LIMIT 1",
            record_columns(Dialect::Versioned)
        );
        self.read(OP, &format!("key={key}"), |conn| {
            conn.query_row(&sql, [key], map_record).optional()
        })
    }

    /// Record `value` under `tag` as of now, without a version.
    ///
    /// Always appends; use [`HistoryStore::upsert_tagged_value`] to avoid
    /// duplicates on repeated runs.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` on a tagged store, `InvalidArgument`,
    /// or a storage error.
    pub fn create_tagged_version(
        &mut self,
        key: &str,
        value: &str,
        tag: &str,
        source: &str,
    ) -> Result<HistoryRecord> {
        const OP: &str = "create_tagged_version";
        self.require_dialect(OP, Dialect::Versioned)?;
        validate_key(key)?;
        validate_tag(tag)?;

        let timestamp = now_timestamp();
        let id = self.mutate(OP, &format!("key={key} tag={tag}"), |tx| {
            tx.prepare_cached(
                "INSERT INTO env_history (key, value, timestamp, version, action, source, tag)
                 VALUES (?1, ?2, ?3, NULL, NULL, ?4, ?5)",
            )?
            .execute(rusqlite::params![key, value, timestamp, source, tag])?;
            Ok(tx.last_insert_rowid())
        })?;

        Ok(HistoryRecord {
            id,
            key: key.to_string(),
            value: value.to_string(),
            timestamp,
            tag: Some(tag.to_string()),
            version: None,
            action: None,
            source: source.to_string(),
        })
    }

    /// Correct the latest version of `key` in place, or create version 1.
    ///
    /// Unlike [`HistoryStore::add_record`] this never adds a version to a
    /// key that already has one.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` on a tagged store, `InvalidArgument`,
    /// or a storage error.
    pub fn upsert_latest_versioned_value(
        &mut self,
        key: &str,
        value: &str,
        source: &str,
    ) -> Result<HistoryRecord> {
        const OP: &str = "upsert_latest_versioned_value";
        self.require_dialect(OP, Dialect::Versioned)?;
        validate_key(key)?;

        let timestamp = now_timestamp();
        let record = self.mutate(OP, &format!("key={key}"), |tx| {
            let latest: Option<i64> = tx
                .prepare_cached(
                    "SELECT id FROM env_history
                     WHERE key = ?1 AND version IS NOT NULL
                     ORDER BY version DESC LIMIT 1",
                )?
                .query_row([key], |row| row.get(0))
                .optional()?;

            match latest {
                Some(id) => {
                    tx.execute(
                        "UPDATE env_history SET value = ?1, timestamp = ?2 WHERE id = ?3",
                        rusqlite::params![value, timestamp, id],
                    )?;
                    fetch_record(tx, Dialect::Versioned, id)?
                        .ok_or(rusqlite::Error::QueryReturnedNoRows)
                }
                None => insert_versioned(
                    tx,
                    &NewRecord {
                        key: key.to_string(),
                        value: value.to_string(),
                        timestamp: timestamp.clone(),
                        action: Action::Created,
                        source: source.to_string(),
                    },
                ),
            }
        })?;

        debug!(key, version = ?record.version, "Latest version upserted");
        Ok(record)
    }

    /// Aggregates grouped by version number, ascending.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedOperation` on a tagged store, or a storage error.
    pub fn get_version_stats(&self) -> Result<Vec<VersionStats>> {
        const OP: &str = "get_version_stats";
        self.require_dialect(OP, Dialect::Versioned)?;
        let sql = format!(
            "SELECT h.version, COUNT(*), COUNT(DISTINCT h.key), {}
             FROM env_history h WHERE h.version IS NOT NULL
             GROUP BY h.version ORDER BY h.version",
            stamp_bounds("s.version = h.version")
        );
        self.read(OP, "", |conn| {
            conn.prepare(&sql)?
                .query_map([], |row| {
                    Ok(VersionStats {
                        version: row.get(0)?,
                        stats: HistoryStats {
                            total_records: row.get(1)?,
                            unique_keys: row.get(2)?,
                            oldest_timestamp: row.get(3)?,
                            newest_timestamp: row.get(4)?,
                        },
                    })
                })?
                .collect()
        })
    }
}
