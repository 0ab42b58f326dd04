//! Query engine: point lookups, tag lookups, aggregates and retention.
//!
//! Everything here works on both dialects except `get_version_stats`,
//! which lives with the versioned engine.

use crate::error::Result;
use crate::model::{Action, Dialect, HistoryRecord, HistoryStats, TagStats, TaggedValue};
use crate::storage::HistoryStore;
use rusqlite::{Connection, OptionalExtension, Row};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Column list producing the shape `map_record` expects.
///
/// Tagged tables have no `version`/`action` columns; select NULL instead.
pub(crate) const fn record_columns(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Tagged => "id, key, value, timestamp, tag, NULL, NULL, source",
        Dialect::Versioned => "id, key, value, timestamp, tag, version, action, source",
    }
}

pub(crate) fn map_record(row: &Row<'_>) -> rusqlite::Result<HistoryRecord> {
    let action = row
        .get::<_, Option<String>>(6)?
        .map(|s| s.parse::<Action>())
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, e.into())
        })?;

    Ok(HistoryRecord {
        id: row.get(0)?,
        key: row.get(1)?,
        value: row.get(2)?,
        timestamp: row.get(3)?,
        tag: row.get(4)?,
        version: row.get(5)?,
        action,
        source: row.get(7)?,
    })
}

/// Fetch one row by id.
pub(crate) fn fetch_record(
    conn: &Connection,
    dialect: Dialect,
    id: i64,
) -> rusqlite::Result<Option<HistoryRecord>> {
    let sql = format!(
        "SELECT {} FROM env_history WHERE id = ?1",
        record_columns(dialect)
    );
    conn.query_row(&sql, [id], map_record).optional()
}

/// Oldest and newest stamp of the rows matching `filter`, picked by instant
/// rather than by text. `filter` may reference the outer row as `h`.
pub(crate) fn stamp_bounds(filter: &str) -> String {
    format!(
        "(SELECT s.timestamp FROM env_history s WHERE {filter}
           ORDER BY julianday(s.timestamp), s.id LIMIT 1),
         (SELECT s.timestamp FROM env_history s WHERE {filter}
           ORDER BY julianday(s.timestamp) DESC, s.id DESC LIMIT 1)"
    )
}

/// SQLite `LIMIT` value; negative means unbounded.
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX))
}

fn map_stats(row: &Row<'_>, offset: usize) -> rusqlite::Result<HistoryStats> {
    Ok(HistoryStats {
        total_records: row.get(offset)?,
        unique_keys: row.get(offset + 1)?,
        oldest_timestamp: row.get(offset + 2)?,
        newest_timestamp: row.get(offset + 3)?,
    })
}

impl HistoryStore {
    /// All rows for a key, newest first, capped at `limit` (`None` = all).
    ///
    /// Versioned stores order by version (tag-only rows last), tagged
    /// stores by timestamp; ties fall back to insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the query fails.
    pub fn get_history_by_key(&self, key: &str, limit: Option<usize>) -> Result<Vec<HistoryRecord>> {
        let dialect = self.dialect();
        let order = match dialect {
            Dialect::Versioned => "version DESC NULLS LAST, julianday(timestamp) DESC, id DESC",
            Dialect::Tagged => "julianday(timestamp) DESC, id DESC",
        };
        let sql = format!(
            "SELECT {} FROM env_history WHERE key = ?1 ORDER BY {order} LIMIT ?2",
            record_columns(dialect)
        );

        self.read("get_history_by_key", &format!("key={key}"), |conn| {
            conn.prepare(&sql)?
                .query_map(rusqlite::params![key, sql_limit(limit)], map_record)?
                .collect()
        })
    }

    /// All rows across all keys, newest first by instant.
    ///
    /// Stamps are compared through `julianday()`, so rows written with
    /// different offsets still order by the moment they denote.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the query fails.
    pub fn get_all_history(&self, limit: Option<usize>) -> Result<Vec<HistoryRecord>> {
        let sql = format!(
            "SELECT {} FROM env_history ORDER BY julianday(timestamp) DESC, id DESC LIMIT ?1",
            record_columns(self.dialect())
        );

        self.read("get_all_history", "", |conn| {
            conn.prepare(&sql)?
                .query_map([sql_limit(limit)], map_record)?
                .collect()
        })
    }

    /// Rows for `key` written under `tag`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the query fails.
    pub fn get_history_by_key_and_tag(
        &self,
        key: &str,
        tag: &str,
        limit: Option<usize>,
    ) -> Result<Vec<HistoryRecord>> {
        let sql = format!(
            "SELECT {} FROM env_history WHERE key = ?1 AND tag = ?2
             ORDER BY julianday(timestamp) DESC, id DESC LIMIT ?3",
            record_columns(self.dialect())
        );

        self.read("get_history_by_key_and_tag", &format!("key={key} tag={tag}"), |conn| {
            conn.prepare(&sql)?
                .query_map(rusqlite::params![key, tag, sql_limit(limit)], map_record)?
                .collect()
        })
    }

    /// All rows under a tag, ordered by key then insertion.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the query fails.
    pub fn get_history_by_tag(&self, tag: &str, limit: Option<usize>) -> Result<Vec<HistoryRecord>> {
        let sql = format!(
            "SELECT {} FROM env_history WHERE tag = ?1 ORDER BY key, id LIMIT ?2",
            record_columns(self.dialect())
        );

        self.read("get_history_by_tag", &format!("tag={tag}"), |conn| {
            conn.prepare(&sql)?
                .query_map(rusqlite::params![tag, sql_limit(limit)], map_record)?
                .collect()
        })
    }

    /// Key/value map for exactly one tag.
    ///
    /// An unknown tag yields an empty map. If a versioned store holds more
    /// than one row for a `(key, tag)`, the most recently inserted wins.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the query fails.
    pub fn get_tagged_values(&self, tag: &str) -> Result<BTreeMap<String, String>> {
        self.read("get_tagged_values", &format!("tag={tag}"), |conn| {
            let mut stmt = conn
                .prepare_cached("SELECT key, value FROM env_history WHERE tag = ?1 ORDER BY id")?;
            let rows = stmt.query_map([tag], |row| Ok((row.get(0)?, row.get(1)?)))?;

            let mut values = BTreeMap::new();
            for row in rows {
                let (key, value): (String, String) = row?;
                values.insert(key, value);
            }
            Ok(values)
        })
    }

    /// Distinct non-null tags, sorted lexicographically.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the query fails.
    pub fn get_all_tags(&self) -> Result<Vec<String>> {
        self.read("get_all_tags", "", |conn| {
            conn.prepare_cached(
                "SELECT DISTINCT tag FROM env_history WHERE tag IS NOT NULL ORDER BY tag",
            )?
            .query_map([], |row| row.get(0))?
            .collect()
        })
    }

    /// Aggregates over the whole table.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the query fails.
    pub fn get_stats(&self) -> Result<HistoryStats> {
        let sql = format!(
            "SELECT COUNT(*), COUNT(DISTINCT key), {} FROM env_history",
            stamp_bounds("1")
        );
        self.read("get_stats", "", |conn| {
            conn.query_row(&sql, [], |row| map_stats(row, 0))
        })
    }

    /// Aggregates for one tag plus its resolved key/value pairs.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the query fails.
    pub fn get_tag_stats(&self, tag: &str) -> Result<TagStats> {
        let sql = format!(
            "SELECT COUNT(*), COUNT(DISTINCT key), {} FROM env_history WHERE tag = ?1",
            stamp_bounds("s.tag = ?1")
        );
        let stats = self.read("get_tag_stats", &format!("tag={tag}"), |conn| {
            conn.query_row(&sql, [tag], |row| map_stats(row, 0))
        })?;

        let values = self
            .get_tagged_values(tag)?
            .into_iter()
            .map(|(key, value)| TaggedValue { key, value })
            .collect();

        Ok(TagStats {
            tag: tag.to_string(),
            stats,
            values: Some(values),
        })
    }

    /// Aggregates for every tag, sorted by tag name.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the query fails.
    pub fn get_all_tags_stats(&self) -> Result<Vec<TagStats>> {
        let sql = format!(
            "SELECT h.tag, COUNT(*), COUNT(DISTINCT h.key), {}
             FROM env_history h WHERE h.tag IS NOT NULL
             GROUP BY h.tag ORDER BY h.tag",
            stamp_bounds("s.tag = h.tag")
        );
        self.read("get_all_tags_stats", "", |conn| {
            conn.prepare(&sql)?
                .query_map([], |row| {
                    Ok(TagStats {
                        tag: row.get(0)?,
                        stats: map_stats(row, 1)?,
                        values: None,
                    })
                })?
                .collect()
        })
    }

    /// Delete rows older than `max_age`, returning how many were removed.
    ///
    /// This is the only path that physically deletes history.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a negative age, or a storage error.
    /// An age reaching past the earliest representable instant removes
    /// nothing.
    pub fn prune_older_than(&mut self, max_age: chrono::Duration) -> Result<usize> {
        if max_age < chrono::Duration::zero() {
            return Err(crate::error::Error::InvalidArgument(
                "retention age must not be negative".to_string(),
            ));
        }
        let Some(cutoff) = chrono::Utc::now().checked_sub_signed(max_age) else {
            debug!(days = max_age.num_days(), "Retention age predates any timestamp");
            return Ok(0);
        };
        self.prune_before(cutoff)
    }

    /// Delete rows with a timestamp strictly before `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is closed or the delete fails.
    pub fn prune_before(&mut self, cutoff: chrono::DateTime<chrono::Utc>) -> Result<usize> {
        let cutoff = cutoff.to_rfc3339_opts(chrono::SecondsFormat::Millis, true);
        let context = format!("cutoff={cutoff}");

        // julianday() normalizes offsets, so mixed-offset rows compare correctly.
        let removed = self.mutate("prune_before", &context, |tx| {
            tx.execute(
                "DELETE FROM env_history WHERE julianday(timestamp) < julianday(?1)",
                [&cutoff],
            )
        })?;

        if removed > 0 {
            info!(removed, %cutoff, "Pruned history");
        } else {
            debug!(%cutoff, "Nothing to prune");
        }
        Ok(removed)
    }
}
