//! Schema management for the history store.
//!
//! The history table itself is created by the migration registry; this
//! module owns the bookkeeping tables, connection pragmas, index sets,
//! adoption of stores written before schema tracking existed, and the
//! transactional `ensure_schema` entry point.

use crate::error::{Error, Result};
use crate::model::Dialect;
use crate::storage::migrations::{self, step_error};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::{debug, info, warn};

/// Name of the history table.
pub const HISTORY_TABLE: &str = "env_history";

/// Bookkeeping tables shared by both dialects.
pub const META_SQL: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
";

const COMMON_INDEXES_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_env_history_key ON env_history(key);
CREATE INDEX IF NOT EXISTS idx_env_history_timestamp ON env_history(timestamp);
CREATE INDEX IF NOT EXISTS idx_env_history_tag ON env_history(tag);
";

const TAGGED_INDEXES_SQL: &str = r"
CREATE UNIQUE INDEX IF NOT EXISTS idx_env_history_key_tag ON env_history(key, tag);
";

const VERSIONED_INDEXES_SQL: &str = r"
CREATE UNIQUE INDEX IF NOT EXISTS idx_env_history_key_version
    ON env_history(key, version) WHERE version IS NOT NULL;
";

/// Outcome of a successful `ensure_schema` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaState {
    /// Dialect the store is now in.
    pub dialect: Dialect,
    /// Migration steps executed by this call, in order.
    pub applied: Vec<&'static str>,
    /// True if a pre-tracking table was adopted.
    pub adopted_legacy: bool,
}

/// Set connection pragmas.
///
/// Must run outside a transaction (`journal_mode` cannot change inside one).
///
/// # Errors
///
/// Returns an error if a pragma cannot be set.
pub fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    Ok(())
}

/// Create or migrate the schema so the store is in the requested dialect.
///
/// `requested = None` keeps whatever the store already is (tagged for a
/// fresh store). A versioned store is only converted to tagged when
/// `convert` is set; otherwise a differing request is a `DialectMismatch`.
///
/// Everything runs in a single IMMEDIATE transaction. On any failure the
/// transaction is rolled back and the database is exactly as it was.
///
/// # Errors
///
/// Returns `Migration` if any step fails, or `DialectMismatch`.
pub fn ensure_schema(
    conn: &mut Connection,
    requested: Option<Dialect>,
    convert: bool,
) -> Result<SchemaState> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(step_error("begin"))?;

    tx.execute_batch(META_SQL).map_err(step_error("meta_tables"))?;

    let mut stored = stored_dialect(&tx).map_err(step_error("store_meta"))?;
    let mut adopted_legacy = false;
    if stored.is_none() {
        stored = adopt_legacy_table(&tx)?;
        adopted_legacy = stored.is_some();
    }

    let dialect = resolve_dialect(stored, requested, convert)?;
    let applied = migrations::run_migrations(&tx, stored, dialect)?;

    tx.execute_batch(COMMON_INDEXES_SQL)
        .map_err(step_error("indexes"))?;
    let dialect_indexes = match dialect {
        Dialect::Tagged => TAGGED_INDEXES_SQL,
        Dialect::Versioned => VERSIONED_INDEXES_SQL,
    };
    tx.execute_batch(dialect_indexes)
        .map_err(step_error("indexes"))?;

    tx.execute(
        "INSERT INTO store_meta (key, value) VALUES ('dialect', ?1)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        [dialect.as_str()],
    )
    .map_err(step_error("store_meta"))?;

    tx.commit().map_err(step_error("commit"))?;

    if applied.is_empty() {
        debug!(%dialect, "Schema up to date");
    } else {
        info!(%dialect, steps = applied.len(), "Schema migrated");
    }

    Ok(SchemaState {
        dialect,
        applied,
        adopted_legacy,
    })
}

fn resolve_dialect(
    stored: Option<Dialect>,
    requested: Option<Dialect>,
    convert: bool,
) -> Result<Dialect> {
    match (stored, requested) {
        (None, requested) => Ok(requested.unwrap_or_default()),
        (Some(stored), None) => Ok(stored),
        (Some(stored), Some(requested)) if stored == requested => Ok(stored),
        (Some(Dialect::Versioned), Some(Dialect::Tagged)) if convert => Ok(Dialect::Tagged),
        (Some(stored), Some(requested)) => Err(Error::DialectMismatch { stored, requested }),
    }
}

/// Dialect recorded in `store_meta`, if any.
fn stored_dialect(conn: &Connection) -> rusqlite::Result<Option<Dialect>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value FROM store_meta WHERE key = 'dialect'",
            [],
            |row| row.get(0),
        )
        .optional()?;

    raw.map(|s| {
        s.parse::<Dialect>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, e.into())
        })
    })
    .transpose()
}

/// Column name and NOT NULL flag from `pragma_table_info`.
fn table_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<(String, bool)>> {
    conn.prepare("SELECT name, \"notnull\" FROM pragma_table_info(?1)")?
        .query_map([table], |row| Ok((row.get(0)?, row.get::<_, i64>(1)? == 1)))?
        .collect()
}

/// Take over a history table written before `schema_migrations` existed.
///
/// The column layout is inspected once, missing columns are added, and
/// the dialect baseline is marked applied so the regular registry takes
/// over. Tagged tables are rebuilt so `tag` is NOT NULL and unique per
/// key. Returns `None` when there is no history table at all.
fn adopt_legacy_table(conn: &Connection) -> Result<Option<Dialect>> {
    let step = "adopt_legacy";
    let columns = table_columns(conn, HISTORY_TABLE).map_err(step_error(step))?;
    if columns.is_empty() {
        return Ok(None);
    }

    let has = |name: &str| columns.iter().any(|(c, _)| c == name);
    let dialect = if has("version") {
        Dialect::Versioned
    } else {
        Dialect::Tagged
    };
    warn!(%dialect, "Adopting history table written before schema tracking");

    let mut additions = Vec::new();
    if !has("tag") {
        additions.push("ALTER TABLE env_history ADD COLUMN tag TEXT");
    }
    if !has("source") {
        additions.push("ALTER TABLE env_history ADD COLUMN source TEXT NOT NULL DEFAULT ''");
    }
    if dialect == Dialect::Versioned && !has("action") {
        additions.push("ALTER TABLE env_history ADD COLUMN action TEXT");
    }
    for sql in additions {
        debug!(sql, "Adding legacy column");
        conn.execute(sql, []).map_err(step_error(step))?;
    }

    // Versioned tables always go through the rebuild step afterwards,
    // which normalizes nullability whatever the legacy layout was.
    if dialect == Dialect::Tagged {
        debug!("Rebuilding legacy tagged table");
        migrations::rebuild_tagged_table(conn).map_err(step_error(step))?;
    }
    migrations::record_applied(conn, migrations::baseline_version(dialect))
        .map_err(step_error(step))?;

    Ok(Some(dialect))
}
