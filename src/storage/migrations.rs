//! Database migrations embedded at compile time.
//!
//! Migrations are sourced from `/migrations/` at the repo root and
//! embedded into the binary using `include_str!`. Each dialect owns an
//! ordered registry; the `schema_migrations` table records which steps
//! a store has seen. Everything here runs inside the caller's transaction.

use crate::error::{Error, Result};
use crate::model::Dialect;
use rusqlite::Connection;
use std::collections::HashSet;
use tracing::info;

/// A single migration with version identifier and SQL content.
struct Migration {
    version: &'static str,
    sql: &'static str,
}

/// Versioned (append-only) dialect, in order.
const VERSIONED_MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001_versioned_history",
        sql: include_str!("../../migrations/001_versioned_history.sql"),
    },
    Migration {
        version: "002_nullable_version",
        sql: include_str!("../../migrations/002_nullable_version.sql"),
    },
];

/// Tagged (upsert) dialect, in order.
const TAGGED_MIGRATIONS: &[Migration] = &[Migration {
    version: "001_tagged_history",
    sql: include_str!("../../migrations/001_tagged_history.sql"),
}];

/// Rebuilds a fully migrated versioned table into the tagged layout.
const CONVERT_TO_TAGGED: Migration = Migration {
    version: "003_convert_to_tagged",
    sql: include_str!("../../migrations/003_convert_to_tagged.sql"),
};

/// Baseline step that legacy adoption marks for each dialect.
pub(crate) const fn baseline_version(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Tagged => TAGGED_MIGRATIONS[0].version,
        Dialect::Versioned => VERSIONED_MIGRATIONS[0].version,
    }
}

fn registry(dialect: Dialect) -> &'static [Migration] {
    match dialect {
        Dialect::Tagged => TAGGED_MIGRATIONS,
        Dialect::Versioned => VERSIONED_MIGRATIONS,
    }
}

/// Newest migration step this build knows for `dialect`.
#[must_use]
pub fn latest_schema_version(dialect: Dialect) -> &'static str {
    registry(dialect).last().map_or("none", |m| m.version)
}

fn is_known(version: &str) -> bool {
    CONVERT_TO_TAGGED.version == version
        || VERSIONED_MIGRATIONS
            .iter()
            .chain(TAGGED_MIGRATIONS)
            .any(|m| m.version == version)
}

pub(crate) fn step_error(step: &str) -> impl FnOnce(rusqlite::Error) -> Error + '_ {
    move |e| Error::Migration {
        step: step.to_string(),
        reason: e.to_string(),
    }
}

/// Versions already recorded in `schema_migrations`.
///
/// # Errors
///
/// Returns an error if the tracking table cannot be read.
pub fn applied_versions(conn: &Connection) -> rusqlite::Result<HashSet<String>> {
    conn.prepare("SELECT version FROM schema_migrations")?
        .query_map([], |row| row.get(0))?
        .collect()
}

/// Record a step as applied without running it.
pub(crate) fn record_applied(conn: &Connection, version: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, chrono::Utc::now().timestamp_millis()],
    )?;
    Ok(())
}

/// Rebuild a legacy tagged table into the current tagged layout.
///
/// Reuses the conversion SQL, which reads only columns both layouts
/// share: `tag` becomes NOT NULL, untagged rows and duplicate
/// `(key, tag)` rows are relabelled `legacy-<id>`.
pub(crate) fn rebuild_tagged_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(CONVERT_TO_TAGGED.sql)
}

fn apply(conn: &Connection, migration: &Migration) -> Result<()> {
    info!(version = migration.version, "Applying migration");
    conn.execute_batch(migration.sql)
        .map_err(step_error(migration.version))?;
    record_applied(conn, migration.version).map_err(step_error(migration.version))?;
    info!(version = migration.version, "Migration complete");
    Ok(())
}

fn apply_pending(
    conn: &Connection,
    migrations: &'static [Migration],
    applied: &HashSet<String>,
    ran: &mut Vec<&'static str>,
) -> Result<()> {
    for migration in migrations {
        if applied.contains(migration.version) {
            continue;
        }
        apply(conn, migration)?;
        ran.push(migration.version);
    }
    Ok(())
}

/// Bring the history table from `stored` to the `target` dialect.
///
/// `stored` is `None` for a fresh database. Must be called inside a
/// transaction: a failing step leaves earlier steps uncommitted.
///
/// Returns the versions that were executed, in order.
///
/// # Errors
///
/// Returns `Migration` if a step fails or the store records a step this
/// build does not know, and `DialectMismatch` for a tagged-to-versioned
/// request (there is no way back).
pub fn run_migrations(
    conn: &Connection,
    stored: Option<Dialect>,
    target: Dialect,
) -> Result<Vec<&'static str>> {
    let applied = applied_versions(conn).map_err(step_error("schema_migrations"))?;

    if let Some(unknown) = applied.iter().find(|v| !is_known(v)) {
        return Err(Error::Migration {
            step: unknown.clone(),
            reason: "store was written by a newer envx".to_string(),
        });
    }

    let mut ran = Vec::new();
    match (stored, target) {
        (Some(Dialect::Tagged), Dialect::Versioned) => {
            return Err(Error::DialectMismatch {
                stored: Dialect::Tagged,
                requested: Dialect::Versioned,
            });
        }
        (Some(Dialect::Versioned), Dialect::Tagged) => {
            apply_pending(conn, VERSIONED_MIGRATIONS, &applied, &mut ran)?;
            apply(conn, &CONVERT_TO_TAGGED)?;
            ran.push(CONVERT_TO_TAGGED.version);
            // The conversion produces the current tagged shape directly.
            for migration in TAGGED_MIGRATIONS {
                record_applied(conn, migration.version).map_err(step_error(migration.version))?;
            }
        }
        (_, target) => apply_pending(conn, registry(target), &applied, &mut ran)?,
    }

    Ok(ran)
}
