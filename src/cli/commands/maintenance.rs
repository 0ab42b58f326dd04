//! Store maintenance: upgrade and prune.

use super::{display, print_json, RunContext};
use crate::error::{Error, Result};
use crate::model::Dialect;
use crate::storage::{HistoryStore, OpenOptions};
use serde::Serialize;
use std::path::PathBuf;

#[derive(Serialize)]
struct UpgradeOutput {
    path: PathBuf,
    mode: Dialect,
    applied: Vec<&'static str>,
}

#[derive(Serialize)]
struct PruneOutput {
    days: u32,
    deleted: usize,
}

/// Execute the upgrade command: convert a versioned store to tagged.
///
/// Every row is kept. A store that is already tagged is left as is.
///
/// # Errors
///
/// Returns `NotInitialized`, `InvalidArgument` if `--mode versioned` was
/// requested, or `Migration` if the conversion fails (nothing changes).
pub fn upgrade(ctx: &RunContext) -> Result<()> {
    if ctx.mode == Some(Dialect::Versioned) {
        return Err(Error::InvalidArgument(
            "upgrade converts to the tagged mode; drop --mode versioned".to_string(),
        ));
    }

    let path = ctx.db_path()?;
    if !path.exists() {
        return Err(Error::NotInitialized { path });
    }

    let store = HistoryStore::open_path(&path, &OpenOptions::default().convert_to_tagged())?;
    let applied = store.schema_state().applied.clone();
    super::run_and_close(store, |_| Ok(()))?;

    if ctx.json {
        return print_json(&UpgradeOutput {
            path,
            mode: Dialect::Tagged,
            applied,
        });
    }

    if applied.is_empty() {
        println!("Store at {} is already tagged", display(&path));
    } else {
        println!("Upgraded store at {} to tagged", display(&path));
        for step in &applied {
            println!("  applied {step}");
        }
    }
    Ok(())
}

/// Execute the prune command.
///
/// # Errors
///
/// Returns `NotInitialized` or a storage error.
pub fn prune(ctx: &RunContext, days: u32) -> Result<()> {
    let deleted =
        ctx.with_store(|store| store.prune_older_than(chrono::Duration::days(i64::from(days))))?;

    if ctx.json {
        return print_json(&PruneOutput { days, deleted });
    }

    println!("Pruned {deleted} record(s) older than {days} day(s)");
    Ok(())
}
