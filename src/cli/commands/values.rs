//! Single-key commands: set, del, latest.

use super::{print_json, RunContext};
use crate::error::{Error, Result};
use crate::model::{Action, Dialect, HistoryRecord};
use crate::storage::HistoryStore;
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct SetOutput {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    action: Option<Action>,
}

/// Execute the set command.
///
/// In a tagged store the value is upserted under `tag` (or the next
/// auto tag). In a versioned store it is upserted under `tag` when one is
/// given, otherwise appended as the next version.
///
/// # Errors
///
/// Returns `NotInitialized`, `InvalidArgument`, or a storage error.
pub fn set(ctx: &RunContext, key: &str, value: &str, tag: Option<&str>) -> Result<()> {
    let source = ctx.source("set");
    let output = ctx.with_store(|store| match (store.dialect(), tag) {
        (Dialect::Tagged, _) => {
            let outcome = store.batch_upsert_tagged_values([(key, Some(value))], tag, &source)?;
            Ok(SetOutput {
                key: key.to_string(),
                tag: Some(outcome.tag),
                version: None,
                action: None,
            })
        }
        (Dialect::Versioned, Some(tag)) => {
            store.upsert_tagged_value(key, value, tag, &source)?;
            Ok(SetOutput {
                key: key.to_string(),
                tag: Some(tag.to_string()),
                version: None,
                action: None,
            })
        }
        (Dialect::Versioned, None) => {
            let record = store.set_versioned_value(key, value, &source)?;
            Ok(SetOutput {
                key: record.key,
                tag: None,
                version: record.version,
                action: record.action,
            })
        }
    })?;

    if ctx.json {
        return print_json(&output);
    }

    match (&output.tag, output.version) {
        (Some(tag), _) => println!("Set {} under tag '{tag}'", key.bold()),
        (None, Some(version)) => println!(
            "Set {} (version {version}, {})",
            key.bold(),
            output.action.map_or("", |a| a.as_str())
        ),
        (None, None) => println!("Set {}", key.bold()),
    }
    Ok(())
}

/// Execute the del command.
///
/// Appends a `deleted` version with an empty value. Only versioned stores
/// keep per-key history to append to.
///
/// # Errors
///
/// Returns `UnsupportedOperation` on a tagged store, `KeyNotFound` if the
/// key has no versions or is already deleted, or a storage error.
pub fn del(ctx: &RunContext, key: &str) -> Result<()> {
    let source = ctx.source("del");
    let record = ctx
        .with_store(|store| store.delete_versioned_value(key, &source))?
        .ok_or_else(|| Error::KeyNotFound { key: key.to_string() })?;

    if ctx.json {
        return print_json(&record);
    }

    println!(
        "Deleted {} (version {})",
        key.bold(),
        record.version.unwrap_or_default()
    );
    Ok(())
}

/// Current value of `key`: the highest version in a versioned store, the
/// most recently written row in a tagged store.
fn latest_record(store: &HistoryStore, key: &str) -> Result<Option<HistoryRecord>> {
    match store.dialect() {
        Dialect::Versioned => store.get_latest_version(key),
        Dialect::Tagged => Ok(store.get_history_by_key(key, Some(1))?.into_iter().next()),
    }
}

/// Execute the latest command.
///
/// # Errors
///
/// Returns `KeyNotFound` if the key has no history or was deleted last.
pub fn latest(ctx: &RunContext, key: &str) -> Result<()> {
    let record = ctx
        .with_store(|store| latest_record(store, key))?
        .filter(|r| r.action != Some(Action::Deleted))
        .ok_or_else(|| Error::KeyNotFound { key: key.to_string() })?;

    if ctx.json {
        return print_json(&record);
    }

    println!("{}", record.value);
    Ok(())
}
