//! Create the store for a project.
//!
//! `envx init` creates `<root>/.envx/envx.db` in the requested mode
//! (tagged unless `--mode versioned`), drops a `.gitignore` next to it so
//! the history never lands in version control, and optionally seeds a
//! first snapshot from a `.env` file.

use super::{display, print_json, run_and_close, RunContext};
use crate::error::{Error, Result};
use crate::model::Dialect;
use crate::storage::{BatchUpsert, HistoryStore, OpenOptions, STORE_DIR};
use crate::sync::dotenv;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

const GITIGNORE: &str = "# envx history is local-only\n*\n";

#[derive(Serialize)]
struct InitOutput {
    path: PathBuf,
    mode: Dialect,
    #[serde(skip_serializing_if = "Option::is_none")]
    seeded: Option<BatchUpsert>,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if the store exists and `force` is not
/// set, or any error from creating the store or reading `from`.
pub fn execute(ctx: &RunContext, force: bool, from: Option<&Path>, tag: Option<&str>) -> Result<()> {
    let path = ctx.db_path()?;

    if path.exists() {
        if !force {
            return Err(Error::AlreadyInitialized { path });
        }
        remove_store_files(&path)?;
        info!(path = %path.display(), "Removed existing store");
    }

    // Read the seed before creating anything so a bad file leaves no store behind.
    let seed = from.map(dotenv::read_file).transpose()?;

    let mode = ctx.mode.unwrap_or_default();
    let store = HistoryStore::open_path(&path, &OpenOptions::default().dialect(mode))?;
    write_gitignore(&path)?;

    let source = ctx.source("init");
    let seeded = run_and_close(store, |store| {
        seed.map(|values| {
            store.batch_upsert_tagged_values(values.iter().map(|(k, v)| (k, Some(v))), tag, &source)
        })
        .transpose()
    })?;

    if ctx.json {
        return print_json(&InitOutput { path, mode, seeded });
    }

    println!("Initialized {mode} envx store at {}", display(&path));
    if let Some(seeded) = seeded {
        println!(
            "  Seeded {} value(s) under tag '{}'",
            seeded.written, seeded.tag
        );
    }
    Ok(())
}

/// Remove the database file and its WAL companions.
fn remove_store_files(path: &Path) -> Result<()> {
    fs::remove_file(path)?;
    for suffix in ["-wal", "-shm"] {
        let mut companion = path.as_os_str().to_os_string();
        companion.push(suffix);
        match fs::remove_file(&companion) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

/// Write `.envx/.gitignore` when the store lives in the default directory.
fn write_gitignore(db_path: &Path) -> Result<()> {
    let Some(dir) = db_path
        .parent()
        .filter(|dir| dir.file_name().is_some_and(|name| name == STORE_DIR))
    else {
        return Ok(());
    };
    let gitignore = dir.join(".gitignore");
    if !gitignore.exists() {
        fs::write(gitignore, GITIGNORE)?;
    }
    Ok(())
}
