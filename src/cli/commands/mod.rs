//! Command implementations.
//!
//! Every command that touches the store goes through
//! [`RunContext::with_store`], which resolves the store path, opens it
//! with the requested mode and closes it again whatever the outcome.

pub mod completions;
pub mod history;
pub mod init;
pub mod maintenance;
pub mod snapshot;
pub mod values;
pub mod version;

use crate::config::{resolve_db_path, resolve_source};
use crate::error::{Error, Result};
use crate::model::Dialect;
use crate::storage::{HistoryStore, OpenOptions};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Global settings shared by every command.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    pub db: Option<PathBuf>,
    pub root: Option<PathBuf>,
    pub mode: Option<Dialect>,
    pub source: Option<String>,
    pub json: bool,
}

impl RunContext {
    /// Resolved store file path.
    ///
    /// # Errors
    ///
    /// Returns `Config` if no project root can be determined.
    pub fn db_path(&self) -> Result<PathBuf> {
        resolve_db_path(self.db.as_deref(), self.root.as_deref())
    }

    /// Source label for writes made by `command`.
    #[must_use]
    pub fn source(&self, command: &str) -> String {
        resolve_source(self.source.as_deref(), command)
    }

    /// Options for opening an existing store.
    #[must_use]
    pub fn open_options(&self) -> OpenOptions {
        let options = OpenOptions::default();
        match self.mode {
            Some(mode) => options.dialect(mode),
            None => options,
        }
    }

    /// Open an existing store, run `f`, and close the store.
    ///
    /// # Errors
    ///
    /// Returns `NotInitialized` if the store file does not exist, the error
    /// from `f`, or the error from closing.
    pub fn with_store<R>(&self, f: impl FnOnce(&mut HistoryStore) -> Result<R>) -> Result<R> {
        let path = self.db_path()?;
        if !path.exists() {
            return Err(Error::NotInitialized { path });
        }
        let store = HistoryStore::open_path(&path, &self.open_options())?;
        run_and_close(store, f)
    }
}

/// Run `f` against `store`, then close it.
///
/// An error from `f` wins over an error from closing.
pub(crate) fn run_and_close<R>(
    mut store: HistoryStore,
    f: impl FnOnce(&mut HistoryStore) -> Result<R>,
) -> Result<R> {
    let result = f(&mut store);
    let closed = store.close();
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(close_err)) => {
            warn!(error = %close_err, "Failed to close store after error");
            Err(e)
        }
    }
}

/// Print a value as a single JSON line.
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Display form of a path for messages.
pub(crate) fn display(path: &Path) -> String {
    path.display().to_string()
}
