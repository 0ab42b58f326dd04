//! SQLite history store.
//!
//! `HistoryStore` owns the single connection to `<root>/.envx/envx.db`.
//! Construction opens the file and runs the schema manager, so a store
//! value is always ready; `close()` releases the handle and every later
//! call fails with `StoreClosed`.
//!
//! The write engines and query engine live in sibling modules as further
//! `impl HistoryStore` blocks and go through [`HistoryStore::mutate`] and
//! [`HistoryStore::read`], which wrap engine errors with the operation name.

use crate::error::{Error, Result};
use crate::model::Dialect;
use crate::storage::schema::{apply_pragmas, ensure_schema, SchemaState};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Directory holding the store, relative to the project root.
pub const STORE_DIR: &str = ".envx";

/// Database file name inside [`STORE_DIR`].
pub const STORE_FILE: &str = "envx.db";

/// Path of the store file for a project root.
#[must_use]
pub fn store_path(project_root: &Path) -> PathBuf {
    project_root.join(STORE_DIR).join(STORE_FILE)
}

/// Options for opening a store.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Dialect to require. `None` accepts whatever the store already is
    /// and creates fresh stores as tagged.
    pub dialect: Option<Dialect>,
    /// Allow converting a versioned store when `dialect` is tagged.
    pub convert: bool,
    /// How long to wait on a locked database.
    pub busy_timeout: Duration,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            dialect: None,
            convert: false,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl OpenOptions {
    /// Require (or create with) a specific dialect.
    #[must_use]
    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = Some(dialect);
        self
    }

    /// Convert a versioned store to the tagged dialect on open.
    #[must_use]
    pub fn convert_to_tagged(mut self) -> Self {
        self.dialect = Some(Dialect::Tagged);
        self.convert = true;
        self
    }
}

/// SQLite-backed history store.
#[derive(Debug)]
pub struct HistoryStore {
    conn: Option<Connection>,
    dialect: Dialect,
    path: Option<PathBuf>,
    schema: SchemaState,
}

impl HistoryStore {
    /// Open the store under a project root with default options.
    ///
    /// Creates `<root>/.envx/` if needed.
    ///
    /// # Errors
    ///
    /// Returns `Initialization` if the file cannot be created or opened and
    /// `Migration` if the schema cannot be brought up to date.
    pub fn open(project_root: &Path) -> Result<Self> {
        Self::open_path(&store_path(project_root), &OpenOptions::default())
    }

    /// Open the store under a project root.
    ///
    /// # Errors
    ///
    /// See [`HistoryStore::open`]; also `DialectMismatch`.
    pub fn open_with(project_root: &Path, options: &OpenOptions) -> Result<Self> {
        Self::open_path(&store_path(project_root), options)
    }

    /// Open a store file at an explicit path.
    ///
    /// # Errors
    ///
    /// See [`HistoryStore::open_with`].
    pub fn open_path(path: &Path, options: &OpenOptions) -> Result<Self> {
        let init_err = |reason: String| Error::Initialization {
            path: path.to_path_buf(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| init_err(e.to_string()))?;
        }

        let conn = Connection::open(path).map_err(|e| init_err(e.to_string()))?;
        conn.busy_timeout(options.busy_timeout)
            .map_err(|e| init_err(e.to_string()))?;
        apply_pragmas(&conn).map_err(|e| init_err(e.to_string()))?;

        Self::from_connection(conn, Some(path.to_path_buf()), options)
    }

    /// Open an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or schema cannot be set up.
    pub fn open_memory(dialect: Dialect) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Initialization {
            path: PathBuf::from(":memory:"),
            reason: e.to_string(),
        })?;
        Self::from_connection(conn, None, &OpenOptions::default().dialect(dialect))
    }

    fn from_connection(
        mut conn: Connection,
        path: Option<PathBuf>,
        options: &OpenOptions,
    ) -> Result<Self> {
        let schema = ensure_schema(&mut conn, options.dialect, options.convert)?;
        info!(
            dialect = %schema.dialect,
            path = ?path,
            migrated = schema.applied.len(),
            "Store opened"
        );
        Ok(Self {
            conn: Some(conn),
            dialect: schema.dialect,
            path,
            schema,
        })
    }

    /// Re-run the schema manager.
    ///
    /// Idempotent; a ready store normally reports no applied steps.
    ///
    /// # Errors
    ///
    /// Returns `StoreClosed` or a `Migration` failure.
    pub fn ensure_schema(&mut self) -> Result<SchemaState> {
        let dialect = self.dialect;
        let conn = self
            .conn
            .as_mut()
            .ok_or(Error::StoreClosed { op: "ensure_schema" })?;
        ensure_schema(conn, Some(dialect), false)
    }

    /// Release the database handle.
    ///
    /// # Errors
    ///
    /// Returns `StoreClosed` if already closed, or the engine error if the
    /// connection could not be closed cleanly (the handle is released anyway).
    pub fn close(&mut self) -> Result<()> {
        let conn = self.conn.take().ok_or(Error::StoreClosed { op: "close" })?;
        let context = self
            .path
            .as_ref()
            .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string());
        conn.close()
            .map_err(|(_, e)| Error::storage("close", context, e))?;
        info!(path = ?self.path, "Store closed");
        Ok(())
    }

    /// Whether `close()` has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Dialect the store is in.
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Backing file path (`None` for in-memory stores).
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Schema state reported when the store was opened.
    #[must_use]
    pub fn schema_state(&self) -> &SchemaState {
        &self.schema
    }

    /// Get the live connection, or fail with `StoreClosed`.
    pub(crate) fn conn(&self, op: &'static str) -> Result<&Connection> {
        self.conn.as_ref().ok_or(Error::StoreClosed { op })
    }

    /// Fail unless the store is open and in the `expected` dialect.
    pub(crate) fn require_dialect(&self, op: &'static str, expected: Dialect) -> Result<()> {
        self.conn(op)?;
        if self.dialect == expected {
            Ok(())
        } else {
            Err(Error::UnsupportedOperation {
                op,
                dialect: self.dialect,
            })
        }
    }

    /// Run a read-only query, wrapping engine errors with `op` and `context`.
    pub(crate) fn read<F, R>(&self, op: &'static str, context: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<R>,
    {
        let conn = self.conn(op)?;
        f(conn).map_err(|e| Error::storage(op, context, e))
    }

    /// Execute a write inside one IMMEDIATE transaction.
    ///
    /// The closure's writes are committed together or not at all; readers
    /// never observe a partial batch.
    pub(crate) fn mutate<F, R>(&mut self, op: &'static str, context: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> rusqlite::Result<R>,
    {
        let conn = self.conn.as_mut().ok_or(Error::StoreClosed { op })?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::storage(op, context, e))?;

        let result = f(&tx).map_err(|e| Error::storage(op, context, e))?;

        tx.commit().map_err(|e| Error::storage(op, context, e))?;
        debug!(op, context, "Committed");
        Ok(result)
    }
}
