//! envx - versioned, tagged history of environment variables
//!
//! This crate provides the history store and the `envx` CLI built on it.
//! Every project keeps its history in a local SQLite file,
//! `<project-root>/.envx/envx.db`.
//!
//! # Architecture
//!
//! - [`storage`] - SQLite history store (schema manager, upsert engine,
//!   append/versioning engine, query engine)
//! - [`model`] - Data types (HistoryRecord, Dialect, statistics)
//! - [`sync`] - Snapshot exchange through JSON envelopes and `.env` files
//! - [`config`] - Store location and default resolution
//! - [`validate`] - Key, tag and timestamp validation
//! - [`cli`] - Command-line interface using clap
//! - [`error`] - Error types and handling
//!
//! # Example
//!
//! ```no_run
//! use envx::HistoryStore;
//! use std::path::Path;
//!
//! let mut store = HistoryStore::open(Path::new("."))?;
//! store.batch_upsert_tagged_values([("DATABASE_URL", Some("postgres://localhost"))], Some("v1"), "docs")?;
//! let values = store.get_tagged_values("v1")?;
//! assert_eq!(values["DATABASE_URL"], "postgres://localhost");
//! store.close()?;
//! # Ok::<(), envx::Error>(())
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod model;
pub mod storage;
pub mod sync;
pub mod validate;

pub use error::{Error, Result};
pub use model::Dialect;
pub use storage::{HistoryStore, OpenOptions};
