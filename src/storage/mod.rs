//! SQLite storage layer for envx.
//!
//! This module provides the history store using SQLite with:
//! - WAL mode for concurrent reads
//! - One IMMEDIATE transaction per write batch
//! - Ordered, transactional schema migrations
//! - Two dialects (tagged upsert / versioned append) behind one handle
//!
//! # Submodules
//!
//! - [`schema`] - Schema manager (pragmas, indexes, legacy adoption)
//! - [`migrations`] - Embedded migration registry
//! - [`sqlite`] - Store lifecycle and transaction helpers
//! - [`tagged`] - Upsert engine
//! - [`versioned`] - Append/versioning engine
//! - [`query`] - Query engine and retention
//! - [`autotag`] - `auto-<N>` tag numbering

pub mod autotag;
pub mod migrations;
pub mod query;
pub mod schema;
pub mod sqlite;
pub mod tagged;
pub mod versioned;

pub use schema::SchemaState;
pub use sqlite::{store_path, HistoryStore, OpenOptions, STORE_DIR, STORE_FILE};
pub use tagged::BatchUpsert;
