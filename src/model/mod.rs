//! Data models for envx.
//!
//! This module contains the domain models shared by the store and the CLI:
//! - HistoryRecord (one row of the audit trail)
//! - Action / Dialect
//! - Aggregate statistics (whole store, per tag, per version)

pub mod record;
pub mod stats;

pub use record::{now_timestamp, Action, Dialect, HistoryRecord, NewRecord, TaggedValue};
pub use stats::{HistoryStats, TagStats, VersionStats};
