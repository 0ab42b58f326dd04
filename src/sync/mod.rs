//! Snapshot exchange through files.
//!
//! Two formats move tagged snapshots in and out of a store:
//!
//! - **Envelope**: JSON `{tag, timestamp, items}` for store-to-store
//!   transfer (`envx export` / `envx import`)
//! - **Dotenv**: plain `KEY=VALUE` files (`envx tag`, `envx init --from`)
//!
//! Every write goes through [`atomic_write`] so a crash never leaves a
//! half-written file behind.

pub mod dotenv;
mod envelope;
mod file;

pub use envelope::{EnvelopeItem, SnapshotEnvelope};
pub use file::atomic_write;
