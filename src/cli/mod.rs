//! CLI definitions using clap.

use crate::model::Dialect;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// envx - versioned, tagged history of your environment variables
#[derive(Parser, Debug)]
#[command(name = "envx", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Store file path (default: <project-root>/.envx/envx.db)
    #[arg(long, global = true, env = "ENVX_DB")]
    pub db: Option<PathBuf>,

    /// Project root (default: nearest directory with .envx/, else git root)
    #[arg(long, global = true, env = "ENVX_ROOT")]
    pub root: Option<PathBuf>,

    /// Store mode to require or create with (tagged, versioned)
    #[arg(long, global = true, env = "ENVX_MODE", value_parser = parse_dialect)]
    pub mode: Option<Dialect>,

    /// Source label recorded with writes
    #[arg(long, global = true, env = "ENVX_SOURCE")]
    pub source: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

fn parse_dialect(s: &str) -> Result<Dialect, String> {
    s.parse()
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the store for this project
    Init {
        /// Recreate the store, discarding existing history
        #[arg(long)]
        force: bool,

        /// Seed the store from a .env file
        #[arg(long)]
        from: Option<PathBuf>,

        /// Tag for the seeded snapshot (default: auto-<N>)
        #[arg(long, requires = "from")]
        tag: Option<String>,
    },

    /// Record a value for a key
    Set {
        key: String,
        value: String,

        /// Write under this tag instead of appending a version
        #[arg(long)]
        tag: Option<String>,
    },

    /// Record a deletion of a key (versioned stores)
    Del { key: String },

    /// Show the current value of a key
    Latest { key: String },

    /// Snapshot a .env file under a tag
    Tag {
        /// Tag name (default: auto-<N>)
        name: Option<String>,

        /// File to snapshot
        #[arg(long, short, default_value = ".env")]
        file: PathBuf,
    },

    /// Show the values stored under a tag
    Show {
        tag: String,

        /// Print as .env lines
        #[arg(long)]
        dotenv: bool,

        /// Write a .env file instead of printing
        #[arg(long, short, conflicts_with = "dotenv")]
        out: Option<PathBuf>,
    },

    /// List history, newest first
    History {
        /// Only this key
        key: Option<String>,

        /// Only this tag (combines with KEY)
        #[arg(long)]
        tag: Option<String>,

        /// Maximum rows
        #[arg(long, short)]
        limit: Option<usize>,
    },

    /// List all tags
    Tags,

    /// Show history statistics
    Stats {
        /// Statistics for one tag
        #[arg(long, conflicts_with_all = ["all_tags", "versions"])]
        tag: Option<String>,

        /// Statistics for every tag
        #[arg(long, conflicts_with = "versions")]
        all_tags: bool,

        /// Statistics per version number (versioned stores)
        #[arg(long)]
        versions: bool,
    },

    /// Export a tag as a JSON snapshot envelope
    Export {
        tag: String,

        /// Output file (default: stdout)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Import a JSON snapshot envelope
    Import {
        file: PathBuf,

        /// Override the envelope's tag
        #[arg(long)]
        tag: Option<String>,
    },

    /// Convert a versioned store to the tagged layout
    Upgrade,

    /// Delete history older than N days
    Prune {
        #[arg(long)]
        days: u32,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Print version information
    Version,
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
