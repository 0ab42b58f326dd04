//! Error types for envx.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=store, 3=not_found, 4=validation, etc.)
//! - Retryability flags for scripted callers
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use crate::model::Dialect;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for envx operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Scripts match on the string or on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Store (exit 2)
    NotInitialized,
    AlreadyInitialized,
    InitializationFailed,
    MigrationFailed,
    DialectMismatch,
    StoreClosed,
    ConstraintViolation,
    DatabaseError,

    // Not Found (exit 3)
    TagNotFound,
    KeyNotFound,

    // Validation (exit 4)
    InvalidArgument,
    UnsupportedOperation,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::InitializationFailed => "INITIALIZATION_FAILED",
            Self::MigrationFailed => "MIGRATION_FAILED",
            Self::DialectMismatch => "DIALECT_MISMATCH",
            Self::StoreClosed => "STORE_CLOSED",
            Self::ConstraintViolation => "CONSTRAINT_VIOLATION",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::TagNotFound => "TAG_NOT_FOUND",
            Self::KeyNotFound => "KEY_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::UnsupportedOperation => "UNSUPPORTED_OPERATION",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized
            | Self::AlreadyInitialized
            | Self::InitializationFailed
            | Self::MigrationFailed
            | Self::DialectMismatch
            | Self::StoreClosed
            | Self::ConstraintViolation
            | Self::DatabaseError => 2,
            Self::TagNotFound | Self::KeyNotFound => 3,
            Self::InvalidArgument | Self::UnsupportedOperation => 4,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether a caller should retry, possibly with corrected input.
    ///
    /// Migration and initialization failures are never retryable: the
    /// store must be treated as unusable until someone looks at it.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::InvalidArgument | Self::DatabaseError)
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in envx operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: no store at {}", path.display())]
    NotInitialized { path: PathBuf },

    #[error("Already initialized at {}", path.display())]
    AlreadyInitialized { path: PathBuf },

    #[error("Cannot open store at {}: {reason}", path.display())]
    Initialization { path: PathBuf, reason: String },

    #[error("Schema migration {step} failed: {reason}")]
    Migration { step: String, reason: String },

    #[error("Store was created as '{stored}' and cannot be opened as '{requested}'")]
    DialectMismatch { stored: Dialect, requested: Dialect },

    #[error("{op} is not available on a '{dialect}' store")]
    UnsupportedOperation { op: &'static str, dialect: Dialect },

    #[error("Constraint violation in {op} ({context}): {detail}")]
    ConstraintViolation {
        op: &'static str,
        context: String,
        detail: String,
    },

    #[error("Storage error in {op} ({context}): {source}")]
    Storage {
        op: &'static str,
        context: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Store is closed: {op} called after close()")]
    StoreClosed { op: &'static str },

    #[error("Tag not found: {tag}")]
    TagNotFound { tag: String },

    #[error("Key not found: {key}")]
    KeyNotFound { key: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Wrap a storage-engine error with the operation name and key/tag context.
    ///
    /// SQLite constraint failures surface as `ConstraintViolation`; the public
    /// API never produces them on purpose, so seeing one means a bug.
    #[must_use]
    pub fn storage(op: &'static str, context: impl Into<String>, source: rusqlite::Error) -> Self {
        let context = context.into();
        if is_constraint_violation(&source) {
            return Self::ConstraintViolation {
                op,
                context,
                detail: source.to_string(),
            };
        }
        Self::Storage {
            op,
            context,
            source,
        }
    }

    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized { .. } => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Initialization { .. } => ErrorCode::InitializationFailed,
            Self::Migration { .. } => ErrorCode::MigrationFailed,
            Self::DialectMismatch { .. } => ErrorCode::DialectMismatch,
            Self::UnsupportedOperation { .. } => ErrorCode::UnsupportedOperation,
            Self::ConstraintViolation { .. } => ErrorCode::ConstraintViolation,
            Self::Storage { .. } => ErrorCode::DatabaseError,
            Self::StoreClosed { .. } => ErrorCode::StoreClosed,
            Self::TagNotFound { .. } => ErrorCode::TagNotFound,
            Self::KeyNotFound { .. } => ErrorCode::KeyNotFound,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized { .. } => {
                Some("Run `envx init` in the project root to create the store".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "A store already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::Migration { .. } => Some(
                "The store was left untouched. Back up .envx/envx.db before retrying \
                 with a newer envx."
                    .to_string(),
            ),

            Self::DialectMismatch { stored, requested } => {
                if *stored == Dialect::Versioned && *requested == Dialect::Tagged {
                    Some("Run `envx upgrade` to convert the store to the tagged mode.".to_string())
                } else {
                    Some(format!(
                        "Re-run with `--mode {stored}` (or set ENVX_MODE={stored})."
                    ))
                }
            }

            Self::UnsupportedOperation { dialect, .. } => Some(format!(
                "This store uses the '{dialect}' dialect. Per-key versions only exist \
                 in 'versioned' stores."
            )),

            Self::TagNotFound { tag } => Some(format!(
                "No rows under tag '{tag}'. Use `envx tags` to list available tags."
            )),

            Self::KeyNotFound { key } => Some(format!(
                "No history for '{key}'. Use `envx history` to see recorded keys."
            )),

            Self::StoreClosed { .. } => {
                Some("Open a new store handle; closed handles cannot be reused.".to_string())
            }

            Self::Initialization { .. }
            | Self::ConstraintViolation { .. }
            | Self::Storage { .. }
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
