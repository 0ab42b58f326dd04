//! Configuration management.
//!
//! This module resolves where the store lives and which defaults a
//! command runs with.
//!
//! # Layout
//!
//! Every project keeps its history next to the code:
//! `<project-root>/.envx/envx.db`. The project root is found by walking
//! up to an existing `.envx/`, falling back to the git top-level and then
//! the current directory, so commands work from any subdirectory.

use crate::error::{Error, Result};
use crate::storage::{store_path, STORE_DIR};

use std::path::{Path, PathBuf};

/// Walk up from `start` looking for a directory that contains `.envx/`.
#[must_use]
pub fn discover_project_root_from(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(STORE_DIR).is_dir())
        .map(Path::to_path_buf)
}

/// Get the git repository root directory.
fn git_toplevel() -> Option<PathBuf> {
    std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim().to_string()))
        .filter(|p| !p.as_os_str().is_empty())
}

/// Resolve the project root.
///
/// Priority:
/// 1. `explicit` (from `--root` / `ENVX_ROOT`)
/// 2. Nearest ancestor of the current directory holding `.envx/`
/// 3. Git top-level
/// 4. Current directory
///
/// # Errors
///
/// Returns `Config` if the current directory cannot be determined.
pub fn resolve_project_root(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(root) = explicit {
        return Ok(root.to_path_buf());
    }

    let cwd = std::env::current_dir()
        .map_err(|e| Error::Config(format!("cannot read current directory: {e}")))?;

    if let Some(root) = discover_project_root_from(&cwd) {
        return Ok(root);
    }

    Ok(git_toplevel().unwrap_or(cwd))
}

/// Resolve the store file path.
///
/// An explicit database path (`--db` / `ENVX_DB`) wins over any root.
///
/// # Errors
///
/// Returns `Config` if the project root cannot be resolved.
pub fn resolve_db_path(explicit_db: Option<&Path>, explicit_root: Option<&Path>) -> Result<PathBuf> {
    if let Some(db) = explicit_db {
        return Ok(db.to_path_buf());
    }
    resolve_project_root(explicit_root).map(|root| store_path(&root))
}

/// Source label recorded with a write.
///
/// Uses `explicit` (from `--source` / `ENVX_SOURCE`) when non-blank,
/// otherwise the command's own name.
#[must_use]
pub fn resolve_source(explicit: Option<&str>, command: &str) -> String {
    explicit
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(command)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".envx")).unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            discover_project_root_from(&nested),
            Some(dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_discover_ignores_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".envx"), "").unwrap();
        // Only ancestors above the tempdir could match; the file itself must not.
        assert_ne!(
            discover_project_root_from(dir.path()),
            Some(dir.path().to_path_buf())
        );
    }

    #[test]
    fn test_resolve_db_path_with_explicit() {
        let explicit = PathBuf::from("/custom/path/envx.db");
        let result = resolve_db_path(Some(&explicit), Some(Path::new("/ignored"))).unwrap();
        assert_eq!(result, explicit);
    }

    #[test]
    fn test_resolve_db_path_from_root() {
        let result = resolve_db_path(None, Some(Path::new("/work/app"))).unwrap();
        assert_eq!(result, PathBuf::from("/work/app/.envx/envx.db"));
    }

    #[test]
    fn test_resolve_source() {
        assert_eq!(resolve_source(None, "set"), "set");
        assert_eq!(resolve_source(Some("  "), "set"), "set");
        assert_eq!(resolve_source(Some("ci"), "set"), "ci");
    }
}
