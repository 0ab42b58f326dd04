//! Snapshot commands: tag, show, export, import.

use super::{display, print_json, RunContext};
use crate::error::{Error, Result};
use crate::storage::BatchUpsert;
use crate::sync::{dotenv, SnapshotEnvelope};
use colored::Colorize;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Serialize)]
struct ShowOutput {
    tag: String,
    values: BTreeMap<String, String>,
    count: usize,
}

/// Result of writing a tag to a file.
#[derive(Serialize)]
struct FileOutput {
    tag: String,
    path: PathBuf,
    count: usize,
}

#[derive(Serialize)]
struct ImportOutput {
    path: PathBuf,
    #[serde(flatten)]
    outcome: BatchUpsert,
}

/// Execute the tag command: snapshot a `.env` file.
///
/// # Errors
///
/// Returns `Io` if the file cannot be read, `InvalidArgument` for a bad
/// line or tag, or a storage error.
pub fn tag(ctx: &RunContext, name: Option<&str>, file: &Path) -> Result<()> {
    let values = dotenv::read_file(file)?;
    let source = ctx.source("tag");
    let outcome = ctx.with_store(|store| {
        store.batch_upsert_tagged_values(values.iter().map(|(k, v)| (k, Some(v))), name, &source)
    })?;

    if ctx.json {
        return print_json(&outcome);
    }

    println!(
        "Tagged {} value(s) from {} as {}",
        outcome.written,
        display(file),
        outcome.tag.green().bold()
    );
    Ok(())
}

/// Execute the show command.
///
/// With `out` the values are written there as a `.env` file, atomically.
///
/// # Errors
///
/// Returns `TagNotFound` if nothing is stored under `tag`, or an I/O error.
pub fn show(ctx: &RunContext, tag: &str, as_dotenv: bool, out: Option<&Path>) -> Result<()> {
    let values = ctx.with_store(|store| store.get_tagged_values(tag))?;
    if values.is_empty() {
        return Err(Error::TagNotFound { tag: tag.to_string() });
    }

    if let Some(out) = out {
        dotenv::write_file(out, &values)?;
        if ctx.json {
            return print_json(&FileOutput {
                tag: tag.to_string(),
                path: out.to_path_buf(),
                count: values.len(),
            });
        }
        println!("Wrote {} value(s) under '{tag}' to {}", values.len(), display(out));
        return Ok(());
    }

    if as_dotenv {
        print!("{}", dotenv::render(&values));
        return Ok(());
    }

    if ctx.json {
        return print_json(&ShowOutput {
            tag: tag.to_string(),
            count: values.len(),
            values,
        });
    }

    println!("{} ({} values)", tag.cyan().bold(), values.len());
    for (key, value) in &values {
        println!("  {} = {value}", key.bold());
    }
    Ok(())
}

/// Execute the export command.
///
/// Writes the envelope to `out` atomically, or prints it to stdout.
///
/// # Errors
///
/// Returns `TagNotFound` if nothing is stored under `tag`, or an I/O error.
pub fn export(ctx: &RunContext, tag: &str, out: Option<&Path>) -> Result<()> {
    let envelope = ctx.with_store(|store| SnapshotEnvelope::from_store(store, tag))?;
    let count = envelope.value_count();
    if count == 0 {
        return Err(Error::TagNotFound { tag: tag.to_string() });
    }

    let Some(out) = out else {
        println!("{}", serde_json::to_string_pretty(&envelope)?);
        return Ok(());
    };

    envelope.write(out)?;

    if ctx.json {
        return print_json(&FileOutput {
            tag: tag.to_string(),
            path: out.to_path_buf(),
            count,
        });
    }

    println!("Exported {count} value(s) under '{tag}' to {}", display(out));
    Ok(())
}

/// Execute the import command.
///
/// Importing the same envelope again leaves the store unchanged.
///
/// # Errors
///
/// Returns `Io`/`Json` for an unreadable envelope, `InvalidArgument` for
/// bad keys or tags, or a storage error.
pub fn import(ctx: &RunContext, file: &Path, tag: Option<&str>) -> Result<()> {
    let mut envelope = SnapshotEnvelope::read(file)?;
    if let Some(tag) = tag {
        envelope.tag = Some(tag.to_string());
    }

    let source = ctx.source("import");
    let outcome = ctx.with_store(|store| envelope.apply(store, &source))?;

    if ctx.json {
        return print_json(&ImportOutput {
            path: file.to_path_buf(),
            outcome,
        });
    }

    println!(
        "Imported {} value(s) as {}",
        outcome.written,
        outcome.tag.green().bold()
    );
    if outcome.skipped > 0 {
        println!("  Skipped {} item(s) without a value", outcome.skipped);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::init;
    use tempfile::TempDir;

    fn setup() -> (TempDir, RunContext) {
        let temp_dir = TempDir::new().unwrap();
        let ctx = RunContext {
            root: Some(temp_dir.path().to_path_buf()),
            json: true,
            ..RunContext::default()
        };
        init::execute(&ctx, false, None, None).unwrap();
        (temp_dir, ctx)
    }

    #[test]
    fn test_tag_snapshot_is_idempotent() {
        let (dir, ctx) = setup();
        let env_file = dir.path().join(".env");
        std::fs::write(&env_file, "A=1\nB=2\n").unwrap();

        tag(&ctx, Some("v1"), &env_file).unwrap();
        tag(&ctx, Some("v1"), &env_file).unwrap();

        let stats = ctx.with_store(|s| s.get_stats()).unwrap();
        assert_eq!(stats.total_records, 2);
    }

    #[test]
    fn test_show_unknown_tag() {
        let (_dir, ctx) = setup();
        assert!(matches!(
            show(&ctx, "missing", false, None),
            Err(Error::TagNotFound { .. })
        ));
    }

    #[test]
    fn test_export_import_between_projects() {
        let (dir, ctx) = setup();
        let env_file = dir.path().join(".env");
        std::fs::write(&env_file, "A=1\nB=2\n").unwrap();
        tag(&ctx, Some("release"), &env_file).unwrap();

        let out = dir.path().join("release.json");
        export(&ctx, "release", Some(&out)).unwrap();

        let (_other_dir, other) = setup();
        import(&other, &out, None).unwrap();
        import(&other, &out, Some("copy")).unwrap();

        let values = other.with_store(|s| s.get_tagged_values("release")).unwrap();
        assert_eq!(values.len(), 2);
        let tags = other.with_store(|s| s.get_all_tags()).unwrap();
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_export_unknown_tag_writes_nothing() {
        let (dir, ctx) = setup();
        let out = dir.path().join("none.json");
        assert!(matches!(
            export(&ctx, "none", Some(&out)),
            Err(Error::TagNotFound { .. })
        ));
        assert!(!out.exists());
    }
}
