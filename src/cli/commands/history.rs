//! Read-only commands: history, tags, stats.

use super::{print_json, RunContext};
use crate::error::{Error, Result};
use crate::model::{HistoryRecord, HistoryStats};
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct HistoryOutput {
    records: Vec<HistoryRecord>,
    count: usize,
}

#[derive(Serialize)]
struct TagsOutput {
    tags: Vec<String>,
    count: usize,
}

/// Execute the history command.
///
/// `key` and `tag` narrow the rows independently; both together select
/// the key's rows under that tag.
///
/// # Errors
///
/// Returns `NotInitialized` or a storage error.
pub fn history(
    ctx: &RunContext,
    key: Option<&str>,
    tag: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    let records = ctx.with_store(|store| match (key, tag) {
        (Some(key), Some(tag)) => store.get_history_by_key_and_tag(key, tag, limit),
        (Some(key), None) => store.get_history_by_key(key, limit),
        (None, Some(tag)) => store.get_history_by_tag(tag, limit),
        (None, None) => store.get_all_history(limit),
    })?;

    if ctx.json {
        return print_json(&HistoryOutput {
            count: records.len(),
            records,
        });
    }

    if records.is_empty() {
        println!("No history.");
        return Ok(());
    }

    for record in &records {
        print_record(record);
    }
    Ok(())
}

fn print_record(record: &HistoryRecord) {
    let mut label = String::new();
    if let Some(version) = record.version {
        label.push_str(&format!("v{version} "));
    }
    if let Some(action) = record.action {
        label.push_str(action.as_str());
        label.push(' ');
    }
    if let Some(tag) = &record.tag {
        label.push_str(&format!("[{tag}] "));
    }
    println!(
        "{} {} {}= {}  {}",
        record.timestamp.dimmed(),
        record.key.bold(),
        label.cyan(),
        record.value,
        format!("({})", record.source).dimmed()
    );
}

/// Execute the tags command.
///
/// # Errors
///
/// Returns `NotInitialized` or a storage error.
pub fn tags(ctx: &RunContext) -> Result<()> {
    let tags = ctx.with_store(|store| store.get_all_tags())?;

    if ctx.json {
        return print_json(&TagsOutput {
            count: tags.len(),
            tags,
        });
    }

    if tags.is_empty() {
        println!("No tags.");
    }
    for tag in &tags {
        println!("{tag}");
    }
    Ok(())
}

/// Which aggregate the stats command reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsScope<'a> {
    Store,
    Tag(&'a str),
    AllTags,
    Versions,
}

/// Execute the stats command.
///
/// # Errors
///
/// Returns `TagNotFound` for an unknown tag, `UnsupportedOperation` for
/// version stats on a tagged store, or a storage error.
pub fn stats(ctx: &RunContext, scope: StatsScope<'_>) -> Result<()> {
    match scope {
        StatsScope::Store => {
            let stats = ctx.with_store(|store| store.get_stats())?;
            if ctx.json {
                return print_json(&stats);
            }
            print_stats("Store", &stats);
        }
        StatsScope::Tag(tag) => {
            let stats = ctx.with_store(|store| store.get_tag_stats(tag))?;
            if stats.stats.is_empty() {
                return Err(Error::TagNotFound { tag: tag.to_string() });
            }
            if ctx.json {
                return print_json(&stats);
            }
            print_stats(&format!("Tag {tag}"), &stats.stats);
        }
        StatsScope::AllTags => {
            let all = ctx.with_store(|store| store.get_all_tags_stats())?;
            if ctx.json {
                return print_json(&all);
            }
            for tag in &all {
                print_stats(&format!("Tag {}", tag.tag), &tag.stats);
            }
        }
        StatsScope::Versions => {
            let all = ctx.with_store(|store| store.get_version_stats())?;
            if ctx.json {
                return print_json(&all);
            }
            for version in &all {
                print_stats(&format!("Version {}", version.version), &version.stats);
            }
        }
    }
    Ok(())
}

fn print_stats(title: &str, stats: &HistoryStats) {
    println!("{}", title.cyan().bold());
    println!("  Records:     {}", stats.total_records);
    println!("  Unique keys: {}", stats.unique_keys);
    if let (Some(oldest), Some(newest)) = (&stats.oldest_timestamp, &stats.newest_timestamp) {
        println!("  Range:       {oldest} .. {newest}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands::{init, values};
    use crate::model::Dialect;
    use tempfile::TempDir;

    fn setup(mode: Dialect) -> (TempDir, RunContext) {
        let temp_dir = TempDir::new().unwrap();
        let ctx = RunContext {
            root: Some(temp_dir.path().to_path_buf()),
            mode: Some(mode),
            json: true,
            ..RunContext::default()
        };
        init::execute(&ctx, false, None, None).unwrap();
        (temp_dir, ctx)
    }

    #[test]
    fn test_stats_scopes() {
        let (_dir, ctx) = setup(Dialect::Versioned);
        values::set(&ctx, "A", "1", None).unwrap();
        values::set(&ctx, "A", "2", Some("v1")).unwrap();

        stats(&ctx, StatsScope::Store).unwrap();
        stats(&ctx, StatsScope::Tag("v1")).unwrap();
        stats(&ctx, StatsScope::AllTags).unwrap();
        stats(&ctx, StatsScope::Versions).unwrap();
        assert!(matches!(
            stats(&ctx, StatsScope::Tag("nope")),
            Err(Error::TagNotFound { .. })
        ));
    }

    #[test]
    fn test_version_stats_need_versioned_store() {
        let (_dir, ctx) = setup(Dialect::Tagged);
        assert!(matches!(
            stats(&ctx, StatsScope::Versions),
            Err(Error::UnsupportedOperation { .. })
        ));
    }

    #[test]
    fn test_history_and_tags_on_empty_store() {
        let (_dir, ctx) = setup(Dialect::Tagged);
        history(&ctx, None, None, Some(10)).unwrap();
        history(&ctx, Some("A"), None, None).unwrap();
        tags(&ctx).unwrap();
    }
}
