//! Auto-generated tag names (`auto-<N>`).
//!
//! `N` is one more than the largest number among existing `auto-<digits>`
//! tags. Anything else that merely starts with `auto-` is ignored.

use rusqlite::Connection;

/// Prefix shared by every auto-generated tag.
pub const AUTO_TAG_PREFIX: &str = "auto-";

/// Parse the number out of an auto tag, if the tag has the exact shape.
#[must_use]
pub fn parse_auto_tag(tag: &str) -> Option<u64> {
    let digits = tag.strip_prefix(AUTO_TAG_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Format the auto tag for a number.
#[must_use]
pub fn format_auto_tag(n: u64) -> String {
    format!("{AUTO_TAG_PREFIX}{n}")
}

/// Next free auto tag in the history table.
///
/// Call inside the write transaction that uses the tag so two writers
/// cannot pick the same number. Returns `None` once `auto-<u64::MAX>`
/// exists, since every later number would reuse a tag.
///
/// # Errors
///
/// Returns an error if the tag scan fails.
pub fn next_auto_tag(conn: &Connection) -> rusqlite::Result<Option<String>> {
    let mut stmt =
        conn.prepare_cached("SELECT DISTINCT tag FROM env_history WHERE tag LIKE 'auto-%'")?;
    let tags = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut highest = 0u64;
    for tag in tags {
        if let Some(n) = parse_auto_tag(&tag?) {
            highest = highest.max(n);
        }
    }

    Ok(highest.checked_add(1).map(format_auto_tag))
}
