//! `.env` file reading and writing.
//!
//! Accepted lines:
//! - `KEY=VALUE`, optionally prefixed with `export `
//! - blank lines and lines starting with `#`
//!
//! A value wrapped in matching single or double quotes is unquoted. No
//! escape processing or interpolation is done.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};
use crate::sync::file::atomic_write;
use crate::validate::validate_key;

/// Parse `.env` content into an ordered map. Later duplicates win.
///
/// # Errors
///
/// Returns `InvalidArgument` naming the first bad line.
pub fn parse(content: &str) -> Result<BTreeMap<String, String>> {
    let mut values = BTreeMap::new();

    for (index, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map_or(line, str::trim_start);

        let Some((key, value)) = line.split_once('=') else {
            return Err(Error::InvalidArgument(format!(
                "line {}: expected KEY=VALUE",
                index + 1
            )));
        };
        let key = key.trim();
        validate_key(key)
            .map_err(|e| Error::InvalidArgument(format!("line {}: {e}", index + 1)))?;

        values.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    Ok(values)
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Render values as `.env` content.
///
/// Values with whitespace, `#` or quotes are double-quoted unless they
/// contain a double quote themselves, in which case single quotes are used.
#[must_use]
pub fn render(values: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in values {
        let needs_quotes = value
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '#' | '"' | '\''));
        let rendered = if !needs_quotes {
            value.clone()
        } else if value.contains('"') {
            format!("'{value}'")
        } else {
            format!("\"{value}\"")
        };
        out.push_str(key);
        out.push('=');
        out.push_str(&rendered);
        out.push('\n');
    }
    out
}

/// Read and parse a `.env` file.
///
/// # Errors
///
/// Returns `Io` if the file cannot be read, or `InvalidArgument` for a bad line.
pub fn read_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    parse(&content).map_err(|e| match e {
        Error::InvalidArgument(msg) => {
            Error::InvalidArgument(format!("{}: {msg}", path.display()))
        }
        other => other,
    })
}

/// Write values as a `.env` file, atomically.
///
/// # Errors
///
/// Returns `Io` on failure.
pub fn write_file(path: &Path, values: &BTreeMap<String, String>) -> Result<()> {
    atomic_write(path, &render(values))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic() {
        let values = parse(
            "# comment\n\
             DATABASE_URL=postgres://localhost/db\n\
             \n\
             export API_KEY = abc123\n\
             QUOTED=\"hello world\"\n\
             SINGLE='a \"b\"'\n\
             EMPTY=\n\
             WITH_EQ=a=b\n",
        )
        .unwrap();

        assert_eq!(values["DATABASE_URL"], "postgres://localhost/db");
        assert_eq!(values["API_KEY"], "abc123");
        assert_eq!(values["QUOTED"], "hello world");
        assert_eq!(values["SINGLE"], "a \"b\"");
        assert_eq!(values["EMPTY"], "");
        assert_eq!(values["WITH_EQ"], "a=b");
        assert_eq!(values.len(), 6);
    }

    #[test]
    fn test_parse_duplicate_last_wins() {
        let values = parse("A=1\nA=2\n").unwrap();
        assert_eq!(values["A"], "2");
    }

    #[test]
    fn test_parse_mismatched_quotes_kept() {
        let values = parse("A=\"open\nB='x\"\n").unwrap();
        assert_eq!(values["A"], "\"open");
        assert_eq!(values["B"], "'x\"");
    }

    #[test]
    fn test_parse_reports_line() {
        let err = parse("A=1\nnot a pair\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));

        let err = parse("=value\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_render_reparses() {
        let mut values = BTreeMap::new();
        values.insert("PLAIN".to_string(), "x".to_string());
        values.insert("SPACED".to_string(), "a b".to_string());
        values.insert("HASH".to_string(), "a#b".to_string());
        values.insert("DQUOTE".to_string(), "say \"hi\"".to_string());
        values.insert("EMPTY".to_string(), String::new());

        let rendered = render(&values);
        assert!(rendered.contains("SPACED=\"a b\"\n"));
        assert!(rendered.contains("DQUOTE='say \"hi\"'\n"));
        assert_eq!(parse(&rendered).unwrap(), values);
    }
}
