//! Version command implementation.

use crate::error::Result;
use crate::model::Dialect;
use crate::storage::migrations::latest_schema_version;
use serde::Serialize;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    default_mode: Dialect,
    schema: SchemaVersions,
}

#[derive(Serialize)]
struct SchemaVersions {
    tagged: &'static str,
    versioned: &'static str,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };
    let schema = SchemaVersions {
        tagged: latest_schema_version(Dialect::Tagged),
        versioned: latest_schema_version(Dialect::Versioned),
    };

    if json {
        let output = VersionOutput {
            version,
            build,
            default_mode: Dialect::default(),
            schema,
        };
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }

    println!("envx version {version} ({build})");
    println!("  schema: tagged {}, versioned {}", schema.tagged, schema.versioned);
    Ok(())
}
