//! envx CLI entry point.

use clap::Parser;
use envx::cli::commands::{self, history::StatsScope, RunContext};
use envx::cli::{Cli, Commands};
use envx::error::Error;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let ctx = RunContext {
        db: cli.db.clone(),
        root: cli.root.clone(),
        mode: cli.mode,
        source: cli.source.clone(),
        json,
    };

    match &cli.command {
        Commands::Init { force, from, tag } => {
            commands::init::execute(&ctx, *force, from.as_deref(), tag.as_deref())
        }

        // Single keys
        Commands::Set { key, value, tag } => {
            commands::values::set(&ctx, key, value, tag.as_deref())
        }
        Commands::Del { key } => commands::values::del(&ctx, key),
        Commands::Latest { key } => commands::values::latest(&ctx, key),

        // Snapshots
        Commands::Tag { name, file } => commands::snapshot::tag(&ctx, name.as_deref(), file),
        Commands::Show { tag, dotenv, out } => {
            commands::snapshot::show(&ctx, tag, *dotenv, out.as_deref())
        }
        Commands::Export { tag, out } => commands::snapshot::export(&ctx, tag, out.as_deref()),
        Commands::Import { file, tag } => commands::snapshot::import(&ctx, file, tag.as_deref()),

        // Queries
        Commands::History { key, tag, limit } => {
            commands::history::history(&ctx, key.as_deref(), tag.as_deref(), *limit)
        }
        Commands::Tags => commands::history::tags(&ctx),
        Commands::Stats {
            tag,
            all_tags,
            versions,
        } => {
            let scope = match (tag.as_deref(), *all_tags, *versions) {
                (Some(tag), _, _) => StatsScope::Tag(tag),
                (None, true, _) => StatsScope::AllTags,
                (None, false, true) => StatsScope::Versions,
                (None, false, false) => StatsScope::Store,
            };
            commands::history::stats(&ctx, scope)
        }

        // Maintenance
        Commands::Upgrade => commands::maintenance::upgrade(&ctx),
        Commands::Prune { days } => commands::maintenance::prune(&ctx, *days),

        Commands::Completions { shell } => commands::completions::execute(shell),
        Commands::Version => commands::version::execute(json),
    }
}
