use std::io;

use anyhow::Result;
use clap::Parser;

use ripple::cli::commands;
use ripple::cli::{Cli, Commands, LogLevel};

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_level);

    match cli.command {
        Commands::Analyze {
            ref entries,
            ref changes,
            ref changes_file,
            ref file,
            change_type,
            ref exports,
        } => {
            let project = commands::load_project(cli.root.as_deref(), cli.config.as_deref())?;
            let changes = commands::gather_changes(
                &project,
                changes.as_deref(),
                changes_file.as_deref(),
                file.as_deref(),
                change_type.map(Into::into),
                exports.as_deref(),
            )?;
            let (output, has_failures) =
                commands::run_analyze(&project, entries, changes, &cli.format)?;
            println!("{}", output);
            if has_failures {
                std::process::exit(1);
            }
        }

        Commands::Git {
            ref entries,
            ref range,
            detailed,
            list,
        } => {
            let project = commands::load_project(cli.root.as_deref(), cli.config.as_deref())?;
            let (output, has_failures) =
                commands::run_git(&project, entries, range, detailed, list, &cli.format)?;
            println!("{}", output);
            if has_failures {
                std::process::exit(1);
            }
        }

        Commands::Worker => commands::run_worker()?,
    }

    Ok(())
}

/// Diagnostics go to stderr so stdout stays parseable.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}
