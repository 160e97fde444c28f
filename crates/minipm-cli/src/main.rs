#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::uninlined_format_args)]

mod commands;
mod logging;

use clap::Parser;
use minipm_core::config::DEFAULT_MODULES_DIR;
use minipm_core::Config;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "minipm")]
#[command(author, version, about = "A minimal npm-compatible package installer", long_about = None)]
struct Cli {
    /// Increase logging verbosity (-v for DEBUG, -vv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit JSON formatted output (stable, machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Override the project root
    #[arg(long, global = true, value_name = "PATH")]
    cwd: Option<PathBuf>,

    /// Registry base URL (overrides MINIPM_REGISTRY and .npmrc)
    #[arg(long, global = true, value_name = "URL")]
    registry: Option<String>,

    /// Name of the modules root directory
    #[arg(long, global = true, value_name = "NAME", default_value = DEFAULT_MODULES_DIR)]
    modules_dir: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Create a package.json in the project root
    Init,

    /// Install a package, or everything declared in package.json
    #[command(visible_alias = "i")]
    Install {
        /// Package name (e.g. "left-pad", "@scope/name", "left-pad@1.3.0")
        name: Option<String>,

        /// Version or dist-tag (defaults to "latest")
        #[arg(requires = "name")]
        version: Option<String>,

        /// Record the package under devDependencies
        #[arg(short = 'D', long)]
        save_dev: bool,
    },

    /// Remove a package, or everything declared in package.json
    #[command(visible_alias = "rm")]
    Uninstall {
        /// Package name
        name: Option<String>,

        /// Accepted for npm compatibility; names are removed from both groups
        #[arg(short = 'D', long)]
        save_dev: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Determine project root
    let cwd = cli
        .cwd
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_else(|| PathBuf::from("."));

    let config = Config::new(cwd)
        .with_verbosity(cli.verbose)
        .with_json_logs(cli.json)
        .with_registry(cli.registry)
        .with_modules_dir(cli.modules_dir);
    config.validate().into_diagnostic()?;

    logging::init(config.verbosity, config.json_logs);

    match cli.command {
        Some(Commands::Init) => commands::init::run(&config, cli.json),
        Some(Commands::Install {
            name: Some(name),
            version,
            save_dev,
        }) => commands::install::run_one(&config, &name, version.as_deref(), save_dev, cli.json),
        Some(Commands::Install { name: None, .. }) | None => {
            commands::install::run_all(&config, cli.json)
        }
        Some(Commands::Uninstall {
            name: Some(name), ..
        }) => commands::uninstall::run_one(&config, &name, cli.json),
        Some(Commands::Uninstall { name: None, .. }) => {
            commands::uninstall::run_all(&config, cli.json)
        }
    }
}
