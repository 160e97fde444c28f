pub mod init;
pub mod install;
pub mod uninstall;

use minipm_core::pkg::{Installer, RegistryClient};
use minipm_core::Config;
use miette::{IntoDiagnostic, Result};

/// Build the orchestrator for the configured project.
pub(crate) fn installer(config: &Config) -> Result<Installer> {
    let registry = RegistryClient::from_config(config).into_diagnostic()?;
    Ok(Installer::new(config.clone(), registry))
}

/// Print a JSON document to stdout.
pub(crate) fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).into_diagnostic()?);
    Ok(())
}
