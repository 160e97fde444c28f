//! `minipm init` command implementation.
//!
//! Writes a template package.json. Non-destructive: an existing manifest is
//! left untouched.

use super::{installer, print_json};
use minipm_core::pkg::InitOutcome;
use minipm_core::Config;
use miette::{IntoDiagnostic, Result};

/// Run the init command.
pub fn run(config: &Config, json: bool) -> Result<()> {
    let installer = installer(config)?;
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;
    let path = installer.manifest().path().to_path_buf();

    match runtime.block_on(installer.init()) {
        Ok(outcome) => {
            if json {
                print_json(&serde_json::json!({
                    "ok": true,
                    "outcome": outcome,
                    "path": path.to_string_lossy(),
                }))?;
            } else {
                match outcome {
                    InitOutcome::Created => println!("Wrote to {}", path.display()),
                    InitOutcome::AlreadyExists => {
                        println!("{} already exists, leaving it unchanged", path.display());
                    }
                }
            }
            Ok(())
        }
        Err(e) => {
            if json {
                print_json(&serde_json::json!({
                    "ok": false,
                    "error": { "code": e.code(), "message": e.message() },
                }))?;
            } else {
                eprintln!("error: {e}");
            }
            std::process::exit(1);
        }
    }
}
