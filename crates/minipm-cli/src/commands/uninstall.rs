//! `minipm uninstall` command implementation.

use super::{installer, print_json};
use minipm_core::pkg::{UninstallOutcome, UninstallReport};
use minipm_core::Config;
use miette::{IntoDiagnostic, Result};

/// Uninstall a single package.
pub fn run_one(config: &Config, name: &str, json: bool) -> Result<()> {
    let installer = installer(config)?;
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;

    match runtime.block_on(installer.uninstall_one(name)) {
        Ok(outcome) => {
            if json {
                print_json(&serde_json::json!({
                    "ok": true,
                    "name": name,
                    "outcome": outcome,
                }))?;
            } else {
                match outcome {
                    UninstallOutcome::Removed => println!("- {name}"),
                    UninstallOutcome::NotInstalled => println!("{name} is not installed"),
                }
            }
            Ok(())
        }
        Err(e) => {
            if json {
                print_json(&serde_json::json!({
                    "ok": false,
                    "name": name,
                    "error": { "code": e.code(), "message": e.message() },
                }))?;
            } else {
                eprintln!("error: {e}");
            }
            std::process::exit(1);
        }
    }
}

/// Uninstall everything declared in the manifest.
pub fn run_all(config: &Config, json: bool) -> Result<()> {
    let installer = installer(config)?;
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;

    let report = match runtime.block_on(installer.uninstall_all()) {
        Ok(report) => report,
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
    };

    if json {
        print_json(&serde_json::json!({
            "ok": report.ok(),
            "removed": report.removed,
            "not_installed": report.not_installed,
            "failures": report.failures,
            "notes": report.notes,
        }))?;
    } else {
        print_report(&report);
    }

    if !report.ok() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_report(report: &UninstallReport) {
    for note in &report.notes {
        println!("{note}");
    }
    for name in &report.removed {
        println!("- {name}");
    }
    for name in &report.not_installed {
        println!("{name} is not installed");
    }
    for failure in &report.failures {
        eprintln!("error: {failure}");
    }
}
