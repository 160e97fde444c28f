//! `minipm install` command implementation.

use super::{installer, print_json};
use minipm_core::pkg::{InstallReport, PackageRef, ResolvedInstall};
use minipm_core::Config;
use miette::{IntoDiagnostic, Result};

/// Install a single package and record it.
pub fn run_one(
    config: &Config,
    name: &str,
    version: Option<&str>,
    save_dev: bool,
    json: bool,
) -> Result<()> {
    let pkg = match PackageRef::parse(name) {
        Ok(pkg) => pkg.with_version(version).with_dev(save_dev),
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

    let installer = installer(config)?;
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;

    match runtime.block_on(installer.install_one(&pkg)) {
        Ok(installed) => {
            if json {
                print_json(&serde_json::json!({ "ok": true, "installed": installed }))?;
            } else {
                print_installed(&installed);
            }
            Ok(())
        }
        Err(failure) => {
            if json {
                print_json(&serde_json::json!({ "ok": false, "failure": failure }))?;
            } else {
                eprintln!("error: {failure}");
            }
            std::process::exit(1);
        }
    }
}

/// Install everything declared in the manifest.
pub fn run_all(config: &Config, json: bool) -> Result<()> {
    let installer = installer(config)?;
    let runtime = tokio::runtime::Runtime::new().into_diagnostic()?;

    let report = match runtime.block_on(installer.install_all()) {
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
            "installed": report.installed,
            "failures": report.failures,
            "notes": report.notes,
            "concurrency_limit": report.concurrency_limit,
            "peak_in_flight": report.peak_in_flight,
        }))?;
    } else {
        print_report(&report);
    }

    if !report.ok() {
        std::process::exit(1);
    }
    Ok(())
}

fn print_installed(installed: &ResolvedInstall) {
    let dev = if installed.dev { " (dev)" } else { "" };
    println!("+ {}@{}{dev}", installed.name, installed.version);
}

fn print_report(report: &InstallReport) {
    for note in &report.notes {
        println!("{note}");
    }
    for installed in &report.installed {
        print_installed(installed);
    }
    for failure in &report.failures {
        eprintln!("error: {failure}");
    }
    if !report.installed.is_empty() || !report.failures.is_empty() {
        println!();
        println!(
            "{} installed, {} failed",
            report.installed.len(),
            report.failures.len()
        );
    }
}
