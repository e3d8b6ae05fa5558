//! deploykit: production configuration and deployment artifact generation
//!
//! Loads a checksummed configuration tree (environment defaults overlaid by a
//! persisted JSON file), validates it, and renders Kubernetes, Docker Compose,
//! nginx, and Prometheus artifacts from it.

mod artifacts;
mod cli;
mod config;
mod domain;
mod service;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs;
use std::io::ErrorKind;
use std::process;

use cli::{Cli, Commands};
use config::{ConfigService, ValidationContext, Verification};
use domain::Env;
use service::ConfigManager;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_dir = cli
        .log_dir
        .clone()
        .unwrap_or_else(domain::logger::default_log_dir);
    domain::logger::init(cli.debug, &log_dir)?;

    // Load configuration once; everything below borrows the manager
    let env = Env::real();
    let service = ConfigService::resolve(cli.config.as_deref(), &env);
    let manager = ConfigManager::init(service, env);

    match cli.command {
        Commands::Show => {
            let json = serde_json::to_string_pretty(&manager.config())?;
            println!("{}", json);
            if !cli.quiet {
                eprintln!("Configuration source: {}", manager.load_outcome());
            }
        }
        Commands::Init { force } => {
            let path = manager.service().path();
            if path.exists() && !force {
                bail!(
                    "Configuration file already exists: {} (use --force to overwrite)",
                    path.display()
                );
            }
            manager
                .save()
                .with_context(|| format!("Failed to write configuration: {}", path.display()))?;
            if !cli.quiet {
                eprintln!("Configuration file created at: {}", path.display());
            }
        }
        Commands::Set { json } => {
            let partial: serde_json::Value =
                serde_json::from_str(&json).context("Update is not valid JSON")?;
            manager.update(partial).context("Failed to update configuration")?;
            if !cli.quiet {
                eprintln!(
                    "Configuration saved to: {}",
                    manager.service().path().display()
                );
            }
        }
        Commands::Validate { cache_url_var } => {
            let ctx = ValidationContext::from_env(manager.env(), &cache_url_var);
            let report = manager.validate(&ctx);
            print!("{}", report);
            if !report.is_valid() {
                eprintln!(
                    "Configuration is invalid: {} error(s), {} warning(s)",
                    report.errors.len(),
                    report.warnings.len()
                );
                process::exit(1);
            }
            if !cli.quiet {
                eprintln!("Configuration is valid.");
            }
        }
        Commands::Verify => {
            let path = manager.service().path();
            let raw = match fs::read(path) {
                Ok(raw) => raw,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    println!("No configuration file at {}", path.display());
                    return Ok(());
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to read {}", path.display()));
                }
            };

            let verifier = manager.service().verifier();
            let verification = verifier.verify(&raw);
            match &verification {
                Verification::Match => println!("OK: checksum matches {}", path.display()),
                Verification::NoBaseline => {
                    println!("OK: no checksum recorded for {}", path.display())
                }
                Verification::Mismatch { expected, actual } => println!(
                    "MISMATCH: {} does not match {} (expected {}, found {})",
                    path.display(),
                    verifier.checksum_path().display(),
                    expected,
                    actual
                ),
                Verification::Unreadable(e) => println!(
                    "UNREADABLE: {}: {}",
                    verifier.checksum_path().display(),
                    e
                ),
            }
            if !verification.is_trusted() {
                process::exit(1);
            }
        }
        Commands::Generate { target, output } => {
            let rendered = match target {
                Some(kind) => vec![(kind, manager.generate(kind)?)],
                None => manager.generate_all()?,
            };

            match output {
                Some(dir) => {
                    let written = artifacts::write_artifacts(&dir, &rendered).with_context(|| {
                        format!("Failed to write artifacts to {}", dir.display())
                    })?;
                    if !cli.quiet {
                        for path in written {
                            eprintln!("Wrote {}", path.display());
                        }
                    }
                }
                None if rendered.len() == 1 => {
                    print!("{}", rendered[0].1);
                }
                None => {
                    for (kind, content) in &rendered {
                        println!("# ==> {} <==", kind.file_name());
                        print!("{}", content);
                        println!();
                    }
                }
            }
        }
        Commands::Version => {
            println!("deploykit {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
