// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! spacey-mf - Module Federation tooling for React Native projects
//!
//! Prepares the generated federation directory of a project, prints its
//! `mf-manifest.json` and lists the bundle requests a build has to make.

use anyhow::Context;
use clap::{Parser, Subcommand};
use owo_colors::OwoColorize;
use spacey_federation::{BuildOptions, FederationCommand, ModuleFederation, ModuleFederationConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Module Federation tooling for React Native projects
#[derive(Parser, Debug)]
#[command(name = "spacey-mf")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Federation config file, relative to the project root
    #[arg(short, long, global = true, default_value = "federation.config.json")]
    config: PathBuf,

    /// Project root
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,

    /// Bundler command the build runs under
    #[arg(long, global = true, default_value = "start")]
    command: String,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Recreate the generated directory and write every runtime module
    Prepare,

    /// Print the manifest of the configured container
    Manifest,

    /// List the bundle requests of a build
    Requests {
        /// Host entry file
        #[arg(long, default_value = "index.js")]
        entry: PathBuf,

        /// Target platform
        #[arg(long, default_value = "ios")]
        platform: String,

        /// Request production bundles
        #[arg(long)]
        release: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "spacey_federation=debug,spacey_mf=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let config_path = cli.root.join(&cli.config);
    let options = ModuleFederationConfig::load(&config_path)
        .with_context(|| format!("reading {}", config_path.display()))?;
    debug!("Loaded {}", config_path.display());
    let build = BuildOptions::new(&cli.root, FederationCommand::from_arg(&cli.command)).from_env();

    let Some(federation) = ModuleFederation::new(options, build)? else {
        eprintln!(
            "{}: federation is disabled for '{}'",
            "Warning".yellow().bold(),
            cli.command.cyan()
        );
        return Ok(());
    };

    match &cli.action {
        Action::Prepare => {
            let manifest = federation.prepare()?;
            let written = federation.materialize()?;
            println!(
                "{} {} ({} runtime modules)",
                "Prepared".green().bold(),
                manifest.display(),
                written.len()
            );
        }
        Action::Manifest => {
            println!("{}", federation.manifest().to_json()?);
        }
        Action::Requests {
            entry,
            platform,
            release,
        } => {
            for request in federation.bundle_requests(entry, platform, !release) {
                println!("{}", request.to_url(&cli.root));
            }
        }
    }
    Ok(())
}
