// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! flowmake - Pipeline Graph Compiler
//!
//! Resolves declarative tool workflows into executable Makefiles.

use clap::Parser;
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flowmake::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flowmake=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();

    // Change to specified directory if provided
    if let Some(ref dir) = cli.directory {
        std::env::set_current_dir(dir).map_err(|e| {
            miette::miette!("Failed to change to directory '{}': {}", dir.display(), e)
        })?;
    }

    // Dispatch to command handlers
    match cli.command {
        Commands::Run {
            config,
            makefile,
            dry_run,
            jobs,
        } => flowmake::cli::run::run(config, makefile, dry_run, jobs, cli.verbose).await,
        Commands::Validate { config } => flowmake::cli::validate::run(config, cli.verbose).await,
        Commands::Graph { config, format } => {
            flowmake::cli::graph::run(config, format, cli.verbose).await
        }
    }
}
