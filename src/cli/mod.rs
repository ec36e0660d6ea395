// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! CLI command definitions and handlers
//!
//! Defines the command-line interface for flowmake.

pub mod graph;
pub mod run;
pub mod validate;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Pipeline graph compiler
///
/// Resolves declarative tool workflows into executable Makefiles.
#[derive(Parser, Debug)]
#[clap(
    name = "flowmake",
    version,
    about = "Pipeline graph compiler: resolves declarative tool workflows into executable Makefiles",
    long_about = None,
    after_help = "Examples:\n\
        flowmake validate               Check the project file resolves\n\
        flowmake graph --format dot     Render the resolved task graph\n\
        flowmake run --dry-run          Emit the Makefile without executing\n\
        flowmake run -j 4               Resolve, emit, and run make\n\n\
        See 'flowmake <command> --help' for more information on a specific command."
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[clap(short, long, global = true)]
    pub verbose: bool,

    /// Change to directory before executing
    #[clap(short = 'C', long, global = true, value_name = "DIR")]
    pub directory: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve the pipeline, emit the Makefile, and execute it
    Run {
        /// Project file
        #[clap(short, long, default_value = "flowmake.json")]
        config: PathBuf,

        /// Where to write the Makefile
        #[clap(short, long, default_value = "Makefile")]
        makefile: PathBuf,

        /// Emit the Makefile but do not execute it
        #[clap(long)]
        dry_run: bool,

        /// Parallel jobs passed to make (-j)
        #[clap(short, long)]
        jobs: Option<usize>,
    },

    /// Validate the project file by running a full resolution
    Validate {
        /// Project file
        #[clap(default_value = "flowmake.json")]
        config: PathBuf,
    },

    /// Show the resolved task workflow as a graph
    Graph {
        /// Project file
        #[clap(default_value = "flowmake.json")]
        config: PathBuf,

        /// Output format (text, dot, mermaid)
        #[clap(short, long, default_value = "text")]
        format: GraphFormat,
    },
}

/// Graph output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Text,
    Dot,
    Mermaid,
}

impl std::str::FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "dot" => Ok(Self::Dot),
            "mermaid" => Ok(Self::Mermaid),
            _ => Err(format!("Unknown graph format: {}", s)),
        }
    }
}
