// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! # flowmake - Pipeline Graph Compiler
//!
//! `flowmake` compiles a declarative description of a multi-tool pipeline
//! into a fully resolved execution graph and emits it as a Makefile.
//!
//! ## Features
//!
//! - **Graph resolution** - unique/shared node declarations become one
//!   canonical dependency graph, nested pipelines included
//! - **Filename construction** - unset file and option values are derived
//!   from configurable per-argument rules
//! - **Divisions** - a multi-valued argument fans a task out into parallel
//!   executions; a consolidation point folds them back together
//! - **Streams** - producer/consumer pairs validated and emitted as piped
//!   recipes
//!
//! ## Quick Start
//!
//! ```bash
//! # Check that the project file resolves
//! flowmake validate
//!
//! # Render the resolved task graph
//! flowmake graph --format dot
//!
//! # Resolve, emit the Makefile, and run make
//! flowmake run -j 4
//! ```

pub mod cli;
pub mod config;
pub mod emit;
pub mod errors;
pub mod graph;
pub mod resolve;
pub mod utils;

// Re-export commonly used types
pub use config::{ConfigSet, PipelineDefinition, ToolDefinition};
pub use errors::{FlowmakeError, FlowmakeResult};
pub use resolve::{resolve, ExecutionPlan, ResolvedPipeline};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
