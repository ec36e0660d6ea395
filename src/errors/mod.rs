// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Error types for pipeline resolution and execution
//!
//! Every resolution pass fails fast: the first invariant violation is
//! returned as a structured error carrying the task, argument, or node it
//! concerns. There is no partial-success state.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for flowmake operations
pub type FlowmakeResult<T> = Result<T, FlowmakeError>;

/// Main error type for flowmake
#[derive(Error, Debug, Diagnostic)]
pub enum FlowmakeError {
    // ─────────────────────────────────────────────────────────────────────────
    // Resolution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Unresolved reference '{reference}' in pipeline '{pipeline}'")]
    #[diagnostic(
        code(flowmake::config_reference),
        help("Check that '{reference}' names a task, argument, or node declared in the pipeline or one of its nested pipelines")
    )]
    ConfigReference { reference: String, pipeline: String },

    #[error("Argument '{argument}' is not valid for tool '{tool}' (task '{task}')")]
    #[diagnostic(code(flowmake::argument_mismatch))]
    ArgumentMismatch {
        tool: String,
        task: String,
        argument: String,
        #[help]
        help: Option<String>,
    },

    #[error("Inconsistent stub configuration on node '{node}': {reason}")]
    #[diagnostic(
        code(flowmake::stub_consistency),
        help("All stub references sharing a node must declare identical extension sets")
    )]
    StubConsistency { node: String, reason: String },

    #[error("Cannot construct filename for argument '{argument}' of task '{task}': {reason}")]
    #[diagnostic(code(flowmake::filename_construction))]
    FilenameConstruction {
        task: String,
        argument: String,
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Division error on task '{task}': {reason}")]
    #[diagnostic(code(flowmake::division))]
    Division {
        task: String,
        reason: String,
        #[help]
        help: Option<String>,
    },

    #[error("Stream error on task '{task}': {reason}")]
    #[diagnostic(
        code(flowmake::stream),
        help("Streaming tasks must form producer/consumer pairs that are adjacent in the workflow")
    )]
    Stream { task: String, reason: String },

    #[error("Workflow could not be ordered; pending tasks: {}", .pending.join(", "))]
    #[diagnostic(
        code(flowmake::workflow),
        help("Review the links between the pending tasks to remove the cycle")
    )]
    Workflow { pending: Vec<String> },

    // ─────────────────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Configuration file not found: {path}")]
    #[diagnostic(
        code(flowmake::config_not_found),
        help("Create a project file (flowmake.json) describing tools and pipelines")
    )]
    ConfigNotFound { path: PathBuf },

    #[error("Task '{task}' uses unknown tool '{tool}'")]
    #[diagnostic(code(flowmake::unknown_tool))]
    UnknownTool { task: String, tool: String },

    #[error("Unknown pipeline '{pipeline}'")]
    #[diagnostic(code(flowmake::unknown_pipeline))]
    UnknownPipeline { pipeline: String },

    #[error("Duplicate task name '{task}' in pipeline '{pipeline}'")]
    #[diagnostic(code(flowmake::duplicate_task))]
    DuplicateTask { task: String, pipeline: String },

    #[error("Duplicate node id '{node}' in pipeline '{pipeline}'")]
    #[diagnostic(code(flowmake::duplicate_node))]
    DuplicateNode { node: String, pipeline: String },

    #[error("Invalid configuration: {reason}")]
    #[diagnostic(code(flowmake::invalid_config))]
    InvalidConfig {
        reason: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Execution Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("'make' not found")]
    #[diagnostic(
        code(flowmake::make_not_found),
        help("Install GNU make and ensure it is in your PATH")
    )]
    MakeNotFound,

    #[error("Build failed with exit code {exit_code}")]
    #[diagnostic(code(flowmake::build_failed))]
    BuildFailed {
        exit_code: i32,
        stderr: String,
        #[help]
        help: Option<String>,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // IO/System Errors
    // ─────────────────────────────────────────────────────────────────────────
    #[error("Failed to read file '{path}': {error}")]
    #[diagnostic(code(flowmake::file_read_error))]
    FileReadError { path: PathBuf, error: String },

    #[error("Failed to write file '{path}': {error}")]
    #[diagnostic(code(flowmake::file_write_error))]
    FileWriteError { path: PathBuf, error: String },

    #[error("IO error: {message}")]
    #[diagnostic(code(flowmake::io_error))]
    Io { message: String },

    #[error("JSON parsing error: {message}")]
    #[diagnostic(code(flowmake::json_error))]
    Json { message: String },
}

impl From<std::io::Error> for FlowmakeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io {
            message: e.to_string(),
        }
    }
}

impl From<serde_json::Error> for FlowmakeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json {
            message: e.to_string(),
        }
    }
}

impl FlowmakeError {
    /// Create an argument mismatch with a suggestion naming the tool's arguments
    pub fn unknown_argument(tool: &str, task: &str, argument: &str, known: &[String]) -> Self {
        let help = if known.is_empty() {
            None
        } else {
            Some(format!("Tool '{}' accepts: {}", tool, known.join(", ")))
        };

        Self::ArgumentMismatch {
            tool: tool.to_string(),
            task: task.to_string(),
            argument: argument.to_string(),
            help,
        }
    }

    /// Create a filename construction error without a help message
    pub fn filename(task: &str, argument: &str, reason: impl Into<String>) -> Self {
        Self::FilenameConstruction {
            task: task.to_string(),
            argument: argument.to_string(),
            reason: reason.into(),
            help: None,
        }
    }

    /// Create a division error without a help message
    pub fn division(task: &str, reason: impl Into<String>) -> Self {
        Self::Division {
            task: task.to_string(),
            reason: reason.into(),
            help: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_argument_help_lists_arguments() {
        let err = FlowmakeError::unknown_argument(
            "aligner",
            "align",
            "--bogus",
            &["--in".to_string(), "--out".to_string()],
        );

        match err {
            FlowmakeError::ArgumentMismatch { help, .. } => {
                assert!(help.unwrap().contains("--in"));
            }
            _ => panic!("Expected ArgumentMismatch"),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: FlowmakeError = io.into();
        assert!(matches!(err, FlowmakeError::Io { .. }));
    }

    #[test]
    fn test_division_constructor() {
        let err = FlowmakeError::division("call", "two arguments force division");
        assert!(err.to_string().contains("call"));
    }
}
