// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Build execution
//!
//! Runs the emitted Makefile with `make`. The runner is the only part of
//! the system that touches external processes; everything upstream is pure
//! graph resolution.

use async_trait::async_trait;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::process::Command;

use crate::errors::FlowmakeError;

/// Result of a build execution
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

/// Executes an emitted build script
#[async_trait]
pub trait BuildRunner {
    /// Run the build script in the given directory
    async fn execute(
        &self,
        makefile: &Path,
        working_dir: &Path,
        jobs: Option<usize>,
    ) -> Result<BuildResult, FlowmakeError>;

    /// Whether the build tool is installed
    async fn check_available(&self) -> Result<bool, FlowmakeError>;

    /// Build tool version string
    async fn version(&self) -> Result<String, FlowmakeError>;
}

/// Runner backed by GNU make
pub struct MakeRunner;

impl MakeRunner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for MakeRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BuildRunner for MakeRunner {
    async fn execute(
        &self,
        makefile: &Path,
        working_dir: &Path,
        jobs: Option<usize>,
    ) -> Result<BuildResult, FlowmakeError> {
        let make = which::which("make").map_err(|_| FlowmakeError::MakeNotFound)?;

        let start = Instant::now();

        let mut cmd = Command::new(make);
        cmd.arg("-f").arg(makefile);
        if let Some(jobs) = jobs {
            cmd.arg(format!("-j{}", jobs));
        }
        cmd.current_dir(working_dir);

        let output = cmd.output().await?;

        let duration = start.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);

        Ok(BuildResult {
            success: output.status.success(),
            stdout,
            stderr,
            exit_code,
            duration,
        })
    }

    async fn check_available(&self) -> Result<bool, FlowmakeError> {
        Ok(which::which("make").is_ok())
    }

    async fn version(&self) -> Result<String, FlowmakeError> {
        let make = which::which("make").map_err(|_| FlowmakeError::MakeNotFound)?;

        let output = Command::new(make).arg("--version").output().await?;

        let version_str = String::from_utf8_lossy(&output.stdout);
        let version = version_str
            .lines()
            .next()
            .unwrap_or("unknown")
            .trim()
            .to_string();

        Ok(version)
    }
}
