// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Emission and execution of the resolved plan
//!
//! The resolved graph is read-only here: the emitter serializes the
//! execution plan into a Makefile and the runner hands it to `make`.

mod makefile;
mod runner;

pub use makefile::MakefileEmitter;
pub use runner::{BuildResult, BuildRunner, MakeRunner};
