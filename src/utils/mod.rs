// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Utility modules
//!
//! Common utilities for the flowmake CLI.

pub mod spinner;

pub use spinner::*;
