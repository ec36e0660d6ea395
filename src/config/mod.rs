// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Configuration: tool argument tables and pipeline declarations
//!
//! This module defines the on-disk JSON schema (flowmake.json) and the
//! scope tree built from nested pipeline invocations. Everything here is
//! declarative input; the resolution engine in [`crate::resolve`] turns it
//! into a graph.

mod pipelines;
mod scope;
mod tools;

pub use pipelines::{
    ConfigSet, NodeTarget, NodeValueAssignment, PipelineDefinition, PipelineInvocation,
    SharedNodeDecl, TaskDefinition, UniqueNodeDecl,
};
pub use scope::{
    resolve_node_address, resolve_task_address, DeclRef, NodeAddress, PipelineScope,
};
pub use tools::{
    ArgumentDefinition, ArgumentKind, ConstructionRule, StreamInstructions, TextFragment,
    ToolDefinition, ToolRegistry,
};
