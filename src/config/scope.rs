// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Pipeline scope tree
//!
//! Nested pipeline invocations form a tree of scopes. Node and task
//! references between scopes use [`NodeAddress`], an ordered list of path
//! segments; a reference that does not resolve inside the referencing scope
//! is retried in each ancestor scope in turn. Dotted strings exist only at
//! the configuration and display boundaries — resolution itself walks
//! structured segments.

use std::fmt;

use crate::config::pipelines::{
    ConfigSet, PipelineDefinition, SharedNodeDecl, TaskDefinition, UniqueNodeDecl,
};
use crate::errors::FlowmakeError;

/// A structured address: ordered path segments, the last naming a node or
/// task, the rest naming nested scopes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeAddress {
    pub segments: Vec<String>,
}

impl NodeAddress {
    /// Parse a dotted reference from configuration
    pub fn parse(reference: &str) -> Self {
        Self {
            segments: reference.split('.').map(String::from).collect(),
        }
    }

    /// The scope path portion (all but the final segment)
    pub fn scope_path(&self) -> &[String] {
        &self.segments[..self.segments.len().saturating_sub(1)]
    }

    /// The final segment: the node or task name
    pub fn leaf(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

/// One instantiated pipeline scope
#[derive(Debug, Clone)]
pub struct PipelineScope {
    /// Invocation name (the entry pipeline's own name at the root)
    pub name: String,

    /// Path segments from the root scope (empty at the root)
    pub path: Vec<String>,

    pub definition: PipelineDefinition,

    pub children: Vec<PipelineScope>,
}

/// A declaration found by address resolution
#[derive(Debug, Clone, Copy)]
pub enum DeclRef<'a> {
    Unique(&'a UniqueNodeDecl),
    Shared(&'a SharedNodeDecl),
}

impl PipelineScope {
    /// Instantiate the scope tree for the entry pipeline
    pub fn instantiate(set: &ConfigSet) -> Result<Self, FlowmakeError> {
        let mut active = Vec::new();
        Self::build(set, &set.entry, set.entry.clone(), Vec::new(), &mut active)
    }

    fn build(
        set: &ConfigSet,
        pipeline_name: &str,
        invocation_name: String,
        path: Vec<String>,
        active: &mut Vec<String>,
    ) -> Result<Self, FlowmakeError> {
        if active.iter().any(|p| p == pipeline_name) {
            return Err(FlowmakeError::InvalidConfig {
                reason: format!(
                    "Pipeline '{}' invokes itself through {}",
                    pipeline_name,
                    active.join(" → ")
                ),
                help: None,
            });
        }

        let definition = set.pipeline(pipeline_name)?.clone();
        active.push(pipeline_name.to_string());

        let mut children = Vec::new();
        for invocation in &definition.pipelines {
            let mut child_path = path.clone();
            child_path.push(invocation.name.clone());
            children.push(Self::build(
                set,
                &invocation.pipeline,
                invocation.name.clone(),
                child_path,
                active,
            )?);
        }

        active.pop();

        Ok(Self {
            name: invocation_name,
            path,
            definition,
            children,
        })
    }

    /// Child scope by invocation name
    pub fn child(&self, name: &str) -> Option<&PipelineScope> {
        self.children.iter().find(|c| c.name == name)
    }

    /// Descend from this scope along a path of invocation names
    pub fn descend(&self, path: &[String]) -> Option<&PipelineScope> {
        let mut scope = self;
        for segment in path {
            scope = scope.child(segment)?;
        }
        Some(scope)
    }

    /// Render a local name as a graph node id, qualified by this scope's path
    pub fn qualify(&self, local: &str) -> String {
        if self.path.is_empty() {
            local.to_string()
        } else {
            format!("{}.{}", self.path.join("."), local)
        }
    }

    /// All scopes in pre-order (self first)
    pub fn scopes(&self) -> Vec<&PipelineScope> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.scopes());
        }
        out
    }

    /// Task definition by local name
    pub fn task(&self, name: &str) -> Option<&TaskDefinition> {
        self.definition.tasks.iter().find(|t| t.name == name)
    }

    /// Declared node (unique or shared) by local id
    pub fn node_decl(&self, id: &str) -> Option<DeclRef<'_>> {
        if let Some(decl) = self.definition.unique_nodes.iter().find(|n| n.id == id) {
            return Some(DeclRef::Unique(decl));
        }
        self.definition
            .shared_nodes
            .iter()
            .find(|n| n.id == id)
            .map(DeclRef::Shared)
    }
}

/// Resolve a node address relative to the scope at `from`, retrying in each
/// ancestor scope. Returns the owning scope and the declaration.
pub fn resolve_node_address<'a>(
    root: &'a PipelineScope,
    from: &[String],
    address: &NodeAddress,
) -> Option<(&'a PipelineScope, DeclRef<'a>)> {
    for anchor_len in (0..=from.len()).rev() {
        let anchor = root.descend(&from[..anchor_len])?;
        if let Some(scope) = anchor.descend(address.scope_path()) {
            if let Some(decl) = scope.node_decl(address.leaf()) {
                return Some((scope, decl));
            }
        }
    }
    None
}

/// Resolve a task address relative to the scope at `from`, retrying in each
/// ancestor scope. Returns the owning scope and the task definition.
pub fn resolve_task_address<'a>(
    root: &'a PipelineScope,
    from: &[String],
    address: &NodeAddress,
) -> Option<(&'a PipelineScope, &'a TaskDefinition)> {
    for anchor_len in (0..=from.len()).rev() {
        let anchor = root.descend(&from[..anchor_len])?;
        if let Some(scope) = anchor.descend(address.scope_path()) {
            if let Some(task) = scope.task(address.leaf()) {
                return Some((scope, task));
            }
        }
    }
    None
}
