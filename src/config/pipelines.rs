// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Pipeline declarations
//!
//! Defines the schema for flowmake.json project files: tool definitions,
//! pipeline definitions (tasks plus unique/shared node declarations), and
//! the entry pipeline to resolve.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::config::tools::{ToolDefinition, ToolRegistry};
use crate::errors::FlowmakeError;

/// A complete project file: tools, pipelines, and the entry point
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSet {
    /// Tool definitions available to all pipelines
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,

    /// Pipeline definitions; nested pipelines reference these by name
    pub pipelines: Vec<PipelineDefinition>,

    /// Name of the pipeline to resolve
    pub entry: String,
}

impl ConfigSet {
    /// Load a project file
    pub fn from_file(path: &Path) -> Result<Self, FlowmakeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| FlowmakeError::FileReadError {
                path: path.to_path_buf(),
                error: e.to_string(),
            })?;

        Self::from_json(&content)
    }

    /// Parse a project file from a JSON string
    pub fn from_json(json: &str) -> Result<Self, FlowmakeError> {
        let set: Self = serde_json::from_str(json)?;
        set.validate()?;
        Ok(set)
    }

    /// Build the tool registry
    pub fn registry(&self) -> Result<ToolRegistry, FlowmakeError> {
        ToolRegistry::new(self.tools.clone())
    }

    /// Look up a pipeline definition by name
    pub fn pipeline(&self, name: &str) -> Result<&PipelineDefinition, FlowmakeError> {
        self.pipelines
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| FlowmakeError::UnknownPipeline {
                pipeline: name.to_string(),
            })
    }

    /// Structural checks that do not require graph resolution: unique names,
    /// known tools, known nested pipelines
    fn validate(&self) -> Result<(), FlowmakeError> {
        let tool_names: HashSet<_> = self.tools.iter().map(|t| t.name.as_str()).collect();
        let pipeline_names: HashSet<_> =
            self.pipelines.iter().map(|p| p.name.as_str()).collect();

        if !pipeline_names.contains(self.entry.as_str()) {
            return Err(FlowmakeError::UnknownPipeline {
                pipeline: self.entry.clone(),
            });
        }

        for pipeline in &self.pipelines {
            let mut seen_tasks = HashSet::new();
            for task in &pipeline.tasks {
                if !seen_tasks.insert(task.name.as_str()) {
                    return Err(FlowmakeError::DuplicateTask {
                        task: task.name.clone(),
                        pipeline: pipeline.name.clone(),
                    });
                }
                if !tool_names.contains(task.tool.as_str()) {
                    return Err(FlowmakeError::UnknownTool {
                        task: task.name.clone(),
                        tool: task.tool.clone(),
                    });
                }
            }

            let mut seen_nodes = HashSet::new();
            for id in pipeline
                .unique_nodes
                .iter()
                .map(|n| n.id.as_str())
                .chain(pipeline.shared_nodes.iter().map(|n| n.id.as_str()))
            {
                if !seen_nodes.insert(id) {
                    return Err(FlowmakeError::DuplicateNode {
                        node: id.to_string(),
                        pipeline: pipeline.name.clone(),
                    });
                }
            }

            for invocation in &pipeline.pipelines {
                if !pipeline_names.contains(invocation.pipeline.as_str()) {
                    return Err(FlowmakeError::UnknownPipeline {
                        pipeline: invocation.pipeline.clone(),
                    });
                }
                if seen_tasks.contains(invocation.name.as_str()) {
                    return Err(FlowmakeError::DuplicateTask {
                        task: invocation.name.clone(),
                        pipeline: pipeline.name.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// One pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Pipeline name (unique within the project file)
    pub name: String,

    /// Pipeline description
    #[serde(default)]
    pub description: Option<String>,

    /// Tasks in this pipeline
    #[serde(default)]
    pub tasks: Vec<TaskDefinition>,

    /// Nested pipeline invocations
    #[serde(default)]
    pub pipelines: Vec<PipelineInvocation>,

    /// Nodes belonging to exactly one task/argument
    #[serde(default)]
    pub unique_nodes: Vec<UniqueNodeDecl>,

    /// Nodes shared between several task/argument pairs
    #[serde(default)]
    pub shared_nodes: Vec<SharedNodeDecl>,

    /// Values assigned to declared nodes
    #[serde(default)]
    pub values: Vec<NodeValueAssignment>,

    /// Declared nodes whose files are intermediate and deleted once their
    /// last consumer has run
    #[serde(default)]
    pub delete_files: Vec<String>,
}

/// One task: an invocation of a tool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDefinition {
    /// Task name (unique within the pipeline)
    pub name: String,

    /// Tool to invoke
    pub tool: String,

    /// Argument that, when multi-valued, is passed in full to every
    /// execution instead of being split
    #[serde(default)]
    pub greedy_argument: Option<String>,

    /// This task folds all upstream divisions into one execution
    #[serde(default)]
    pub consolidate: bool,

    /// This task reads its input from a stream
    #[serde(default)]
    pub input_stream: bool,

    /// This task writes its output to a stream
    #[serde(default)]
    pub output_stream: bool,
}

/// An invocation of another pipeline as a nested scope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineInvocation {
    /// Scope name; nested tasks and nodes are addressed through it
    pub name: String,

    /// Name of the invoked pipeline definition
    pub pipeline: String,
}

/// Declaration of a node owned by exactly one task/argument
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UniqueNodeDecl {
    /// Declared node id, referenced by values/deletions/shared nodes
    pub id: String,

    #[serde(flatten)]
    pub target: NodeTarget,
}

/// Declaration of a node shared by several task/argument pairs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedNodeDecl {
    pub id: String,

    /// References that all denote the same logical value
    pub refs: Vec<NodeTarget>,
}

/// Where a node declaration points
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeTarget {
    /// Directly at a task and argument in this pipeline
    TaskArgument {
        task: String,
        argument: String,

        /// For stub arguments in mixed shared groups: which extension's
        /// file this reference shares
        #[serde(default)]
        stub_extension: Option<String>,
    },

    /// At a declared node of a nested pipeline (or an ancestor scope),
    /// addressed by dot-separated path
    NestedNode { node: String },
}

/// A value assignment to a declared node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeValueAssignment {
    /// Declared node id (local or dotted nested address)
    pub node: String,

    /// One value per logical iteration
    pub values: Vec<String>,
}
