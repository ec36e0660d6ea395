// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Pipeline graph model
//!
//! A directed graph of task and data nodes keyed by stable string ids
//! (dot-separated when pipelines are nested). Node payloads are a sum type
//! per kind; edges carry the argument metadata linking a data node to a
//! task. Adding a node is idempotent on its id; adding an edge always
//! appends (parallel edges are how stub families attach). Nothing here
//! checks for cycles — the workflow orderer owns that.

use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

use crate::config::{ConstructionRule, StreamInstructions};

/// Node kind discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Task,
    File,
    Option,
}

/// Payload of a task node
#[derive(Debug, Clone)]
pub struct TaskData {
    /// Stable node id (qualified by scope path)
    pub id: String,

    /// Name of the tool this task invokes
    pub tool: String,

    /// Argument consumed in full by every execution
    pub greedy_argument: Option<String>,

    /// Number of parallel replicas (1 = not divided)
    pub divisions: usize,

    /// Which replica this node is (0 for the original)
    pub division_index: usize,

    /// Long form of the argument that forced the division, if this task is
    /// (or inherits) a division point
    pub division_argument: Option<String>,

    pub is_parent: bool,
    pub is_child: bool,
    pub parent: Option<String>,
    /// Replica node ids, in division order
    pub children: Vec<String>,

    /// This task folds all upstream divisions into one execution
    pub consolidate: bool,

    pub is_input_stream: bool,
    pub is_output_stream: bool,

    /// Independent executions implied by a multi-valued non-greedy input
    pub subphases: usize,
}

impl TaskData {
    pub fn new(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            greedy_argument: None,
            divisions: 1,
            division_index: 0,
            division_argument: None,
            is_parent: false,
            is_child: false,
            parent: None,
            children: Vec::new(),
            consolidate: false,
            is_input_stream: false,
            is_output_stream: false,
            subphases: 1,
        }
    }
}

/// Payload of a file or option node
#[derive(Debug, Clone)]
pub struct DataData {
    /// Stable node id (qualified by scope path)
    pub id: String,

    /// One value per logical iteration
    pub values: Vec<String>,

    pub required: bool,

    /// Member of a stub family
    pub stub: bool,
    pub stub_extension: Option<String>,

    /// Deleted once its last consumer has run
    pub intermediate: bool,
    pub delete_after_task: Option<String>,

    pub is_parent: bool,
    pub is_child: bool,
    pub parent: Option<String>,
    /// Per-division replica node ids
    pub children: Vec<String>,

    /// Disambiguating suffix applied to this node's values
    pub division_text: Option<String>,

    /// Declared configuration node ids that resolve to this node
    pub config_node_ids: Vec<String>,
}

impl DataData {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: Vec::new(),
            required: false,
            stub: false,
            stub_extension: None,
            intermediate: false,
            delete_after_task: None,
            is_parent: false,
            is_child: false,
            parent: None,
            children: Vec::new(),
            division_text: None,
            config_node_ids: Vec::new(),
        }
    }
}

/// Node payload, one variant per kind
#[derive(Debug, Clone)]
pub enum NodeData {
    Task(TaskData),
    File(DataData),
    Option(DataData),
}

impl NodeData {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Task(_) => NodeKind::Task,
            Self::File(_) => NodeKind::File,
            Self::Option(_) => NodeKind::Option,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Task(t) => &t.id,
            Self::File(d) | Self::Option(d) => &d.id,
        }
    }

    pub fn as_task(&self) -> Option<&TaskData> {
        match self {
            Self::Task(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_task_mut(&mut self) -> Option<&mut TaskData> {
        match self {
            Self::Task(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&DataData> {
        match self {
            Self::File(d) | Self::Option(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_data_mut(&mut self) -> Option<&mut DataData> {
        match self {
            Self::File(d) | Self::Option(d) => Some(d),
            _ => None,
        }
    }
}

/// Edge payload: the argument binding a data node to a task
#[derive(Debug, Clone, Default)]
pub struct EdgeData {
    /// Long form of the argument (canonical)
    pub long_form: String,
    pub short_form: Option<String>,

    pub is_input: bool,
    pub is_output: bool,

    pub stub: bool,
    pub stub_extension: Option<String>,
    /// Exactly one edge per stub family and task carries this
    pub primary_stub: bool,

    /// Override for the text placed on the command line
    pub command_line_argument: Option<String>,

    /// Stream overrides from the tool's argument table
    pub input_stream: Option<StreamInstructions>,
    pub output_stream: Option<StreamInstructions>,

    /// Set once the stream validator has paired producer and consumer
    pub is_stream: bool,

    pub is_greedy: bool,

    pub construction: Option<ConstructionRule>,

    pub allow_multiple: bool,
}

/// The pipeline graph: petgraph storage plus an id index
#[derive(Debug, Default)]
pub struct PipelineGraph {
    graph: DiGraph<NodeData, EdgeData>,
    ids: HashMap<String, NodeIndex>,
}

impl PipelineGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; idempotent on id (an existing node is returned untouched)
    pub fn add_node(&mut self, data: NodeData) -> NodeIndex {
        if let Some(&ix) = self.ids.get(data.id()) {
            return ix;
        }
        let id = data.id().to_string();
        let ix = self.graph.add_node(data);
        self.ids.insert(id, ix);
        ix
    }

    /// Add an edge; parallel edges between the same endpoints are permitted
    pub fn add_edge(&mut self, from: NodeIndex, to: NodeIndex, data: EdgeData) -> EdgeIndex {
        self.graph.add_edge(from, to, data)
    }

    pub fn index(&self, id: &str) -> Option<NodeIndex> {
        self.ids.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    pub fn node(&self, ix: NodeIndex) -> &NodeData {
        &self.graph[ix]
    }

    pub fn node_mut(&mut self, ix: NodeIndex) -> &mut NodeData {
        &mut self.graph[ix]
    }

    pub fn id(&self, ix: NodeIndex) -> &str {
        self.graph[ix].id()
    }

    /// Task payload; callers must pass a task node index
    pub fn task(&self, ix: NodeIndex) -> &TaskData {
        match &self.graph[ix] {
            NodeData::Task(t) => t,
            other => panic!("node '{}' is not a task", other.id()),
        }
    }

    /// Mutable task payload; callers must pass a task node index
    pub fn task_mut(&mut self, ix: NodeIndex) -> &mut TaskData {
        match &mut self.graph[ix] {
            NodeData::Task(t) => t,
            other => panic!("node '{}' is not a task", other.id()),
        }
    }

    /// Data payload; callers must pass a file or option node index
    pub fn data(&self, ix: NodeIndex) -> &DataData {
        match &self.graph[ix] {
            NodeData::File(d) | NodeData::Option(d) => d,
            other => panic!("node '{}' is not a data node", other.id()),
        }
    }

    /// Mutable data payload; callers must pass a file or option node index
    pub fn data_mut(&mut self, ix: NodeIndex) -> &mut DataData {
        match &mut self.graph[ix] {
            NodeData::File(d) | NodeData::Option(d) => d,
            other => panic!("node '{}' is not a data node", other.id()),
        }
    }

    pub fn edge(&self, ix: EdgeIndex) -> &EdgeData {
        &self.graph[ix]
    }

    pub fn edge_mut(&mut self, ix: EdgeIndex) -> &mut EdgeData {
        &mut self.graph[ix]
    }

    pub fn edge_endpoints(&self, ix: EdgeIndex) -> (NodeIndex, NodeIndex) {
        self.graph
            .edge_endpoints(ix)
            .expect("edge index out of bounds")
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// All node indices of the given kind, in insertion order
    pub fn nodes_of_kind(&self, kind: NodeKind) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&ix| self.graph[ix].kind() == kind)
            .collect()
    }

    /// All task node indices, in insertion order
    pub fn task_nodes(&self) -> Vec<NodeIndex> {
        self.nodes_of_kind(NodeKind::Task)
    }

    /// All data node indices (files and options), in insertion order
    pub fn data_nodes(&self) -> Vec<NodeIndex> {
        self.graph
            .node_indices()
            .filter(|&ix| self.graph[ix].kind() != NodeKind::Task)
            .collect()
    }

    pub fn predecessors(&self, ix: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(ix, Direction::Incoming)
            .collect()
    }

    pub fn successors(&self, ix: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .neighbors_directed(ix, Direction::Outgoing)
            .collect()
    }

    /// Incoming edges as (source, edge) pairs, in insertion order
    pub fn in_edges(&self, ix: NodeIndex) -> Vec<(NodeIndex, EdgeIndex)> {
        use petgraph::visit::EdgeRef;
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(ix, Direction::Incoming)
            .map(|e| (e.source(), e.id()))
            .collect();
        edges.reverse();
        edges
    }

    /// Outgoing edges as (target, edge) pairs, in insertion order
    pub fn out_edges(&self, ix: NodeIndex) -> Vec<(NodeIndex, EdgeIndex)> {
        use petgraph::visit::EdgeRef;
        let mut edges: Vec<_> = self
            .graph
            .edges_directed(ix, Direction::Outgoing)
            .map(|e| (e.target(), e.id()))
            .collect();
        edges.reverse();
        edges
    }

    /// Edge indices between two specific endpoints
    pub fn edges_between(&self, from: NodeIndex, to: NodeIndex) -> Vec<EdgeIndex> {
        use petgraph::visit::EdgeRef;
        self.graph
            .edges_connecting(from, to)
            .map(|e| e.id())
            .collect()
    }

    /// Tasks one hop upstream, reached through data nodes
    pub fn task_predecessors(&self, task: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        for data in self.predecessors(task) {
            for pred in self.predecessors(data) {
                if self.graph[pred].kind() == NodeKind::Task && !out.contains(&pred) {
                    out.push(pred);
                }
            }
        }
        out
    }

    /// Tasks one hop downstream, reached through data nodes
    pub fn task_successors(&self, task: NodeIndex) -> Vec<NodeIndex> {
        let mut out = Vec::new();
        for data in self.successors(task) {
            for succ in self.successors(data) {
                if self.graph[succ].kind() == NodeKind::Task && !out.contains(&succ) {
                    out.push(succ);
                }
            }
        }
        out
    }
}
