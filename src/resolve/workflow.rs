// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Workflow ordering
//!
//! Computes a deterministic, dependency-respecting execution order over the
//! task nodes. Tasks are first assigned to tiers (a task's tier is one more
//! than the highest tier among its predecessors; a pass that assigns
//! nothing while tasks remain pending is a cycle). The workflow is then
//! grown greedily: after each placed task, the next pick prefers its
//! streaming consumer (streamed pairs must stay contiguous), then its
//! successors with the fewest remaining successors — branches that
//! terminate are scheduled before branches that continue.

use std::collections::{HashMap, HashSet};

use petgraph::graph::NodeIndex;
use tracing::debug;

use crate::errors::{FlowmakeError, FlowmakeResult};
use crate::graph::PipelineGraph;

/// The resolved task execution order
#[derive(Debug)]
pub struct Workflow {
    /// Task node indices in execution order
    pub order: Vec<NodeIndex>,

    /// Tier of each task (1 = no predecessors)
    pub tiers: HashMap<NodeIndex, usize>,

    positions: HashMap<String, usize>,
}

impl Workflow {
    /// Position of a task in the order. Division children share their
    /// parent's position.
    pub fn position(&self, graph: &PipelineGraph, task: NodeIndex) -> Option<usize> {
        let data = graph.task(task);
        if let Some(ref parent) = data.parent {
            return self.positions.get(parent).copied();
        }
        self.positions.get(&data.id).copied()
    }

    /// Ordered task ids
    pub fn task_ids(&self, graph: &PipelineGraph) -> Vec<String> {
        self.order.iter().map(|&t| graph.id(t).to_string()).collect()
    }

    /// Text rendering of the execution order with per-task dependencies
    pub fn to_text(&self, graph: &PipelineGraph) -> String {
        let mut out = String::new();
        for (i, &task) in self.order.iter().enumerate() {
            let data = graph.task(task);
            let deps: Vec<_> = graph
                .task_predecessors(task)
                .into_iter()
                .map(|p| graph.id(p).to_string())
                .collect();

            out.push_str(&format!("{}. {} ({})", i + 1, data.id, data.tool));
            if !deps.is_empty() {
                out.push_str(&format!(" [depends: {}]", deps.join(", ")));
            }
            out.push('\n');
        }
        out
    }

    /// Mermaid diagram of the task graph
    pub fn to_mermaid(&self, graph: &PipelineGraph) -> String {
        let mut out = String::from("graph TD\n");
        for &task in &self.order {
            out.push_str(&format!("    {}[{}]\n", graph.id(task), graph.id(task)));
        }
        for &task in &self.order {
            for succ in graph.task_successors(task) {
                out.push_str(&format!("    {} --> {}\n", graph.id(task), graph.id(succ)));
            }
        }
        out
    }

    /// DOT diagram of the task graph
    pub fn to_dot(&self, graph: &PipelineGraph) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for &task in &self.order {
            let succs = graph.task_successors(task);
            if succs.is_empty() && graph.task_predecessors(task).is_empty() {
                out.push_str(&format!("    \"{}\";\n", graph.id(task)));
            }
            for succ in succs {
                out.push_str(&format!(
                    "    \"{}\" -> \"{}\";\n",
                    graph.id(task),
                    graph.id(succ)
                ));
            }
        }

        out.push_str("}\n");
        out
    }
}

/// Order all task nodes of the graph
pub fn order_workflow(graph: &PipelineGraph) -> FlowmakeResult<Workflow> {
    let mut tasks = graph.task_nodes();
    tasks.sort_by(|&a, &b| graph.id(a).cmp(graph.id(b)));

    let preds: HashMap<NodeIndex, Vec<NodeIndex>> = tasks
        .iter()
        .map(|&t| (t, graph.task_predecessors(t)))
        .collect();
    let succs: HashMap<NodeIndex, Vec<NodeIndex>> = tasks
        .iter()
        .map(|&t| (t, graph.task_successors(t)))
        .collect();

    let tiers = assign_tiers(graph, &tasks, &preds)?;
    let order = place(graph, &tasks, &preds, &succs, &tiers)?;

    debug!(tasks = order.len(), "workflow ordered");

    let positions = order
        .iter()
        .enumerate()
        .map(|(i, &t)| (graph.id(t).to_string(), i))
        .collect();

    Ok(Workflow {
        order,
        tiers,
        positions,
    })
}

fn assign_tiers(
    graph: &PipelineGraph,
    tasks: &[NodeIndex],
    preds: &HashMap<NodeIndex, Vec<NodeIndex>>,
) -> FlowmakeResult<HashMap<NodeIndex, usize>> {
    let mut tiers: HashMap<NodeIndex, usize> = HashMap::new();

    for &task in tasks {
        if preds[&task].is_empty() {
            tiers.insert(task, 1);
        }
    }

    while tiers.len() < tasks.len() {
        let mut progressed = false;

        for &task in tasks {
            if tiers.contains_key(&task) {
                continue;
            }
            let task_preds = &preds[&task];
            if task_preds.iter().all(|p| tiers.contains_key(p)) {
                let tier = task_preds.iter().map(|p| tiers[p]).max().unwrap_or(0) + 1;
                tiers.insert(task, tier);
                progressed = true;
            }
        }

        if !progressed {
            let mut pending: Vec<String> = tasks
                .iter()
                .filter(|t| !tiers.contains_key(t))
                .map(|&t| graph.id(t).to_string())
                .collect();
            pending.sort();
            return Err(FlowmakeError::Workflow { pending });
        }
    }

    Ok(tiers)
}

fn place(
    graph: &PipelineGraph,
    tasks: &[NodeIndex],
    preds: &HashMap<NodeIndex, Vec<NodeIndex>>,
    succs: &HashMap<NodeIndex, Vec<NodeIndex>>,
    tiers: &HashMap<NodeIndex, usize>,
) -> FlowmakeResult<Vec<NodeIndex>> {
    let mut order: Vec<NodeIndex> = Vec::with_capacity(tasks.len());
    let mut placed: HashSet<NodeIndex> = HashSet::new();

    while order.len() < tasks.len() {
        let candidates: Vec<NodeIndex> = tasks
            .iter()
            .copied()
            .filter(|t| !placed.contains(t) && preds[t].iter().all(|p| placed.contains(p)))
            .collect();

        if candidates.is_empty() {
            let mut pending: Vec<String> = tasks
                .iter()
                .filter(|t| !placed.contains(t))
                .map(|&t| graph.id(t).to_string())
                .collect();
            pending.sort();
            return Err(FlowmakeError::Workflow { pending });
        }

        let pick = choose(graph, &order, &candidates, succs, tiers, &placed);
        placed.insert(pick);
        order.push(pick);
    }

    Ok(order)
}

fn choose(
    graph: &PipelineGraph,
    order: &[NodeIndex],
    candidates: &[NodeIndex],
    succs: &HashMap<NodeIndex, Vec<NodeIndex>>,
    tiers: &HashMap<NodeIndex, usize>,
    placed: &HashSet<NodeIndex>,
) -> NodeIndex {
    let remaining =
        |t: NodeIndex| succs[&t].iter().filter(|s| !placed.contains(s)).count();

    if let Some(&last) = order.last() {
        let last_succs = &succs[&last];

        // A streaming producer's consumer must come immediately after it.
        if graph.task(last).is_output_stream {
            if let Some(consumer) = candidates
                .iter()
                .copied()
                .find(|c| last_succs.contains(c) && graph.task(*c).is_input_stream)
            {
                return consumer;
            }
        }

        // Extend from the last placed task: terminating branches first.
        if let Some(next) = candidates
            .iter()
            .copied()
            .filter(|c| last_succs.contains(c))
            .min_by_key(|&c| (remaining(c), graph.id(c).to_string()))
        {
            return next;
        }
    }

    candidates
        .iter()
        .copied()
        .min_by_key(|&c| (tiers[&c], remaining(c), graph.id(c).to_string()))
        .expect("candidates checked non-empty")
}
