// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Division and consolidation
//!
//! A task divides when an option argument supplies more values than the
//! task has executions: the task is cloned once per extra value and its
//! outputs fan out into parent/child data-node families, each tagged with a
//! suffix derived from the forcing value. Downstream tasks consuming a
//! divided output inherit the fan-out; a task declared as a consolidation
//! point collapses it again, consuming every division's output in one
//! execution.
//!
//! Tasks are processed in workflow order so that upstream fan-outs are in
//! place before their consumers are examined. For each task the planned
//! clones, edges, and value updates are collected first and committed in
//! one step.

use petgraph::graph::{EdgeIndex, NodeIndex};
use tracing::debug;

use crate::config::ToolRegistry;
use crate::errors::{FlowmakeError, FlowmakeResult};
use crate::graph::{NodeData, NodeKind, PipelineGraph};
use crate::resolve::filename::{construct_for_edge, insert_suffix, remove_suffix};
use crate::resolve::workflow::Workflow;

/// Apply divisions and consolidations to every task, in workflow order
pub fn apply_divisions(
    graph: &mut PipelineGraph,
    tools: &ToolRegistry,
    workflow: &Workflow,
    run_tag: &str,
) -> FlowmakeResult<()> {
    for &task in &workflow.order {
        process_task(graph, tools, task, run_tag)?;
    }
    Ok(())
}

/// Sanitized suffix derived from a forcing value ("chr1" → "_chr1")
pub fn division_text(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|c| match c {
            '/' | ':' => '-',
            c if c.is_whitespace() => '-',
            c => c,
        })
        .collect();
    format!("_{}", sanitized)
}

fn process_task(
    graph: &mut PipelineGraph,
    tools: &ToolRegistry,
    task: NodeIndex,
    run_tag: &str,
) -> FlowmakeResult<()> {
    let subphases = compute_subphases(graph, task)?;
    graph.task_mut(task).subphases = subphases;

    let forcing = find_forcing_argument(graph, task, subphases)?;
    let inherited = find_inherited_parents(graph, task)?;

    let task_id = graph.task(task).id.clone();

    if graph.task(task).consolidate {
        if forcing.is_some() {
            return Err(FlowmakeError::division(
                &task_id,
                "a consolidation point cannot itself be forced to divide",
            ));
        }
        if inherited.is_empty() {
            return Err(FlowmakeError::division(
                &task_id,
                "declared as a consolidation point but no divided input reaches it",
            ));
        }
        consolidate(graph, tools, task, &inherited)
    } else if let Some((node, edge, count)) = forcing {
        if !inherited.is_empty() {
            // Dividing a task that already sits inside an upstream division
            // is not a documented combination.
            return Err(FlowmakeError::division(
                &task_id,
                "task both inherits a division and is forced to divide",
            ));
        }
        divide(graph, tools, task, node, edge, count, subphases, run_tag)
    } else if !inherited.is_empty() {
        inherit(graph, tools, task, &inherited, subphases)
    } else {
        construct_plain_outputs(graph, tools, task, subphases)
    }
}

/// Subphase count from non-greedy multi-valued file inputs. Conflicting
/// multiplicities among them are fatal.
fn compute_subphases(graph: &PipelineGraph, task: NodeIndex) -> FlowmakeResult<usize> {
    let mut count: Option<usize> = None;

    for (node, edge_ix) in graph.in_edges(task) {
        let edge = graph.edge(edge_ix);
        if !edge.is_input || edge.is_greedy {
            continue;
        }
        if graph.node(node).kind() != NodeKind::File {
            continue;
        }
        let data = graph.data(node);
        if data.is_parent || data.is_child {
            continue;
        }
        if data.values.len() > 1 {
            match count {
                None => count = Some(data.values.len()),
                Some(existing) if existing == data.values.len() => {}
                Some(existing) => {
                    return Err(FlowmakeError::division(
                        &graph.task(task).id,
                        format!(
                            "inputs disagree on multiplicity ({} vs {} values)",
                            existing,
                            data.values.len()
                        ),
                    ));
                }
            }
        }
    }

    Ok(count.unwrap_or(1))
}

/// The option argument forcing this task to divide, if any. At most one
/// argument may force division.
fn find_forcing_argument(
    graph: &PipelineGraph,
    task: NodeIndex,
    subphases: usize,
) -> FlowmakeResult<Option<(NodeIndex, EdgeIndex, usize)>> {
    let mut forcing: Option<(NodeIndex, EdgeIndex, usize)> = None;

    for (node, edge_ix) in graph.in_edges(task) {
        let edge = graph.edge(edge_ix);
        if !edge.is_input || graph.node(node).kind() != NodeKind::Option {
            continue;
        }
        let data = graph.data(node);
        let count = data.values.len();
        if count <= 1 {
            continue;
        }
        // Repeatable arguments carry all values on every execution;
        // per-subphase counts are absorbed without dividing.
        if edge.allow_multiple || count == subphases {
            continue;
        }
        if data.is_parent || data.is_child {
            return Err(FlowmakeError::division(
                &graph.task(task).id,
                format!("division-forcing argument '{}' is already divided", edge.long_form),
            ));
        }
        if let Some((_, prior_edge, _)) = forcing {
            return Err(FlowmakeError::division(
                &graph.task(task).id,
                format!(
                    "arguments '{}' and '{}' both force division",
                    graph.edge(prior_edge).long_form,
                    edge.long_form
                ),
            ));
        }
        forcing = Some((node, edge_ix, count));
    }

    Ok(forcing)
}

/// Predecessor data nodes that are division parents. All must agree on the
/// division count.
fn find_inherited_parents(
    graph: &PipelineGraph,
    task: NodeIndex,
) -> FlowmakeResult<Vec<(NodeIndex, EdgeIndex)>> {
    let mut inherited = Vec::new();
    let mut children_count: Option<usize> = None;

    for (node, edge_ix) in graph.in_edges(task) {
        if !graph.edge(edge_ix).is_input {
            continue;
        }
        if graph.node(node).kind() == NodeKind::Task {
            continue;
        }
        let data = graph.data(node);
        if !data.is_parent {
            continue;
        }
        match children_count {
            None => children_count = Some(data.children.len()),
            Some(existing) if existing == data.children.len() => {}
            Some(existing) => {
                return Err(FlowmakeError::division(
                    &graph.task(task).id,
                    format!(
                        "divided inputs disagree on division count ({} vs {})",
                        existing + 1,
                        data.children.len() + 1
                    ),
                ));
            }
        }
        inherited.push((node, edge_ix));
    }

    Ok(inherited)
}

/// Clone a task for division `index`, copying predecessor edges. Edges from
/// `rewire` sources are replaced by their per-division child.
fn clone_task(
    graph: &mut PipelineGraph,
    task: NodeIndex,
    index: usize,
    rewire: &[(NodeIndex, NodeIndex)],
) -> NodeIndex {
    let parent = graph.task(task).clone();
    let clone_id = format!("{}.{}", parent.id, index);

    let mut data = parent.clone();
    data.id = clone_id.clone();
    data.is_parent = false;
    data.is_child = true;
    data.parent = Some(parent.id.clone());
    data.children = Vec::new();
    data.divisions = 1;
    data.division_index = index;
    let clone = graph.add_node(NodeData::Task(data));

    for (source, edge_ix) in graph.in_edges(task) {
        let edge = graph.edge(edge_ix).clone();
        let source = rewire
            .iter()
            .find(|(from, _)| *from == source)
            .map(|(_, to)| *to)
            .unwrap_or(source);
        graph.add_edge(source, clone, edge);
    }

    clone
}

/// Fan one output node out into per-division children fed by the task
/// clones. `values` holds one value set per division; `texts` the matching
/// division suffixes.
fn fan_out_output(
    graph: &mut PipelineGraph,
    output: NodeIndex,
    edge_ix: EdgeIndex,
    clones: &[NodeIndex],
    values: &[Vec<String>],
    texts: &[String],
) {
    let output_id = graph.data(output).id.clone();
    let edge = graph.edge(edge_ix).clone();

    let mut child_ids = Vec::new();
    for (k, &clone) in clones.iter().enumerate() {
        let division = k + 1;
        let mut data = graph.data(output).clone();
        data.id = format!("{}.{}", output_id, division);
        data.is_parent = false;
        data.is_child = true;
        data.parent = Some(output_id.clone());
        data.children = Vec::new();
        data.values = values[division].clone();
        data.division_text = Some(texts[division].clone());

        let child = graph.add_node(match graph.node(output).kind() {
            NodeKind::Option => NodeData::Option(data),
            _ => NodeData::File(data),
        });
        graph.add_edge(clone, child, edge.clone());
        child_ids.push(graph.data(child).id.clone());
    }

    let parent = graph.data_mut(output);
    parent.values = values[0].clone();
    parent.division_text = Some(texts[0].clone());
    parent.is_parent = true;
    parent.children = child_ids;
}

/// Division point: clone the task per forcing value and fan its outputs out
#[allow(clippy::too_many_arguments)]
fn divide(
    graph: &mut PipelineGraph,
    tools: &ToolRegistry,
    task: NodeIndex,
    forcing_node: NodeIndex,
    forcing_edge: EdgeIndex,
    divisions: usize,
    subphases: usize,
    run_tag: &str,
) -> FlowmakeResult<()> {
    let task_id = graph.task(task).id.clone();
    let forcing_argument = graph.edge(forcing_edge).long_form.clone();
    let texts: Vec<String> = graph
        .data(forcing_node)
        .values
        .iter()
        .map(|v| division_text(v))
        .collect();

    debug!(task = %task_id, divisions, argument = %forcing_argument, "division point");

    let clones: Vec<NodeIndex> = (1..divisions)
        .map(|k| clone_task(graph, task, k, &[]))
        .collect();

    {
        let data = graph.task_mut(task);
        data.divisions = divisions;
        data.division_argument = Some(forcing_argument.clone());
        data.is_parent = true;
        data.children = (1..divisions).map(|k| format!("{}.{}", task_id, k)).collect();
    }
    for &clone in &clones {
        graph.task_mut(clone).division_argument = Some(forcing_argument.clone());
    }

    // Construct (or take) one base value set, then suffix it per division.
    // Intermediate outputs additionally carry the run-unique tag; the full
    // applied suffix is stored as the division text so consolidation can
    // strip it again.
    for (output, edge_ix) in graph.out_edges(task) {
        if graph.node(output).kind() == NodeKind::Task {
            continue;
        }
        let base = if graph.data(output).values.is_empty() {
            construct_for_edge(graph, tools, task, edge_ix, output, subphases)?
        } else {
            graph.data(output).values.clone()
        };

        let intermediate = graph.data(output).intermediate;
        let suffixes: Vec<String> = texts
            .iter()
            .map(|text| {
                if intermediate {
                    format!("{}_{}", text, run_tag)
                } else {
                    text.clone()
                }
            })
            .collect();
        let per_division: Vec<Vec<String>> = suffixes
            .iter()
            .map(|suffix| base.iter().map(|v| insert_suffix(v, suffix)).collect())
            .collect();

        fan_out_output(graph, output, edge_ix, &clones, &per_division, &suffixes);
    }

    Ok(())
}

/// A task inside an upstream division: clone it per division, rewiring each
/// clone to the matching input children, and fan its outputs out the same
/// way
fn inherit(
    graph: &mut PipelineGraph,
    tools: &ToolRegistry,
    task: NodeIndex,
    inherited: &[(NodeIndex, EdgeIndex)],
    subphases: usize,
) -> FlowmakeResult<()> {
    let task_id = graph.task(task).id.clone();
    let divisions = graph.data(inherited[0].0).children.len() + 1;

    debug!(task = %task_id, divisions, "inherits division");

    // Texts come from the divided input family.
    let input_parent = inherited[0].0;
    let mut texts = vec![graph
        .data(input_parent)
        .division_text
        .clone()
        .unwrap_or_default()];
    for child_id in graph.data(input_parent).children.clone() {
        let child = graph.index(&child_id).ok_or_else(|| {
            FlowmakeError::division(&task_id, format!("missing division child '{}'", child_id))
        })?;
        texts.push(graph.data(child).division_text.clone().unwrap_or_default());
    }

    // Per-clone rewiring: every divided input parent is replaced by its
    // k-th child.
    let clones: Vec<NodeIndex> = (1..divisions)
        .map(|k| {
            let mut rewire = Vec::new();
            for &(parent, _) in inherited {
                let child_id = graph.data(parent).children[k - 1].clone();
                let child = graph.index(&child_id).ok_or_else(|| {
                    FlowmakeError::division(
                        &task_id,
                        format!("missing division child '{}'", child_id),
                    )
                })?;
                rewire.push((parent, child));
            }
            Ok(clone_task(graph, task, k, &rewire))
        })
        .collect::<FlowmakeResult<_>>()?;

    {
        let data = graph.task_mut(task);
        data.divisions = divisions;
        data.is_parent = true;
        data.children = (1..divisions).map(|k| format!("{}.{}", task_id, k)).collect();
    }

    // Outputs: each division's values derive from that division's own
    // inputs, so the suffix arrives through construction.
    for (output, edge_ix) in graph.out_edges(task) {
        if graph.node(output).kind() == NodeKind::Task {
            continue;
        }

        let explicit = graph.data(output).values.clone();
        let mut per_division: Vec<Vec<String>> = Vec::with_capacity(divisions);

        if explicit.is_empty() {
            per_division.push(construct_for_edge(graph, tools, task, edge_ix, output, subphases)?);
        } else {
            per_division.push(explicit.clone());
        }

        for (k, &clone) in clones.iter().enumerate() {
            if explicit.is_empty() {
                // The clone has no output edge yet; evaluate the rule
                // against the clone's rewired inputs.
                let values = construct_clone_output(graph, tools, clone, edge_ix, output, subphases)?;
                per_division.push(values);
            } else {
                per_division.push(
                    explicit
                        .iter()
                        .map(|v| insert_suffix(v, &texts[k + 1]))
                        .collect(),
                );
            }
        }

        fan_out_output(graph, output, edge_ix, &clones, &per_division, &texts);
    }

    Ok(())
}

/// Evaluate an output construction rule in the context of a task clone.
/// The clone's output edge does not exist yet, so the parent's edge payload
/// supplies the rule while the clone supplies the (rewired) input values.
fn construct_clone_output(
    graph: &PipelineGraph,
    tools: &ToolRegistry,
    clone: NodeIndex,
    template_edge: EdgeIndex,
    template_output: NodeIndex,
    subphases: usize,
) -> FlowmakeResult<Vec<String>> {
    let edge = graph.edge(template_edge).clone();
    crate::resolve::filename::construct_with_rule(
        graph,
        tools,
        clone,
        &edge,
        template_output,
        subphases,
    )
}

/// Consolidation point: collapse upstream divisions into one execution
fn consolidate(
    graph: &mut PipelineGraph,
    tools: &ToolRegistry,
    task: NodeIndex,
    inherited: &[(NodeIndex, EdgeIndex)],
) -> FlowmakeResult<()> {
    let task_id = graph.task(task).id.clone();

    debug!(task = %task_id, inputs = inherited.len(), "consolidation point");

    // Wire every division child of every divided input to this task.
    for &(parent, edge_ix) in inherited {
        let edge = graph.edge(edge_ix).clone();
        for child_id in graph.data(parent).children.clone() {
            let child = graph.index(&child_id).ok_or_else(|| {
                FlowmakeError::division(&task_id, format!("missing division child '{}'", child_id))
            })?;
            graph.add_edge(child, task, edge.clone());
        }
    }

    graph.task_mut(task).divisions = 1;
    graph.task_mut(task).subphases = 1;

    // Outputs are constructed from the un-suffixed base values: strip the
    // division texts (and the intermediate run tag) the fan-out inserted.
    let mut strip: Vec<String> = Vec::new();
    for &(parent, _) in inherited {
        let data = graph.data(parent);
        if let Some(ref text) = data.division_text {
            let suffix = text.clone();
            strip.push(suffix);
        }
    }

    for (output, edge_ix) in graph.out_edges(task) {
        if graph.node(output).kind() == NodeKind::Task {
            continue;
        }
        if !graph.data(output).values.is_empty() {
            continue;
        }
        let constructed = construct_for_edge(graph, tools, task, edge_ix, output, 1)?;
        let cleaned: Vec<String> = constructed
            .iter()
            .map(|v| {
                let mut value = v.clone();
                for suffix in &strip {
                    value = remove_suffix(&value, suffix);
                }
                value
            })
            .collect();
        graph.data_mut(output).values = cleaned;
    }

    Ok(())
}

/// No division, no consolidation: construct any still-unset outputs
fn construct_plain_outputs(
    graph: &mut PipelineGraph,
    tools: &ToolRegistry,
    task: NodeIndex,
    subphases: usize,
) -> FlowmakeResult<()> {
    for (output, edge_ix) in graph.out_edges(task) {
        if graph.node(output).kind() == NodeKind::Task {
            continue;
        }
        if !graph.data(output).values.is_empty() {
            continue;
        }
        let values = construct_for_edge(graph, tools, task, edge_ix, output, subphases)?;
        graph.data_mut(output).values = values;
    }
    Ok(())
}
