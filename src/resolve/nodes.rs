// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Node resolution
//!
//! Turns the declarative unique/shared node declarations of a pipeline
//! scope tree into canonical graph nodes and edges. Shared declarations are
//! expanded breadth-first until only concrete task/argument references
//! remain, then classified by their stub content; unique declarations not
//! swallowed by a shared group are attached afterwards. Every declared node
//! id is recorded against the graph node(s) it resolved to, so later passes
//! can apply values and deletion directives by declared id.

use std::collections::{HashMap, HashSet, VecDeque};

use tracing::debug;

use crate::config::{
    resolve_node_address, ArgumentDefinition, DeclRef, NodeAddress, NodeTarget, PipelineScope,
    TaskDefinition, ToolRegistry,
};
use crate::errors::{FlowmakeError, FlowmakeResult};
use crate::graph::{DataData, EdgeData, NodeData, PipelineGraph, TaskData};
use petgraph::graph::NodeIndex;

/// Result of node resolution: the populated graph plus the mapping from
/// declared configuration node ids to graph nodes (many-to-one for shared
/// declarations, one-to-many for stub families)
pub struct NodeResolution {
    pub graph: PipelineGraph,
    pub node_map: HashMap<String, Vec<NodeIndex>>,
}

/// A fully expanded reference: one task/argument pair in one scope
#[derive(Debug, Clone)]
struct ConcreteRef {
    scope_path: Vec<String>,
    task: String,
    argument: String,
    stub_extension: Option<String>,
}

/// Build graph nodes and edges from the scope tree
pub fn resolve_nodes(
    root: &PipelineScope,
    tools: &ToolRegistry,
) -> FlowmakeResult<NodeResolution> {
    let mut graph = PipelineGraph::new();
    let mut node_map: HashMap<String, Vec<NodeIndex>> = HashMap::new();

    create_task_nodes(root, tools, &mut graph)?;

    // Shared declarations first: their expansion may swallow unique
    // declarations, which are then considered resolved.
    for scope in root.scopes() {
        for decl_id in scope
            .definition
            .shared_nodes
            .iter()
            .map(|d| d.id.clone())
            .collect::<Vec<_>>()
        {
            resolve_shared(root, scope, &decl_id, tools, &mut graph, &mut node_map)?;
        }
    }

    // Remaining unique declarations.
    for scope in root.scopes() {
        for decl in &scope.definition.unique_nodes {
            let qualified = scope.qualify(&decl.id);
            if node_map.contains_key(&qualified) {
                continue;
            }
            resolve_unique(root, scope, decl.id.as_str(), tools, &mut graph, &mut node_map)?;
        }
    }

    let planned_values = graph_values_plan(root, &node_map, &graph)?;
    apply_values(&planned_values, &mut graph);
    apply_deletions(root, &node_map, &mut graph)?;

    debug!(
        nodes = graph.node_count(),
        edges = graph.edge_count(),
        "node resolution complete"
    );

    Ok(NodeResolution { graph, node_map })
}

fn create_task_nodes(
    root: &PipelineScope,
    tools: &ToolRegistry,
    graph: &mut PipelineGraph,
) -> FlowmakeResult<()> {
    for scope in root.scopes() {
        for task in &scope.definition.tasks {
            let tool = tools.require(&task.tool, &task.name)?;
            if let Some(ref greedy) = task.greedy_argument {
                if tool.argument(greedy).is_none() {
                    return Err(FlowmakeError::unknown_argument(
                        &tool.name,
                        &task.name,
                        greedy,
                        &tool.argument_names(),
                    ));
                }
            }

            let mut data = TaskData::new(scope.qualify(&task.name), &task.tool);
            data.greedy_argument = task.greedy_argument.clone();
            data.consolidate = task.consolidate;
            data.is_input_stream = task.input_stream;
            data.is_output_stream = task.output_stream;
            graph.add_node(NodeData::Task(data));
        }
    }
    Ok(())
}

/// Expand a declaration (by id, within its scope) to concrete references.
/// Returns the references and every declared node id visited on the way.
fn expand(
    root: &PipelineScope,
    scope: &PipelineScope,
    decl_id: &str,
) -> FlowmakeResult<(Vec<ConcreteRef>, Vec<String>)> {
    let mut refs = Vec::new();
    let mut visited = Vec::new();
    let mut seen = HashSet::new();
    let mut queue: VecDeque<(Vec<String>, String)> = VecDeque::new();
    queue.push_back((scope.path.clone(), decl_id.to_string()));

    while let Some((path, id)) = queue.pop_front() {
        let owner = root
            .descend(&path)
            .ok_or_else(|| FlowmakeError::ConfigReference {
                reference: id.clone(),
                pipeline: root.definition.name.clone(),
            })?;
        let qualified = owner.qualify(&id);
        if !seen.insert(qualified.clone()) {
            continue;
        }
        visited.push(qualified.clone());

        let decl = owner
            .node_decl(&id)
            .ok_or_else(|| FlowmakeError::ConfigReference {
                reference: qualified.clone(),
                pipeline: owner.definition.name.clone(),
            })?;

        let targets: Vec<NodeTarget> = match decl {
            DeclRef::Unique(u) => vec![u.target.clone()],
            DeclRef::Shared(s) => s.refs.clone(),
        };

        for target in targets {
            match target {
                NodeTarget::TaskArgument {
                    task,
                    argument,
                    stub_extension,
                } => {
                    // The task may live in a nested scope relative to the
                    // declaration's owner.
                    let address = NodeAddress::parse(&task);
                    let (task_scope, task_def) =
                        crate::config::resolve_task_address(root, &owner.path, &address)
                            .ok_or_else(|| FlowmakeError::ConfigReference {
                                reference: task.clone(),
                                pipeline: owner.definition.name.clone(),
                            })?;
                    refs.push(ConcreteRef {
                        scope_path: task_scope.path.clone(),
                        task: task_def.name.clone(),
                        argument,
                        stub_extension,
                    });
                }
                NodeTarget::NestedNode { node } => {
                    let address = NodeAddress::parse(&node);
                    let (target_scope, _) = resolve_node_address(root, &owner.path, &address)
                        .ok_or_else(|| FlowmakeError::ConfigReference {
                            reference: node.clone(),
                            pipeline: owner.definition.name.clone(),
                        })?;
                    queue.push_back((target_scope.path.clone(), address.leaf().to_string()));
                }
            }
        }
    }

    Ok((refs, visited))
}

fn resolve_shared(
    root: &PipelineScope,
    scope: &PipelineScope,
    decl_id: &str,
    tools: &ToolRegistry,
    graph: &mut PipelineGraph,
    node_map: &mut HashMap<String, Vec<NodeIndex>>,
) -> FlowmakeResult<()> {
    let qualified = scope.qualify(decl_id);
    if node_map.contains_key(&qualified) {
        return Ok(());
    }

    let (refs, visited) = expand(root, scope, decl_id)?;
    if refs.is_empty() {
        return Err(FlowmakeError::ConfigReference {
            reference: qualified,
            pipeline: scope.definition.name.clone(),
        });
    }

    // Look up argument metadata for every reference.
    let mut lookups: Vec<(ConcreteRef, TaskDefinition, ArgumentDefinition)> = Vec::new();
    for r in refs {
        let task_scope = root
            .descend(&r.scope_path)
            .ok_or_else(|| FlowmakeError::ConfigReference {
                reference: r.task.clone(),
                pipeline: scope.definition.name.clone(),
            })?;
        let task_def = task_scope
            .task(&r.task)
            .ok_or_else(|| FlowmakeError::ConfigReference {
                reference: r.task.clone(),
                pipeline: task_scope.definition.name.clone(),
            })?
            .clone();
        let arg = tools
            .require_argument(&task_def.tool, &r.task, &r.argument)?
            .clone();
        lookups.push((r, task_def, arg));
    }

    // The chain may include a declaration another group already
    // materialized; attach the references it did not cover to the existing
    // node(s) instead of creating duplicates.
    if let Some(existing) = visited.iter().find_map(|id| node_map.get(id)).cloned() {
        for (r, task_def, arg) in &lookups {
            if arg.stub && existing.len() == arg.stub_extensions.len() {
                for (position, &member) in existing.iter().enumerate() {
                    if !already_wired(graph, member, r, &arg.long_form) {
                        wire(
                            graph,
                            member,
                            r,
                            task_def,
                            arg,
                            Some((arg.stub_extensions[position].clone(), position == 0)),
                            false,
                        )?;
                    }
                }
            } else if !already_wired(graph, existing[0], r, &arg.long_form) {
                wire(graph, existing[0], r, task_def, arg, None, false)?;
            }
        }
        for id in visited {
            node_map.entry(id).or_insert_with(|| existing.clone());
        }
        return Ok(());
    }

    let number_of_refs = lookups.len();
    let number_of_stubs = lookups.iter().filter(|(_, _, a)| a.stub).count();
    let number_of_stub_extensions = lookups
        .iter()
        .filter(|(r, _, _)| r.stub_extension.is_some())
        .count();

    let created: Vec<NodeIndex> = if number_of_stubs == 0 && number_of_stub_extensions == 0 {
        shared_no_stubs(&qualified, &lookups, graph)?
    } else if number_of_stubs == number_of_refs {
        shared_all_stubs(&qualified, &lookups, graph)?
    } else if number_of_stubs > 0 && number_of_stubs == number_of_stub_extensions {
        shared_some_stubs(&qualified, &lookups, graph)?
    } else {
        return Err(FlowmakeError::StubConsistency {
            node: qualified,
            reason: format!(
                "{} of {} references are stubs but only {} designate a stub extension",
                number_of_stubs, number_of_refs, number_of_stub_extensions
            ),
        });
    };

    for id in visited {
        node_map.entry(id).or_insert_with(|| created.clone());
    }

    Ok(())
}

/// All references plain: one node, every task wired to it
fn shared_no_stubs(
    qualified: &str,
    lookups: &[(ConcreteRef, TaskDefinition, ArgumentDefinition)],
    graph: &mut PipelineGraph,
) -> FlowmakeResult<Vec<NodeIndex>> {
    let all_files = lookups.iter().all(|(_, _, a)| a.is_file());
    let all_options = lookups.iter().all(|(_, _, a)| !a.is_file());
    if !all_files && !all_options {
        let (r, task_def, _) = &lookups[0];
        return Err(FlowmakeError::ArgumentMismatch {
            tool: task_def.tool.clone(),
            task: r.task.clone(),
            argument: r.argument.clone(),
            help: Some(format!(
                "Shared node '{}' mixes file and option arguments",
                qualified
            )),
        });
    }

    let mut data = DataData::new(qualified);
    data.required = lookups.iter().any(|(_, _, a)| a.required);
    data.config_node_ids.push(qualified.to_string());
    let node = graph.add_node(if all_files {
        NodeData::File(data)
    } else {
        NodeData::Option(data)
    });

    for (r, task_def, arg) in lookups {
        wire(graph, node, r, task_def, arg, None, false)?;
    }

    Ok(vec![node])
}

/// All references stubs sharing one extension set: one node per extension
fn shared_all_stubs(
    qualified: &str,
    lookups: &[(ConcreteRef, TaskDefinition, ArgumentDefinition)],
    graph: &mut PipelineGraph,
) -> FlowmakeResult<Vec<NodeIndex>> {
    let first_extensions = &lookups[0].2.stub_extensions;
    for (_, _, arg) in lookups {
        if &arg.stub_extensions != first_extensions {
            return Err(FlowmakeError::StubConsistency {
                node: qualified.to_string(),
                reason: format!(
                    "extension sets differ: [{}] vs [{}]",
                    first_extensions.join(", "),
                    arg.stub_extensions.join(", ")
                ),
            });
        }
    }

    let mut members = Vec::new();
    for extension in first_extensions {
        let mut data = DataData::new(format!("{}.{}", qualified, extension));
        data.stub = true;
        data.stub_extension = Some(extension.clone());
        data.required = lookups.iter().any(|(_, _, a)| a.required);
        data.config_node_ids.push(qualified.to_string());
        members.push(graph.add_node(NodeData::File(data)));
    }

    for (r, task_def, arg) in lookups {
        for (position, &member) in members.iter().enumerate() {
            let extension = &first_extensions[position];
            wire(
                graph,
                member,
                r,
                task_def,
                arg,
                Some((extension.clone(), position == 0)),
                false,
            )?;
        }
    }

    Ok(members)
}

/// A mix of stub and plain references: plain references join the node of
/// the stub's designated extension, the remaining extensions get private
/// nodes
fn shared_some_stubs(
    qualified: &str,
    lookups: &[(ConcreteRef, TaskDefinition, ArgumentDefinition)],
    graph: &mut PipelineGraph,
) -> FlowmakeResult<Vec<NodeIndex>> {
    let stub_refs: Vec<_> = lookups.iter().filter(|(_, _, a)| a.stub).collect();
    let plain_refs: Vec<_> = lookups.iter().filter(|(_, _, a)| !a.stub).collect();

    let extensions = &stub_refs[0].2.stub_extensions;
    let designated = stub_refs[0]
        .0
        .stub_extension
        .clone()
        .ok_or_else(|| FlowmakeError::StubConsistency {
            node: qualified.to_string(),
            reason: "stub reference does not designate a shared extension".into(),
        })?;

    for (r, _, arg) in &stub_refs {
        if &arg.stub_extensions != extensions || r.stub_extension.as_deref() != Some(&designated)
        {
            return Err(FlowmakeError::StubConsistency {
                node: qualified.to_string(),
                reason: "stub references disagree on extensions or the shared extension".into(),
            });
        }
    }
    if !extensions.iter().any(|e| e == &designated) {
        return Err(FlowmakeError::StubConsistency {
            node: qualified.to_string(),
            reason: format!(
                "designated extension '{}' is not in the stub's extension set",
                designated
            ),
        });
    }

    let mut members = Vec::new();
    for extension in extensions {
        let mut data = DataData::new(format!("{}.{}", qualified, extension));
        data.stub = true;
        data.stub_extension = Some(extension.clone());
        data.config_node_ids.push(qualified.to_string());
        members.push(graph.add_node(NodeData::File(data)));
    }

    for (r, task_def, arg) in &stub_refs {
        for (position, &member) in members.iter().enumerate() {
            wire(
                graph,
                member,
                r,
                task_def,
                arg,
                Some((extensions[position].clone(), position == 0)),
                false,
            )?;
        }
    }

    let designated_position = extensions.iter().position(|e| e == &designated).unwrap();
    for (r, task_def, arg) in &plain_refs {
        wire(graph, members[designated_position], r, task_def, arg, None, false)?;
    }

    Ok(members)
}

fn resolve_unique(
    root: &PipelineScope,
    scope: &PipelineScope,
    decl_id: &str,
    tools: &ToolRegistry,
    graph: &mut PipelineGraph,
    node_map: &mut HashMap<String, Vec<NodeIndex>>,
) -> FlowmakeResult<()> {
    let qualified = scope.qualify(decl_id);
    let (refs, visited) = expand(root, scope, decl_id)?;

    // A unique declaration expands to exactly one concrete reference
    // (possibly through a chain of nested-pipeline pointers).
    if refs.len() != 1 {
        return Err(FlowmakeError::ConfigReference {
            reference: qualified,
            pipeline: scope.definition.name.clone(),
        });
    }
    let r = &refs[0];

    // The chain may land on a declaration a shared group already resolved.
    if let Some(existing) = visited.iter().find_map(|id| node_map.get(id)).cloned() {
        for id in visited {
            node_map.entry(id).or_insert_with(|| existing.clone());
        }
        return Ok(());
    }

    let task_scope = root.descend(&r.scope_path).unwrap();
    let task_def = task_scope.task(&r.task).unwrap().clone();
    let arg = tools
        .require_argument(&task_def.tool, &r.task, &r.argument)?
        .clone();

    let created: Vec<NodeIndex> = if arg.stub {
        let mut members = Vec::new();
        for (position, extension) in arg.stub_extensions.iter().enumerate() {
            let mut data = DataData::new(format!("{}.{}", qualified, extension));
            data.stub = true;
            data.stub_extension = Some(extension.clone());
            data.required = arg.required;
            data.config_node_ids.push(qualified.clone());
            let member = graph.add_node(NodeData::File(data));
            wire(
                graph,
                member,
                r,
                &task_def,
                &arg,
                Some((extension.clone(), position == 0)),
                false,
            )?;
            members.push(member);
        }
        members
    } else {
        let mut data = DataData::new(qualified.clone());
        data.required = arg.required;
        data.config_node_ids.push(qualified.clone());
        let node = graph.add_node(if arg.is_file() {
            NodeData::File(data)
        } else {
            NodeData::Option(data)
        });
        wire(graph, node, r, &task_def, &arg, None, false)?;
        vec![node]
    };

    for id in visited {
        node_map.entry(id).or_insert_with(|| created.clone());
    }

    Ok(())
}

/// Whether a task already has an edge to the data node under this argument
fn already_wired(
    graph: &PipelineGraph,
    data_node: NodeIndex,
    r: &ConcreteRef,
    long_form: &str,
) -> bool {
    let task_id = if r.scope_path.is_empty() {
        r.task.clone()
    } else {
        format!("{}.{}", r.scope_path.join("."), r.task)
    };
    let Some(task_ix) = graph.index(&task_id) else {
        return false;
    };

    graph
        .edges_between(data_node, task_ix)
        .into_iter()
        .chain(graph.edges_between(task_ix, data_node))
        .any(|e| graph.edge(e).long_form == long_form)
}

/// Create the edge between a data node and the task of a concrete reference
fn wire(
    graph: &mut PipelineGraph,
    data_node: NodeIndex,
    r: &ConcreteRef,
    task_def: &TaskDefinition,
    arg: &ArgumentDefinition,
    stub: Option<(String, bool)>,
    _replacing: bool,
) -> FlowmakeResult<()> {
    use crate::config::ArgumentKind;

    let task_id = if r.scope_path.is_empty() {
        r.task.clone()
    } else {
        format!("{}.{}", r.scope_path.join("."), r.task)
    };
    let task_ix = graph
        .index(&task_id)
        .ok_or_else(|| FlowmakeError::ConfigReference {
            reference: task_id.clone(),
            pipeline: String::new(),
        })?;

    let (stub_extension, primary) = match stub {
        Some((ext, primary)) => (Some(ext), primary),
        None => (None, false),
    };

    let edge = EdgeData {
        long_form: arg.long_form.clone(),
        short_form: arg.short_form.clone(),
        is_input: arg.kind != ArgumentKind::Output,
        is_output: arg.kind == ArgumentKind::Output,
        stub: stub_extension.is_some(),
        stub_extension,
        primary_stub: primary,
        command_line_argument: arg.command_line.clone(),
        input_stream: arg.input_stream.clone(),
        output_stream: arg.output_stream.clone(),
        is_stream: false,
        is_greedy: task_def.greedy_argument.as_deref() == Some(arg.long_form.as_str()),
        construction: arg.construction.clone(),
        allow_multiple: arg.allow_multiple,
    };

    if arg.kind == ArgumentKind::Output {
        graph.add_edge(task_ix, data_node, edge);
    } else {
        graph.add_edge(data_node, task_ix, edge);
    }

    Ok(())
}

/// Planned value application: (node, values) pairs computed read-only
fn graph_values_plan(
    root: &PipelineScope,
    node_map: &HashMap<String, Vec<NodeIndex>>,
    graph: &PipelineGraph,
) -> FlowmakeResult<Vec<(NodeIndex, Vec<String>)>> {
    let mut plan = Vec::new();

    for scope in root.scopes() {
        for assignment in &scope.definition.values {
            let address = NodeAddress::parse(&assignment.node);
            let (owner, _) = resolve_node_address(root, &scope.path, &address).ok_or_else(
                || FlowmakeError::ConfigReference {
                    reference: assignment.node.clone(),
                    pipeline: scope.definition.name.clone(),
                },
            )?;
            let qualified = owner.qualify(address.leaf());
            let nodes =
                node_map
                    .get(&qualified)
                    .ok_or_else(|| FlowmakeError::ConfigReference {
                        reference: assignment.node.clone(),
                        pipeline: scope.definition.name.clone(),
                    })?;

            for &node in nodes {
                let data = graph.data(node);
                let values = if data.stub {
                    let extension = data.stub_extension.as_deref().unwrap_or_default();
                    assignment
                        .values
                        .iter()
                        .map(|v| format!("{}.{}", v, extension))
                        .collect()
                } else {
                    assignment.values.clone()
                };
                plan.push((node, values));
            }
        }
    }

    Ok(plan)
}

fn apply_values(plan: &[(NodeIndex, Vec<String>)], graph: &mut PipelineGraph) {
    for (node, values) in plan {
        graph.data_mut(*node).values = values.clone();
    }
}

fn apply_deletions(
    root: &PipelineScope,
    node_map: &HashMap<String, Vec<NodeIndex>>,
    graph: &mut PipelineGraph,
) -> FlowmakeResult<()> {
    for scope in root.scopes() {
        for reference in &scope.definition.delete_files {
            let address = NodeAddress::parse(reference);
            let (owner, _) = resolve_node_address(root, &scope.path, &address).ok_or_else(
                || FlowmakeError::ConfigReference {
                    reference: reference.clone(),
                    pipeline: scope.definition.name.clone(),
                },
            )?;
            let qualified = owner.qualify(address.leaf());
            let nodes =
                node_map
                    .get(&qualified)
                    .ok_or_else(|| FlowmakeError::ConfigReference {
                        reference: reference.clone(),
                        pipeline: scope.definition.name.clone(),
                    })?;
            for &node in nodes {
                graph.data_mut(node).intermediate = true;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSet, PipelineScope};
    use crate::graph::NodeKind;

    fn resolve(json: &str) -> FlowmakeResult<NodeResolution> {
        let set = ConfigSet::from_json(json)?;
        let root = PipelineScope::instantiate(&set)?;
        let tools = set.registry()?;
        resolve_nodes(&root, &tools)
    }

    fn two_task_project(extra_tool_args: &str, nodes: &str) -> String {
        format!(
            r#"{{
                "tools": [
                    {{
                        "name": "producer",
                        "executable": "produce",
                        "arguments": [
                            {{"long_form": "--in", "kind": "input"}},
                            {{"long_form": "--out", "kind": "output"{}}}
                        ]
                    }},
                    {{
                        "name": "consumer",
                        "executable": "consume",
                        "arguments": [
                            {{"long_form": "--in", "kind": "input"}},
                            {{"long_form": "--flag", "kind": "option"}}
                        ]
                    }}
                ],
                "pipelines": [
                    {{
                        "name": "main",
                        "tasks": [
                            {{"name": "produce", "tool": "producer"}},
                            {{"name": "consume", "tool": "consumer"}}
                        ],
                        {}
                    }}
                ],
                "entry": "main"
            }}"#,
            extra_tool_args, nodes
        )
    }

    #[test]
    fn test_unique_node_attaches_one_edge() {
        let json = two_task_project(
            "",
            r#""unique_nodes": [
                {"id": "raw", "task": "produce", "argument": "--in"}
            ]"#,
        );

        let resolution = resolve(&json).unwrap();
        let graph = &resolution.graph;

        let node = graph.index("raw").unwrap();
        assert_eq!(graph.node(node).kind(), NodeKind::File);

        let task = graph.index("produce").unwrap();
        assert_eq!(graph.predecessors(task), vec![node]);
    }

    #[test]
    fn test_shared_node_single_node_many_edges() {
        let json = two_task_project(
            "",
            r#""shared_nodes": [
                {"id": "link", "refs": [
                    {"task": "produce", "argument": "--out"},
                    {"task": "consume", "argument": "--in"}
                ]}
            ]"#,
        );

        let resolution = resolve(&json).unwrap();
        let graph = &resolution.graph;

        let node = graph.index("link").unwrap();
        let produce = graph.index("produce").unwrap();
        let consume = graph.index("consume").unwrap();

        assert_eq!(graph.successors(produce), vec![node]);
        assert_eq!(graph.predecessors(consume), vec![node]);
        assert_eq!(resolution.node_map["link"], vec![node]);
    }

    #[test]
    fn test_mixed_file_and_option_rejected() {
        let json = two_task_project(
            "",
            r#""shared_nodes": [
                {"id": "bad", "refs": [
                    {"task": "produce", "argument": "--out"},
                    {"task": "consume", "argument": "--flag"}
                ]}
            ]"#,
        );

        let result = resolve(&json);
        assert!(matches!(result, Err(FlowmakeError::ArgumentMismatch { .. })));
    }

    #[test]
    fn test_unresolved_reference() {
        let json = two_task_project(
            "",
            r#""unique_nodes": [
                {"id": "bad", "task": "produce", "argument": "--missing"}
            ]"#,
        );

        let result = resolve(&json);
        assert!(matches!(result, Err(FlowmakeError::ArgumentMismatch { .. })));
    }

    fn stub_project(shared: &str) -> String {
        format!(
            r#"{{
                "tools": [
                    {{
                        "name": "indexer",
                        "executable": "index",
                        "arguments": [
                            {{"long_form": "--out", "kind": "output", "stub": true,
                              "stub_extensions": ["bam", "bai"]}}
                        ]
                    }},
                    {{
                        "name": "viewer",
                        "executable": "view",
                        "arguments": [
                            {{"long_form": "--in", "kind": "input"}},
                            {{"long_form": "--stub-in", "kind": "input", "stub": true,
                              "stub_extensions": ["bam", "bai"]}}
                        ]
                    }}
                ],
                "pipelines": [
                    {{
                        "name": "main",
                        "tasks": [
                            {{"name": "index", "tool": "indexer"}},
                            {{"name": "view", "tool": "viewer"}}
                        ],
                        "shared_nodes": [{}]
                    }}
                ],
                "entry": "main"
            }}"#,
            shared
        )
    }

    #[test]
    fn test_all_stub_references_share_per_extension_nodes() {
        let json = stub_project(
            r#"{"id": "indexed", "refs": [
                {"task": "index", "argument": "--out"},
                {"task": "view", "argument": "--stub-in"}
            ]}"#,
        );

        let resolution = resolve(&json).unwrap();
        let graph = &resolution.graph;

        let bam = graph.index("indexed.bam").unwrap();
        let bai = graph.index("indexed.bai").unwrap();
        assert_eq!(resolution.node_map["indexed"], vec![bam, bai]);

        // Each task touches both members; exactly one primary edge each.
        let index = graph.index("index").unwrap();
        for member in [bam, bai] {
            assert_eq!(graph.edges_between(index, member).len(), 1);
        }
        let primaries: Vec<_> = graph
            .out_edges(index)
            .into_iter()
            .filter(|(_, e)| graph.edge(*e).primary_stub)
            .collect();
        assert_eq!(primaries.len(), 1);
    }

    #[test]
    fn test_mixed_stub_and_plain_references() {
        // The stub reference designates "bam" as the shared extension; the
        // plain reference joins that node and "bai" stays private.
        let json = stub_project(
            r#"{"id": "indexed", "refs": [
                {"task": "index", "argument": "--out", "stub_extension": "bam"},
                {"task": "view", "argument": "--in"}
            ]}"#,
        );

        let resolution = resolve(&json).unwrap();
        let graph = &resolution.graph;

        let bam = graph.index("indexed.bam").unwrap();
        let bai = graph.index("indexed.bai").unwrap();
        let view = graph.index("view").unwrap();

        assert_eq!(graph.predecessors(view), vec![bam]);
        assert!(graph.successors(bai).is_empty());
    }

    #[test]
    fn test_stub_without_designation_rejected() {
        let json = stub_project(
            r#"{"id": "indexed", "refs": [
                {"task": "index", "argument": "--out"},
                {"task": "view", "argument": "--in"}
            ]}"#,
        );

        let result = resolve(&json);
        assert!(matches!(result, Err(FlowmakeError::StubConsistency { .. })));
    }

    #[test]
    fn test_values_applied_to_stub_family() {
        let json = stub_project(
            r#"{"id": "indexed", "refs": [
                {"task": "index", "argument": "--out"},
                {"task": "view", "argument": "--stub-in"}
            ]}"#,
        )
        .replace(
            r#""shared_nodes""#,
            r#""values": [{"node": "indexed", "values": ["sample"]}], "shared_nodes""#,
        );

        let resolution = resolve(&json).unwrap();
        let graph = &resolution.graph;

        let bam = graph.index("indexed.bam").unwrap();
        let bai = graph.index("indexed.bai").unwrap();
        assert_eq!(graph.data(bam).values, vec!["sample.bam"]);
        assert_eq!(graph.data(bai).values, vec!["sample.bai"]);
    }

    #[test]
    fn test_nested_pipeline_shared_reference() {
        let json = r#"{
            "tools": [
                {
                    "name": "t",
                    "executable": "t",
                    "arguments": [
                        {"long_form": "--in", "kind": "input"},
                        {"long_form": "--out", "kind": "output"}
                    ]
                }
            ],
            "pipelines": [
                {
                    "name": "outer",
                    "tasks": [{"name": "finish", "tool": "t"}],
                    "pipelines": [{"name": "sub", "pipeline": "inner"}],
                    "shared_nodes": [
                        {"id": "handoff", "refs": [
                            {"node": "sub.result"},
                            {"task": "finish", "argument": "--in"}
                        ]}
                    ]
                },
                {
                    "name": "inner",
                    "tasks": [{"name": "start", "tool": "t"}],
                    "unique_nodes": [
                        {"id": "result", "task": "start", "argument": "--out"}
                    ]
                }
            ],
            "entry": "outer"
        }"#;

        let resolution = resolve(json).unwrap();
        let graph = &resolution.graph;

        let node = graph.index("handoff").unwrap();
        let start = graph.index("sub.start").unwrap();
        let finish = graph.index("finish").unwrap();

        assert_eq!(graph.successors(start), vec![node]);
        assert_eq!(graph.predecessors(finish), vec![node]);
        // The nested declaration resolves to the same graph node.
        assert_eq!(resolution.node_map["sub.result"], vec![node]);
    }
}
