// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Dependency and output resolution
//!
//! Walks the finished graph once per task execution (divisions × subphases)
//! and emits what the build-script emitter needs: the argument→value
//! assignments in tool-declared order, the dependency and output file
//! lists, the post-execution deletion schedule for intermediate files, and
//! the stream pairings. The graph is read-only afterwards.

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use tracing::debug;

use crate::config::ToolRegistry;
use crate::errors::{FlowmakeError, FlowmakeResult};
use crate::graph::{NodeKind, PipelineGraph};
use crate::resolve::filename::strip_known_extension;
use crate::resolve::stream::StreamLink;
use crate::resolve::workflow::Workflow;

/// The fully resolved plan handed to the emitter
#[derive(Debug)]
pub struct ExecutionPlan {
    /// Ordered task ids (division parents only)
    pub workflow: Vec<String>,

    /// Per-task execution sets, in workflow order
    pub tasks: Vec<TaskPlan>,
}

/// All executions of one task (its divisions and subphases)
#[derive(Debug)]
pub struct TaskPlan {
    pub id: String,
    pub tool: String,
    pub executions: Vec<TaskExecution>,
}

/// One concrete tool invocation
#[derive(Debug)]
pub struct TaskExecution {
    /// Graph node executing this run (the task or one of its division
    /// children)
    pub task_node: String,

    pub division: usize,
    pub subphase: usize,

    /// Argument assignments in tool-declared order
    pub arguments: Vec<ResolvedArgument>,

    /// Input files this execution depends on
    pub dependencies: Vec<String>,

    /// Files this execution produces
    pub outputs: Vec<String>,

    /// Intermediate files deleted after this execution
    pub deletions: Vec<String>,

    /// Task this execution pipes into / receives a pipe from
    pub stream_to: Option<String>,
    pub stream_from: Option<String>,
}

/// One argument on the command line
#[derive(Debug)]
pub struct ResolvedArgument {
    /// Text placed on the command line (long form unless overridden)
    pub argument: String,

    pub values: Vec<String>,

    /// Part of a validated stream pairing
    pub is_stream: bool,

    /// Omitted entirely when streaming
    pub omit: bool,
}

/// Resolve every task execution of the graph
pub fn resolve_outputs(
    graph: &mut PipelineGraph,
    tools: &ToolRegistry,
    workflow: &Workflow,
    links: &[StreamLink],
) -> FlowmakeResult<ExecutionPlan> {
    schedule_deletions(graph, workflow);

    let stream_to: HashMap<&str, &str> = links
        .iter()
        .map(|l| (l.producer.as_str(), l.consumer.as_str()))
        .collect();
    let stream_from: HashMap<&str, &str> = links
        .iter()
        .map(|l| (l.consumer.as_str(), l.producer.as_str()))
        .collect();

    let mut tasks = Vec::new();
    for &task in &workflow.order {
        let data = graph.task(task).clone();

        let mut division_nodes = vec![task];
        for child_id in &data.children {
            let child = graph.index(child_id).ok_or_else(|| {
                FlowmakeError::division(&data.id, format!("missing division child '{}'", child_id))
            })?;
            division_nodes.push(child);
        }

        let mut executions = Vec::new();
        for (division, &node) in division_nodes.iter().enumerate() {
            for subphase in 0..data.subphases {
                let mut execution =
                    resolve_execution(graph, tools, node, division, subphase, data.subphases)?;
                let node_id = graph.task(node).id.clone();
                execution.stream_to = stream_to.get(node_id.as_str()).map(|s| s.to_string());
                execution.stream_from =
                    stream_from.get(node_id.as_str()).map(|s| s.to_string());
                executions.push(execution);
            }
        }

        // Deletions fire once, after the task's final execution.
        let deletions = collect_deletions(graph, &division_nodes);
        if let Some(last) = executions.last_mut() {
            last.deletions = deletions;
        }

        tasks.push(TaskPlan {
            id: data.id.clone(),
            tool: data.tool.clone(),
            executions,
        });
    }

    debug!(
        tasks = tasks.len(),
        executions = tasks.iter().map(|t| t.executions.len()).sum::<usize>(),
        "execution plan resolved"
    );

    Ok(ExecutionPlan {
        workflow: workflow.task_ids(graph),
        tasks,
    })
}

/// Mark each intermediate data node with the task node after which its
/// files can be removed (its last consumer in workflow order)
fn schedule_deletions(graph: &mut PipelineGraph, workflow: &Workflow) {
    let mut planned: Vec<(NodeIndex, String)> = Vec::new();

    for node in graph.data_nodes() {
        let data = graph.data(node);
        if !data.intermediate || data.values.is_empty() {
            continue;
        }

        let last_consumer = graph
            .successors(node)
            .into_iter()
            .filter(|&s| graph.node(s).kind() == NodeKind::Task)
            .max_by_key(|&s| workflow.position(graph, s).unwrap_or(0));

        if let Some(consumer) = last_consumer {
            planned.push((node, graph.task(consumer).id.clone()));
        }
    }

    for (node, task_id) in planned {
        graph.data_mut(node).delete_after_task = Some(task_id);
    }
}

/// Files of intermediate nodes scheduled for deletion after one of the
/// given task nodes
fn collect_deletions(graph: &PipelineGraph, division_nodes: &[NodeIndex]) -> Vec<String> {
    let ids: Vec<&str> = division_nodes
        .iter()
        .map(|&n| graph.task(n).id.as_str())
        .collect();

    let mut deletions = Vec::new();
    for node in graph.data_nodes() {
        let data = graph.data(node);
        if let Some(ref after) = data.delete_after_task {
            if ids.contains(&after.as_str()) {
                deletions.extend(data.values.iter().cloned());
            }
        }
    }
    deletions
}

fn resolve_execution(
    graph: &PipelineGraph,
    tools: &ToolRegistry,
    node: NodeIndex,
    division: usize,
    subphase: usize,
    subphases: usize,
) -> FlowmakeResult<TaskExecution> {
    let task = graph.task(node);
    let tool = tools.require(&task.tool, &task.id)?;

    let mut arguments = Vec::new();
    let mut dependencies = Vec::new();
    let mut outputs = Vec::new();

    for arg_def in &tool.arguments {
        let incident: Vec<_> = graph
            .in_edges(node)
            .into_iter()
            .chain(graph.out_edges(node))
            .filter(|&(_, e)| graph.edge(e).long_form == arg_def.long_form)
            .collect();

        if incident.is_empty() {
            continue;
        }

        let is_stub = incident.iter().any(|&(_, e)| graph.edge(e).stub);
        if is_stub {
            resolve_stub_argument(
                graph,
                node,
                &incident,
                subphase,
                subphases,
                &mut arguments,
                &mut dependencies,
                &mut outputs,
            )?;
        } else {
            resolve_plain_argument(
                graph,
                node,
                &incident,
                division,
                subphase,
                subphases,
                &mut arguments,
                &mut dependencies,
                &mut outputs,
            )?;
        }
    }

    Ok(TaskExecution {
        task_node: task.id.clone(),
        division,
        subphase,
        arguments,
        dependencies,
        outputs,
        deletions: Vec::new(),
        stream_to: None,
        stream_from: None,
    })
}

/// Select the value(s) of a data node for one execution
fn select_values(
    graph: &PipelineGraph,
    task_node: NodeIndex,
    data_node: NodeIndex,
    edge_ix: petgraph::graph::EdgeIndex,
    division: usize,
    subphase: usize,
    subphases: usize,
) -> FlowmakeResult<Vec<String>> {
    let task = graph.task(task_node);
    let edge = graph.edge(edge_ix);
    let data = graph.data(data_node);
    let values = &data.values;

    if edge.is_greedy || edge.allow_multiple {
        return Ok(values.clone());
    }

    // The forcing argument distributes one value per division.
    if task.division_argument.as_deref() == Some(edge.long_form.as_str())
        && !data.is_parent
        && !data.is_child
        && values.len() > 1
    {
        let index = if task.is_child { task.division_index } else { division };
        return values.get(index).cloned().map(|v| vec![v]).ok_or_else(|| {
            FlowmakeError::division(
                &task.id,
                format!(
                    "division {} exceeds the {} values of '{}'",
                    index,
                    values.len(),
                    edge.long_form
                ),
            )
        });
    }

    match values.len() {
        0 => {
            if data.required {
                Err(FlowmakeError::ArgumentMismatch {
                    tool: task.tool.clone(),
                    task: task.id.clone(),
                    argument: edge.long_form.clone(),
                    help: Some("required argument has no value".into()),
                })
            } else {
                Ok(Vec::new())
            }
        }
        1 => Ok(vec![values[0].clone()]),
        n if n == subphases => Ok(vec![values[subphase].clone()]),
        n => Err(FlowmakeError::ArgumentMismatch {
            tool: task.tool.clone(),
            task: task.id.clone(),
            argument: edge.long_form.clone(),
            help: Some(format!(
                "{} values cannot be distributed over {} subphases",
                n, subphases
            )),
        }),
    }
}

/// Resolve one non-stub argument. Several parallel edges under the same
/// argument (a consolidation point consuming every division's output)
/// merge into one multi-valued assignment.
#[allow(clippy::too_many_arguments)]
fn resolve_plain_argument(
    graph: &PipelineGraph,
    task_node: NodeIndex,
    incident: &[(NodeIndex, petgraph::graph::EdgeIndex)],
    division: usize,
    subphase: usize,
    subphases: usize,
    arguments: &mut Vec<ResolvedArgument>,
    dependencies: &mut Vec<String>,
    outputs: &mut Vec<String>,
) -> FlowmakeResult<()> {
    let first_edge = graph.edge(incident[0].1);

    // Streamed files never materialize: they appear on neither the
    // dependency nor the output list, and the argument follows its stream
    // instructions.
    if first_edge.is_stream {
        let (data_node, edge_ix) = incident[0];
        let edge = graph.edge(edge_ix);
        let values =
            select_values(graph, task_node, data_node, edge_ix, division, subphase, subphases)?;
        let instructions = if edge.is_output {
            edge.output_stream.as_ref()
        } else {
            edge.input_stream.as_ref()
        };
        let (omit, stream_values) = match instructions {
            Some(i) if i.omit_argument => (true, Vec::new()),
            Some(i) => (
                false,
                match i.replace_value {
                    Some(ref replacement) => vec![replacement.clone()],
                    None => values,
                },
            ),
            None => (false, values),
        };
        arguments.push(ResolvedArgument {
            argument: command_line_text(edge),
            values: stream_values,
            is_stream: true,
            omit,
        });
        return Ok(());
    }

    let mut merged = Vec::new();
    for &(data_node, edge_ix) in incident {
        let edge = graph.edge(edge_ix);
        let values =
            select_values(graph, task_node, data_node, edge_ix, division, subphase, subphases)?;
        if values.is_empty() {
            continue;
        }

        if graph.node(data_node).kind() == NodeKind::File {
            if edge.is_output {
                outputs.extend(values.iter().cloned());
            } else {
                dependencies.extend(values.iter().cloned());
            }
        }
        merged.extend(values);
    }

    if !merged.is_empty() {
        arguments.push(ResolvedArgument {
            argument: command_line_text(first_edge),
            values: merged,
            is_stream: false,
            omit: false,
        });
    }

    Ok(())
}

/// A stub family collapses to one command-line value (the primary member's
/// base name) while every member file joins the dependency/output lists
#[allow(clippy::too_many_arguments)]
fn resolve_stub_argument(
    graph: &PipelineGraph,
    task_node: NodeIndex,
    incident: &[(NodeIndex, petgraph::graph::EdgeIndex)],
    subphase: usize,
    subphases: usize,
    arguments: &mut Vec<ResolvedArgument>,
    dependencies: &mut Vec<String>,
    outputs: &mut Vec<String>,
) -> FlowmakeResult<()> {
    let task = graph.task(task_node);
    let mut command_value: Option<String> = None;
    let mut is_output = false;
    let mut argument_text = String::new();

    for &(data_node, edge_ix) in incident {
        let edge = graph.edge(edge_ix);
        let data = graph.data(data_node);

        let value = match data.values.len() {
            0 => continue,
            1 => data.values[0].clone(),
            n if n == subphases => data.values[subphase].clone(),
            n => {
                return Err(FlowmakeError::ArgumentMismatch {
                    tool: task.tool.clone(),
                    task: task.id.clone(),
                    argument: edge.long_form.clone(),
                    help: Some(format!(
                        "stub member carries {} values for {} subphases",
                        n, subphases
                    )),
                });
            }
        };

        if edge.is_output {
            is_output = true;
            outputs.push(value.clone());
        } else {
            dependencies.push(value.clone());
        }

        if edge.primary_stub {
            argument_text = command_line_text(edge);
            let extension = data.stub_extension.as_deref().unwrap_or_default();
            command_value = Some(strip_known_extension(&value, &[extension]));
        }
    }

    if let Some(value) = command_value {
        arguments.push(ResolvedArgument {
            argument: argument_text,
            values: vec![value],
            is_stream: false,
            omit: false,
        });
    } else if is_output || !dependencies.is_empty() {
        return Err(FlowmakeError::ArgumentMismatch {
            tool: task.tool.clone(),
            task: task.id.clone(),
            argument: incident
                .first()
                .map(|&(_, e)| graph.edge(e).long_form.clone())
                .unwrap_or_default(),
            help: Some("stub family has no primary member".into()),
        });
    }

    Ok(())
}

fn command_line_text(edge: &crate::graph::EdgeData) -> String {
    edge.command_line_argument
        .clone()
        .unwrap_or_else(|| edge.long_form.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArgumentDefinition, ArgumentKind, ToolDefinition, ToolRegistry};
    use crate::graph::{DataData, EdgeData, NodeData, TaskData};
    use crate::resolve::workflow::order_workflow;

    fn arg(long: &str, kind: ArgumentKind) -> ArgumentDefinition {
        ArgumentDefinition {
            long_form: long.into(),
            short_form: None,
            kind,
            required: false,
            allow_multiple: false,
            command_line: None,
            extensions: vec![],
            stub: false,
            stub_extensions: vec![],
            input_stream: None,
            output_stream: None,
            construction: None,
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(vec![ToolDefinition {
            name: "tool".into(),
            description: None,
            executable: "tool".into(),
            precommand: None,
            modifier: None,
            arguments: vec![
                arg("--in", ArgumentKind::Input),
                arg("--region", ArgumentKind::Option),
                arg("--out", ArgumentKind::Output),
            ],
        }])
        .unwrap()
    }

    fn simple_graph(in_values: &[&str], out_values: &[&str]) -> PipelineGraph {
        let mut g = PipelineGraph::new();
        let t = g.add_node(NodeData::Task(TaskData::new("run", "tool")));

        let mut input = DataData::new("in");
        input.values = in_values.iter().map(|s| s.to_string()).collect();
        let input = g.add_node(NodeData::File(input));
        g.add_edge(input, t, EdgeData {
            long_form: "--in".into(),
            is_input: true,
            ..Default::default()
        });

        let mut output = DataData::new("out");
        output.values = out_values.iter().map(|s| s.to_string()).collect();
        let output = g.add_node(NodeData::File(output));
        g.add_edge(t, output, EdgeData {
            long_form: "--out".into(),
            is_output: true,
            ..Default::default()
        });

        g
    }

    fn plan(graph: &mut PipelineGraph) -> ExecutionPlan {
        let workflow = order_workflow(graph).unwrap();
        // Subphase bookkeeping normally happens in the division pass.
        crate::resolve::division::apply_divisions(graph, &registry(), &workflow, "tag").unwrap();
        resolve_outputs(graph, &registry(), &workflow, &[]).unwrap()
    }

    #[test]
    fn test_arguments_in_tool_order() {
        let mut g = simple_graph(&["a.bam"], &["a.vcf"]);
        // Add the option after the output; tool order still wins.
        let t = g.index("run").unwrap();
        let mut region = DataData::new("region");
        region.values = vec!["chr1".into()];
        let region = g.add_node(NodeData::Option(region));
        g.add_edge(region, t, EdgeData {
            long_form: "--region".into(),
            is_input: true,
            ..Default::default()
        });

        let plan = plan(&mut g);
        let execution = &plan.tasks[0].executions[0];
        let order: Vec<_> = execution.arguments.iter().map(|a| a.argument.as_str()).collect();
        assert_eq!(order, vec!["--in", "--region", "--out"]);
    }

    #[test]
    fn test_dependencies_and_outputs() {
        let mut g = simple_graph(&["a.bam"], &["a.vcf"]);
        let plan = plan(&mut g);
        let execution = &plan.tasks[0].executions[0];

        assert_eq!(execution.dependencies, vec!["a.bam"]);
        assert_eq!(execution.outputs, vec!["a.vcf"]);
    }

    #[test]
    fn test_subphase_value_selection() {
        let mut g = simple_graph(&["a.bam", "b.bam"], &["a.vcf", "b.vcf"]);
        let plan = plan(&mut g);
        let executions = &plan.tasks[0].executions;

        assert_eq!(executions.len(), 2);
        assert_eq!(executions[0].dependencies, vec!["a.bam"]);
        assert_eq!(executions[1].dependencies, vec!["b.bam"]);
        assert_eq!(executions[1].outputs, vec!["b.vcf"]);
    }

    #[test]
    fn test_greedy_argument_gets_all_values() {
        let mut g = simple_graph(&["a.bam", "b.bam"], &["m.vcf"]);
        let t = g.index("run").unwrap();
        g.task_mut(t).greedy_argument = Some("--in".into());
        let input = g.index("in").unwrap();
        for e in g.edges_between(input, t) {
            g.edge_mut(e).is_greedy = true;
        }

        let plan = plan(&mut g);
        let executions = &plan.tasks[0].executions;
        assert_eq!(executions.len(), 1);
        assert_eq!(executions[0].arguments[0].values, vec!["a.bam", "b.bam"]);
        assert_eq!(executions[0].dependencies, vec!["a.bam", "b.bam"]);
    }

    #[test]
    fn test_division_executions_select_forcing_value() {
        let mut g = simple_graph(&["a.bam"], &[]);
        let t = g.index("run").unwrap();
        let mut region = DataData::new("region");
        region.values = vec!["chr1".into(), "chr2".into()];
        let region = g.add_node(NodeData::Option(region));
        g.add_edge(region, t, EdgeData {
            long_form: "--region".into(),
            is_input: true,
            ..Default::default()
        });
        let out = g.index("out").unwrap();
        let edges = g.edges_between(t, out);
        g.edge_mut(edges[0]).construction = Some(crate::config::ConstructionRule::FromArgument {
            argument: "--in".into(),
            strip_extension: false,
            add_text: vec![],
            separator: "_".into(),
        });

        let plan = plan(&mut g);
        let executions = &plan.tasks[0].executions;

        assert_eq!(executions.len(), 2);
        let region_values: Vec<_> = executions
            .iter()
            .map(|e| {
                e.arguments
                    .iter()
                    .find(|a| a.argument == "--region")
                    .unwrap()
                    .values
                    .clone()
            })
            .collect();
        assert_eq!(region_values, vec![vec!["chr1"], vec!["chr2"]]);
    }

    #[test]
    fn test_intermediate_deletion_scheduled_on_last_consumer() {
        let mut g = simple_graph(&["a.bam"], &["a.vcf"]);
        let input = g.index("in").unwrap();
        g.data_mut(input).intermediate = true;

        let plan = plan(&mut g);
        let execution = plan.tasks[0].executions.last().unwrap();
        assert_eq!(execution.deletions, vec!["a.bam"]);
    }
}
