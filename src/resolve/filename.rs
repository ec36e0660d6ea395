// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Filename construction
//!
//! A small rule interpreter that derives unset file and option values from
//! other nodes' values. Rules live on the edge linking a data node to its
//! task (they come from the tool's argument table): either `from_argument`
//! (take a sibling argument's values, strip a known extension, append
//! sourced text fragments, re-extend) or `define_name` (a literal filename,
//! optionally placed in a directory taken from another argument).
//!
//! Construction is deterministic: the same graph state always yields the
//! same values.

use petgraph::graph::{EdgeIndex, NodeIndex};

use crate::config::{ConstructionRule, TextFragment, ToolRegistry};
use crate::errors::{FlowmakeError, FlowmakeResult};
use crate::graph::PipelineGraph;

/// Strip the first matching extension alternative from a value
pub fn strip_known_extension(value: &str, alternatives: &[&str]) -> String {
    for ext in alternatives {
        let suffix = format!(".{}", ext);
        if value.ends_with(&suffix) {
            return value[..value.len() - suffix.len()].to_string();
        }
    }
    value.to_string()
}

/// Append an extension unless the value already carries it
pub fn append_extension(value: &str, extension: &str) -> String {
    let suffix = format!(".{}", extension);
    if value.ends_with(&suffix) {
        value.to_string()
    } else {
        format!("{}{}", value, suffix)
    }
}

/// Insert a suffix before the final extension ("out.bam" + "_chr1" →
/// "out_chr1.bam"); appended when there is no extension
pub fn insert_suffix(value: &str, suffix: &str) -> String {
    let stem_start = value.rfind('/').map(|p| p + 1).unwrap_or(0);
    match value[stem_start..].rfind('.') {
        Some(dot) => {
            let dot = stem_start + dot;
            format!("{}{}{}", &value[..dot], suffix, &value[dot..])
        }
        None => format!("{}{}", value, suffix),
    }
}

/// Remove an inserted suffix again; the inverse of [`insert_suffix`]
pub fn remove_suffix(value: &str, suffix: &str) -> String {
    match value.rfind(suffix) {
        Some(pos) => format!("{}{}", &value[..pos], &value[pos + suffix.len()..]),
        None => value.to_string(),
    }
}

/// Construct values for one unset data node attached to `task_ix` by
/// `edge_ix`. Applies the subphase contract and re-extends the result.
pub fn construct_for_edge(
    graph: &PipelineGraph,
    tools: &ToolRegistry,
    task_ix: NodeIndex,
    edge_ix: EdgeIndex,
    data_ix: NodeIndex,
    subphases: usize,
) -> FlowmakeResult<Vec<String>> {
    let edge = graph.edge(edge_ix).clone();
    construct_with_rule(graph, tools, task_ix, &edge, data_ix, subphases)
}

/// Construct values using an explicit edge payload. Used for division
/// clones, whose output edges do not exist yet while their values are being
/// derived; `data_ix` supplies the target's stub metadata.
pub fn construct_with_rule(
    graph: &PipelineGraph,
    tools: &ToolRegistry,
    task_ix: NodeIndex,
    edge: &crate::graph::EdgeData,
    data_ix: NodeIndex,
    subphases: usize,
) -> FlowmakeResult<Vec<String>> {
    let task = graph.task(task_ix);
    let argument = edge.long_form.clone();

    let rule = edge.construction.clone().ok_or_else(|| {
        FlowmakeError::filename(
            &task.id,
            &argument,
            "no value was supplied and the tool defines no construction rule",
        )
    })?;

    let base = evaluate_rule(graph, tools, task_ix, &rule, &argument)?;

    // A greedy task consumes its multi-valued argument whole, so it gets
    // exactly one output regardless of subphases.
    let greedy_output = task.greedy_argument.is_some() && edge.is_output;
    let values = if greedy_output {
        if base.len() != 1 {
            return Err(FlowmakeError::filename(
                &task.id,
                &argument,
                format!(
                    "greedy task requires exactly one output value, rule produced {}",
                    base.len()
                ),
            ));
        }
        base
    } else {
        apply_subphase_contract(base, subphases, &task.id, &argument)?
    };

    // Re-extend. Literal define_name values are used as-is; stub members
    // take their own extension; plain targets take the argument's primary
    // extension when one is declared.
    let data = graph.data(data_ix);
    let extended = if matches!(rule, ConstructionRule::DefineName { .. }) && !data.stub {
        values
    } else if data.stub {
        let extension = data.stub_extension.as_deref().unwrap_or_default();
        values
            .iter()
            .map(|v| append_extension(v, extension))
            .collect()
    } else {
        let arg = tools.require_argument(&task.tool, &task.id, &argument)?;
        match arg.primary_extension() {
            Some(extension) => values
                .iter()
                .map(|v| append_extension(v, extension))
                .collect(),
            None => values,
        }
    };

    Ok(extended)
}

/// The base-value/subphase contract: a single value broadcasts across
/// subphases with a disambiguating index; any other mismatch is fatal
pub fn apply_subphase_contract(
    values: Vec<String>,
    subphases: usize,
    task: &str,
    argument: &str,
) -> FlowmakeResult<Vec<String>> {
    if values.len() == subphases {
        return Ok(values);
    }
    if values.len() == 1 && subphases > 1 {
        let base = &values[0];
        return Ok((1..=subphases)
            .map(|i| insert_suffix(base, &format!("_{}", i)))
            .collect());
    }
    Err(FlowmakeError::filename(
        task,
        argument,
        format!(
            "rule produced {} value(s) but the task has {} subphase(s)",
            values.len(),
            subphases
        ),
    ))
}

fn evaluate_rule(
    graph: &PipelineGraph,
    tools: &ToolRegistry,
    task_ix: NodeIndex,
    rule: &ConstructionRule,
    argument: &str,
) -> FlowmakeResult<Vec<String>> {
    match rule {
        ConstructionRule::FromArgument {
            argument: base_argument,
            strip_extension,
            add_text,
            separator,
        } => evaluate_from_argument(
            graph,
            tools,
            task_ix,
            argument,
            base_argument,
            *strip_extension,
            add_text,
            separator,
        ),
        ConstructionRule::DefineName {
            filename,
            path_argument,
        } => evaluate_define_name(graph, task_ix, argument, filename, path_argument.as_deref()),
    }
}

#[allow(clippy::too_many_arguments)]
fn evaluate_from_argument(
    graph: &PipelineGraph,
    tools: &ToolRegistry,
    task_ix: NodeIndex,
    argument: &str,
    base_argument: &str,
    strip_extension: bool,
    add_text: &[TextFragment],
    separator: &str,
) -> FlowmakeResult<Vec<String>> {
    let task = graph.task(task_ix);

    let mut base = argument_values(graph, task_ix, base_argument).ok_or_else(|| {
        FlowmakeError::filename(
            &task.id,
            argument,
            format!("base argument '{}' has no values yet", base_argument),
        )
    })?;

    if strip_extension {
        let arg = tools.require_argument(&task.tool, &task.id, base_argument)?;
        let alternatives = arg.extension_alternatives();
        base = base
            .iter()
            .map(|v| strip_known_extension(v, &alternatives))
            .collect();
    }

    for fragment in add_text {
        let pieces = fragment_values(graph, tools, task_ix, argument, fragment, base.len())?;
        base = base
            .iter()
            .zip(pieces.iter())
            .map(|(b, p)| {
                if p.is_empty() {
                    b.clone()
                } else {
                    format!("{}{}{}", b, separator, p)
                }
            })
            .collect();
    }

    Ok(base)
}

/// Values contributed by one text fragment, aligned with the base values
fn fragment_values(
    graph: &PipelineGraph,
    tools: &ToolRegistry,
    task_ix: NodeIndex,
    argument: &str,
    fragment: &TextFragment,
    base_len: usize,
) -> FlowmakeResult<Vec<String>> {
    let task = graph.task(task_ix);

    if let Some(ref text) = fragment.text {
        return Ok(vec![text.clone(); base_len]);
    }

    let source_argument = fragment.argument.as_deref().ok_or_else(|| {
        FlowmakeError::filename(
            &task.id,
            argument,
            "text fragment names neither a literal nor a source argument",
        )
    })?;

    // A fragment may source a sibling task in the same scope.
    let source_task_ix = match fragment.task.as_deref() {
        None => task_ix,
        Some(name) => {
            let scope_prefix = match task.id.rfind('.') {
                Some(pos) => &task.id[..=pos],
                None => "",
            };
            let id = format!("{}{}", scope_prefix, name);
            graph.index(&id).ok_or_else(|| {
                FlowmakeError::filename(
                    &task.id,
                    argument,
                    format!("text fragment references unknown task '{}'", name),
                )
            })?
        }
    };

    let mut values =
        argument_values(graph, source_task_ix, source_argument).ok_or_else(|| {
            FlowmakeError::filename(
                &task.id,
                argument,
                format!(
                    "text fragment source '{}' has no values yet",
                    source_argument
                ),
            )
        })?;

    if fragment.strip_extension {
        let source_task = graph.task(source_task_ix);
        let arg = tools.require_argument(&source_task.tool, &source_task.id, source_argument)?;
        let alternatives = arg.extension_alternatives();
        values = values
            .iter()
            .map(|v| strip_known_extension(v, &alternatives))
            .collect();
    }

    if values.len() == base_len {
        Ok(values)
    } else if values.len() == 1 {
        Ok(vec![values[0].clone(); base_len])
    } else {
        Err(FlowmakeError::filename(
            &task.id,
            argument,
            format!(
                "text fragment '{}' supplies {} values for {} base values",
                source_argument,
                values.len(),
                base_len
            ),
        ))
    }
}

fn evaluate_define_name(
    graph: &PipelineGraph,
    task_ix: NodeIndex,
    argument: &str,
    filename: &str,
    path_argument: Option<&str>,
) -> FlowmakeResult<Vec<String>> {
    let task = graph.task(task_ix);

    let value = match path_argument {
        None => filename.to_string(),
        Some(path_arg) => {
            let values = argument_values(graph, task_ix, path_arg).ok_or_else(|| {
                FlowmakeError::filename(
                    &task.id,
                    argument,
                    format!("path argument '{}' has no value", path_arg),
                )
            })?;
            format!("{}/{}", values[0].trim_end_matches('/'), filename)
        }
    };

    Ok(vec![value])
}

/// Current values of the named argument on a task, read from the attached
/// data node. Stub arguments read their primary member.
fn argument_values(
    graph: &PipelineGraph,
    task_ix: NodeIndex,
    argument: &str,
) -> Option<Vec<String>> {
    let mut fallback = None;

    let incident = graph
        .in_edges(task_ix)
        .into_iter()
        .chain(graph.out_edges(task_ix));

    for (node, edge_ix) in incident {
        let edge = graph.edge(edge_ix);
        if edge.long_form != argument && edge.short_form.as_deref() != Some(argument) {
            continue;
        }
        let data = graph.data(node);
        if data.values.is_empty() {
            continue;
        }
        if edge.stub && !edge.primary_stub {
            fallback.get_or_insert_with(|| data.values.clone());
            continue;
        }
        return Some(data.values.clone());
    }

    fallback
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ArgumentDefinition, ArgumentKind, ToolDefinition, ToolRegistry};
    use crate::graph::{DataData, EdgeData, NodeData, TaskData};

    fn registry() -> ToolRegistry {
        let sorter = ToolDefinition {
            name: "sorter".into(),
            description: None,
            executable: "sort".into(),
            precommand: None,
            modifier: None,
            arguments: vec![
                ArgumentDefinition {
                    long_form: "--in".into(),
                    short_form: None,
                    kind: ArgumentKind::Input,
                    required: true,
                    allow_multiple: false,
                    command_line: None,
                    extensions: vec!["sam|bam".into()],
                    stub: false,
                    stub_extensions: vec![],
                    input_stream: None,
                    output_stream: None,
                    construction: None,
                },
                ArgumentDefinition {
                    long_form: "--out".into(),
                    short_form: None,
                    kind: ArgumentKind::Output,
                    required: false,
                    allow_multiple: false,
                    command_line: None,
                    extensions: vec!["sorted.bam".into()],
                    stub: false,
                    stub_extensions: vec![],
                    input_stream: None,
                    output_stream: None,
                    construction: None,
                },
            ],
        };
        ToolRegistry::new(vec![sorter]).unwrap()
    }

    /// One task with an input holding `in_values` and an unset output whose
    /// edge carries `rule`
    fn one_task_graph(
        in_values: &[&str],
        rule: ConstructionRule,
    ) -> (PipelineGraph, NodeIndex, EdgeIndex, NodeIndex) {
        let mut graph = PipelineGraph::new();
        let task = graph.add_node(NodeData::Task(TaskData::new("sort", "sorter")));

        let mut input = DataData::new("in");
        input.values = in_values.iter().map(|s| s.to_string()).collect();
        let input = graph.add_node(NodeData::File(input));
        graph.add_edge(input, task, EdgeData {
            long_form: "--in".into(),
            is_input: true,
            ..Default::default()
        });

        let output = graph.add_node(NodeData::File(DataData::new("out")));
        let edge = graph.add_edge(task, output, EdgeData {
            long_form: "--out".into(),
            is_output: true,
            construction: Some(rule),
            ..Default::default()
        });

        (graph, task, edge, output)
    }

    fn from_in_rule() -> ConstructionRule {
        ConstructionRule::FromArgument {
            argument: "--in".into(),
            strip_extension: true,
            add_text: vec![],
            separator: "_".into(),
        }
    }

    #[test]
    fn test_strip_and_append() {
        assert_eq!(strip_known_extension("a.sam", &["sam", "bam"]), "a");
        assert_eq!(strip_known_extension("a.cram", &["sam", "bam"]), "a.cram");
        assert_eq!(append_extension("a", "bam"), "a.bam");
        assert_eq!(append_extension("a.bam", "bam"), "a.bam");
    }

    #[test]
    fn test_insert_and_remove_suffix() {
        assert_eq!(insert_suffix("out.bam", "_chr1"), "out_chr1.bam");
        assert_eq!(insert_suffix("dir.v2/out", "_chr1"), "dir.v2/out_chr1");
        assert_eq!(remove_suffix("out_chr1.bam", "_chr1"), "out.bam");
    }

    #[test]
    fn test_from_argument_construction() {
        let (graph, task, edge, output) = one_task_graph(&["sample.sam"], from_in_rule());
        let values = construct_for_edge(&graph, &registry(), task, edge, output, 1).unwrap();
        assert_eq!(values, vec!["sample.sorted.bam"]);
    }

    #[test]
    fn test_additional_text_fragment() {
        let rule = ConstructionRule::FromArgument {
            argument: "--in".into(),
            strip_extension: true,
            add_text: vec![TextFragment {
                text: Some("dedup".into()),
                ..Default::default()
            }],
            separator: "_".into(),
        };
        let (graph, task, edge, output) = one_task_graph(&["sample.sam"], rule);
        let values = construct_for_edge(&graph, &registry(), task, edge, output, 1).unwrap();
        assert_eq!(values, vec!["sample_dedup.sorted.bam"]);
    }

    #[test]
    fn test_define_name() {
        let rule = ConstructionRule::DefineName {
            filename: "merged.bam".into(),
            path_argument: None,
        };
        let (graph, task, edge, output) = one_task_graph(&["x.sam"], rule);
        let values = construct_for_edge(&graph, &registry(), task, edge, output, 1).unwrap();
        assert_eq!(values, vec!["merged.bam"]);
    }

    #[test]
    fn test_broadcast_single_base_across_subphases() {
        let values = apply_subphase_contract(
            vec!["out.bam".into()],
            3,
            "sort",
            "--out",
        )
        .unwrap();
        assert_eq!(values, vec!["out_1.bam", "out_2.bam", "out_3.bam"]);
    }

    #[test]
    fn test_subphase_mismatch_is_fatal() {
        let result = apply_subphase_contract(
            vec!["a".into(), "b".into()],
            3,
            "sort",
            "--out",
        );
        assert!(matches!(
            result,
            Err(FlowmakeError::FilenameConstruction { .. })
        ));
    }

    #[test]
    fn test_per_subphase_construction() {
        let (graph, task, edge, output) =
            one_task_graph(&["a.sam", "b.sam"], from_in_rule());
        let values = construct_for_edge(&graph, &registry(), task, edge, output, 2).unwrap();
        assert_eq!(values, vec!["a.sorted.bam", "b.sorted.bam"]);
    }

    #[test]
    fn test_missing_rule_is_fatal() {
        let mut graph = PipelineGraph::new();
        let task = graph.add_node(NodeData::Task(TaskData::new("sort", "sorter")));
        let output = graph.add_node(NodeData::File(DataData::new("out")));
        let edge = graph.add_edge(task, output, EdgeData {
            long_form: "--out".into(),
            is_output: true,
            ..Default::default()
        });

        let result = construct_for_edge(&graph, &registry(), task, edge, output, 1);
        assert!(matches!(
            result,
            Err(FlowmakeError::FilenameConstruction { .. })
        ));
    }

    #[test]
    fn test_construction_is_deterministic() {
        let (graph, task, edge, output) = one_task_graph(&["sample.sam"], from_in_rule());
        let first = construct_for_edge(&graph, &registry(), task, edge, output, 1).unwrap();
        let second = construct_for_edge(&graph, &registry(), task, edge, output, 1).unwrap();
        assert_eq!(first, second);
    }
}
