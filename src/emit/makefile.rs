// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Makefile emission
//!
//! Serializes an [`ExecutionPlan`] into a Makefile: one rule per task
//! execution, an `all` target over the pipeline's terminal outputs, and
//! `rm -f` lines for scheduled intermediate deletions. Stream-paired
//! executions collapse into a single piped recipe on the consumer's rule.

use std::collections::HashMap;
use std::path::Path;

use crate::config::ToolRegistry;
use crate::errors::{FlowmakeError, FlowmakeResult};
use crate::resolve::{ExecutionPlan, TaskExecution};

/// Renders execution plans as Makefiles
pub struct MakefileEmitter<'a> {
    tools: &'a ToolRegistry,
}

impl<'a> MakefileEmitter<'a> {
    pub fn new(tools: &'a ToolRegistry) -> Self {
        Self { tools }
    }

    /// Render the whole plan
    pub fn render(&self, plan: &ExecutionPlan) -> FlowmakeResult<String> {
        let mut out = String::from("# Generated by flowmake - do not edit\n\n");
        out.push_str(".PHONY: all\n.DELETE_ON_ERROR:\n\n");

        out.push_str(&format!("all: {}\n\n", terminal_outputs(plan).join(" ")));

        // Executions by task node and subphase, for folding stream chains.
        let by_node: HashMap<(&str, usize), (&str, &TaskExecution)> = plan
            .tasks
            .iter()
            .flat_map(|t| {
                t.executions
                    .iter()
                    .map(move |e| ((e.task_node.as_str(), e.subphase), (t.tool.as_str(), e)))
            })
            .collect();

        for task in &plan.tasks {
            for execution in &task.executions {
                // A streaming producer's command is emitted on its
                // consumer's rule.
                if execution.stream_to.is_some() {
                    continue;
                }
                out.push_str(&self.render_rule(&task.tool, execution, &by_node)?);
                out.push('\n');
            }
        }

        Ok(out)
    }

    /// Render the plan and write it to disk
    pub fn write(&self, plan: &ExecutionPlan, path: &Path) -> FlowmakeResult<()> {
        let content = self.render(plan)?;
        std::fs::write(path, content).map_err(|e| FlowmakeError::FileWriteError {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
    }

    fn render_rule(
        &self,
        tool: &str,
        execution: &TaskExecution,
        by_node: &HashMap<(&str, usize), (&str, &TaskExecution)>,
    ) -> FlowmakeResult<String> {
        // Walk the stream chain back to its first producer, collecting
        // commands, dependencies, and any real files the producers still
        // write alongside their streams.
        let mut commands = vec![self.render_command(tool, execution)?];
        let mut dependencies = execution.dependencies.clone();
        let mut targets = execution.outputs.clone();

        let mut upstream = execution.stream_from.as_deref();
        while let Some(producer_id) = upstream {
            let &(producer_tool, producer) = by_node
                .get(&(producer_id, execution.subphase))
                .ok_or_else(|| FlowmakeError::Stream {
                    task: producer_id.to_string(),
                    reason: "stream producer missing from the execution plan".into(),
                })?;
            commands.insert(0, self.render_command(producer_tool, producer)?);
            dependencies.extend(producer.dependencies.iter().cloned());
            targets.extend(producer.outputs.iter().cloned());
            upstream = producer.stream_from.as_deref();
        }

        let mut rule = format!(
            "{}: {}\n\t{}\n",
            targets.join(" "),
            dependencies.join(" "),
            commands.join(" | ")
        );

        if !execution.deletions.is_empty() {
            rule.push_str(&format!("\trm -f {}\n", execution.deletions.join(" ")));
        }

        Ok(rule)
    }

    fn render_command(&self, tool: &str, execution: &TaskExecution) -> FlowmakeResult<String> {
        let definition = self
            .tools
            .tool(tool)
            .ok_or_else(|| FlowmakeError::UnknownTool {
                task: execution.task_node.clone(),
                tool: tool.to_string(),
            })?;

        let mut parts = vec![definition.command_prefix()];
        for argument in &execution.arguments {
            if argument.omit {
                continue;
            }
            if argument.values.is_empty() {
                parts.push(argument.argument.clone());
            } else {
                for value in &argument.values {
                    parts.push(format!("{} {}", argument.argument, value));
                }
            }
        }

        Ok(parts.join(" "))
    }
}

/// Outputs never consumed by a later execution
fn terminal_outputs(plan: &ExecutionPlan) -> Vec<String> {
    let consumed: std::collections::HashSet<&str> = plan
        .tasks
        .iter()
        .flat_map(|t| t.executions.iter())
        .flat_map(|e| e.dependencies.iter())
        .map(String::as_str)
        .collect();

    let mut seen = std::collections::HashSet::new();
    let mut terminal = Vec::new();
    for task in &plan.tasks {
        for execution in &task.executions {
            for output in &execution.outputs {
                if !consumed.contains(output.as_str()) && seen.insert(output.clone()) {
                    terminal.push(output.clone());
                }
            }
        }
    }
    terminal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigSet;
    use crate::resolve::resolve;

    fn align_sort_plan() -> (ConfigSet, crate::resolve::ResolvedPipeline) {
        let json = r#"{
            "tools": [
                {
                    "name": "aligner",
                    "executable": "align",
                    "arguments": [
                        {"long_form": "--in", "kind": "input", "extensions": ["fastq"]},
                        {"long_form": "--out", "kind": "output", "extensions": ["bam"],
                          "construction": {"method": "from_argument",
                            "argument": "--in", "strip_extension": true}}
                    ]
                },
                {
                    "name": "sorter",
                    "executable": "sort",
                    "arguments": [
                        {"long_form": "--in", "kind": "input", "extensions": ["bam"]},
                        {"long_form": "--out", "kind": "output", "extensions": ["sorted.bam"],
                          "construction": {"method": "from_argument",
                            "argument": "--in", "strip_extension": true}}
                    ]
                }
            ],
            "pipelines": [
                {
                    "name": "main",
                    "tasks": [
                        {"name": "align", "tool": "aligner"},
                        {"name": "sort", "tool": "sorter"}
                    ],
                    "unique_nodes": [
                        {"id": "reads", "task": "align", "argument": "--in"},
                        {"id": "sorted", "task": "sort", "argument": "--out"}
                    ],
                    "shared_nodes": [
                        {"id": "aligned", "refs": [
                            {"task": "align", "argument": "--out"},
                            {"task": "sort", "argument": "--in"}
                        ]}
                    ],
                    "values": [{"node": "reads", "values": ["sample.fastq"]}],
                    "delete_files": ["aligned"]
                }
            ],
            "entry": "main"
        }"#;

        let set = ConfigSet::from_json(json).unwrap();
        let resolved = resolve(&set).unwrap();
        (set, resolved)
    }

    #[test]
    fn test_rules_and_all_target() {
        let (set, resolved) = align_sort_plan();
        let registry = set.registry().unwrap();
        let makefile = MakefileEmitter::new(&registry).render(&resolved.plan).unwrap();

        assert!(makefile.contains("all: sample.sorted.bam"));
        assert!(makefile.contains("sample.bam: sample.fastq\n\talign --in sample.fastq --out sample.bam"));
        assert!(makefile.contains("sample.sorted.bam: sample.bam\n\tsort --in sample.bam --out sample.sorted.bam"));
        assert!(makefile.contains(".DELETE_ON_ERROR:"));
    }

    #[test]
    fn test_intermediate_deletion_line() {
        let (set, resolved) = align_sort_plan();
        let registry = set.registry().unwrap();
        let makefile = MakefileEmitter::new(&registry).render(&resolved.plan).unwrap();

        // "aligned" is intermediate; its file is removed after sort runs.
        assert!(makefile.contains("\trm -f sample.bam"));
    }

    #[test]
    fn test_streamed_pair_folds_into_one_rule() {
        let json = r#"{
            "tools": [
                {
                    "name": "producer",
                    "executable": "produce",
                    "arguments": [
                        {"long_form": "--in", "kind": "input", "extensions": ["txt"]},
                        {"long_form": "--out", "kind": "output", "extensions": ["dat"],
                          "output_stream": {"omit_argument": true},
                          "construction": {"method": "from_argument",
                            "argument": "--in", "strip_extension": true}}
                    ]
                },
                {
                    "name": "consumer",
                    "executable": "consume",
                    "arguments": [
                        {"long_form": "--in", "kind": "input", "extensions": ["dat"],
                          "input_stream": {"replace_value": "-"}},
                        {"long_form": "--out", "kind": "output", "extensions": ["result"],
                          "construction": {"method": "define_name",
                            "filename": "final.result"}}
                    ]
                }
            ],
            "pipelines": [
                {
                    "name": "main",
                    "tasks": [
                        {"name": "produce", "tool": "producer", "output_stream": true},
                        {"name": "consume", "tool": "consumer", "input_stream": true}
                    ],
                    "unique_nodes": [
                        {"id": "source", "task": "produce", "argument": "--in"},
                        {"id": "final", "task": "consume", "argument": "--out"}
                    ],
                    "shared_nodes": [
                        {"id": "piped", "refs": [
                            {"task": "produce", "argument": "--out"},
                            {"task": "consume", "argument": "--in"}
                        ]}
                    ],
                    "values": [{"node": "source", "values": ["input.txt"]}]
                }
            ],
            "entry": "main"
        }"#;

        let set = ConfigSet::from_json(json).unwrap();
        let resolved = resolve(&set).unwrap();
        assert_eq!(resolved.links.len(), 1);

        let registry = set.registry().unwrap();
        let makefile = MakefileEmitter::new(&registry).render(&resolved.plan).unwrap();

        // One piped rule; the streamed file is neither a target nor a
        // dependency anywhere.
        assert!(makefile.contains("final.result: input.txt\n\tproduce --in input.txt | consume --in - --out final.result"));
        assert!(!makefile.contains("input.dat"));
    }
}
