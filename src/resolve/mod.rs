// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Pipeline graph resolution
//!
//! The passes run in a fixed order, each depending on invariants the
//! previous one established: node resolution builds the graph, the orderer
//! fixes the task sequence, the division sweep constructs filenames and
//! applies fan-out/fan-in (non-divided values before divisions, division-
//! dependent values with them), stream validation checks producer/consumer
//! pairings against the order, and the output resolver freezes everything
//! into an [`ExecutionPlan`]. Resolution is synchronous and fails fast; the
//! first violated invariant aborts the whole run.

pub mod division;
pub mod filename;
pub mod nodes;
pub mod outputs;
pub mod stream;
pub mod workflow;

use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use tracing::debug;

use crate::config::{ConfigSet, PipelineScope};
use crate::errors::FlowmakeResult;
use crate::graph::PipelineGraph;

pub use outputs::{ExecutionPlan, ResolvedArgument, TaskExecution, TaskPlan};
pub use stream::StreamLink;
pub use workflow::Workflow;

/// A fully resolved pipeline: the immutable graph, the task order, the
/// validated stream pairings, and the execution plan for the emitter
pub struct ResolvedPipeline {
    pub graph: PipelineGraph,
    pub workflow: Workflow,
    pub links: Vec<StreamLink>,
    pub plan: ExecutionPlan,
    pub node_map: HashMap<String, Vec<NodeIndex>>,
}

/// Resolve a loaded configuration into an execution plan
pub fn resolve(set: &ConfigSet) -> FlowmakeResult<ResolvedPipeline> {
    let root = PipelineScope::instantiate(set)?;
    let tools = set.registry()?;
    let tag = run_tag(&root.definition.name);

    debug!(pipeline = %root.definition.name, "resolving");

    let nodes::NodeResolution { mut graph, node_map } = nodes::resolve_nodes(&root, &tools)?;
    let workflow = workflow::order_workflow(&graph)?;
    division::apply_divisions(&mut graph, &tools, &workflow, &tag)?;
    let links = stream::validate_streams(&mut graph, &workflow)?;
    let plan = outputs::resolve_outputs(&mut graph, &tools, &workflow, &links)?;

    Ok(ResolvedPipeline {
        graph,
        workflow,
        links,
        plan,
        node_map,
    })
}

/// Short run-unique tag for intermediate division files
fn run_tag(pipeline: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(pipeline.as_bytes());
    hasher.update(&std::process::id().to_le_bytes());
    if let Ok(elapsed) = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        hasher.update(&elapsed.as_nanos().to_le_bytes());
    }
    hasher.finalize().to_hex()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FlowmakeError;

    /// Scenario: align (no output rule) feeding sort (rule from --in).
    /// `with_align_rule` adds the missing construction rule.
    fn align_sort_project(with_align_rule: bool) -> String {
        let align_out_rule = if with_align_rule {
            r#", "construction": {"method": "from_argument", "argument": "--in", "strip_extension": true}"#
        } else {
            ""
        };

        format!(
            r#"{{
                "tools": [
                    {{
                        "name": "aligner",
                        "executable": "align",
                        "arguments": [
                            {{"long_form": "--in", "kind": "input", "required": true,
                              "extensions": ["fastq"]}},
                            {{"long_form": "--out", "kind": "output",
                              "extensions": ["bam"]{}}}
                        ]
                    }},
                    {{
                        "name": "sorter",
                        "executable": "sort",
                        "arguments": [
                            {{"long_form": "--in", "kind": "input", "extensions": ["sam|bam"]}},
                            {{"long_form": "--out", "kind": "output",
                              "extensions": ["sorted.bam"],
                              "construction": {{"method": "from_argument",
                                "argument": "--in", "strip_extension": true}}}}
                        ]
                    }}
                ],
                "pipelines": [
                    {{
                        "name": "align-sort",
                        "tasks": [
                            {{"name": "align", "tool": "aligner"}},
                            {{"name": "sort", "tool": "sorter"}}
                        ],
                        "unique_nodes": [
                            {{"id": "reads", "task": "align", "argument": "--in"}},
                            {{"id": "sorted", "task": "sort", "argument": "--out"}}
                        ],
                        "shared_nodes": [
                            {{"id": "aligned", "refs": [
                                {{"task": "align", "argument": "--out"}},
                                {{"task": "sort", "argument": "--in"}}
                            ]}}
                        ],
                        "values": [
                            {{"node": "reads", "values": ["sample.fastq"]}}
                        ]
                    }}
                ],
                "entry": "align-sort"
            }}"#,
            align_out_rule
        )
    }

    #[test]
    fn test_unset_output_without_rule_fails() {
        let set = ConfigSet::from_json(&align_sort_project(false)).unwrap();
        let result = resolve(&set);
        assert!(matches!(
            result,
            Err(FlowmakeError::FilenameConstruction { .. })
        ));
    }

    #[test]
    fn test_align_sort_resolves_filenames_and_order() {
        let set = ConfigSet::from_json(&align_sort_project(true)).unwrap();
        let resolved = resolve(&set).unwrap();

        assert_eq!(resolved.plan.workflow, vec!["align", "sort"]);

        let graph = &resolved.graph;
        let aligned = graph.index("aligned").unwrap();
        assert_eq!(graph.data(aligned).values, vec!["sample.bam"]);
        let sorted = graph.index("sorted").unwrap();
        assert_eq!(graph.data(sorted).values, vec!["sample.sorted.bam"]);
    }

    /// Scenario: call divides over three regions; merge consolidates them.
    fn call_merge_project(with_merge: bool) -> String {
        let merge_parts = if with_merge {
            r#",
                            {"name": "merge", "tool": "merger", "consolidate": true}"#
        } else {
            ""
        };
        let merge_nodes = if with_merge {
            r#",
                            {"id": "merged", "task": "merge", "argument": "--out"}"#
        } else {
            ""
        };
        let vcf_refs = if with_merge {
            r#"[
                                {"task": "call", "argument": "--out"},
                                {"task": "merge", "argument": "--in"}
                            ]"#
        } else {
            r#"[
                                {"task": "call", "argument": "--out"}
                            ]"#
        };

        format!(
            r#"{{
                "tools": [
                    {{
                        "name": "caller",
                        "executable": "call",
                        "arguments": [
                            {{"long_form": "--in", "kind": "input", "extensions": ["bam"]}},
                            {{"long_form": "--region", "kind": "option"}},
                            {{"long_form": "--out", "kind": "output", "extensions": ["vcf"],
                              "construction": {{"method": "from_argument",
                                "argument": "--in", "strip_extension": true}}}}
                        ]
                    }},
                    {{
                        "name": "merger",
                        "executable": "merge",
                        "arguments": [
                            {{"long_form": "--in", "kind": "input", "extensions": ["vcf"],
                              "allow_multiple": true}},
                            {{"long_form": "--out", "kind": "output",
                              "extensions": ["merged.vcf"],
                              "construction": {{"method": "from_argument",
                                "argument": "--in", "strip_extension": true}}}}
                        ]
                    }}
                ],
                "pipelines": [
                    {{
                        "name": "call-merge",
                        "tasks": [
                            {{"name": "call", "tool": "caller"}}{}
                        ],
                        "unique_nodes": [
                            {{"id": "alignments", "task": "call", "argument": "--in"}},
                            {{"id": "regions", "task": "call", "argument": "--region"}}{}
                        ],
                        "shared_nodes": [
                            {{"id": "calls", "refs": {}}}
                        ],
                        "values": [
                            {{"node": "alignments", "values": ["cohort.bam"]}},
                            {{"node": "regions", "values": ["chr1", "chr2", "chr3"]}}
                        ]
                    }}
                ],
                "entry": "call-merge"
            }}"#,
            merge_parts, merge_nodes, vcf_refs
        )
    }

    #[test]
    fn test_region_values_force_division() {
        let set = ConfigSet::from_json(&call_merge_project(false)).unwrap();
        let resolved = resolve(&set).unwrap();
        let graph = &resolved.graph;

        let call = graph.index("call").unwrap();
        assert_eq!(graph.task(call).divisions, 3);
        assert_eq!(graph.task(call).children.len(), 2);

        let calls = graph.index("calls").unwrap();
        assert_eq!(graph.data(calls).values, vec!["cohort_chr1.vcf"]);
        assert_eq!(
            graph.data(graph.index("calls.1").unwrap()).values,
            vec!["cohort_chr2.vcf"]
        );
        assert_eq!(
            graph.data(graph.index("calls.2").unwrap()).values,
            vec!["cohort_chr3.vcf"]
        );

        // One execution per division, each with its own region.
        let plan = &resolved.plan.tasks[0];
        assert_eq!(plan.executions.len(), 3);
    }

    #[test]
    fn test_consolidation_collapses_divisions() {
        let set = ConfigSet::from_json(&call_merge_project(true)).unwrap();
        let resolved = resolve(&set).unwrap();
        let graph = &resolved.graph;

        let merge = graph.index("merge").unwrap();
        assert_eq!(graph.task(merge).divisions, 1);
        // Three incoming data nodes: the division parent and two children.
        assert_eq!(graph.predecessors(merge).len(), 3);

        // The constructed output derives from the un-suffixed base value.
        let merged = graph.index("merged").unwrap();
        assert_eq!(graph.data(merged).values, vec!["cohort.merged.vcf"]);

        // The merge execution depends on all three division outputs.
        let merge_plan = resolved.plan.tasks.iter().find(|t| t.id == "merge").unwrap();
        assert_eq!(merge_plan.executions.len(), 1);
        let mut deps = merge_plan.executions[0].dependencies.clone();
        deps.sort();
        assert_eq!(
            deps,
            vec!["cohort_chr1.vcf", "cohort_chr2.vcf", "cohort_chr3.vcf"]
        );
        assert_eq!(
            merge_plan.executions[0].outputs,
            vec!["cohort.merged.vcf"]
        );
    }

    #[test]
    fn test_workflow_is_permutation_of_tasks() {
        let set = ConfigSet::from_json(&call_merge_project(true)).unwrap();
        let resolved = resolve(&set).unwrap();

        let mut ids = resolved.plan.workflow.clone();
        ids.sort();
        assert_eq!(ids, vec!["call", "merge"]);
    }

    #[test]
    fn test_stub_family_values_stay_symmetric() {
        let json = r#"{
            "tools": [
                {
                    "name": "indexer",
                    "executable": "index",
                    "arguments": [
                        {"long_form": "--in", "kind": "input", "extensions": ["bam"]},
                        {"long_form": "--out", "kind": "output", "stub": true,
                          "stub_extensions": ["bam", "bai"],
                          "construction": {"method": "from_argument",
                            "argument": "--in", "strip_extension": true,
                            "add_text": [{"text": "indexed"}]}}
                    ]
                }
            ],
            "pipelines": [
                {
                    "name": "main",
                    "tasks": [{"name": "index", "tool": "indexer"}],
                    "unique_nodes": [
                        {"id": "raw", "task": "index", "argument": "--in"},
                        {"id": "indexed", "task": "index", "argument": "--out"}
                    ],
                    "values": [
                        {"node": "raw", "values": ["a.bam", "b.bam"]}
                    ]
                }
            ],
            "entry": "main"
        }"#;

        let set = ConfigSet::from_json(json).unwrap();
        let resolved = resolve(&set).unwrap();
        let graph = &resolved.graph;

        let bam = graph.data(graph.index("indexed.bam").unwrap());
        let bai = graph.data(graph.index("indexed.bai").unwrap());
        assert_eq!(bam.values.len(), bai.values.len());
        assert_eq!(bam.values, vec!["a_indexed.bam", "b_indexed.bam"]);
        assert_eq!(bai.values, vec!["a_indexed.bai", "b_indexed.bai"]);
    }

    #[test]
    fn test_run_tag_is_short_hex() {
        let tag = run_tag("p");
        assert_eq!(tag.len(), 8);
        assert!(tag.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
