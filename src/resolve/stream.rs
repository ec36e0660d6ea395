// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Stream validation
//!
//! Tasks wired to pipe output directly into the next task's input must be
//! mutually configured for it: the producer flagged as an output stream
//! with an argument carrying stream-output instructions, the consumer
//! flagged as an input stream with stream-input instructions on its
//! consuming edge, exactly one consumer per streaming output node, and the
//! pair adjacent in the resolved workflow. Division children share their
//! parent's position for the adjacency check.

use std::collections::HashSet;

use petgraph::graph::EdgeIndex;
use tracing::debug;

use crate::errors::{FlowmakeError, FlowmakeResult};
use crate::graph::{NodeKind, PipelineGraph};
use crate::resolve::workflow::Workflow;

/// One validated producer/consumer stream pairing
#[derive(Debug, Clone)]
pub struct StreamLink {
    pub producer: String,
    pub consumer: String,
    pub argument: String,
}

/// Validate all streaming tasks and mark the paired edges
pub fn validate_streams(
    graph: &mut PipelineGraph,
    workflow: &Workflow,
) -> FlowmakeResult<Vec<StreamLink>> {
    let mut links = Vec::new();
    let mut stream_edges: Vec<EdgeIndex> = Vec::new();
    let mut consumers: HashSet<String> = HashSet::new();

    for producer in graph.task_nodes() {
        let producer_data = graph.task(producer);
        if !producer_data.is_output_stream {
            continue;
        }
        let producer_id = producer_data.id.clone();

        let streaming_outputs: Vec<_> = graph
            .out_edges(producer)
            .into_iter()
            .filter(|&(node, edge)| {
                graph.node(node).kind() != NodeKind::Task
                    && graph.edge(edge).output_stream.is_some()
            })
            .collect();

        if streaming_outputs.is_empty() {
            return Err(FlowmakeError::Stream {
                task: producer_id,
                reason: "flagged as an output stream but no output argument declares stream instructions".into(),
            });
        }

        let producer_task = graph.task(producer);
        if streaming_outputs.len() > 1
            && producer_task.subphases == 1
            && producer_task.divisions == 1
        {
            return Err(FlowmakeError::Stream {
                task: producer_id,
                reason: format!(
                    "{} streaming outputs but only one execution",
                    streaming_outputs.len()
                ),
            });
        }

        let mut resolved = 0usize;
        for (node, producer_edge) in &streaming_outputs {
            let downstream: Vec<_> = graph
                .successors(*node)
                .into_iter()
                .filter(|&s| graph.node(s).kind() == NodeKind::Task)
                .collect();

            if downstream.len() != 1 {
                return Err(FlowmakeError::Stream {
                    task: producer_id.clone(),
                    reason: format!(
                        "streaming output '{}' has {} consumers, exactly one is required",
                        graph.id(*node),
                        downstream.len()
                    ),
                });
            }
            let consumer = downstream[0];
            let consumer_data = graph.task(consumer);
            let consumer_id = consumer_data.id.clone();

            if !consumer_data.is_input_stream {
                return Err(FlowmakeError::Stream {
                    task: producer_id.clone(),
                    reason: format!(
                        "consumer '{}' is not flagged as an input stream",
                        consumer_id
                    ),
                });
            }

            let consumer_edge = graph
                .edges_between(*node, consumer)
                .into_iter()
                .find(|&e| graph.edge(e).input_stream.is_some())
                .ok_or_else(|| FlowmakeError::Stream {
                    task: consumer_id.clone(),
                    reason: format!(
                        "consuming argument of '{}' declares no stream-input instructions",
                        graph.id(*node)
                    ),
                })?;

            let producer_pos = workflow.position(graph, producer);
            let consumer_pos = workflow.position(graph, consumer);
            match (producer_pos, consumer_pos) {
                (Some(p), Some(c)) if c == p + 1 => {}
                _ => {
                    return Err(FlowmakeError::Stream {
                        task: producer_id.clone(),
                        reason: format!(
                            "consumer '{}' does not directly follow its producer in the workflow",
                            consumer_id
                        ),
                    });
                }
            }

            if !consumers.insert(consumer_id.clone()) {
                return Err(FlowmakeError::Stream {
                    task: consumer_id.clone(),
                    reason: "already paired with another streaming producer".into(),
                });
            }

            stream_edges.push(*producer_edge);
            stream_edges.push(consumer_edge);
            resolved += 1;
            links.push(StreamLink {
                producer: producer_id.clone(),
                consumer: consumer_id,
                argument: graph.edge(*producer_edge).long_form.clone(),
            });
        }

        if resolved != streaming_outputs.len() {
            return Err(FlowmakeError::Stream {
                task: producer_id,
                reason: format!(
                    "{} streaming outputs resolved to {} consumers",
                    streaming_outputs.len(),
                    resolved
                ),
            });
        }
    }

    // Every task expecting a stream must have been paired.
    for task in graph.task_nodes() {
        let data = graph.task(task);
        if data.is_input_stream && !consumers.contains(&data.id) {
            return Err(FlowmakeError::Stream {
                task: data.id.clone(),
                reason: "flagged as an input stream but no producer streams into it".into(),
            });
        }
    }

    for edge in stream_edges {
        graph.edge_mut(edge).is_stream = true;
    }

    debug!(links = links.len(), "streams validated");
    Ok(links)
}
