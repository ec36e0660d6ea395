// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Validate command - run a full resolution and report

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::config::ConfigSet;
use crate::resolve::resolve;

/// Run the validate command
pub async fn run(config_path: PathBuf, verbose: bool) -> Result<()> {
    println!("{}", "Validating pipeline...".bold());
    println!();

    if !config_path.exists() {
        return Err(miette::miette!(
            "Project file not found: {}\n\n\
             Create a flowmake.json describing your tools and pipelines.",
            config_path.display()
        ));
    }

    let set = match ConfigSet::from_file(&config_path) {
        Ok(set) => set,
        Err(e) => {
            eprintln!("  {} Failed to parse project file", "✗".red());
            eprintln!();
            return Err(e.into());
        }
    };
    println!("  {} Project file is valid JSON", "✓".green());

    let resolved = match resolve(&set) {
        Ok(resolved) => resolved,
        Err(e) => {
            eprintln!("  {} Resolution failed", "✗".red());
            eprintln!();
            return Err(e.into());
        }
    };
    println!(
        "  {} Graph resolved ({} nodes, {} edges)",
        "✓".green(),
        resolved.graph.node_count(),
        resolved.graph.edge_count()
    );
    println!(
        "  {} Workflow ordered ({} tasks)",
        "✓".green(),
        resolved.plan.workflow.len()
    );
    if !resolved.links.is_empty() {
        println!(
            "  {} Streams paired ({} links)",
            "✓".green(),
            resolved.links.len()
        );
    }

    if verbose {
        println!();
        println!("{}:", "Pipeline summary".bold());
        println!("  Entry: {}", set.entry);
        for task in &resolved.plan.tasks {
            println!(
                "    - {} ({}, {} execution{})",
                task.id,
                task.tool,
                task.executions.len(),
                if task.executions.len() == 1 { "" } else { "s" }
            );
        }
    }

    println!();
    println!("{}", "Pipeline is valid!".green().bold());
    Ok(())
}
