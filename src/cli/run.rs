// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Run command - resolve, emit, and execute the pipeline

use colored::Colorize;
use miette::Result;
use std::path::PathBuf;

use crate::config::ConfigSet;
use crate::emit::{BuildRunner, MakeRunner, MakefileEmitter};
use crate::resolve::resolve;
use crate::utils::create_spinner;

/// Run the pipeline
pub async fn run(
    config_path: PathBuf,
    makefile_path: PathBuf,
    dry_run: bool,
    jobs: Option<usize>,
    verbose: bool,
) -> Result<()> {
    if !config_path.exists() {
        return Err(miette::miette!(
            "Project file not found: {}\n\n\
             Create a flowmake.json describing your tools and pipelines.",
            config_path.display()
        ));
    }

    let set = ConfigSet::from_file(&config_path)?;
    let resolved = resolve(&set)?;

    println!();
    println!("{}: {}", "Pipeline".bold(), set.entry);
    println!("{}", "═".repeat(50));
    println!(
        "Execution plan ({} task{}):",
        resolved.plan.workflow.len(),
        if resolved.plan.workflow.len() == 1 { "" } else { "s" }
    );
    println!();
    print!("{}", resolved.workflow.to_text(&resolved.graph));
    println!();

    if verbose {
        for task in &resolved.plan.tasks {
            for execution in &task.executions {
                println!(
                    "  {} {} [{}.{}] → {}",
                    "→".blue(),
                    execution.task_node,
                    execution.division,
                    execution.subphase,
                    execution.outputs.join(", ")
                );
            }
        }
        println!();
    }

    let registry = set.registry()?;
    MakefileEmitter::new(&registry).write(&resolved.plan, &makefile_path)?;
    println!(
        "  {} Wrote {}",
        "✓".green(),
        makefile_path.display().to_string().bold()
    );

    if dry_run {
        println!();
        println!("{}", "Dry run - skipping execution.".yellow());
        return Ok(());
    }

    let runner = MakeRunner::new();
    if !runner.check_available().await? {
        return Err(miette::miette!(
            "'make' not found in PATH - install GNU make or use --dry-run"
        ));
    }

    let working_dir = std::env::current_dir()
        .map_err(|e| miette::miette!("Failed to get current directory: {}", e))?;

    let spinner = create_spinner("Running make...");
    let result = runner.execute(&makefile_path, &working_dir, jobs).await?;
    spinner.finish_and_clear();

    if !result.stdout.is_empty() && verbose {
        println!("{}", result.stdout.dimmed());
    }

    println!();
    if result.success {
        println!(
            "{}",
            format!(
                "Pipeline completed successfully in {:.2}s",
                result.duration.as_secs_f64()
            )
            .green()
        );
        Ok(())
    } else {
        if !result.stderr.is_empty() {
            eprintln!("{}", result.stderr.dimmed());
        }
        println!(
            "{}",
            format!("Pipeline failed after {:.2}s", result.duration.as_secs_f64()).red()
        );
        Err(miette::miette!("make exited with code {}", result.exit_code))
    }
}
