// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 flowmake contributors

//! Graph command - visualize the resolved workflow

use miette::Result;
use std::path::PathBuf;

use super::GraphFormat;
use crate::config::ConfigSet;
use crate::resolve::resolve;

/// Run the graph command
pub async fn run(config_path: PathBuf, format: GraphFormat, _verbose: bool) -> Result<()> {
    if !config_path.exists() {
        return Err(miette::miette!(
            "Project file not found: {}\n\n\
             Create a flowmake.json describing your tools and pipelines.",
            config_path.display()
        ));
    }

    let set = ConfigSet::from_file(&config_path)?;
    let resolved = resolve(&set)?;

    let output = match format {
        GraphFormat::Text => resolved.workflow.to_text(&resolved.graph),
        GraphFormat::Dot => resolved.workflow.to_dot(&resolved.graph),
        GraphFormat::Mermaid => resolved.workflow.to_mermaid(&resolved.graph),
    };

    println!("{}", output);

    Ok(())
}
