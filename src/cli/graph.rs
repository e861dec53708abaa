//! Show the stage graph.
//!
//! Stages are listed in topological order with their dependencies, lifecycle state and
//! whether their outputs live in the project cache. With `--paths` every stage is set up
//! first, which resolves output locations without doing any expensive work.
//!
//! ```text
//! minecraft            global   set-up
//! libraries            global   set-up     <- minecraft
//! ...
//! mod-dependencies     project  set-up     <- mappings, remapped, libraries
//! ```

use crate::cli::common::{CommandContext, GlobalOptions};
use crate::provider::{NodeId, NodeState, ProviderGraph};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use std::path::PathBuf;

/// Show stages in dependency order.
#[derive(Args, Debug)]
pub struct GraphCommand {
    /// Set up every stage and list its output paths
    #[arg(long)]
    paths: bool,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct StageSummary {
    name: &'static str,
    state: String,
    projectmapped: bool,
    dependencies: Vec<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    outputs: Vec<PathBuf>,
}

impl GraphCommand {
    pub fn execute(self, options: &GlobalOptions) -> Result<()> {
        let context = CommandContext::load(options)?;
        let pipeline = context.pipeline()?;
        let graph = &pipeline.graph;
        if self.paths {
            for node in graph.topological_order()? {
                graph.reach(node, NodeState::SetUp)?;
            }
        }

        let stages = summarize(graph)?;
        if self.json {
            println!("{}", serde_json::to_string_pretty(&stages)?);
            return Ok(());
        }
        for stage in &stages {
            let scope = if stage.projectmapped { "project".yellow() } else { "global".normal() };
            let mut line = format!("{:<20} {:<8} {:<10}", stage.name.bold(), scope, stage.state);
            if !stage.dependencies.is_empty() {
                line.push_str(&format!(" <- {}", stage.dependencies.join(", ")).dimmed().to_string());
            }
            println!("{line}");
            for output in &stage.outputs {
                println!("    {}", output.display());
            }
        }
        Ok(())
    }
}

fn summarize(graph: &ProviderGraph) -> Result<Vec<StageSummary>> {
    graph
        .topological_order()?
        .into_iter()
        .map(|node: NodeId| {
            let dependencies = graph
                .dependencies(node)?
                .iter()
                .map(|dep| graph.name(*dep))
                .collect::<Result<Vec<_>>>()?;
            Ok(StageSummary {
                name: graph.name(node)?,
                state: graph.state(node)?.to_string(),
                projectmapped: graph.is_projectmapped(node)?,
                dependencies,
                outputs: graph.outputs(node)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Pipeline;
    use crate::test_utils::{CountingTransport, test_environment};
    use tempfile::TempDir;

    #[test]
    fn test_summary_lists_every_stage_before_setup() {
        let temp = TempDir::new().unwrap();
        let pipeline = Pipeline::new(test_environment(temp.path(), "", CountingTransport::new()).unwrap());
        let stages = summarize(&pipeline.graph).unwrap();

        assert_eq!(stages.len(), 13);
        let position = |name: &str| stages.iter().position(|stage| stage.name == name).unwrap();
        assert!(position("minecraft") < position("libraries"));
        assert!(position("forge") < position("binpatched"));
        assert!(stages.iter().all(|stage| stage.outputs.is_empty()));
        let remapped = stages.iter().find(|stage| stage.name == "remapped").unwrap();
        assert!(remapped.dependencies.contains(&"mappings"));
        assert!(!remapped.projectmapped);
    }
}
