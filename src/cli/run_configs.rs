//! Stage client and server run configurations without building the remapped jars.

use crate::cli::common::{CommandContext, GlobalOptions};
use anyhow::Result;
use clap::Args;
use colored::Colorize;

/// Stage launch descriptors under `.oldloom/run-configs`.
#[derive(Args, Debug)]
pub struct RunConfigsCommand {}

impl RunConfigsCommand {
    pub fn execute(self, options: &GlobalOptions) -> Result<()> {
        let context = CommandContext::load(options)?;
        let pipeline = context.pipeline()?;
        let staged = pipeline.stage_run_configs()?;
        println!("{} Staged {} run configurations", "✓".green(), staged.len());
        for file in staged {
            println!("  {}", file.display());
        }
        Ok(())
    }
}
