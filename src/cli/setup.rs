//! Build the development workspace.
//!
//! `setup` installs every stage of the pipeline in dependency order. Stages whose outputs
//! already exist load them instead of rebuilding, so a second run touches the network only
//! for conditional checks of the version manifest and asset index.
//!
//! # Examples
//!
//! ```bash
//! oldloom setup
//! oldloom setup --offline
//! oldloom setup --refresh-dependencies
//! ```
//!
//! On success the deobfuscated game jars are printed:
//!
//! ```text
//! ✓ Workspace ready for Minecraft 1.6.4
//!   intermediary  ~/.cache/oldloom/minecraft-1.6.4-intermediary-3f2a….jar
//!   named         ~/.cache/oldloom/minecraft-1.6.4-named-3f2a….jar
//! ```

use crate::cli::common::{CommandContext, GlobalOptions};
use crate::provider::remapped::REMAP_TARGETS;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::info;

/// Install every pipeline stage.
#[derive(Args, Debug)]
pub struct SetupCommand {
    /// Also print mod dependency and run configuration outputs
    #[arg(long)]
    all_outputs: bool,
}

impl SetupCommand {
    pub fn execute(self, options: &GlobalOptions) -> Result<()> {
        let context = CommandContext::load(options)?;
        let pipeline = context.pipeline()?;
        info!(
            "Setting up Minecraft {} from {}",
            context.settings.minecraft_version,
            context.config_path.display()
        );
        pipeline.install_all()?;

        println!(
            "{} Workspace ready for Minecraft {}",
            "✓".green(),
            context.settings.minecraft_version.bold()
        );
        for namespace in REMAP_TARGETS {
            let jar = pipeline.game_jar(namespace)?;
            println!("  {:<13} {}", namespace.as_str().cyan(), jar.display());
        }

        if self.all_outputs {
            let mods = pipeline.graph.get(pipeline.mod_dependencies)?;
            for file in mods.files() {
                println!("  {:<13} {}", "mod".cyan(), file.display());
            }
            let run_configs = pipeline.graph.get(pipeline.run_configs)?;
            for file in run_configs.staged() {
                println!("  {:<13} {}", "run-config".cyan(), file.display());
            }
        }
        Ok(())
    }
}
