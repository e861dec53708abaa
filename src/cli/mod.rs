//! Command-line interface for oldloom
//!
//! ```text
//! oldloom [--verbose|--quiet] [--no-progress] [--config FILE] [--project-dir DIR]
//!         [--offline] [--refresh-dependencies] <command>
//!
//! setup                 install every pipeline stage
//! run-configs           stage client and server run configurations
//! graph [--paths]       show stages in dependency order
//! mappings <query>      look up a class or member in every namespace
//! cache info            show cache locations and sizes
//! cache clean           delete cached artifacts
//! ```
//!
//! Every command loads `oldloom.toml` from the project directory (or `--config`), resolves
//! it into [`crate::config::Settings`], and drives the [`crate::provider::Pipeline`].

mod cache;
pub mod common;
mod graph;
mod mappings;
mod run_configs;
mod setup;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::{Parser, Subcommand};
use common::GlobalOptions;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Runtime configuration derived from the global flags.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log filter; `None` defers to `RUST_LOG`, then `info`
    pub log_level: Option<String>,
    /// Hide progress bars
    pub no_progress: bool,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the global tracing subscriber. Later calls are ignored.
    pub fn init_logging(&self) {
        let filter = match &self.log_level {
            Some(level) => EnvFilter::new(level),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        };
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

/// Reconstruct a development workspace for legacy Forge mods.
#[derive(Parser, Debug)]
#[command(
    name = "oldloom",
    about = "Development workspace builder for legacy Forge mods",
    version,
    long_about = "oldloom fetches, patches, merges and deobfuscates old Minecraft releases \
                  so that mods can be developed and debugged against readable names."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Show debug output, including cache decisions
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Hide progress bars
    #[arg(long, global = true)]
    no_progress: bool,

    /// Project file to use instead of `{project-dir}/oldloom.toml`
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Project directory (defaults to the current directory)
    #[arg(long, global = true)]
    project_dir: Option<PathBuf>,

    /// Never touch the network; cached files only
    #[arg(long, global = true)]
    offline: bool,

    /// Delete and rebuild every stage output this run touches
    #[arg(long, global = true)]
    refresh_dependencies: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install every pipeline stage
    Setup(setup::SetupCommand),

    /// Stage client and server run configurations
    RunConfigs(run_configs::RunConfigsCommand),

    /// Show the stage graph in dependency order
    Graph(graph::GraphCommand),

    /// Look up a class or member name across namespaces
    Mappings(mappings::MappingsCommand),

    /// Inspect or clean the caches
    Cache(cache::CacheCommand),
}

impl Cli {
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            Some("error".to_string())
        } else {
            None
        };
        CliConfig {
            log_level,
            no_progress: self.no_progress || self.quiet,
        }
    }

    fn global_options(&self) -> Result<GlobalOptions> {
        let project_dir = match &self.project_dir {
            Some(dir) => dir.clone(),
            None => std::env::current_dir()?,
        };
        Ok(GlobalOptions {
            project_dir,
            config: self.config.clone(),
            offline: self.offline,
            refresh_dependencies: self.refresh_dependencies,
            progress: !(self.no_progress || self.quiet),
        })
    }

    /// Initialise logging and run the selected command.
    pub fn execute(self) -> Result<()> {
        let config = self.build_config();
        config.init_logging();
        self.execute_with_config(&config)
    }

    pub fn execute_with_config(self, _config: &CliConfig) -> Result<()> {
        let options = self.global_options()?;
        match self.command {
            Commands::Setup(cmd) => cmd.execute(&options),
            Commands::RunConfigs(cmd) => cmd.execute(&options),
            Commands::Graph(cmd) => cmd.execute(&options),
            Commands::Mappings(cmd) => cmd.execute(&options),
            Commands::Cache(cmd) => cmd.execute(&options),
        }
    }
}
