//! Inspect and clean the cache roots.
//!
//! Works without a project file: the shared root then comes from `OLDLOOM_CACHE_DIR` or the
//! platform cache directory, and the project root from `--project-dir`.
//!
//! ```bash
//! oldloom cache info
//! oldloom cache clean            # project cache only
//! oldloom cache clean --global   # shared cache only
//! oldloom cache clean --project --global
//! ```

use crate::cache::{CacheDirectory, CacheRootInfo};
use crate::cli::common::{GlobalOptions, cache_roots, format_size};
use anyhow::Result;
use clap::{Args, Subcommand};
use colored::Colorize;
use std::path::Path;
use tracing::info;

/// Inspect or clean the caches.
#[derive(Args, Debug)]
pub struct CacheCommand {
    #[command(subcommand)]
    command: CacheSubcommand,
}

#[derive(Subcommand, Debug)]
enum CacheSubcommand {
    /// Show cache locations and sizes
    Info,

    /// Delete cached artifacts (the project cache unless --global is given)
    Clean {
        /// Clean the project cache
        #[arg(long)]
        project: bool,

        /// Clean the shared cache used by every project
        #[arg(long)]
        global: bool,
    },
}

impl CacheCommand {
    pub fn execute(self, options: &GlobalOptions) -> Result<()> {
        let (global, project) = cache_roots(options)?;
        let cache = CacheDirectory::new(global, project);
        match self.command {
            CacheSubcommand::Info => {
                print_root("global", &cache.global_info()?);
                print_root("project", &cache.project_info()?);
            }
            CacheSubcommand::Clean { project, global } => {
                let (project, global) = clean_targets(project, global);
                if project {
                    report_clean("project", cache.project_root(), cache.clean_project()?);
                }
                if global {
                    report_clean("global", cache.global_root(), cache.clean_global()?);
                }
            }
        }
        Ok(())
    }
}

/// `(project, global)` roots to clean; neither flag means the project root alone.
const fn clean_targets(project: bool, global: bool) -> (bool, bool) {
    (project || !global, global)
}

fn print_root(label: &str, root: &CacheRootInfo) {
    let size = if root.exists {
        format_size(root.size_bytes)
    } else {
        "not created".dimmed().to_string()
    };
    println!("{:<8} {}  {}", label.bold(), root.path.display(), size);
}

fn report_clean(label: &str, path: &Path, removed: bool) {
    let path = path.display();
    if removed {
        info!("Removed {label} cache {path}");
        println!("{} Cleaned {label} cache {path}", "✓".green());
    } else {
        println!("{label} cache {path} is already empty");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_targets_default_to_project() {
        assert_eq!(clean_targets(false, false), (true, false));
        assert_eq!(clean_targets(false, true), (false, true));
        assert_eq!(clean_targets(true, true), (true, true));
    }
}
