//! Shared plumbing for CLI commands: locating the project file and building a pipeline.

use crate::config::{
    CACHE_DIR_ENV, CONFIG_FILE_NAME, PROJECT_STATE_DIR, Settings, SettingsOverrides, WorkspaceConfig,
    default_global_cache_dir,
};
use crate::core::LoomError;
use crate::fetch::ReqwestTransport;
use crate::host::{JsonRunConfigSink, StaticResolver};
use crate::provider::{Environment, Pipeline};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Global flags, resolved once before a command runs.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub project_dir: PathBuf,
    pub config: Option<PathBuf>,
    pub offline: bool,
    pub refresh_dependencies: bool,
    pub progress: bool,
}

impl GlobalOptions {
    /// The project file this invocation reads.
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(|| self.project_dir.join(CONFIG_FILE_NAME))
    }

    const fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            offline: self.offline,
            refresh_dependencies: self.refresh_dependencies,
            progress: self.progress,
        }
    }
}

/// A loaded project: its file, parsed configuration and resolved settings.
#[derive(Debug)]
pub struct CommandContext {
    pub config_path: PathBuf,
    pub config: WorkspaceConfig,
    pub settings: Settings,
}

impl CommandContext {
    /// Load and resolve the project file named by `options`.
    ///
    /// # Errors
    /// Returns a configuration error when the file is missing, and propagates parse and
    /// resolution failures.
    pub fn load(options: &GlobalOptions) -> Result<Self> {
        let config_path = options.config_path();
        if !config_path.exists() {
            return Err(LoomError::Configuration {
                message: format!(
                    "no {CONFIG_FILE_NAME} found at {}; create one with at least minecraft_version",
                    config_path.display()
                ),
            }
            .into());
        }
        let config = WorkspaceConfig::load_from(&config_path)?;
        let settings = Settings::resolve(&config, &options.project_dir, env_cache_dir(), options.overrides())
            .with_context(|| format!("Failed to resolve settings from {}", config_path.display()))?;
        Ok(Self {
            config_path,
            config,
            settings,
        })
    }

    /// Wire the production adapters into a fresh pipeline.
    pub fn pipeline(&self) -> Result<Pipeline> {
        let transport = ReqwestTransport::new(self.settings.network_timeout)?;
        let resolver = StaticResolver::from_config(&self.config, &self.settings.project_dir);
        let sink = JsonRunConfigSink::new(self.settings.run_config_dir());
        let env = Environment::new(
            self.settings.clone(),
            Box::new(transport),
            Box::new(resolver),
            Box::new(sink),
        );
        Ok(Pipeline::new(env))
    }
}

/// `OLDLOOM_CACHE_DIR`, when set and non-empty.
pub fn env_cache_dir() -> Option<PathBuf> {
    std::env::var_os(CACHE_DIR_ENV)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Cache roots for commands that must work without a project file.
///
/// Uses the project file when one exists, so `[cache] global_dir` is honoured.
pub fn cache_roots(options: &GlobalOptions) -> Result<(PathBuf, PathBuf)> {
    if options.config_path().exists() {
        let context = CommandContext::load(options)?;
        return Ok((context.settings.global_cache_dir, context.settings.project_cache_dir));
    }
    let global = match env_cache_dir() {
        Some(dir) => absolutize(&options.project_dir, &dir),
        None => default_global_cache_dir()?,
    };
    let project = options.project_dir.join(PROJECT_STATE_DIR).join("cache");
    Ok((global, project))
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() { path.to_path_buf() } else { base.join(path) }
}

/// Human-readable byte count.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 { format!("{bytes} B") } else { format!("{value:.1} {}", UNITS[unit]) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn options(project_dir: &Path) -> GlobalOptions {
        GlobalOptions {
            project_dir: project_dir.to_path_buf(),
            config: None,
            offline: true,
            refresh_dependencies: false,
            progress: false,
        }
    }

    #[test]
    fn test_missing_project_file_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        let err = CommandContext::load(&options(temp.path())).unwrap_err();
        assert!(matches!(err.downcast_ref::<LoomError>(), Some(LoomError::Configuration { .. })));
    }

    #[test]
    fn test_load_applies_overrides() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "minecraft_version = \"1.6.4\"\n[cache]\nglobal_dir = \"shared\"\n",
        )
        .unwrap();
        let context = CommandContext::load(&options(temp.path())).unwrap();
        assert!(context.settings.offline);
        assert_eq!(context.settings.minecraft_version, "1.6.4");
        assert_eq!(
            context.settings.project_cache_dir,
            temp.path().join(PROJECT_STATE_DIR).join("cache")
        );
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }
}
