//! Resolved, immutable build settings.

use crate::config::{UrlConfig, WorkspaceConfig};
use crate::core::LoomError;
use crate::mappings::Namespace;
use crate::transform::merge::SideAnnotationStyle;
use crate::transform::remap::ClassFilterRule;
use anyhow::{Context, Result};
use semver::Version;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the shared cache root.
pub const CACHE_DIR_ENV: &str = "OLDLOOM_CACHE_DIR";

/// Directory (inside the project) holding project-private state.
pub const PROJECT_STATE_DIR: &str = ".oldloom";

/// Command-line switches that take precedence over the project file.
#[derive(Debug, Clone, Copy, Default)]
pub struct SettingsOverrides {
    pub offline: bool,
    pub refresh_dependencies: bool,
    pub progress: bool,
}

/// Everything the pipeline needs to know about this build
///
/// Built once per invocation by [`Settings::resolve`]; every [`crate::config::AutoFlag`] is
/// inferred at that point and the result is never re-evaluated.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_dir: PathBuf,
    pub minecraft_version: String,
    pub game_version: Version,
    pub offline: bool,
    pub refresh_dependencies: bool,
    pub progress: bool,
    pub launchwrapper: bool,
    pub binpatches: bool,
    pub remap_local_variables: bool,
    pub class_filter: Vec<ClassFilterRule>,
    pub mod_namespace: Namespace,
    pub side_annotation: SideAnnotationStyle,
    pub custom_access_transformers: Vec<PathBuf>,
    pub jarmod_denylist: Vec<String>,
    pub global_cache_dir: PathBuf,
    pub project_cache_dir: PathBuf,
    pub asset_max_age: Option<Duration>,
    pub network_timeout: Duration,
    pub urls: UrlConfig,
}

impl Settings {
    /// Resolve settings from a parsed project file.
    ///
    /// `env_cache_dir` is the value of [`CACHE_DIR_ENV`], passed in so resolution stays a pure
    /// function of its arguments.
    pub fn resolve(
        config: &WorkspaceConfig,
        project_dir: &Path,
        env_cache_dir: Option<PathBuf>,
        overrides: SettingsOverrides,
    ) -> Result<Self> {
        let game_version = parse_game_version(&config.minecraft_version)?;
        let legacy_launch = game_version < Version::new(1, 6, 0);

        let has_sources = !config.dependency_files("minecraft_sources").is_empty();

        let global_cache_dir = match env_cache_dir.or_else(|| config.cache.global_dir.clone()) {
            Some(dir) => absolutize(project_dir, &dir),
            None => default_global_cache_dir()?,
        };

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            minecraft_version: config.minecraft_version.trim().to_string(),
            offline: config.offline || overrides.offline,
            refresh_dependencies: config.refresh_dependencies || overrides.refresh_dependencies,
            progress: overrides.progress,
            launchwrapper: config.forge.launchwrapper.resolve(|| !legacy_launch),
            binpatches: config.forge.binpatches.resolve(|| !legacy_launch),
            remap_local_variables: config.remap.local_variables.resolve(|| !has_sources),
            class_filter: config.remap.class_filter.clone(),
            mod_namespace: config.remap.mod_namespace,
            side_annotation: config.forge.side_annotation,
            custom_access_transformers: config
                .access_transformers
                .custom
                .iter()
                .map(|path| absolutize(project_dir, path))
                .collect(),
            jarmod_denylist: config.jarmod.denylist.clone(),
            global_cache_dir,
            project_cache_dir: project_dir.join(PROJECT_STATE_DIR).join("cache"),
            asset_max_age: config.cache.asset_max_age_secs.map(Duration::from_secs),
            network_timeout: Duration::from_secs(config.cache.network_timeout_secs.max(1)),
            urls: config.urls.clone(),
            game_version,
        })
    }

    /// Directory receiving staged run configurations.
    #[must_use]
    pub fn run_config_dir(&self) -> PathBuf {
        self.project_dir.join(PROJECT_STATE_DIR).join("run-configs")
    }

    /// Game working directory used by run configurations.
    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        self.project_dir.join("run")
    }
}

/// Parse a game version, padding two-component versions (`1.5` becomes `1.5.0`).
pub fn parse_game_version(raw: &str) -> Result<Version> {
    let trimmed = raw.trim();
    let normalized = match trimmed.split('.').count() {
        1 => format!("{trimmed}.0.0"),
        2 => format!("{trimmed}.0"),
        _ => trimmed.to_string(),
    };
    Version::parse(&normalized).map_err(|err| {
        LoomError::Configuration {
            message: format!("minecraft_version '{raw}' is not a release version: {err}"),
        }
        .into()
    })
}

/// `dirs::cache_dir()/oldloom`.
pub fn default_global_cache_dir() -> Result<PathBuf> {
    dirs::cache_dir()
        .map(|dir| dir.join("oldloom"))
        .context("Could not determine the user cache directory; set OLDLOOM_CACHE_DIR")
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() { path.to_path_buf() } else { base.join(path) }
}
