//! The project file, `oldloom.toml`.

use crate::config::AutoFlag;
use crate::mappings::Namespace;
use crate::transform::merge::SideAnnotationStyle;
use crate::transform::remap::ClassFilterRule;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Default project file name, looked up in the project directory.
pub const CONFIG_FILE_NAME: &str = "oldloom.toml";

/// Launcher metadata listing every released game version.
pub const DEFAULT_VERSION_MANIFEST_URL: &str =
    "https://launchermeta.mojang.com/mc/game/version_manifest.json";

/// Content-addressed asset object store.
pub const DEFAULT_RESOURCES_URL: &str = "https://resources.download.minecraft.net";

/// Contents of `oldloom.toml`
///
/// ```toml
/// minecraft_version = "1.6.4"
///
/// [dependencies]
/// forge = ["libs/forge-1.6.4-9.11.1.965-universal.jar"]
/// mappings = ["libs/mcp-811.zip"]
/// mod_compile = ["libs/some-mod-dev.jar"]
///
/// [access_transformers]
/// custom = ["src/main/resources/mymod_at.cfg"]
///
/// [remap]
/// local_variables = "auto"
/// class_filter = [{ prefix = "com/google/", action = "skip" }]
///
/// [forge]
/// launchwrapper = "auto"
/// binpatches = "auto"
/// ```
///
/// Relative paths are resolved against the project directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Game version, e.g. `1.4.7` or `1.7.10`
    pub minecraft_version: String,

    /// Never touch the network; use cached downloads only
    #[serde(default)]
    pub offline: bool,

    /// Delete and rebuild every stage output
    #[serde(default)]
    pub refresh_dependencies: bool,

    /// Dependency configurations: configuration name to artifact files
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<PathBuf>>,

    #[serde(default)]
    pub access_transformers: AccessTransformerConfig,

    #[serde(default)]
    pub remap: RemapConfig,

    #[serde(default)]
    pub forge: ForgeConfig,

    #[serde(default)]
    pub jarmod: JarmodConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub urls: UrlConfig,
}

/// `[access_transformers]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessTransformerConfig {
    /// Project-supplied transformer files, applied on top of the bundled ones
    #[serde(default)]
    pub custom: Vec<PathBuf>,
}

/// `[remap]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemapConfig {
    /// Give local variables readable synthetic names
    #[serde(default)]
    pub local_variables: AutoFlag,

    /// Packages to leave unmapped or drop from remapped output
    #[serde(default)]
    pub class_filter: Vec<ClassFilterRule>,

    /// Namespace that `mod_compile` artifacts are published in
    #[serde(default = "default_mod_namespace")]
    pub mod_namespace: Namespace,
}

impl Default for RemapConfig {
    fn default() -> Self {
        Self {
            local_variables: AutoFlag::Inferred,
            class_filter: Vec::new(),
            mod_namespace: default_mod_namespace(),
        }
    }
}

const fn default_mod_namespace() -> Namespace {
    Namespace::Intermediary
}

/// `[forge]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ForgeConfig {
    /// Launch through `net.minecraft.launchwrapper.Launch`
    #[serde(default)]
    pub launchwrapper: AutoFlag,

    /// Apply forge as binary patches rather than as a jar overlay
    #[serde(default)]
    pub binpatches: AutoFlag,

    /// Annotation used to tag side-only classes and members in the merged jar
    #[serde(default)]
    pub side_annotation: SideAnnotationStyle,
}

/// `[jarmod]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JarmodConfig {
    /// Glob patterns of overlay entries that must never reach the output
    #[serde(default = "default_jarmod_denylist")]
    pub denylist: Vec<String>,
}

impl Default for JarmodConfig {
    fn default() -> Self {
        Self {
            denylist: default_jarmod_denylist(),
        }
    }
}

/// Forge's deobfuscation data makes FML believe it runs obfuscated; the dev
/// workspace must not ship it.
fn default_jarmod_denylist() -> Vec<String> {
    vec!["deobfuscation_data*.lzma".to_string()]
}

/// `[cache]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Shared cache root; `OLDLOOM_CACHE_DIR` takes precedence
    #[serde(default)]
    pub global_dir: Option<PathBuf>,

    /// Re-download asset indexes older than this, ignoring ETags
    #[serde(default)]
    pub asset_max_age_secs: Option<u64>,

    /// Per-request network timeout
    #[serde(default = "default_network_timeout_secs")]
    pub network_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            global_dir: None,
            asset_max_age_secs: None,
            network_timeout_secs: default_network_timeout_secs(),
        }
    }
}

const fn default_network_timeout_secs() -> u64 {
    30
}

/// `[urls]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlConfig {
    #[serde(default = "default_version_manifest")]
    pub version_manifest: String,
    #[serde(default = "default_resources")]
    pub resources: String,
}

impl Default for UrlConfig {
    fn default() -> Self {
        Self {
            version_manifest: default_version_manifest(),
            resources: default_resources(),
        }
    }
}

fn default_version_manifest() -> String {
    DEFAULT_VERSION_MANIFEST_URL.to_string()
}

fn default_resources() -> String {
    DEFAULT_RESOURCES_URL.to_string()
}

impl WorkspaceConfig {
    /// Load and parse a project file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read project config from {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("Failed to parse project config from {}", path.display()))
    }

    /// Parse project file contents.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        if config.minecraft_version.trim().is_empty() {
            return Err(crate::core::LoomError::Configuration {
                message: "minecraft_version must not be empty".to_string(),
            }
            .into());
        }
        Ok(config)
    }

    /// Files declared for a dependency configuration (possibly none).
    #[must_use]
    pub fn dependency_files(&self, configuration: &str) -> &[PathBuf] {
        self.dependencies.get(configuration).map_or(&[], Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = WorkspaceConfig::parse("minecraft_version = \"1.4.7\"").unwrap();
        assert_eq!(config.minecraft_version, "1.4.7");
        assert_eq!(config.remap.local_variables, AutoFlag::Inferred);
        assert_eq!(config.remap.mod_namespace, Namespace::Intermediary);
        assert_eq!(config.cache.network_timeout_secs, 30);
        assert_eq!(config.jarmod.denylist, vec!["deobfuscation_data*.lzma"]);
        assert!(config.dependency_files("forge").is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = WorkspaceConfig::parse(
            r#"
minecraft_version = "1.6.4"
offline = true

[dependencies]
forge = ["libs/forge.jar"]

[remap]
local_variables = false
mod_namespace = "named"
class_filter = [{ prefix = "com/google/", action = "drop" }]

[forge]
binpatches = "true"
side_annotation = "fabric"

[cache]
global_dir = "/tmp/loom"
asset_max_age_secs = 3600
"#,
        )
        .unwrap();
        assert!(config.offline);
        assert_eq!(config.dependency_files("forge"), [PathBuf::from("libs/forge.jar")]);
        assert_eq!(config.remap.local_variables, AutoFlag::Explicit(false));
        assert_eq!(config.remap.mod_namespace, Namespace::Named);
        assert_eq!(config.remap.class_filter.len(), 1);
        assert_eq!(config.forge.binpatches, AutoFlag::Explicit(true));
        assert_eq!(config.forge.side_annotation, SideAnnotationStyle::Fabric);
        assert_eq!(config.cache.asset_max_age_secs, Some(3600));
    }

    #[test]
    fn test_missing_version_is_rejected() {
        assert!(WorkspaceConfig::parse("offline = true").is_err());
        assert!(WorkspaceConfig::parse("minecraft_version = \"  \"").is_err());
    }
}
