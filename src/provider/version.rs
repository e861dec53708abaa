//! Launcher metadata: the version manifest and per-version JSON.

use serde::Deserialize;
use std::collections::BTreeMap;

/// `version_manifest.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct VersionManifest {
    pub versions: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManifestEntry {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

impl VersionManifest {
    pub fn find(&self, id: &str) -> Option<&ManifestEntry> {
        self.versions.iter().find(|entry| entry.id == id)
    }
}

/// `{version}.json`, restricted to what the pipeline reads.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionMeta {
    pub id: String,
    pub main_class: String,
    #[serde(default)]
    pub minecraft_arguments: Option<String>,
    #[serde(default)]
    pub assets: Option<String>,
    #[serde(default)]
    pub asset_index: Option<AssetIndexRef>,
    pub downloads: Downloads,
    #[serde(default)]
    pub libraries: Vec<Library>,
}

impl VersionMeta {
    /// Asset index id; versions that predate asset indices use `legacy`.
    pub fn asset_index_id(&self) -> &str {
        self.asset_index
            .as_ref()
            .map(|index| index.id.as_str())
            .or(self.assets.as_deref())
            .unwrap_or("legacy")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetIndexRef {
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Downloads {
    pub client: Download,
    #[serde(default)]
    pub server: Option<Download>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Download {
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Library {
    pub name: String,
    #[serde(default)]
    pub downloads: Option<LibraryDownloads>,
    #[serde(default)]
    pub rules: Option<Vec<Rule>>,
    #[serde(default)]
    pub natives: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub extract: Option<ExtractRules>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryDownloads {
    #[serde(default)]
    pub artifact: Option<Artifact>,
    #[serde(default)]
    pub classifiers: Option<BTreeMap<String, Artifact>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Artifact {
    pub path: String,
    pub url: String,
    #[serde(default)]
    pub sha1: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExtractRules {
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    Allow,
    Disallow,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Rule {
    pub action: RuleAction,
    #[serde(default)]
    pub os: Option<OsRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OsRule {
    #[serde(default)]
    pub name: Option<String>,
}

/// Launcher name of the running operating system.
pub fn current_os() -> &'static str {
    match std::env::consts::OS {
        "windows" => "windows",
        "macos" => "osx",
        _ => "linux",
    }
}

fn current_arch_bits() -> &'static str {
    if cfg!(target_pointer_width = "64") { "64" } else { "32" }
}

impl Library {
    /// Whether the library applies on `os`. The last matching rule wins; no rules means allowed.
    pub fn applies_to(&self, os: &str) -> bool {
        let Some(rules) = &self.rules else {
            return true;
        };
        let mut allowed = false;
        for rule in rules {
            let matches = rule
                .os
                .as_ref()
                .and_then(|os_rule| os_rule.name.as_deref())
                .is_none_or(|name| name == os);
            if matches {
                allowed = rule.action == RuleAction::Allow;
            }
        }
        allowed
    }

    /// The regular jar, unless this is a natives-only entry.
    pub fn artifact(&self) -> Option<&Artifact> {
        if self.natives.is_some() {
            return None;
        }
        self.downloads.as_ref()?.artifact.as_ref()
    }

    /// The natives classifier jar for `os`.
    pub fn native_artifact(&self, os: &str) -> Option<&Artifact> {
        let classifier = self.natives.as_ref()?.get(os)?.replace("${arch}", current_arch_bits());
        self.downloads.as_ref()?.classifiers.as_ref()?.get(&classifier)
    }

    pub fn extract_excludes(&self) -> &[String] {
        self.extract.as_ref().map_or(&[], |rules| rules.exclude.as_slice())
    }
}

/// `assets/indexes/{id}.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetIndex {
    pub objects: BTreeMap<String, AssetObject>,
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
    #[serde(default)]
    pub map_to_resources: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetObject {
    pub hash: String,
    #[serde(default)]
    pub size: u64,
}

impl AssetObject {
    /// `{hh}/{hash}`, relative to the objects directory and the resources server.
    pub fn relative_path(&self) -> String {
        format!("{}/{}", self.hash.get(..2).unwrap_or(&self.hash), self.hash)
    }
}

impl AssetIndex {
    /// Whether objects must also be laid out by name under `virtual/{id}`.
    pub const fn needs_virtual_copy(&self) -> bool {
        self.is_virtual || self.map_to_resources
    }
}
