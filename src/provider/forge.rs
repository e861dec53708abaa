//! The mod loader archive and what the pipeline takes from it.

use crate::cache::CacheKey;
use crate::core::Side;
use crate::jar::Jar;
use crate::provider::context::StageContext;
use crate::provider::graph::Provider;
use crate::provider::minecraft::read_json;
use crate::transform::BinpatchSet;
use crate::utils::fs::{atomic_write, calculate_sha1};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How the loader is applied to the game jar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForgeMode {
    /// Per-class binary patches against the vanilla jars
    Binpatch,
    /// The archive is overlaid onto the merged jar
    Jarmod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForgeManifest {
    mode: ForgeMode,
    access_transformers: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ForgeProvider {
    archive: PathBuf,
    dir: PathBuf,
    key: CacheKey,
    manifest: Option<ForgeManifest>,
}

const MANIFEST_FILE: &str = "forge.json";

impl ForgeProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// The resolved `forge` artifact.
    pub fn archive(&self) -> &Path {
        &self.archive
    }

    pub fn mode(&self) -> ForgeMode {
        self.manifest.as_ref().map_or(ForgeMode::Jarmod, |manifest| manifest.mode)
    }

    /// Extracted access transformer configs, in archive order.
    pub fn access_transformers(&self) -> Vec<PathBuf> {
        self.manifest
            .iter()
            .flat_map(|manifest| manifest.access_transformers.iter())
            .map(|name| self.dir.join(name))
            .collect()
    }
}

/// Root-level `*_at.cfg` entries.
fn is_access_transformer(name: &str) -> bool {
    !name.contains('/') && name.ends_with("_at.cfg")
}

impl Provider for ForgeProvider {
    fn name(&self) -> &'static str {
        "forge"
    }

    fn setup(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        self.archive = ctx.resolver().resolve_single("forge")?;
        let sha1 = calculate_sha1(&self.archive)?;
        self.key = CacheKey::new()
            .with("forge", &sha1)
            .with("binpatches", ctx.settings().binpatches.to_string());
        self.dir = ctx.cache().resolve_dir(&format!("forge/{}", self.key.hash()), false)?;
        Ok(())
    }

    fn install(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let archive = Jar::read(&self.archive)?;

        let mut access_transformers = Vec::new();
        for (name, data) in archive.entries() {
            if is_access_transformer(name) {
                atomic_write(&self.dir.join(name), data)?;
                access_transformers.push(name.to_string());
            }
        }

        let has_patches = BinpatchSet::present_in(&archive);
        let mode = match (ctx.settings().binpatches, has_patches) {
            (true, true) => ForgeMode::Binpatch,
            (true, false) => {
                warn!(
                    "{} has no {} payload, applying it as a jarmod",
                    self.archive.display(),
                    BinpatchSet::directory(Side::Client)
                );
                ForgeMode::Jarmod
            }
            (false, true) => {
                warn!("{} carries binpatches but binpatches are disabled", self.archive.display());
                ForgeMode::Jarmod
            }
            (false, false) => ForgeMode::Jarmod,
        };
        debug!("Forge mode {mode:?}, {} access transformer(s)", access_transformers.len());

        let manifest = ForgeManifest { mode, access_transformers };
        let json = serde_json::to_vec_pretty(&manifest).context("Failed to serialize forge manifest")?;
        atomic_write(&self.dir.join(MANIFEST_FILE), &json)?;
        self.manifest = Some(manifest);
        Ok(())
    }

    fn load(&mut self, _ctx: &StageContext<'_>) -> Result<()> {
        self.manifest = Some(read_json(&self.dir.join(MANIFEST_FILE))?);
        Ok(())
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.dir.join(MANIFEST_FILE)]
    }

    fn cache_key(&self) -> Option<&CacheKey> {
        Some(&self.key)
    }
}
