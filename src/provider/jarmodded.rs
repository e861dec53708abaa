//! The merged jar with jarmods laid over it.

use crate::cache::CacheKey;
use crate::jar::Jar;
use crate::provider::context::{Environment, StageContext};
use crate::provider::forge::{ForgeMode, ForgeProvider};
use crate::provider::graph::{Node, Provider};
use crate::provider::merged::MergedProvider;
use crate::transform::{Denylist, jarmod};
use crate::utils::fs::calculate_sha1;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Dependency configuration listing extra jarmods, applied in declaration order.
pub const JARMODS_CONFIGURATION: &str = "jarmods";

pub struct JarmoddedProvider {
    merged: Node<MergedProvider>,
    forge: Node<ForgeProvider>,
    key: CacheKey,
    output: PathBuf,
    jar: PathBuf,
}

impl JarmoddedProvider {
    pub fn new(merged: Node<MergedProvider>, forge: Node<ForgeProvider>) -> Self {
        Self {
            merged,
            forge,
            key: CacheKey::new(),
            output: PathBuf::new(),
            jar: PathBuf::new(),
        }
    }

    /// The overlaid jar, or the merged jar when there was nothing to overlay.
    pub fn jar(&self) -> &Path {
        &self.jar
    }
}

impl Provider for JarmoddedProvider {
    fn name(&self) -> &'static str {
        "jarmodded"
    }

    fn needs_isolation(&self, env: &Environment) -> Result<bool> {
        Ok(!env.resolver.resolve(JARMODS_CONFIGURATION)?.is_empty())
    }

    fn setup(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let settings = ctx.settings();
        let mut key = ctx.dependency_key(self.merged)?;
        for (name, value) in ctx.dependency_key(self.forge)?.props() {
            key.insert(format!("forge.{name}"), value.clone());
        }
        for (position, file) in ctx.resolver().resolve(JARMODS_CONFIGURATION)?.iter().enumerate() {
            key.insert(format!("jarmod.{position}"), calculate_sha1(file)?);
        }
        key.insert("denylist", settings.jarmod_denylist.join(","));
        key.insert("stage", "jarmodded");
        self.key = key;
        self.output = ctx.output_path(
            &self.key,
            &format!("minecraft-{}-jarmodded-{{hash}}.jar", settings.minecraft_version),
        )?;
        self.jar = self.output.clone();
        Ok(())
    }

    fn install(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let merged = ctx.dependency(self.merged)?;
        let forge = ctx.dependency(self.forge)?;

        let mut sources = Vec::new();
        if forge.mode() == ForgeMode::Jarmod {
            sources.push(forge.archive().to_path_buf());
        }
        sources.extend(ctx.resolver().resolve(JARMODS_CONFIGURATION)?);
        if sources.is_empty() {
            debug!("No jarmods, using the merged jar");
            self.jar = merged.jar().to_path_buf();
            return Ok(());
        }

        let denylist = Denylist::new(&ctx.settings().jarmod_denylist)?;
        let overlays = sources.iter().map(|path| Jar::read(path)).collect::<Result<Vec<_>>>()?;
        let base = Jar::read(merged.jar())?;
        let combined = jarmod::overlay(&base, &overlays.iter().collect::<Vec<_>>(), &denylist);
        info!("Overlaid {} jarmod(s)", overlays.len());
        combined.write(&self.output)?;
        self.jar = self.output.clone();
        Ok(())
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.output.clone()]
    }

    fn cache_key(&self) -> Option<&CacheKey> {
        Some(&self.key)
    }
}
