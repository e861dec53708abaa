//! The jarmodded jar with access transformers applied.

use crate::cache::CacheKey;
use crate::jar::Jar;
use crate::mappings::Namespace;
use crate::provider::context::{Environment, StageContext};
use crate::provider::forge::ForgeProvider;
use crate::provider::graph::{Node, Provider};
use crate::provider::jarmodded::JarmoddedProvider;
use crate::provider::mappings::MappingsProvider;
use crate::transform::{AccessTransformerSet, access};
use crate::utils::fs::calculate_sha1;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub struct AccessTransformedProvider {
    jarmodded: Node<JarmoddedProvider>,
    forge: Node<ForgeProvider>,
    mappings: Node<MappingsProvider>,
    key: CacheKey,
    output: PathBuf,
    jar: PathBuf,
}

impl AccessTransformedProvider {
    pub fn new(
        jarmodded: Node<JarmoddedProvider>,
        forge: Node<ForgeProvider>,
        mappings: Node<MappingsProvider>,
    ) -> Self {
        Self {
            jarmodded,
            forge,
            mappings,
            key: CacheKey::new(),
            output: PathBuf::new(),
            jar: PathBuf::new(),
        }
    }

    /// The transformed jar, in official names.
    pub fn jar(&self) -> &Path {
        &self.jar
    }
}

impl Provider for AccessTransformedProvider {
    fn name(&self) -> &'static str {
        "access-transformed"
    }

    fn needs_isolation(&self, env: &Environment) -> Result<bool> {
        Ok(!env.settings.custom_access_transformers.is_empty())
    }

    fn setup(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let settings = ctx.settings();
        let mut key = ctx.dependency_key(self.jarmodded)?;
        for (name, value) in ctx.dependency_key(self.forge)?.props() {
            key.insert(format!("forge.{name}"), value.clone());
        }
        key.insert("mappings", ctx.dependency_key(self.mappings)?.get("mappings").unwrap_or_default());
        for (position, file) in settings.custom_access_transformers.iter().enumerate() {
            key.insert(format!("custom.{position}"), calculate_sha1(file)?);
        }
        key.insert("stage", "access-transformed");
        self.key = key;
        self.output = ctx.output_path(
            &self.key,
            &format!("minecraft-{}-at-{{hash}}.jar", settings.minecraft_version),
        )?;
        self.jar = self.output.clone();
        Ok(())
    }

    fn install(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let jarmodded = ctx.dependency(self.jarmodded)?;
        let forge = ctx.dependency(self.forge)?;
        let mappings = ctx.dependency(self.mappings)?;

        let mut directives = AccessTransformerSet::new();
        let sources = forge
            .access_transformers()
            .into_iter()
            .chain(ctx.settings().custom_access_transformers.iter().cloned());
        for source in sources {
            let content = std::fs::read_to_string(&source)
                .with_context(|| format!("Failed to read access transformer {}", source.display()))?;
            directives.read(&content, &source.display().to_string())?;
        }
        if directives.is_empty() {
            debug!("No access transformers, using the jarmodded jar");
            self.jar = jarmodded.jar().to_path_buf();
            return Ok(());
        }

        let view = mappings.mappings()?.view(Namespace::Intermediary, Namespace::Official);
        let directives = directives.remap(&view);
        let input = Jar::read(jarmodded.jar())?;
        let output = access::transform_jar(&input, &directives)?;
        info!("Applied {} access transformer directives", directives.len());
        output.write(&self.output)?;
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
