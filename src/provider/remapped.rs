//! The game jar in intermediary and named namespaces.

use crate::cache::CacheKey;
use crate::jar::Jar;
use crate::mappings::Namespace;
use crate::provider::access_transformed::AccessTransformedProvider;
use crate::provider::context::StageContext;
use crate::provider::graph::{Node, Provider};
use crate::provider::libraries::LibrariesProvider;
use crate::provider::mappings::MappingsProvider;
use crate::transform::{RemapOptions, remap_jar};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Namespaces produced from the official jar, in one pass.
pub const REMAP_TARGETS: [Namespace; 2] = [Namespace::Intermediary, Namespace::Named];

pub struct RemappedProvider {
    access_transformed: Node<AccessTransformedProvider>,
    mappings: Node<MappingsProvider>,
    libraries: Node<LibrariesProvider>,
    key: CacheKey,
    official: PathBuf,
    jars: [PathBuf; 2],
}

impl RemappedProvider {
    pub fn new(
        access_transformed: Node<AccessTransformedProvider>,
        mappings: Node<MappingsProvider>,
        libraries: Node<LibrariesProvider>,
    ) -> Self {
        Self {
            access_transformed,
            mappings,
            libraries,
            key: CacheKey::new(),
            official: PathBuf::new(),
            jars: Default::default(),
        }
    }

    /// The game jar in `namespace`.
    pub fn jar(&self, namespace: Namespace) -> &Path {
        match namespace {
            Namespace::Official => &self.official,
            Namespace::Intermediary => &self.jars[0],
            Namespace::Named => &self.jars[1],
        }
    }
}

/// Options shared by every remap of game code in this build.
pub(crate) fn remap_options(ctx: &StageContext<'_>) -> RemapOptions {
    let settings = ctx.settings();
    RemapOptions {
        rename_locals: settings.remap_local_variables,
        class_filter: settings.class_filter.clone(),
    }
}

/// Read every library jar for use as a remap classpath.
pub(crate) fn read_classpath(files: &[PathBuf]) -> Result<Vec<Jar>> {
    files
        .iter()
        .map(|file| Jar::read(file).with_context(|| format!("Failed to read classpath entry {}", file.display())))
        .collect()
}

impl Provider for RemappedProvider {
    fn name(&self) -> &'static str {
        "remapped"
    }

    fn setup(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let settings = ctx.settings();
        let mut key = ctx.dependency_key(self.access_transformed)?;
        key.insert("mappings", ctx.dependency_key(self.mappings)?.get("mappings").unwrap_or_default());
        key.insert("local_variables", settings.remap_local_variables.to_string());
        key.insert("class_filter", format!("{:?}", settings.class_filter));
        key.insert("stage", "remapped");
        self.key = key;
        for (slot, namespace) in self.jars.iter_mut().zip(REMAP_TARGETS) {
            *slot = ctx.output_path(
                &self.key,
                &format!("minecraft-{}-{namespace}-{{hash}}.jar", settings.minecraft_version),
            )?;
        }
        Ok(())
    }

    fn install(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let input = Jar::read(self.official_jar(ctx)?.as_path())?;
        let mappings = ctx.dependency(self.mappings)?;
        let classpath = read_classpath(ctx.dependency(self.libraries)?.files())?;
        let classpath: Vec<&Jar> = classpath.iter().collect();

        let mut outputs = remap_jar(
            &input,
            mappings.mappings()?,
            Namespace::Official,
            &REMAP_TARGETS,
            &classpath,
            &remap_options(ctx),
        )?;
        for (path, namespace) in self.jars.iter().zip(REMAP_TARGETS) {
            let jar = outputs
                .remove(&namespace)
                .with_context(|| format!("Remapper produced no {namespace} jar"))?;
            jar.write(path)?;
        }
        Ok(())
    }

    fn load(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        self.official_jar(ctx)?;
        Ok(())
    }

    fn outputs(&self) -> Vec<PathBuf> {
        self.jars.to_vec()
    }

    fn cache_key(&self) -> Option<&CacheKey> {
        Some(&self.key)
    }
}

impl RemappedProvider {
    fn official_jar(&mut self, ctx: &StageContext<'_>) -> Result<PathBuf> {
        self.official = ctx.dependency(self.access_transformed)?.jar().to_path_buf();
        Ok(self.official.clone())
    }
}
