//! Mod jars the project compiles against, remapped to named.

use crate::jar::Jar;
use crate::mappings::Namespace;
use crate::provider::context::{Environment, StageContext};
use crate::provider::graph::{Node, Provider};
use crate::provider::libraries::LibrariesProvider;
use crate::provider::mappings::MappingsProvider;
use crate::provider::remapped::{RemappedProvider, read_classpath, remap_options};
use crate::transform::remap_jar;
use crate::utils::fs::{atomic_write, calculate_sha1};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

pub const MOD_COMPILE_CONFIGURATION: &str = "mod_compile";

struct ModJar {
    source: PathBuf,
    output: PathBuf,
}

pub struct ModDependenciesProvider {
    mappings: Node<MappingsProvider>,
    remapped: Node<RemappedProvider>,
    libraries: Node<LibrariesProvider>,
    jars: Vec<ModJar>,
}

impl ModDependenciesProvider {
    pub const fn new(
        mappings: Node<MappingsProvider>,
        remapped: Node<RemappedProvider>,
        libraries: Node<LibrariesProvider>,
    ) -> Self {
        Self {
            mappings,
            remapped,
            libraries,
            jars: Vec::new(),
        }
    }

    /// Remapped jars, in declaration order.
    pub fn files(&self) -> Vec<&Path> {
        self.jars.iter().map(|jar| jar.output.as_path()).collect()
    }
}

impl Provider for ModDependenciesProvider {
    fn name(&self) -> &'static str {
        "mod-dependencies"
    }

    fn needs_isolation(&self, _env: &Environment) -> Result<bool> {
        Ok(true)
    }

    fn setup(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let mappings = ctx.dependency_key(self.mappings)?;
        let game = ctx.dependency_key(self.remapped)?.hash();
        let namespace = ctx.settings().mod_namespace;
        self.jars = Vec::new();
        for source in ctx.resolver().resolve(MOD_COMPILE_CONFIGURATION)? {
            let key = mappings
                .clone()
                .with("game", &game)
                .with("mod", calculate_sha1(&source)?)
                .with("namespace", namespace.as_str());
            let stem = source
                .file_stem()
                .map_or_else(|| "mod".to_string(), |stem| stem.to_string_lossy().into_owned());
            let output = ctx.output_path(&key, &format!("mod-dependencies/{stem}-{{hash}}.jar"))?;
            self.jars.push(ModJar { source, output });
        }
        Ok(())
    }

    fn install(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let namespace = ctx.settings().mod_namespace;
        let pending: Vec<&ModJar> = self.jars.iter().filter(|jar| !jar.output.exists()).collect();
        if pending.is_empty() {
            return Ok(());
        }
        if namespace == Namespace::Named {
            for jar in pending {
                let data = std::fs::read(&jar.source)
                    .with_context(|| format!("Failed to read {}", jar.source.display()))?;
                atomic_write(&jar.output, &data)?;
            }
            return Ok(());
        }

        let mappings = ctx.dependency(self.mappings)?;
        let remapped = ctx.dependency(self.remapped)?;
        let mut classpath = read_classpath(ctx.dependency(self.libraries)?.files())?;
        classpath.insert(0, Jar::read(remapped.jar(namespace))?);
        let classpath: Vec<&Jar> = classpath.iter().collect();
        let options = remap_options(ctx);

        for jar in pending {
            let input = Jar::read(&jar.source)?;
            let mut outputs = remap_jar(&input, mappings.mappings()?, namespace, &[Namespace::Named], &classpath, &options)
                .with_context(|| format!("Failed to remap mod {}", jar.source.display()))?;
            let named = outputs
                .remove(&Namespace::Named)
                .context("Remapper produced no named jar")?;
            named.write(&jar.output)?;
            info!("Remapped {} from {namespace}", jar.source.display());
        }
        Ok(())
    }

    fn outputs(&self) -> Vec<PathBuf> {
        self.jars.iter().map(|jar| jar.output.clone()).collect()
    }
}
