//! The three-namespace mapping set, built once per mappings artifact.

use crate::cache::CacheKey;
use crate::classfile::ClassFile;
use crate::jar::Jar;
use crate::mappings::tiny::{read_tiny, write_tiny};
use crate::mappings::{MappingSet, McpArchive};
use crate::provider::context::StageContext;
use crate::provider::graph::{Node, Provider};
use crate::provider::merged::MergedProvider;
use crate::utils::fs::{atomic_write, calculate_sha1};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const MAPPINGS_CONFIGURATION: &str = "mappings";

/// Owns the parsed [`MappingSet`]; every remapping stage borrows it from here.
pub struct MappingsProvider {
    merged: Node<MergedProvider>,
    archive: PathBuf,
    id: String,
    key: CacheKey,
    tiny: PathBuf,
    mappings: Option<MappingSet>,
}

impl MappingsProvider {
    pub fn new(merged: Node<MergedProvider>) -> Self {
        Self {
            merged,
            archive: PathBuf::new(),
            id: String::new(),
            key: CacheKey::new(),
            tiny: PathBuf::new(),
            mappings: None,
        }
    }

    /// `{version}-{sha1 prefix}-{merged key prefix}`. Field descriptors come from the merged
    /// jar, so the id names both inputs of the tiny file.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tiny_path(&self) -> &Path {
        &self.tiny
    }

    pub fn mappings(&self) -> Result<&MappingSet> {
        self.mappings.as_ref().context("Mappings have not been loaded")
    }
}

impl Provider for MappingsProvider {
    fn name(&self) -> &'static str {
        "mappings"
    }

    fn setup(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        self.archive = ctx.resolver().resolve_single(MAPPINGS_CONFIGURATION)?;
        let sha1 = calculate_sha1(&self.archive)?;
        let merged = ctx.dependency_key(self.merged)?.hash();
        self.id = format!("{}-{}-{}", ctx.settings().minecraft_version, &sha1[..12], &merged[..8]);
        self.key = CacheKey::new().with("mappings", sha1).with("merged", merged);
        self.tiny = ctx.global_path(&format!("mappings/{}.tiny", self.id))?;
        Ok(())
    }

    fn install(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let archive = Jar::read(&self.archive)?;
        let origin = self.archive.display().to_string();
        let mut mappings = McpArchive::from_jar(&archive, &origin)?
            .build()
            .with_context(|| format!("Failed to build mappings from {origin}"))?;

        let merged = ctx.dependency(self.merged)?;
        let descriptors = field_descriptors(&Jar::read(merged.jar())?)?;
        let filled = mappings.fill_field_descriptors(|owner, name| {
            descriptors.get(&(owner.to_string(), name.to_string())).cloned()
        });
        debug!("Filled {filled} field descriptors from {}", merged.jar().display());

        atomic_write(&self.tiny, write_tiny(&mappings).as_bytes())?;
        info!("Wrote {} class mappings to {}", mappings.len(), self.tiny.display());
        self.mappings = Some(mappings);
        Ok(())
    }

    fn load(&mut self, _ctx: &StageContext<'_>) -> Result<()> {
        let content = std::fs::read_to_string(&self.tiny)
            .with_context(|| format!("Failed to read {}", self.tiny.display()))?;
        let mappings = read_tiny(&content).with_context(|| format!("Failed to parse {}", self.tiny.display()))?;
        debug!("Loaded {} class mappings from {}", mappings.len(), self.tiny.display());
        self.mappings = Some(mappings);
        Ok(())
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.tiny.clone()]
    }

    fn cache_key(&self) -> Option<&CacheKey> {
        Some(&self.key)
    }
}

/// `(class, field) -> descriptor` for every field declared in `jar`.
fn field_descriptors(jar: &Jar) -> Result<HashMap<(String, String), String>> {
    let mut descriptors = HashMap::new();
    for (class_name, data) in jar.classes() {
        let class = ClassFile::parse(data, class_name)?;
        for field in &class.fields {
            let (name, descriptor) = field.key(&class.pool)?;
            descriptors.insert((class_name.to_string(), name), descriptor);
        }
    }
    Ok(descriptors)
}
