//! Runtime libraries listed in the version metadata.

use crate::cache::CacheKey;
use crate::core::LoomError;
use crate::fetch::FetchOptions;
use crate::provider::context::StageContext;
use crate::provider::graph::{Node, Provider};
use crate::provider::minecraft::{MinecraftProvider, read_json};
use crate::provider::version::{Artifact, current_os};
use crate::utils::fs::{atomic_write, join_enclosed};
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Non-native libraries for the current OS, downloaded into the shared `libraries/` tree.
///
/// A marker listing the downloaded jars is written once every library is present; later
/// builds read the list back instead of hashing each jar again.
pub struct LibrariesProvider {
    minecraft: Node<MinecraftProvider>,
    dir: PathBuf,
    key: CacheKey,
    marker: PathBuf,
    files: Vec<PathBuf>,
}

impl LibrariesProvider {
    pub fn new(minecraft: Node<MinecraftProvider>) -> Self {
        Self {
            minecraft,
            dir: PathBuf::new(),
            key: CacheKey::new(),
            marker: PathBuf::new(),
            files: Vec::new(),
        }
    }

    /// Library jars in declaration order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }
}

/// Download `artifact` into `dir`, verified by hash when the metadata carries one.
///
/// `source` is the metadata file naming the artifact, blamed when its path is unsafe.
pub(crate) fn fetch_artifact(
    ctx: &StageContext<'_>,
    dir: &Path,
    artifact: &Artifact,
    source: &Path,
) -> Result<PathBuf> {
    let dest = join_enclosed(dir, &artifact.path, source)?;
    let options = match &artifact.sha1 {
        Some(sha1) => FetchOptions::new().sha1(sha1),
        None => FetchOptions::new().skip_if_exists(),
    };
    ctx.fetcher().fetch(&artifact.url, &dest, &options)?;
    Ok(dest)
}

impl Provider for LibrariesProvider {
    fn name(&self) -> &'static str {
        "libraries"
    }

    fn setup(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        self.dir = ctx.cache().resolve_dir("libraries", false)?;
        self.key = ctx
            .dependency_key(self.minecraft)?
            .with("stage", "libraries")
            .with("os", current_os());
        self.marker = ctx.output_path(&self.key, "libraries/.libraries-{hash}.json")?;
        Ok(())
    }

    fn install(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let minecraft = ctx.dependency(self.minecraft)?;
        let os = current_os();
        let mut relative = Vec::new();
        let mut files = Vec::new();
        for library in &minecraft.meta()?.libraries {
            if !library.applies_to(os) {
                debug!("Skipping {} on {os}", library.name);
                continue;
            }
            if let Some(artifact) = library.artifact() {
                files.push(fetch_artifact(ctx, &self.dir, artifact, minecraft.version_json())?);
                relative.push(artifact.path.clone());
            }
        }
        debug!("{} libraries available", files.len());
        atomic_write(&self.marker, serde_json::to_string_pretty(&relative)?.as_bytes())?;
        self.files = files;
        Ok(())
    }

    fn load(&mut self, _ctx: &StageContext<'_>) -> Result<()> {
        let relative: Vec<String> = read_json(&self.marker)?;
        let mut files = Vec::with_capacity(relative.len());
        for name in &relative {
            let file = join_enclosed(&self.dir, name, &self.marker)?;
            if !file.is_file() {
                return Err(LoomError::DataIntegrity {
                    path: self.marker.clone(),
                    reason: format!("lists {} which no longer exists", file.display()),
                }
                .into());
            }
            files.push(file);
        }
        debug!("Using {} cached libraries", files.len());
        self.files = files;
        Ok(())
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.marker.clone()]
    }

    fn cache_key(&self) -> Option<&CacheKey> {
        Some(&self.key)
    }
}
