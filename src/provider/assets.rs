//! Game assets: the asset index and the objects it names.

use crate::cache::CacheKey;
use crate::fetch::FetchOptions;
use crate::provider::context::StageContext;
use crate::provider::graph::{Node, Provider};
use crate::provider::minecraft::{MinecraftProvider, read_json};
use crate::provider::version::AssetIndex;
use crate::utils::fs::{atomic_write, calculate_sha1, join_enclosed};
use crate::utils::progress::ProgressBar;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Contents of the marker written once every object is in place.
#[derive(Debug, Serialize, Deserialize)]
struct AssetsMarker {
    index_id: String,
    /// Index file relative to the assets root, absent for versions without one
    index: Option<String>,
}

pub struct AssetsProvider {
    minecraft: Node<MinecraftProvider>,
    root: PathBuf,
    key: CacheKey,
    marker: PathBuf,
    index_id: String,
    index: Option<AssetIndex>,
    assets_dir: PathBuf,
}

impl AssetsProvider {
    pub fn new(minecraft: Node<MinecraftProvider>) -> Self {
        Self {
            minecraft,
            root: PathBuf::new(),
            key: CacheKey::new(),
            marker: PathBuf::new(),
            index_id: String::new(),
            index: None,
            assets_dir: PathBuf::new(),
        }
    }

    pub fn index_id(&self) -> &str {
        &self.index_id
    }

    pub fn index(&self) -> Option<&AssetIndex> {
        self.index.as_ref()
    }

    /// The directory a game instance reads assets from.
    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    fn objects_dir(&self) -> PathBuf {
        self.root.join("objects")
    }

    /// Record the loaded index and pick the directory the game reads from.
    fn finish(&mut self, index_id: String, index: Option<AssetIndex>, source: &Path) -> Result<()> {
        self.assets_dir = match &index {
            Some(index) if index.needs_virtual_copy() => join_enclosed(&self.root.join("virtual"), &index_id, source)?,
            _ => self.root.clone(),
        };
        self.index_id = index_id;
        self.index = index;
        Ok(())
    }
}

impl Provider for AssetsProvider {
    fn name(&self) -> &'static str {
        "assets"
    }

    fn setup(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        self.root = ctx.cache().resolve_dir("assets", false)?;
        self.key = ctx
            .dependency_key(self.minecraft)?
            .with("stage", "assets")
            .with("resources", &ctx.settings().urls.resources);
        self.marker = ctx.output_path(&self.key, "assets/.assets-{hash}.json")?;
        Ok(())
    }

    fn install(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let minecraft = ctx.dependency(self.minecraft)?;
        let meta = minecraft.meta()?;
        let index_id = meta.asset_index_id().to_string();
        let Some(index_ref) = &meta.asset_index else {
            info!("Version {} has no asset index, skipping assets", meta.id);
            self.finish(index_id.clone(), None, minecraft.version_json())?;
            let marker = AssetsMarker { index_id, index: None };
            return atomic_write(&self.marker, serde_json::to_string_pretty(&marker)?.as_bytes());
        };

        let index_name = format!("indexes/{}.json", index_ref.id);
        let index_path = join_enclosed(&self.root, &index_name, minecraft.version_json())?;
        let mut options = FetchOptions::new().etag().max_age(ctx.settings().asset_max_age);
        if let Some(sha1) = &index_ref.sha1 {
            options = options.sha1(sha1);
        }
        ctx.fetcher().fetch(&index_ref.url, &index_path, &options)?;
        let index: AssetIndex = read_json(&index_path)?;

        let objects = self.objects_dir();
        let progress = ProgressBar::new(index.objects.len() as u64, ctx.progress());
        progress.set_message(format!("Assets {}", index_ref.id));
        let base = ctx.settings().urls.resources.trim_end_matches('/');
        for object in index.objects.values() {
            let relative = object.relative_path();
            // Objects are content-addressed, so an existing file is the right one.
            ctx.fetcher().fetch(
                &format!("{base}/{relative}"),
                &join_enclosed(&objects, &relative, &index_path)?,
                &FetchOptions::new().skip_if_exists().sha1(&object.hash),
            )?;
            progress.inc(1);
        }
        progress.finish_and_clear();

        self.finish(index_id.clone(), Some(index), &index_path)?;
        if let Some(index) = &self.index
            && index.needs_virtual_copy()
        {
            let copied = copy_virtual(index, &objects, &self.assets_dir, &index_path)?;
            debug!("Copied {copied} assets into the virtual layout");
        }

        let marker = AssetsMarker {
            index_id,
            index: Some(index_name),
        };
        atomic_write(&self.marker, serde_json::to_string_pretty(&marker)?.as_bytes())
    }

    fn load(&mut self, _ctx: &StageContext<'_>) -> Result<()> {
        let marker: AssetsMarker = read_json(&self.marker)?;
        let index = match &marker.index {
            Some(name) => Some(read_json(&join_enclosed(&self.root, name, &self.marker)?)?),
            None => None,
        };
        debug!("Using cached assets for index {}", marker.index_id);
        let source = self.marker.clone();
        self.finish(marker.index_id, index, &source)
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.marker.clone()]
    }

    fn cache_key(&self) -> Option<&CacheKey> {
        Some(&self.key)
    }
}

/// Lay out objects by their logical path, skipping copies whose content already matches.
///
/// Names come from the index at `source`; one that would leave `dest` fails the copy.
fn copy_virtual(index: &AssetIndex, objects: &Path, dest: &Path, source: &Path) -> Result<usize> {
    let mut copied = 0;
    for (name, object) in &index.objects {
        let target = join_enclosed(dest, name, source)?;
        if target.is_file() && calculate_sha1(&target)? == object.hash {
            continue;
        }
        let object_path = join_enclosed(objects, &object.relative_path(), source)?;
        let data = std::fs::read(&object_path)
            .with_context(|| format!("Failed to read asset {}", object_path.display()))?;
        atomic_write(&target, &data)?;
        copied += 1;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LoomError, find_loom_error};
    use sha1::{Digest, Sha1};
    use tempfile::TempDir;

    fn objects_with(temp: &TempDir, content: &[u8]) -> (PathBuf, String) {
        let hash = hex::encode(Sha1::digest(content));
        let objects = temp.path().join("objects");
        std::fs::create_dir_all(objects.join(&hash[..2])).unwrap();
        std::fs::write(objects.join(&hash[..2]).join(&hash), content).unwrap();
        (objects, hash)
    }

    #[test]
    fn test_virtual_copy_is_incremental() {
        let temp = TempDir::new().unwrap();
        let (objects, hash) = objects_with(&temp, b"ogg");
        let index: AssetIndex = serde_json::from_str(&format!(
            r#"{{"virtual": true, "objects": {{"sound/step.ogg": {{"hash": "{hash}", "size": 3}}}}}}"#
        ))
        .unwrap();
        let dest = temp.path().join("virtual/legacy");
        let source = temp.path().join("indexes/legacy.json");
        assert_eq!(copy_virtual(&index, &objects, &dest, &source).unwrap(), 1);
        assert_eq!(std::fs::read(dest.join("sound/step.ogg")).unwrap(), b"ogg");
        assert_eq!(copy_virtual(&index, &objects, &dest, &source).unwrap(), 0);
    }

    #[test]
    fn test_virtual_copy_rejects_escaping_names() {
        let temp = TempDir::new().unwrap();
        let (objects, hash) = objects_with(&temp, b"payload");
        let index: AssetIndex = serde_json::from_str(&format!(
            r#"{{"virtual": true, "objects": {{"../../escaped.txt": {{"hash": "{hash}", "size": 7}}}}}}"#
        ))
        .unwrap();
        let dest = temp.path().join("assets/virtual/legacy");
        let source = temp.path().join("assets/indexes/legacy.json");

        let err = copy_virtual(&index, &objects, &dest, &source).unwrap_err();
        assert!(matches!(
            find_loom_error(&err),
            Some(LoomError::DataIntegrity { path, .. }) if *path == source
        ));
        assert!(!temp.path().join("assets/escaped.txt").exists());
    }
}
