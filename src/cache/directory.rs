//! Cache roots and output path resolution.

use crate::cache::CacheKey;
use crate::utils::fs::{dir_size, ensure_dir, ensure_parent_dir, remove_path};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Placeholder substituted with [`CacheKey::hash`] in filename templates.
pub const HASH_PLACEHOLDER: &str = "{hash}";

/// The two cache roots available to a build
///
/// Stage outputs that are safe to share land in the global root; outputs of projectmapped
/// stages land in the project root. Resolving a path never deletes anything.
#[derive(Debug, Clone)]
pub struct CacheDirectory {
    global_root: PathBuf,
    project_root: PathBuf,
}

/// Location and size of one cache root.
#[derive(Debug, Clone)]
pub struct CacheRootInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: u64,
}

impl CacheDirectory {
    pub fn new(global_root: impl Into<PathBuf>, project_root: impl Into<PathBuf>) -> Self {
        Self {
            global_root: global_root.into(),
            project_root: project_root.into(),
        }
    }

    pub fn global_root(&self) -> &Path {
        &self.global_root
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Root selected by a stage's projectmapped status.
    #[must_use]
    pub fn root(&self, projectmapped: bool) -> &Path {
        if projectmapped { &self.project_root } else { &self.global_root }
    }

    /// Output path for `template` under the selected root
    ///
    /// `template` is a relative path that may contain [`HASH_PLACEHOLDER`]. Parent
    /// directories are created; filesystem errors propagate.
    ///
    /// ```rust,no_run
    /// use oldloom_cli::cache::{CacheDirectory, CacheKey};
    ///
    /// # fn example() -> anyhow::Result<()> {
    /// let cache = CacheDirectory::new("/home/me/.cache/oldloom", "/work/mod/.oldloom/cache");
    /// let key = CacheKey::new().with("version", "1.4.7");
    /// let path = cache.resolve_output_path(&key, "minecraft-1.4.7-merged-{hash}.jar", false)?;
    /// assert!(path.starts_with("/home/me/.cache/oldloom"));
    /// # Ok(())
    /// # }
    /// ```
    pub fn resolve_output_path(
        &self,
        key: &CacheKey,
        template: &str,
        projectmapped: bool,
    ) -> Result<PathBuf> {
        let relative = if template.contains(HASH_PLACEHOLDER) {
            template.replace(HASH_PLACEHOLDER, &key.hash())
        } else {
            template.to_string()
        };
        let path = self.root(projectmapped).join(relative);
        ensure_parent_dir(&path)?;
        Ok(path)
    }

    /// A directory under the selected root, created if missing.
    pub fn resolve_dir(&self, relative: &str, projectmapped: bool) -> Result<PathBuf> {
        let path = self.root(projectmapped).join(relative);
        ensure_dir(&path)?;
        Ok(path)
    }

    pub fn global_info(&self) -> Result<CacheRootInfo> {
        root_info(&self.global_root)
    }

    pub fn project_info(&self) -> Result<CacheRootInfo> {
        root_info(&self.project_root)
    }

    /// Delete the shared cache. Returns whether anything existed.
    pub fn clean_global(&self) -> Result<bool> {
        remove_path(&self.global_root)
    }

    /// Delete the project cache. Returns whether anything existed.
    pub fn clean_project(&self) -> Result<bool> {
        remove_path(&self.project_root)
    }
}

fn root_info(path: &Path) -> Result<CacheRootInfo> {
    Ok(CacheRootInfo {
        path: path.to_path_buf(),
        exists: path.exists(),
        size_bytes: dir_size(path)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cache(temp: &TempDir) -> CacheDirectory {
        CacheDirectory::new(temp.path().join("global"), temp.path().join("project"))
    }

    #[test]
    fn test_hash_placeholder_and_root_selection() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp);
        let key = CacheKey::new().with("version", "1.4.7");

        let shared = cache.resolve_output_path(&key, "minecraft-1.4.7-merged-{hash}.jar", false).unwrap();
        assert_eq!(
            shared,
            temp.path().join("global").join(format!("minecraft-1.4.7-merged-{}.jar", key.hash()))
        );
        assert!(shared.parent().unwrap().is_dir());

        let private = cache.resolve_output_path(&key, "mappings/x.tiny", true).unwrap();
        assert!(private.starts_with(temp.path().join("project")));
        assert!(temp.path().join("project/mappings").is_dir());
    }

    #[test]
    fn test_resolution_keeps_siblings() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp);
        let sibling = temp.path().join("global/minecraft-old.jar");
        ensure_parent_dir(&sibling).unwrap();
        std::fs::write(&sibling, "old").unwrap();

        cache.resolve_output_path(&CacheKey::new(), "minecraft-new-{hash}.jar", false).unwrap();
        assert!(sibling.exists());
    }

    #[test]
    fn test_info_and_clean() {
        let temp = TempDir::new().unwrap();
        let cache = cache(&temp);
        let dir = cache.resolve_dir("natives/1.4.7", true).unwrap();
        std::fs::write(dir.join("liblwjgl.so"), "12345").unwrap();

        let info = cache.project_info().unwrap();
        assert!(info.exists);
        assert_eq!(info.size_bytes, 5);
        assert!(!cache.global_info().unwrap().exists);

        assert!(cache.clean_project().unwrap());
        assert!(!cache.clean_project().unwrap());
    }
}
