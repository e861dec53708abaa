//! Native libraries extracted for the current OS.

use crate::core::LoomError;
use crate::provider::context::StageContext;
use crate::provider::graph::{Node, Provider};
use crate::provider::libraries::fetch_artifact;
use crate::provider::minecraft::MinecraftProvider;
use crate::provider::version::current_os;
use crate::utils::fs::{atomic_write, ensure_dir};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;
use zip::ZipArchive;

/// Marker written once every native jar has been extracted.
pub const UNPACK_FLAG: &str = ".unpack-flag";

pub struct NativesProvider {
    minecraft: Node<MinecraftProvider>,
    dir: PathBuf,
}

impl NativesProvider {
    pub const fn new(minecraft: Node<MinecraftProvider>) -> Self {
        Self {
            minecraft,
            dir: PathBuf::new(),
        }
    }

    /// `natives/{version}`, suitable for `java.library.path`.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Provider for NativesProvider {
    fn name(&self) -> &'static str {
        "natives"
    }

    fn setup(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let version = &ctx.settings().minecraft_version;
        self.dir = ctx.cache().global_root().join("natives").join(version);
        Ok(())
    }

    fn install(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let minecraft = ctx.dependency(self.minecraft)?;
        let libraries_dir = ctx.cache().resolve_dir("libraries", false)?;
        ensure_dir(&self.dir)?;

        let os = current_os();
        for library in &minecraft.meta()?.libraries {
            if !library.applies_to(os) {
                continue;
            }
            let Some(artifact) = library.native_artifact(os) else {
                continue;
            };
            let jar = fetch_artifact(ctx, &libraries_dir, artifact, minecraft.version_json())?;
            let extracted = extract_natives(&jar, &self.dir, library.extract_excludes())?;
            debug!("Extracted {extracted} files from {}", jar.display());
        }

        atomic_write(&self.dir.join(UNPACK_FLAG), b"")?;
        Ok(())
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.dir.join(UNPACK_FLAG)]
    }
}

/// Extract every file of `jar` into `dest` except entries starting with an excluded prefix.
pub fn extract_natives(jar: &Path, dest: &Path, excludes: &[String]) -> Result<usize> {
    let file = File::open(jar).with_context(|| format!("Failed to open {}", jar.display()))?;
    let mut archive = ZipArchive::new(file).map_err(|err| LoomError::DataIntegrity {
        path: jar.to_path_buf(),
        reason: format!("not a zip archive: {err}"),
    })?;

    let mut extracted = 0;
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index).with_context(|| format!("Failed to read {}", jar.display()))?;
        if entry.is_dir() || excludes.iter().any(|prefix| entry.name().starts_with(prefix.as_str())) {
            continue;
        }
        let Some(relative) = entry.enclosed_name() else {
            debug!("Skipping unsafe entry {} in {}", entry.name(), jar.display());
            continue;
        };
        let target = dest.join(relative);
        let name = entry.name().to_string();
        let mut data = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
        entry
            .read_to_end(&mut data)
            .with_context(|| format!("Failed to extract {name} from {}", jar.display()))?;
        atomic_write(&target, &data)?;
        extracted += 1;
    }
    Ok(extracted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::write_jar;
    use tempfile::TempDir;

    #[test]
    fn test_extract_honors_excludes() {
        let temp = TempDir::new().unwrap();
        let jar = temp.path().join("lwjgl-natives.jar");
        write_jar(
            &jar,
            &[
                ("liblwjgl.so", b"elf".to_vec()),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0".to_vec()),
                ("sub/libopenal.so", b"elf2".to_vec()),
            ],
        )
        .unwrap();

        let dest = temp.path().join("natives");
        let count = extract_natives(&jar, &dest, &["META-INF/".to_string()]).unwrap();
        assert_eq!(count, 2);
        assert_eq!(std::fs::read(dest.join("liblwjgl.so")).unwrap(), b"elf");
        assert!(dest.join("sub/libopenal.so").exists());
        assert!(!dest.join("META-INF").exists());
    }
}
