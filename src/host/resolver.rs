//! Dependency configuration resolution.

use crate::config::WorkspaceConfig;
use crate::core::LoomError;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Maps a dependency configuration name (`forge`, `mappings`, ...) to the files it contains.
pub trait DependencyResolver {
    /// Every file of `configuration`, in declaration order. Unknown configurations are empty.
    fn resolve(&self, configuration: &str) -> Result<Vec<PathBuf>>;

    /// The one file of a configuration that must contain exactly one artifact.
    fn resolve_single(&self, configuration: &str) -> Result<PathBuf> {
        let mut files = self.resolve(configuration)?;
        match files.len() {
            0 => Err(LoomError::MissingArtifact {
                configuration: configuration.to_string(),
            }
            .into()),
            1 => Ok(files.remove(0)),
            count => Err(LoomError::AmbiguousArtifact {
                configuration: configuration.to_string(),
                count,
                candidates: files,
            }
            .into()),
        }
    }

    /// Like [`resolve_single`](Self::resolve_single), but an empty configuration is `None`.
    fn resolve_optional(&self, configuration: &str) -> Result<Option<PathBuf>> {
        if self.resolve(configuration)?.is_empty() {
            return Ok(None);
        }
        self.resolve_single(configuration).map(Some)
    }
}

/// Resolver backed by the `[dependencies]` table of the project file
///
/// Relative paths are taken relative to the project directory. Entries containing glob
/// metacharacters expand to their matches in sorted order; a declared plain path that does
/// not exist is an error.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    configurations: BTreeMap<String, Vec<PathBuf>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &WorkspaceConfig, project_dir: &Path) -> Self {
        let configurations = config
            .dependencies
            .iter()
            .map(|(name, files)| {
                let files = files
                    .iter()
                    .map(|file| if file.is_absolute() { file.clone() } else { project_dir.join(file) })
                    .collect();
                (name.clone(), files)
            })
            .collect();
        Self { configurations }
    }

    /// Declare `files` for `configuration`, replacing earlier declarations.
    #[must_use]
    pub fn with(mut self, configuration: impl Into<String>, files: Vec<PathBuf>) -> Self {
        self.configurations.insert(configuration.into(), files);
        self
    }
}

impl DependencyResolver for StaticResolver {
    fn resolve(&self, configuration: &str) -> Result<Vec<PathBuf>> {
        let Some(declared) = self.configurations.get(configuration) else {
            return Ok(Vec::new());
        };
        let mut files = Vec::new();
        for entry in declared {
            let text = entry.to_string_lossy();
            if text.contains(['*', '?', '[']) {
                let mut matches = glob::glob(&text)
                    .map_err(|err| LoomError::Configuration {
                        message: format!("invalid pattern '{text}' in configuration '{configuration}': {err}"),
                    })?
                    .collect::<Result<Vec<_>, _>>()
                    .with_context(|| format!("Failed to expand '{text}'"))?;
                matches.sort();
                debug!("{configuration}: '{text}' matched {} file(s)", matches.len());
                files.extend(matches);
            } else if entry.exists() {
                files.push(entry.clone());
            } else {
                return Err(LoomError::Configuration {
                    message: format!(
                        "configuration '{configuration}' declares {} which does not exist",
                        entry.display()
                    ),
                }
                .into());
            }
        }
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_single_artifact_rules() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a.jar");
        let b = temp.path().join("b.jar");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let resolver = StaticResolver::new()
            .with("forge", vec![a.clone()])
            .with("mappings", vec![a.clone(), b.clone()]);

        assert_eq!(resolver.resolve_single("forge").unwrap(), a);
        assert_eq!(resolver.resolve_optional("jarmods").unwrap(), None);

        let missing = resolver.resolve_single("jarmods").unwrap_err();
        assert!(matches!(missing.downcast_ref(), Some(LoomError::MissingArtifact { .. })));

        let ambiguous = resolver.resolve_single("mappings").unwrap_err();
        match ambiguous.downcast_ref::<LoomError>() {
            Some(LoomError::AmbiguousArtifact { count, .. }) => assert_eq!(*count, 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_relative_paths_and_globs() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join("libs")).unwrap();
        std::fs::write(temp.path().join("libs/z.jar"), b"z").unwrap();
        std::fs::write(temp.path().join("libs/a.jar"), b"a").unwrap();

        let config = WorkspaceConfig::parse(
            "minecraft_version = \"1.4.7\"\n[dependencies]\nmod_compile = [\"libs/*.jar\"]\nforge = [\"missing.zip\"]\n",
        )
        .unwrap();
        let resolver = StaticResolver::from_config(&config, temp.path());

        let files = resolver.resolve("mod_compile").unwrap();
        assert_eq!(files, vec![temp.path().join("libs/a.jar"), temp.path().join("libs/z.jar")]);

        let err = resolver.resolve("forge").unwrap_err();
        assert!(err.downcast_ref::<LoomError>().unwrap().is_configuration_error());
    }
}
