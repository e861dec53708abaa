//! Run configuration descriptors and where they are staged.

use crate::utils::fs::{ensure_dir, safe_write};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

/// Everything an IDE or launcher needs to start the game in development.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunConfig {
    pub name: String,
    pub main_class: String,
    pub program_args: Vec<String>,
    pub vm_args: Vec<String>,
    pub working_dir: PathBuf,
    pub system_properties: BTreeMap<String, String>,
}

impl RunConfig {
    /// Full JVM argument list: `vm_args` followed by `-Dkey=value` per system property.
    #[must_use]
    pub fn jvm_args(&self) -> Vec<String> {
        self.vm_args
            .iter()
            .cloned()
            .chain(self.system_properties.iter().map(|(key, value)| format!("-D{key}={value}")))
            .collect()
    }
}

/// Receives finished run configurations.
pub trait RunConfigSink {
    /// Persist `config` and return where it went.
    fn stage(&self, config: &RunConfig) -> Result<PathBuf>;
}

/// Writes each configuration as `{dir}/{name}.json`.
#[derive(Debug, Clone)]
pub struct JsonRunConfigSink {
    dir: PathBuf,
}

impl JsonRunConfigSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl RunConfigSink for JsonRunConfigSink {
    fn stage(&self, config: &RunConfig) -> Result<PathBuf> {
        ensure_dir(&self.dir)?;
        let path = self.dir.join(format!("{}.json", config.name));
        let json = serde_json::to_string_pretty(config)
            .with_context(|| format!("Failed to serialize run configuration '{}'", config.name))?;
        safe_write(&path, &json)?;
        info!("Staged run configuration {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_sink_writes_named_file() {
        let temp = TempDir::new().unwrap();
        let sink = JsonRunConfigSink::new(temp.path().join("run-configs"));
        let config = RunConfig {
            name: "client".to_string(),
            main_class: "net.minecraft.launchwrapper.Launch".to_string(),
            program_args: vec!["--version".to_string(), "1.6.4".to_string()],
            vm_args: vec!["-Xmx2G".to_string()],
            working_dir: temp.path().join("run"),
            system_properties: BTreeMap::from([("fml.ignoreInvalidMinecraftCertificates".to_string(), "true".to_string())]),
        };

        let path = sink.stage(&config).unwrap();
        assert_eq!(path, temp.path().join("run-configs/client.json"));
        let read: RunConfig = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(read, config);
        assert_eq!(config.jvm_args(), vec!["-Xmx2G", "-Dfml.ignoreInvalidMinecraftCertificates=true"]);
    }
}
