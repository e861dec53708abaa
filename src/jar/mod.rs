//! Jar archives held in memory.
//!
//! Game jars are small enough (a few MB) to read whole. Entries are kept sorted by name,
//! and [`Jar::write`] emits them in that order with a fixed timestamp, so equal contents
//! always produce byte-identical archives.

use crate::core::LoomError;
use crate::utils::fs::AtomicFile;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Directory holding signatures and the manifest.
pub const META_INF: &str = "META-INF/";

/// Files of a jar, keyed by entry name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Jar {
    entries: BTreeMap<String, Vec<u8>>,
}

impl Jar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read every file entry of the archive at `path`; directory entries are skipped.
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);
        if len == 0 {
            return Err(LoomError::DataIntegrity {
                path: path.to_path_buf(),
                reason: "archive is empty (zero bytes)".to_string(),
            }
            .into());
        }

        let corrupt = |err: zip::result::ZipError| LoomError::DataIntegrity {
            path: path.to_path_buf(),
            reason: format!("not a readable zip archive: {err}"),
        };
        let mut archive = ZipArchive::new(file).map_err(corrupt)?;
        let mut entries = BTreeMap::new();
        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(corrupt)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let mut data = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
            entry
                .read_to_end(&mut data)
                .map_err(|err| LoomError::DataIntegrity {
                    path: path.to_path_buf(),
                    reason: format!("failed to inflate {name}: {err}"),
                })?;
            entries.insert(name, data);
        }
        Ok(Self { entries })
    }

    /// Write the archive atomically to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let file = AtomicFile::create(path)?;
        let mut zip = ZipWriter::new(file);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default())
            .unix_permissions(0o644);
        for (name, data) in &self.entries {
            zip.start_file(name.as_str(), options)
                .with_context(|| format!("Failed to add {name} to {}", path.display()))?;
            zip.write_all(data)
                .with_context(|| format!("Failed to write {name} to {}", path.display()))?;
        }
        let file = zip
            .finish()
            .with_context(|| format!("Failed to finish {}", path.display()))?;
        file.commit()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, name: impl Into<String>, data: Vec<u8>) {
        self.entries.insert(name.into(), data);
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<u8>> {
        self.entries.remove(name)
    }

    /// Entries in name order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(n, d)| (n.as_str(), d.as_slice()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(internal class name, bytes)` for every `.class` entry.
    pub fn classes(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.entries()
            .filter_map(|(name, data)| class_name_of(name).map(|class| (class, data)))
    }

    /// Drop every entry under `META-INF/`.
    pub fn strip_meta_inf(&mut self) {
        self.entries.retain(|name, _| !is_meta_inf(name));
    }
}

impl FromIterator<(String, Vec<u8>)> for Jar {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Internal class name for a `.class` entry name.
pub fn class_name_of(entry: &str) -> Option<&str> {
    entry.strip_suffix(".class")
}

/// Entry name for an internal class name.
pub fn entry_name_of(class: &str) -> String {
    format!("{class}.class")
}

pub fn is_meta_inf(entry: &str) -> bool {
    entry.len() >= META_INF.len() && entry[..META_INF.len()].eq_ignore_ascii_case(META_INF)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let mut jar = Jar::new();
        jar.insert("b.class", vec![1, 2, 3]);
        jar.insert("a.txt", b"hello".to_vec());

        let first = temp.path().join("first.jar");
        let second = temp.path().join("second.jar");
        jar.write(&first).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1100));
        jar.write(&second).unwrap();
        assert_eq!(std::fs::read(&first).unwrap(), std::fs::read(&second).unwrap());
        assert_eq!(Jar::read(&first).unwrap(), jar);
    }

    #[test]
    fn test_zero_byte_archive_is_integrity_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("empty.jar");
        std::fs::write(&path, "").unwrap();
        let err = Jar::read(&path).unwrap_err();
        assert!(err.downcast_ref::<LoomError>().is_some_and(LoomError::is_integrity_error));

        std::fs::write(&path, "garbage").unwrap();
        assert!(Jar::read(&path).is_err());
    }

    #[test]
    fn test_meta_inf_and_class_names() {
        let mut jar = Jar::new();
        jar.insert("META-INF/MANIFEST.MF", Vec::new());
        jar.insert("meta-inf/MOJANG_C.SF", Vec::new());
        jar.insert("net/minecraft/a.class", Vec::new());
        jar.strip_meta_inf();
        assert_eq!(jar.names().collect::<Vec<_>>(), vec!["net/minecraft/a.class"]);
        assert_eq!(jar.classes().next().unwrap().0, "net/minecraft/a");
        assert_eq!(entry_name_of("a"), "a.class");
    }
}
