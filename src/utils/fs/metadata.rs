//! File metadata helpers: content hashes, sizes and modification times.

use anyhow::{Context, Result};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;
use walkdir::WalkDir;

/// Calculates the SHA-256 checksum of a file as lowercase hex.
pub fn calculate_checksum(path: &Path) -> Result<String> {
    hash_file::<Sha256>(path)
}

/// Calculates the SHA-1 checksum of a file as lowercase hex.
///
/// The game's launcher metadata publishes SHA-1 digests for every download.
pub fn calculate_sha1(path: &Path) -> Result<String> {
    hash_file::<Sha1>(path)
}

fn hash_file<D: Digest>(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)
        .with_context(|| format!("Failed to read file for checksum: {}", path.display()))?;
    let mut hasher = D::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file
            .read(&mut buffer)
            .with_context(|| format!("Failed to read file for checksum: {}", path.display()))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Calculates the total size of a directory tree in bytes.
///
/// Missing directories count as zero.
pub fn dir_size(path: &Path) -> Result<u64> {
    if !path.exists() {
        return Ok(0);
    }
    let mut size = 0;
    for entry in WalkDir::new(path) {
        let entry = entry.with_context(|| format!("Failed to walk: {}", path.display()))?;
        if entry.file_type().is_file() {
            size += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
    }
    Ok(size)
}

/// Gets the modification time of a file.
pub fn get_modified_time(path: &Path) -> Result<SystemTime> {
    let metadata =
        fs::metadata(path).with_context(|| format!("Failed to get metadata: {}", path.display()))?;
    metadata
        .modified()
        .with_context(|| format!("Failed to get modification time: {}", path.display()))
}

/// Sets the modification time of a file.
pub fn set_modified_time(path: &Path, time: SystemTime) -> Result<()> {
    let file = fs::OpenOptions::new()
        .write(true)
        .open(path)
        .with_context(|| format!("Failed to open for timestamp update: {}", path.display()))?;
    file.set_modified(time)
        .with_context(|| format!("Failed to set modification time: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_known_digests() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("abc");
        fs::write(&path, "abc").unwrap();
        assert_eq!(
            calculate_checksum(&path).unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(calculate_sha1(&path).unwrap(), "a9993e364706816aba3e25717850c26c9cd0d89d");
    }

    #[test]
    fn test_set_modified_time() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("f");
        fs::write(&path, "x").unwrap();
        let when = SystemTime::UNIX_EPOCH + Duration::from_secs(1_400_000_000);
        set_modified_time(&path, when).unwrap();
        assert_eq!(get_modified_time(&path).unwrap(), when);
    }

    #[test]
    fn test_dir_size_counts_nested_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("a/b")).unwrap();
        fs::write(temp.path().join("a/one"), "12345").unwrap();
        fs::write(temp.path().join("a/b/two"), "123").unwrap();
        assert_eq!(dir_size(temp.path()).unwrap(), 8);
        assert_eq!(dir_size(&temp.path().join("missing")).unwrap(), 0);
    }
}
