//! Atomic file write operations using a temp-and-rename strategy.
//!
//! Every cache artifact in oldloom is produced through this module. Content is written to a
//! uniquely named temporary file in the destination directory and only renamed onto the
//! final path once it is complete and synced, so a concurrent reader (another build sharing
//! the global cache) sees either nothing or the whole file. If writing fails, or the
//! [`AtomicFile`] is dropped without [`AtomicFile::commit`], the temporary file is removed.

use crate::utils::fs::dirs::ensure_parent_dir;
use anyhow::{Context, Result};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Safely writes a string to a file using atomic operations.
///
/// Convenience wrapper around [`atomic_write`].
pub fn safe_write(path: &Path, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Atomically writes bytes to a file using a write-then-rename strategy.
///
/// 1. Writes content to a temporary file next to `path`
/// 2. Syncs the temporary file to disk
/// 3. Atomically renames the temporary file onto `path`
///
/// Parent directories are created when missing.
///
/// # Examples
///
/// ```rust,no_run
/// use oldloom_cli::utils::fs::atomic_write;
/// use std::path::Path;
///
/// # fn example() -> anyhow::Result<()> {
/// atomic_write(Path::new("cache/minecraft-1.4.7.jar.etag"), b"\"abc\"")?;
/// # Ok(())
/// # }
/// ```
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = AtomicFile::create(path)?;
    file.write_all(content)
        .with_context(|| format!("Failed to write temporary file for: {}", path.display()))?;
    file.commit()
}

/// A file that becomes visible at its destination only when committed
///
/// Implements [`Write`]; the bytes go to a hidden temporary file in the destination's
/// directory. [`AtomicFile::commit`] syncs and renames it into place. Dropping an
/// uncommitted `AtomicFile` deletes the temporary file.
pub struct AtomicFile {
    temp: NamedTempFile,
    destination: PathBuf,
}

impl AtomicFile {
    /// Open a temporary file that will replace `destination` on commit.
    pub fn create(destination: &Path) -> Result<Self> {
        ensure_parent_dir(destination)?;
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let file_name = destination
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "artifact".to_string());

        let temp = tempfile::Builder::new()
            .prefix(&format!(".{file_name}."))
            .suffix(".tmp")
            .tempfile_in(&parent)
            .with_context(|| format!("Failed to create temp file in: {}", parent.display()))?;

        Ok(Self {
            temp,
            destination: destination.to_path_buf(),
        })
    }

    /// The final path this file will be renamed to.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// The temporary path currently being written.
    pub fn temp_path(&self) -> &Path {
        self.temp.path()
    }

    /// Sync the temporary file and atomically rename it onto the destination.
    pub fn commit(self) -> Result<()> {
        self.temp
            .as_file()
            .sync_all()
            .with_context(|| format!("Failed to sync temp file for: {}", self.destination.display()))?;
        let destination = self.destination;
        self.temp
            .persist(&destination)
            .map_err(|err| err.error)
            .with_context(|| format!("Failed to rename temp file to: {}", destination.display()))?;
        Ok(())
    }
}

impl Write for AtomicFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}

impl Seek for AtomicFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.temp.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_parents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a/b/c.txt");
        atomic_write(&path, b"hello").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn test_atomic_write_replaces_existing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("file.txt");
        std::fs::write(&path, "old").unwrap();
        safe_write(&path, "new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn test_uncommitted_file_leaves_nothing_behind() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("partial.jar");
        {
            let mut file = AtomicFile::create(&path).unwrap();
            file.write_all(b"half of a jar").unwrap();
        }
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
