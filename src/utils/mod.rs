//! Cross-cutting utilities
//!
//! - [`fs`] - atomic writes, directory handling, hashing and timestamps
//! - [`progress`] - terminal progress bars for long downloads

pub mod fs;
pub mod progress;

pub use fs::{AtomicFile, atomic_write, ensure_dir, ensure_parent_dir, safe_write};
