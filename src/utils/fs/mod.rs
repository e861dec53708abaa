//! File system utilities for cache artifacts
//!
//! - [`atomic`] - temp-then-rename writes ([`atomic_write`], [`AtomicFile`])
//! - [`dirs`] - directory creation and removal
//! - [`metadata`] - content hashes, directory sizes, modification times
//! - [`paths`] - joining untrusted names onto cache directories

pub mod atomic;
pub mod dirs;
pub mod metadata;
pub mod paths;

pub use atomic::{AtomicFile, atomic_write, safe_write};
pub use self::dirs::{ensure_dir, ensure_parent_dir, remove_path};
pub use metadata::{
    calculate_checksum, calculate_sha1, dir_size, get_modified_time, set_modified_time,
};
pub use paths::join_enclosed;
