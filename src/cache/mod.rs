//! Content-keyed stage output cache
//!
//! Every stage output lives under one of two roots:
//!
//! ```text
//! ~/.cache/oldloom/                        # shared by every project on the machine
//! ├── minecraft-1.4.7-client.jar
//! ├── minecraft-1.4.7-client.jar.etag
//! ├── minecraft-1.4.7-merged-<hash>.jar
//! ├── mappings/mcp-726a.tiny
//! ├── natives/1.4.7/.unpack-flag
//! └── assets/objects/ab/ab12...
//! {project}/.oldloom/cache/                # projectmapped stages only
//! └── minecraft-1.4.7-at-<hash>.jar
//! ```
//!
//! A [`CacheKey`] names every input affecting a stage's bytes; its digest is substituted into
//! the filename so distinct configurations never share a file. The cache has no lock files.
//! Writers go through [`crate::utils::fs::AtomicFile`], so concurrent readers see either no
//! file or a complete one.

pub mod directory;
pub mod key;

pub use directory::{CacheDirectory, CacheRootInfo, HASH_PLACEHOLDER};
pub use key::CacheKey;
