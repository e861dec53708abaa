//! oldloom - development workspaces for legacy Forge mods
//!
//! Old Minecraft releases (up to 1.7) ship obfuscated client and server jars that Forge
//! patches in one of two ways: binary patches applied per side, or a "jarmod" archive
//! overlaid onto the merged jar. oldloom rebuilds a workspace mods can be compiled and
//! debugged against by running a fixed graph of cached transformations:
//!
//! ```text
//! fetch -> binpatch -> merge -> jarmod -> access transform -> remap (intermediary, named)
//! ```
//!
//! Every stage is a node of the [`provider`] graph. Setup computes a content-derived
//! [`cache::CacheKey`] and output paths; install does the work only when those outputs are
//! missing. Outputs land in a shared cache unless the stage, or anything it depends on, uses
//! project-specific inputs, in which case they are isolated under `.oldloom/cache`.
//!
//! # Modules
//!
//! ## Pipeline
//! - [`provider`] - the stage graph, its lifecycle and the thirteen stages
//! - [`cache`] - content-keyed output paths and the two cache roots
//! - [`fetch`] - conditional downloads (ETag, Last-Modified, hash, max-age)
//! - [`host`] - adapters for dependency resolution and run configuration staging
//!
//! ## Artifacts
//! - [`jar`] - zip archives as ordered entry maps
//! - [`classfile`] - a minimal class-file codec with constant-pool rewriting
//! - [`mappings`] - official, intermediary and named names and their file formats
//! - [`transform`] - merge, binpatch, jarmod overlay, access transformation and remapping
//!
//! ## Supporting
//! - [`cli`] - the `oldloom` command line
//! - [`config`] - `oldloom.toml` and resolved [`config::Settings`]
//! - [`core`] - error taxonomy and the game [`core::Side`]
//! - [`utils`] - atomic file writes and progress reporting
//!
//! # Project file
//!
//! ```toml
//! minecraft_version = "1.6.4"
//!
//! [dependencies]
//! forge = ["libs/minecraftforge-universal-1.6.4-9.11.1.965.jar"]
//! mappings = ["libs/mcp-1.6.4.zip"]
//! mod_compile = ["libs/othermod-1.0.jar"]
//!
//! [access_transformers]
//! custom = ["src/main/resources/mymod_at.cfg"]
//! ```

pub mod cache;
pub mod classfile;
pub mod cli;
pub mod config;
pub mod core;
pub mod fetch;
pub mod host;
pub mod jar;
pub mod mappings;
pub mod provider;
pub mod transform;
pub mod utils;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
