//! Configuration for oldloom
//!
//! A project is described by `oldloom.toml` ([`WorkspaceConfig`]), parsed with `serde` and
//! `toml`. Before the pipeline starts the file is resolved into [`Settings`]: relative paths
//! become absolute, cache roots are chosen, and every [`AutoFlag`] is decided from the game
//! version or the declared inputs.
//!
//! # Cache roots
//!
//! - Shared: `OLDLOOM_CACHE_DIR`, else `[cache] global_dir`, else the platform cache dir
//!   (`~/.cache/oldloom` on Linux)
//! - Project: `{project}/.oldloom/cache`

pub mod auto_flag;
pub mod settings;
pub mod workspace;

pub use auto_flag::AutoFlag;
pub use settings::{
    CACHE_DIR_ENV, PROJECT_STATE_DIR, Settings, SettingsOverrides, default_global_cache_dir,
    parse_game_version,
};
pub use workspace::{
    AccessTransformerConfig, CONFIG_FILE_NAME, CacheConfig, ForgeConfig, JarmodConfig,
    RemapConfig, UrlConfig, WorkspaceConfig,
};
