//! The vanilla game: version metadata and the client and server jars.

use crate::cache::CacheKey;
use crate::core::{LoomError, Side};
use crate::fetch::FetchOptions;
use crate::provider::context::StageContext;
use crate::provider::graph::Provider;
use crate::provider::version::{VersionManifest, VersionMeta};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Default)]
pub struct MinecraftProvider {
    manifest: PathBuf,
    version_json: PathBuf,
    client_jar: PathBuf,
    server_jar: PathBuf,
    key: CacheKey,
    meta: Option<VersionMeta>,
}

impl MinecraftProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn meta(&self) -> Result<&VersionMeta> {
        self.meta.as_ref().context("Version metadata has not been loaded")
    }

    pub fn jar(&self, side: Side) -> &Path {
        match side {
            Side::Client => &self.client_jar,
            Side::Server => &self.server_jar,
        }
    }

    pub fn version_json(&self) -> &Path {
        &self.version_json
    }

    fn fetch_version_json(&self, ctx: &StageContext<'_>, version: &str) -> Result<()> {
        if self.version_json.is_file() {
            return Ok(());
        }
        ctx.fetcher()
            .fetch(&ctx.settings().urls.version_manifest, &self.manifest, &FetchOptions::new().etag())?;
        let manifest: VersionManifest = read_json(&self.manifest)?;
        let entry = manifest.find(version).ok_or_else(|| LoomError::Configuration {
            message: format!("minecraft_version '{version}' is not listed in the version manifest"),
        })?;
        let mut options = FetchOptions::new().etag();
        if let Some(sha1) = &entry.sha1 {
            options = options.sha1(sha1);
        }
        ctx.fetcher().fetch(&entry.url, &self.version_json, &options)?;
        Ok(())
    }
}

impl Provider for MinecraftProvider {
    fn name(&self) -> &'static str {
        "minecraft"
    }

    fn setup(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let version = &ctx.settings().minecraft_version;
        // The version JSON is never re-fetched once present, so the id names its content.
        self.key = CacheKey::new()
            .with("minecraft", version)
            .with("manifest", &ctx.settings().urls.version_manifest);
        self.manifest = ctx.global_path("versions/version_manifest.json")?;
        self.version_json = ctx.global_path(&format!("versions/{version}/{version}.json"))?;
        self.client_jar = ctx.global_path(&format!("minecraft-{version}-client.jar"))?;
        self.server_jar = ctx.global_path(&format!("minecraft-{version}-server.jar"))?;
        Ok(())
    }

    fn install(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let version = ctx.settings().minecraft_version.clone();
        self.fetch_version_json(ctx, &version)?;
        let meta: VersionMeta = read_json(&self.version_json)?;

        let server = meta.downloads.server.as_ref().ok_or_else(|| LoomError::Configuration {
            message: format!("version {version} has no server download"),
        })?;
        for (download, dest) in [(&meta.downloads.client, &self.client_jar), (server, &self.server_jar)] {
            let mut options = FetchOptions::new();
            options = match &download.sha1 {
                Some(sha1) => options.sha1(sha1),
                None => options.skip_if_exists(),
            };
            ctx.fetcher().fetch(&download.url, dest, &options)?;
        }
        self.meta = Some(meta);
        Ok(())
    }

    fn load(&mut self, _ctx: &StageContext<'_>) -> Result<()> {
        debug!("Using cached version metadata {}", self.version_json.display());
        self.meta = Some(read_json(&self.version_json)?);
        Ok(())
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.version_json.clone(), self.client_jar.clone(), self.server_jar.clone()]
    }

    fn cache_key(&self) -> Option<&CacheKey> {
        Some(&self.key)
    }
}

/// Parse a cached JSON document, treating unreadable content as an integrity problem.
pub(crate) fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).map_err(|err| {
        LoomError::DataIntegrity {
            path: path.to_path_buf(),
            reason: format!("invalid JSON: {err}"),
        }
        .into()
    })
}
