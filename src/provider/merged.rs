//! The client and server jars merged into one.

use crate::cache::CacheKey;
use crate::core::Side;
use crate::jar::Jar;
use crate::provider::binpatched::BinpatchedProvider;
use crate::provider::context::StageContext;
use crate::provider::graph::{Node, Provider};
use crate::transform::merge_jars;
use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct MergedProvider {
    binpatched: Node<BinpatchedProvider>,
    key: CacheKey,
    jar: PathBuf,
}

impl MergedProvider {
    pub fn new(binpatched: Node<BinpatchedProvider>) -> Self {
        Self {
            binpatched,
            key: CacheKey::new(),
            jar: PathBuf::new(),
        }
    }

    pub fn jar(&self) -> &Path {
        &self.jar
    }
}

impl Provider for MergedProvider {
    fn name(&self) -> &'static str {
        "merged"
    }

    fn setup(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let settings = ctx.settings();
        self.key = ctx
            .dependency_key(self.binpatched)?
            .with("stage", "merged")
            .with("side_annotation", format!("{:?}", settings.side_annotation));
        self.jar = ctx.output_path(
            &self.key,
            &format!("minecraft-{}-merged-{{hash}}.jar", settings.minecraft_version),
        )?;
        Ok(())
    }

    fn install(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let binpatched = ctx.dependency(self.binpatched)?;
        let client = Jar::read(binpatched.jar(Side::Client))?;
        let server = Jar::read(binpatched.jar(Side::Server))?;
        let (merged, stats) = merge_jars(&client, &server, ctx.settings().side_annotation)?;
        info!(
            "Merged jars: {} identical, {} merged, {} client-only, {} server-only",
            stats.identical, stats.merged, stats.client_only, stats.server_only
        );
        merged.write(&self.jar)
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.jar.clone()]
    }

    fn cache_key(&self) -> Option<&CacheKey> {
        Some(&self.key)
    }
}
