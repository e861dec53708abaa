//! Client and server jars with the loader's binary patches applied.

use crate::cache::CacheKey;
use crate::core::Side;
use crate::jar::Jar;
use crate::provider::context::StageContext;
use crate::provider::forge::{ForgeMode, ForgeProvider};
use crate::provider::graph::{Node, Provider};
use crate::provider::minecraft::MinecraftProvider;
use crate::transform::BinpatchSet;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct BinpatchedProvider {
    minecraft: Node<MinecraftProvider>,
    forge: Node<ForgeProvider>,
    key: CacheKey,
    patched: [PathBuf; 2],
    jars: [PathBuf; 2],
}

impl BinpatchedProvider {
    pub fn new(minecraft: Node<MinecraftProvider>, forge: Node<ForgeProvider>) -> Self {
        Self {
            minecraft,
            forge,
            key: CacheKey::new(),
            patched: Default::default(),
            jars: Default::default(),
        }
    }

    /// The patched jar for `side`, or the vanilla jar when the loader is a jarmod.
    pub fn jar(&self, side: Side) -> &Path {
        &self.jars[index(side)]
    }
}

const fn index(side: Side) -> usize {
    match side {
        Side::Client => 0,
        Side::Server => 1,
    }
}

impl Provider for BinpatchedProvider {
    fn name(&self) -> &'static str {
        "binpatched"
    }

    fn setup(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let version = &ctx.settings().minecraft_version;
        self.key = ctx
            .dependency_key(self.forge)?
            .with("minecraft", version)
            .with("stage", "binpatched");
        for side in Side::ALL {
            self.patched[index(side)] =
                ctx.output_path(&self.key, &format!("minecraft-{version}-{side}-patched-{{hash}}.jar"))?;
        }
        self.jars = self.patched.clone();
        Ok(())
    }

    fn install(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let minecraft = ctx.dependency(self.minecraft)?;
        let forge = ctx.dependency(self.forge)?;
        if forge.mode() == ForgeMode::Jarmod {
            debug!("Loader is a jarmod, using vanilla jars");
            self.jars = [minecraft.jar(Side::Client).to_path_buf(), minecraft.jar(Side::Server).to_path_buf()];
            return Ok(());
        }

        let archive = Jar::read(forge.archive())?;
        for side in Side::ALL {
            let patches = BinpatchSet::from_archive(&archive, side)?;
            let vanilla = Jar::read(minecraft.jar(side))?;
            let patched = patches
                .apply(&vanilla)
                .with_context(|| format!("Failed to patch the {side} jar"))?;
            patched.write(&self.patched[index(side)])?;
        }
        self.jars = self.patched.clone();
        Ok(())
    }

    fn outputs(&self) -> Vec<PathBuf> {
        self.patched.to_vec()
    }

    fn cache_key(&self) -> Option<&CacheKey> {
        Some(&self.key)
    }
}
