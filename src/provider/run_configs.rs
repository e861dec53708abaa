//! Client and server launch descriptors.

use crate::config::Settings;
use crate::core::Side;
use crate::host::RunConfig;
use crate::provider::assets::AssetsProvider;
use crate::provider::context::{Environment, StageContext};
use crate::provider::graph::{Node, Provider};
use crate::provider::minecraft::MinecraftProvider;
use crate::provider::natives::NativesProvider;
use crate::provider::version::VersionMeta;
use anyhow::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const LAUNCHWRAPPER_MAIN: &str = "net.minecraft.launchwrapper.Launch";
pub const CLIENT_TWEAKER: &str = "cpw.mods.fml.common.launcher.FMLTweaker";
pub const SERVER_TWEAKER: &str = "cpw.mods.fml.common.launcher.FMLServerTweaker";
pub const LEGACY_SERVER_MAIN: &str = "net.minecraft.server.MinecraftServer";

pub struct RunConfigsProvider {
    minecraft: Node<MinecraftProvider>,
    natives: Node<NativesProvider>,
    assets: Node<AssetsProvider>,
    staged: Vec<PathBuf>,
}

impl RunConfigsProvider {
    pub const fn new(
        minecraft: Node<MinecraftProvider>,
        natives: Node<NativesProvider>,
        assets: Node<AssetsProvider>,
    ) -> Self {
        Self {
            minecraft,
            natives,
            assets,
            staged: Vec::new(),
        }
    }

    /// Files written by the run configuration sink during this build.
    pub fn staged(&self) -> &[PathBuf] {
        &self.staged
    }
}

/// Where the game finds its natives and assets.
pub struct LaunchPaths<'a> {
    pub natives: &'a Path,
    pub assets: &'a Path,
    pub asset_index: &'a str,
}

/// Build the descriptor for `side`.
pub fn build_run_config(side: Side, settings: &Settings, meta: &VersionMeta, paths: &LaunchPaths<'_>) -> RunConfig {
    let run_dir = settings.run_dir();
    let mut program_args = Vec::new();
    let main_class = match (side, settings.launchwrapper) {
        (Side::Client, true) => {
            program_args.extend(client_arguments(meta, settings, &run_dir, paths));
            program_args.extend(["--tweakClass".to_string(), CLIENT_TWEAKER.to_string()]);
            LAUNCHWRAPPER_MAIN.to_string()
        }
        (Side::Client, false) => {
            program_args.extend(client_arguments(meta, settings, &run_dir, paths));
            meta.main_class.clone()
        }
        (Side::Server, true) => {
            program_args.extend(["--tweakClass".to_string(), SERVER_TWEAKER.to_string()]);
            LAUNCHWRAPPER_MAIN.to_string()
        }
        (Side::Server, false) => LEGACY_SERVER_MAIN.to_string(),
    };
    if side == Side::Server {
        program_args.push("nogui".to_string());
    }

    let mut system_properties = BTreeMap::from([
        ("fml.ignoreInvalidMinecraftCertificates".to_string(), "true".to_string()),
        ("fml.ignorePatchDiscrepancies".to_string(), "true".to_string()),
    ]);
    if side == Side::Client {
        system_properties.insert("java.library.path".to_string(), paths.natives.display().to_string());
    }

    RunConfig {
        name: side.as_str().to_string(),
        main_class,
        program_args,
        vm_args: Vec::new(),
        working_dir: run_dir,
        system_properties,
    }
}

/// `minecraftArguments` with launcher placeholders filled in for offline development.
fn client_arguments(meta: &VersionMeta, settings: &Settings, run_dir: &Path, paths: &LaunchPaths<'_>) -> Vec<String> {
    let Some(template) = &meta.minecraft_arguments else {
        return vec!["Player".to_string(), "0".to_string()];
    };
    let assets = paths.assets.display().to_string();
    let game_dir = run_dir.display().to_string();
    template
        .split_whitespace()
        .map(|arg| match arg {
            "${auth_player_name}" => "Player".to_string(),
            "${version_name}" => settings.minecraft_version.clone(),
            "${game_directory}" => game_dir.clone(),
            "${assets_root}" | "${game_assets}" => assets.clone(),
            "${assets_index_name}" => paths.asset_index.to_string(),
            "${auth_uuid}" | "${auth_access_token}" | "${auth_session}" => "0".to_string(),
            "${user_properties}" => "{}".to_string(),
            "${user_type}" => "legacy".to_string(),
            other => other.to_string(),
        })
        .collect()
}

impl Provider for RunConfigsProvider {
    fn name(&self) -> &'static str {
        "run-configs"
    }

    fn needs_isolation(&self, _env: &Environment) -> Result<bool> {
        Ok(true)
    }

    fn setup(&mut self, _ctx: &StageContext<'_>) -> Result<()> {
        Ok(())
    }

    fn install(&mut self, ctx: &StageContext<'_>) -> Result<()> {
        let minecraft = ctx.dependency(self.minecraft)?;
        let natives = ctx.dependency(self.natives)?;
        let assets = ctx.dependency(self.assets)?;
        let paths = LaunchPaths {
            natives: natives.dir(),
            assets: assets.assets_dir(),
            asset_index: assets.index_id(),
        };

        self.staged.clear();
        for side in Side::ALL {
            let config = build_run_config(side, ctx.settings(), minecraft.meta()?, &paths);
            self.staged.push(ctx.run_configs().stage(&config)?);
        }
        Ok(())
    }

    fn outputs(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{SettingsOverrides, WorkspaceConfig};

    fn settings(version: &str) -> Settings {
        let config = WorkspaceConfig::parse(&format!("minecraft_version = \"{version}\"")).unwrap();
        Settings::resolve(&config, Path::new("/work/mod"), Some("/cache".into()), SettingsOverrides::default()).unwrap()
    }

    fn meta(arguments: &str) -> VersionMeta {
        serde_json::from_str(&format!(
            r#"{{"id": "x", "mainClass": "net.minecraft.client.main.Main", "minecraftArguments": "{arguments}",
                "downloads": {{"client": {{"url": "u"}}}}}}"#
        ))
        .unwrap()
    }

    fn paths() -> LaunchPaths<'static> {
        LaunchPaths {
            natives: Path::new("/cache/natives/1.6.4"),
            assets: Path::new("/cache/assets/virtual/legacy"),
            asset_index: "legacy",
        }
    }

    #[test]
    fn test_launchwrapper_client() {
        let config = build_run_config(
            Side::Client,
            &settings("1.6.4"),
            &meta("--username ${auth_player_name} --assetsDir ${game_assets} --version ${version_name}"),
            &paths(),
        );
        assert_eq!(config.main_class, LAUNCHWRAPPER_MAIN);
        assert_eq!(
            config.program_args,
            vec![
                "--username", "Player", "--assetsDir", "/cache/assets/virtual/legacy", "--version", "1.6.4",
                "--tweakClass", CLIENT_TWEAKER
            ]
        );
        assert_eq!(config.system_properties["java.library.path"], "/cache/natives/1.6.4");
        assert_eq!(config.working_dir, Path::new("/work/mod/run"));
    }

    #[test]
    fn test_legacy_server() {
        let config = build_run_config(Side::Server, &settings("1.5.2"), &meta(""), &paths());
        assert_eq!(config.main_class, LEGACY_SERVER_MAIN);
        assert_eq!(config.program_args, vec!["nogui"]);
        assert!(!config.system_properties.contains_key("java.library.path"));
    }
}
