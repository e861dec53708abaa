//! Shared fixtures for oldloom integration tests
//!
//! [`GameFixture`] lays out a project directory with a fake game release: a version
//! manifest and version JSON served through a [`CountingTransport`], client and server jars
//! built from [`ClassBuilder`] output, one library, a virtual asset index with one object,
//! a jarmod-style Forge archive and an MCP archive.

#![allow(dead_code)]

use anyhow::Result;
use assert_cmd::Command;
use oldloom_cli::config::CONFIG_FILE_NAME;
use oldloom_cli::provider::{Environment, Pipeline};
use oldloom_cli::test_utils::{CannedResponse, ClassBuilder, CountingTransport, test_environment_for, write_jar};
use oldloom_cli::utils::fs::calculate_sha1;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const VERSION: &str = "1.4.7";
pub const MANIFEST_URL: &str = "https://meta.test/version_manifest.json";
pub const VERSION_URL: &str = "https://meta.test/1.4.7.json";
pub const CLIENT_URL: &str = "https://launcher.test/1.4.7/client.jar";
pub const SERVER_URL: &str = "https://launcher.test/1.4.7/server.jar";
pub const LIBRARY_PATH: &str = "org/test/util/1.0/util-1.0.jar";
pub const LIBRARY_URL: &str = "https://libraries.test/org/test/util/1.0/util-1.0.jar";
pub const ASSET_INDEX_URL: &str = "https://meta.test/indexes/legacy.json";
pub const RESOURCES_URL: &str = "https://resources.test";
/// Content of the single asset object, laid out as `title/logo.txt`.
pub const ASSET: &[u8] = b"OLDLOOM";

/// `joined.srg` for the fixture game: `a` is an entity, `b` only exists on the client.
const JOINED_SRG: &str = "\
CL: a net/minecraft/src/Entity
CL: b net/minecraft/src/GuiScreen
FD: a/x net/minecraft/src/Entity/field_70165_t
MD: a/c ()V net/minecraft/src/Entity/func_70071_h_ ()V
";
const FIELDS_CSV: &str = "searge,name,side,desc\nfield_70165_t,posX,2,\n";
const METHODS_CSV: &str = "searge,name,side,desc\nfunc_70071_h_,onUpdate,2,\n";
const PACKAGES_CSV: &str = "class,package\nEntity,net/minecraft/entity\nGuiScreen,net/minecraft/client/gui\n";

/// A project directory wired to a fake release.
pub struct GameFixture {
    pub temp: TempDir,
    pub transport: CountingTransport,
}

impl GameFixture {
    pub fn new() -> Result<Self> {
        let temp = TempDir::new()?;
        let fixture = Self {
            temp,
            transport: CountingTransport::new(),
        };
        fixture.write_artifacts()?;
        Ok(fixture)
    }

    pub fn project_dir(&self) -> &Path {
        self.temp.path()
    }

    pub fn global_cache(&self) -> PathBuf {
        self.project_dir().join("global-cache")
    }

    /// Project file body after `minecraft_version`: `top` holds top-level keys and
    /// `dependencies` extra lines of the `[dependencies]` table.
    pub fn config_body(&self, top: &str, dependencies: &str) -> String {
        format!(
            "{top}\n[dependencies]\nforge = [\"libs/forge.zip\"]\nmappings = [\"libs/mcp.zip\"]\n\
             {dependencies}\n[urls]\nversion_manifest = \"{MANIFEST_URL}\"\nresources = \"{RESOURCES_URL}\"\n"
        )
    }

    /// Write `oldloom.toml` for CLI runs.
    pub fn write_config(&self) -> Result<()> {
        std::fs::write(
            self.project_dir().join(CONFIG_FILE_NAME),
            format!("minecraft_version = \"{VERSION}\"\n{}", self.config_body("", "")),
        )?;
        Ok(())
    }

    /// A fresh environment sharing this fixture's transport and directories.
    pub fn environment(&self, top: &str, dependencies: &str) -> Result<Environment> {
        test_environment_for(
            VERSION,
            self.project_dir(),
            &self.config_body(top, dependencies),
            self.transport.clone(),
        )
    }

    pub fn pipeline(&self) -> Result<Pipeline> {
        Ok(Pipeline::new(self.environment("", "")?))
    }

    fn write_artifacts(&self) -> Result<()> {
        let upstream = self.project_dir().join("upstream");
        let libs = self.project_dir().join("libs");
        std::fs::create_dir_all(&upstream)?;
        std::fs::create_dir_all(&libs)?;

        let entity = ClassBuilder::new("a")
            .field("x", "D")
            .method("c", "()V")
            .build();
        let client = upstream.join("client.jar");
        write_jar(
            &client,
            &[
                ("a.class", entity.clone()),
                ("b.class", ClassBuilder::new("b").field("y", "La;").build()),
                ("title/splashes.txt", b"Also try oldloom!".to_vec()),
            ],
        )?;
        let server = upstream.join("server.jar");
        write_jar(&server, &[("a.class", entity)])?;
        let library = upstream.join("util-1.0.jar");
        write_jar(
            &library,
            &[("org/test/util/Helper.class", ClassBuilder::new("org/test/util/Helper").build())],
        )?;
        let asset_hash = sha1_hex(ASSET);
        let asset_index = format!(
            r#"{{"virtual": true, "objects": {{"title/logo.txt": {{"hash": "{asset_hash}", "size": {}}}}}}}"#,
            ASSET.len()
        );

        write_jar(
            &libs.join("forge.zip"),
            &[
                ("forge/ForgeVersion.class", ClassBuilder::new("forge/ForgeVersion").build()),
                ("deobfuscation_data-1.4.7.lzma", b"not for dev".to_vec()),
                ("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".to_vec()),
            ],
        )?;
        write_jar(
            &libs.join("mcp.zip"),
            &[
                ("conf/joined.srg", JOINED_SRG.as_bytes().to_vec()),
                ("conf/fields.csv", FIELDS_CSV.as_bytes().to_vec()),
                ("conf/methods.csv", METHODS_CSV.as_bytes().to_vec()),
                ("conf/packages.csv", PACKAGES_CSV.as_bytes().to_vec()),
            ],
        )?;

        let version_json = format!(
            r#"{{
                "id": "{VERSION}",
                "mainClass": "net.minecraft.client.Minecraft",
                "minecraftArguments": "${{auth_player_name}} ${{auth_session}}",
                "downloads": {{
                    "client": {{"url": "{CLIENT_URL}", "sha1": "{}"}},
                    "server": {{"url": "{SERVER_URL}", "sha1": "{}"}}
                }},
                "assetIndex": {{"id": "legacy", "url": "{ASSET_INDEX_URL}"}},
                "libraries": [
                    {{"name": "org.test:util:1.0", "downloads": {{"artifact":
                        {{"path": "{LIBRARY_PATH}", "url": "{LIBRARY_URL}", "sha1": "{}"}}}}}}
                ]
            }}"#,
            calculate_sha1(&client)?,
            calculate_sha1(&server)?,
            calculate_sha1(&library)?
        );
        let manifest = format!(r#"{{"versions": [{{"id": "{VERSION}", "url": "{VERSION_URL}"}}]}}"#);

        self.transport
            .route(MANIFEST_URL, CannedResponse::ok(manifest).header("ETag", "\"m1\""));
        self.transport.route(VERSION_URL, CannedResponse::ok(version_json));
        self.transport.route(CLIENT_URL, CannedResponse::ok(std::fs::read(&client)?));
        self.transport.route(SERVER_URL, CannedResponse::ok(std::fs::read(&server)?));
        self.transport.route(LIBRARY_URL, CannedResponse::ok(std::fs::read(&library)?));
        self.transport
            .route(ASSET_INDEX_URL, CannedResponse::ok(asset_index).header("ETag", "\"i1\""));
        self.transport.route(
            &format!("{RESOURCES_URL}/{}/{asset_hash}", &asset_hash[..2]),
            CannedResponse::ok(ASSET.to_vec()),
        );
        Ok(())
    }
}

fn sha1_hex(data: &[u8]) -> String {
    use sha1::{Digest, Sha1};
    hex::encode(Sha1::digest(data))
}

/// The `oldloom` binary with a throwaway shared cache.
pub fn oldloom(cache_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("oldloom").expect("oldloom binary");
    cmd.env("OLDLOOM_CACHE_DIR", cache_dir).env_remove("RUST_LOG");
    cmd
}
