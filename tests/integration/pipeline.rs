//! End-to-end pipeline runs against the fake release in [`GameFixture`].

use crate::common::{ASSET, GameFixture, LIBRARY_PATH};
use anyhow::Result;
use oldloom_cli::core::{LoomError, find_loom_error};
use oldloom_cli::jar::Jar;
use oldloom_cli::mappings::Namespace;
use oldloom_cli::provider::{NodeState, Pipeline};
use oldloom_cli::provider::forge::ForgeMode;
use oldloom_cli::test_utils::{ClassBuilder, init_test_logging, write_jar};
use std::path::PathBuf;

#[test]
fn test_setup_produces_remapped_jars() -> Result<()> {
    init_test_logging(None);
    let fixture = GameFixture::new()?;
    let pipeline = fixture.pipeline()?;
    pipeline.install_all()?;

    for node in pipeline.graph.nodes() {
        assert_eq!(pipeline.graph.state(node)?, NodeState::Installed);
    }
    assert_eq!(pipeline.graph.get(pipeline.forge)?.mode(), ForgeMode::Jarmod);

    let named = Jar::read(&pipeline.game_jar(Namespace::Named)?)?;
    assert!(named.contains("net/minecraft/entity/Entity.class"));
    assert!(named.contains("net/minecraft/client/gui/GuiScreen.class"));
    assert!(named.contains("forge/ForgeVersion.class"));
    assert!(named.contains("title/splashes.txt"));
    assert!(!named.contains("deobfuscation_data-1.4.7.lzma"));
    assert!(!named.contains("META-INF/MANIFEST.MF"));

    let intermediary = Jar::read(&pipeline.game_jar(Namespace::Intermediary)?)?;
    assert!(intermediary.contains("net/minecraft/src/Entity.class"));

    let tiny = pipeline.graph.get(pipeline.mappings)?.tiny_path().to_path_buf();
    assert!(tiny.starts_with(fixture.global_cache().join("mappings")));

    let staged = pipeline.stage_run_configs()?;
    assert_eq!(staged.len(), 2);
    assert!(staged.iter().all(|file| file.starts_with(fixture.project_dir().join(".oldloom"))));
    Ok(())
}

#[test]
fn test_second_build_is_served_from_cache() -> Result<()> {
    let fixture = GameFixture::new()?;
    fixture.pipeline()?.install_all()?;
    let calls = fixture.transport.calls();
    assert!(calls >= 4, "expected manifest, version and both jars to be fetched, got {calls}");

    let first_named = std::fs::read(fixture.pipeline()?.game_jar(Namespace::Named)?)?;
    let pipeline = fixture.pipeline()?;
    pipeline.install_all()?;
    assert_eq!(fixture.transport.calls(), calls);
    assert_eq!(std::fs::read(pipeline.game_jar(Namespace::Named)?)?, first_named);
    Ok(())
}

#[test]
fn test_download_stages_are_cached_by_marker() -> Result<()> {
    let fixture = GameFixture::new()?;
    let first = fixture.pipeline()?;
    first.install_all()?;
    let library = fixture.global_cache().join("libraries").join(LIBRARY_PATH);
    assert_eq!(first.graph.get(first.libraries)?.files(), [library.clone()]);
    let calls = fixture.transport.calls();

    let pipeline = fixture.pipeline()?;
    pipeline.graph.reach(pipeline.libraries, NodeState::SetUp)?;
    pipeline.graph.reach(pipeline.assets, NodeState::SetUp)?;
    for node in [pipeline.libraries.id(), pipeline.assets.id()] {
        let outputs = pipeline.graph.outputs(node)?;
        assert!(!outputs.is_empty());
        assert!(outputs.iter().all(|path| path.is_file()));
    }

    pipeline.install_all()?;
    assert_eq!(fixture.transport.calls(), calls);
    assert_eq!(pipeline.graph.get(pipeline.libraries)?.files(), [library]);
    let assets = pipeline.graph.get(pipeline.assets)?;
    assert_eq!(assets.index_id(), "legacy");
    assert!(assets.index().is_some());
    assert_eq!(std::fs::read(assets.assets_dir().join("title/logo.txt"))?, ASSET);
    Ok(())
}

#[test]
fn test_tiny_file_is_keyed_on_the_merged_jar() -> Result<()> {
    let fixture = GameFixture::new()?;
    let tiny_for = |top: &str| -> Result<PathBuf> {
        let pipeline = Pipeline::new(fixture.environment(top, "")?);
        pipeline.graph.reach(pipeline.mappings, NodeState::SetUp)?;
        Ok(pipeline.graph.outputs(pipeline.mappings)?.remove(0))
    };

    let fml = tiny_for("")?;
    assert_eq!(tiny_for("")?, fml);
    let fabric = tiny_for("[forge]\nside_annotation = \"fabric\"")?;
    assert_ne!(fabric, fml);
    assert!(fabric.starts_with(fixture.global_cache().join("mappings")));
    Ok(())
}

#[test]
fn test_offline_build_reuses_cache_and_fails_without_it() -> Result<()> {
    let fixture = GameFixture::new()?;
    let env = fixture.environment("offline = true", "")?;
    let err = Pipeline::new(env)
        .install_all()
        .expect_err("nothing has been downloaded yet");
    assert!(matches!(
        find_loom_error(&err),
        Some(LoomError::Offline { .. })
    ));
    assert_eq!(fixture.transport.calls(), 0);

    fixture.pipeline()?.install_all()?;
    let calls = fixture.transport.calls();
    let env = fixture.environment("offline = true", "")?;
    Pipeline::new(env).install_all()?;
    assert_eq!(fixture.transport.calls(), calls);
    Ok(())
}

#[test]
fn test_mod_dependencies_are_isolated_per_project() -> Result<()> {
    let fixture = GameFixture::new()?;
    let mod_jar = fixture.project_dir().join("libs").join("othermod.jar");
    write_jar(
        &mod_jar,
        &[(
            "othermod/Hook.class",
            ClassBuilder::new("othermod/Hook")
                .super_class("net/minecraft/src/Entity")
                .build(),
        )],
    )?;
    let env = fixture.environment("", "mod_compile = [\"libs/othermod.jar\"]")?;
    let pipeline = Pipeline::new(env);
    pipeline.install_all()?;

    let mods = pipeline.graph.get(pipeline.mod_dependencies)?;
    let files = mods.files();
    assert_eq!(files.len(), 1);
    assert!(files[0].starts_with(fixture.project_dir().join(".oldloom").join("cache")));
    assert!(Jar::read(files[0])?.contains("othermod/Hook.class"));
    Ok(())
}

#[test]
fn test_refresh_rebuilds_outputs() -> Result<()> {
    let fixture = GameFixture::new()?;
    fixture.pipeline()?.install_all()?;
    let calls = fixture.transport.calls();

    let env = fixture.environment("refresh_dependencies = true", "")?;
    let pipeline = Pipeline::new(env);
    pipeline.install_all()?;
    assert!(fixture.transport.calls() > calls);
    assert!(pipeline.game_jar(Namespace::Named)?.is_file());
    Ok(())
}
