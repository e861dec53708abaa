//! Smoke tests for the `oldloom` binary.

use crate::common::{GameFixture, oldloom};
use anyhow::Result;
use predicates::prelude::*;
use tempfile::TempDir;

#[test]
fn test_help_lists_commands() {
    let temp = TempDir::new().unwrap();
    oldloom(temp.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("setup"))
        .stdout(predicate::str::contains("run-configs"))
        .stdout(predicate::str::contains("mappings"));
}

#[test]
fn test_missing_project_file_fails_with_suggestion() {
    let temp = TempDir::new().unwrap();
    oldloom(&temp.path().join("cache"))
        .args(["setup", "--project-dir"])
        .arg(temp.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("oldloom.toml"));
}

#[test]
fn test_cache_info_without_project_file() {
    let temp = TempDir::new().unwrap();
    let cache = temp.path().join("shared");
    std::fs::create_dir_all(cache.join("mappings")).unwrap();
    std::fs::write(cache.join("mappings").join("x.tiny"), b"tiny\t1\t0\tofficial\n").unwrap();

    oldloom(&cache)
        .args(["cache", "info", "--project-dir"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("global"))
        .stdout(predicate::str::contains("shared"))
        .stdout(predicate::str::contains("not created"));
}

#[test]
fn test_cache_clean_defaults_to_project() {
    let temp = TempDir::new().unwrap();
    let cache = temp.path().join("shared");
    let project_cache = temp.path().join(".oldloom").join("cache");
    std::fs::create_dir_all(&cache).unwrap();
    std::fs::create_dir_all(&project_cache).unwrap();
    std::fs::write(project_cache.join("mod.jar"), b"jar").unwrap();

    oldloom(&cache)
        .args(["cache", "clean", "--project-dir"])
        .arg(temp.path())
        .assert()
        .success();
    assert!(!project_cache.exists());
    assert!(cache.exists());
}

#[test]
fn test_graph_lists_stages() -> Result<()> {
    let fixture = GameFixture::new()?;
    fixture.write_config()?;
    oldloom(&fixture.global_cache())
        .args(["graph", "--project-dir"])
        .arg(fixture.project_dir())
        .assert()
        .success()
        .stdout(predicate::str::contains("minecraft"))
        .stdout(predicate::str::contains("access-transformed"))
        .stdout(predicate::str::contains("mod-dependencies"));
    Ok(())
}

#[test]
fn test_graph_json_reports_projectmapping() -> Result<()> {
    let fixture = GameFixture::new()?;
    fixture.write_config()?;
    let output = oldloom(&fixture.global_cache())
        .args(["graph", "--json", "--project-dir"])
        .arg(fixture.project_dir())
        .output()?;
    assert!(output.status.success());
    let stages: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let stages = stages.as_array().expect("array of stages");
    assert_eq!(stages.len(), 13);
    let run_configs = stages
        .iter()
        .find(|stage| stage["name"] == "run-configs")
        .expect("run-configs stage");
    assert_eq!(run_configs["projectmapped"], true);
    Ok(())
}

#[test]
fn test_offline_setup_without_cache_fails() -> Result<()> {
    let fixture = GameFixture::new()?;
    fixture.write_config()?;
    oldloom(&fixture.global_cache())
        .args(["setup", "--offline", "--quiet", "--project-dir"])
        .arg(fixture.project_dir())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Offline mode"));
    Ok(())
}
