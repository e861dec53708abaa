//! Argument parsing and configuration building for the CLI.

use crate::cli::{Cli, Commands};
use clap::Parser;

#[test]
fn test_cli_parsing() {
    assert!(Cli::try_parse_from(["oldloom", "--help"]).is_err());
    assert!(Cli::try_parse_from(["oldloom"]).is_err());
    assert!(Cli::try_parse_from(["oldloom", "setup"]).is_ok());
    assert!(Cli::try_parse_from(["oldloom", "run-configs"]).is_ok());
    assert!(Cli::try_parse_from(["oldloom", "cache", "info"]).is_ok());
}

#[test]
fn test_verbose_and_quiet_conflict() {
    assert!(Cli::try_parse_from(["oldloom", "--verbose", "--quiet", "setup"]).is_err());
}

#[test]
fn test_build_config_log_levels() {
    let cli = Cli::try_parse_from(["oldloom", "-v", "setup"]).unwrap();
    assert_eq!(cli.build_config().log_level.as_deref(), Some("debug"));

    let cli = Cli::try_parse_from(["oldloom", "setup", "--quiet"]).unwrap();
    let config = cli.build_config();
    assert_eq!(config.log_level.as_deref(), Some("error"));
    assert!(config.no_progress);

    let cli = Cli::try_parse_from(["oldloom", "setup"]).unwrap();
    let config = cli.build_config();
    assert_eq!(config.log_level, None);
    assert!(!config.no_progress);
}

#[test]
fn test_global_flags_after_subcommand() {
    let cli = Cli::try_parse_from([
        "oldloom",
        "graph",
        "--paths",
        "--offline",
        "--refresh-dependencies",
        "--project-dir",
        "/work/mod",
        "--no-progress",
    ])
    .unwrap();
    assert!(matches!(cli.command, Commands::Graph(_)));
    let options = cli.global_options().unwrap();
    assert!(options.offline);
    assert!(options.refresh_dependencies);
    assert!(!options.progress);
    assert_eq!(options.config_path(), std::path::Path::new("/work/mod/oldloom.toml"));
}

#[test]
fn test_explicit_config_path() {
    let cli = Cli::try_parse_from(["oldloom", "-c", "/tmp/other.toml", "setup"]).unwrap();
    assert_eq!(
        cli.global_options().unwrap().config_path(),
        std::path::Path::new("/tmp/other.toml")
    );
}

#[test]
fn test_mappings_namespace_parsing() {
    assert!(Cli::try_parse_from(["oldloom", "mappings", "Entity", "--namespace", "srg"]).is_ok());
    assert!(Cli::try_parse_from(["oldloom", "mappings", "Entity", "--namespace", "bogus"]).is_err());
}

#[test]
fn test_cache_clean_flags() {
    let cli = Cli::try_parse_from(["oldloom", "cache", "clean", "--global"]).unwrap();
    assert!(matches!(cli.command, Commands::Cache(_)));
    assert!(Cli::try_parse_from(["oldloom", "cache", "clean", "--project", "--global"]).is_ok());
}
