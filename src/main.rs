//! oldloom CLI entry point
//!
//! Parses arguments, runs the selected command and renders failures through
//! [`user_friendly_error`]:
//! - `setup` - build the development workspace
//! - `run-configs` - stage client and server launch descriptors
//! - `graph` - show the stage graph
//! - `mappings` - look up names across namespaces
//! - `cache` - inspect and clean the caches

use clap::Parser;
use oldloom_cli::cli;
use oldloom_cli::core::user_friendly_error;

fn main() {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    if let Err(e) = cli.execute() {
        user_friendly_error(e).display();
        std::process::exit(1);
    }
}
