//! Integration test suite for oldloom
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! - **pipeline**: full builds against a fake release served by `CountingTransport`
//! - **cli**: the `oldloom` binary through `assert_cmd`

#[path = "../common/mod.rs"]
mod common;

mod cli;
mod pipeline;
