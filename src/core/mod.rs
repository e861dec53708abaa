//! Core types shared by every oldloom module
//!
//! - [`error`] - the error taxonomy ([`LoomError`]), the [`StageFailure`] context attached by
//!   the provider graph, and CLI error rendering ([`user_friendly_error`])
//! - [`side`] - the two game distributions ([`Side::Client`], [`Side::Server`]) that are
//!   fetched, patched and merged separately

pub mod error;
pub mod side;

pub use error::{ErrorContext, LoomError, StageFailure, StagePhase, find_loom_error, user_friendly_error};
pub use side::Side;
