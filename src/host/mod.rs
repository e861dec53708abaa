//! Adapters to the world outside the pipeline
//!
//! The provider graph never reads the project file or writes IDE files itself. It asks a
//! [`DependencyResolver`] which files back a dependency configuration and hands finished
//! [`RunConfig`]s to a [`RunConfigSink`]. The implementations here back the command-line
//! tool; an embedding build system supplies its own.

pub mod resolver;
pub mod run_config;

pub use resolver::{DependencyResolver, StaticResolver};
pub use run_config::{JsonRunConfigSink, RunConfig, RunConfigSink};
