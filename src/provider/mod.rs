//! Pipeline stages and the graph that sequences them
//!
//! Each stage is a [`Provider`] registered in a [`ProviderGraph`]. A stage is first *set up*
//! (cache key and output paths computed, nothing expensive) and later *installed* (outputs
//! produced, or restored from the cache when they already exist). The graph guarantees that
//! every dependency is installed before a dependent installs, and that a stage writes into the
//! project cache whenever it or anything upstream of it depends on project-local inputs.
//!
//! [`Pipeline`] wires the concrete stages:
//!
//! | Stage | Produces |
//! |-------|----------|
//! | [`minecraft`] | version metadata, vanilla client and server jars |
//! | [`libraries`] | runtime library jars for this OS |
//! | [`natives`] | extracted native libraries (`natives/{version}`) |
//! | [`assets`] | asset index and objects |
//! | [`forge`] | loader archive, its access transformers and patch mode |
//! | [`binpatched`] | client and server jars with binary patches applied |
//! | [`merged`] | one jar with side markers |
//! | [`jarmodded`] | jarmods overlaid |
//! | [`mappings`] | the mapping set and its tiny cache file |
//! | [`access_transformed`] | access widened per directives |
//! | [`remapped`] | intermediary and named jars |
//! | [`mod_dependencies`] | mod jars remapped to named |
//! | [`run_configs`] | client and server launch descriptors |

pub mod access_transformed;
pub mod assets;
pub mod binpatched;
pub mod context;
pub mod forge;
pub mod graph;
pub mod jarmodded;
pub mod libraries;
pub mod mappings;
pub mod merged;
pub mod minecraft;
pub mod mod_dependencies;
pub mod natives;
pub mod pipeline;
pub mod remapped;
pub mod run_configs;
pub mod version;

pub use context::{Environment, StageContext};
pub use graph::{Node, NodeId, NodeState, Provider, ProviderGraph};
pub use pipeline::Pipeline;
