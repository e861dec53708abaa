//! Jar-to-jar transformations run by the pipeline stages.
//!
//! Each function takes its inputs and an immutable description of what to do, and returns
//! a new [`Jar`](crate::jar::Jar); writing the result and deciding whether it is needed at
//! all is left to the provider that calls it.
//!
//! - [`merge`] - combine the client and server jars, tagging one-sided classes and members
//! - [`binpatch`] - apply Forge GDIFF class patches
//! - [`jarmod`] - overlay jar mods onto a jar
//! - [`access`] - apply Forge access transformer directives
//! - [`remap`] - rename classes and members between namespaces
//! - [`hierarchy`] - inheritance lookups used by [`remap`]

pub mod access;
pub mod binpatch;
pub mod hierarchy;
pub mod jarmod;
pub mod merge;
pub mod remap;

pub use access::AccessTransformerSet;
pub use binpatch::BinpatchSet;
pub use jarmod::Denylist;
pub use merge::{SideAnnotationStyle, merge_jars};
pub use remap::{ClassFilterRule, FilterAction, RemapOptions, remap_jar};
