//! Names of the game's classes and members across three namespaces
//!
//! - **official**: the obfuscated names shipped in the game jars (`a`, `b`, `c`)
//! - **intermediary**: stable SRG names (`net/minecraft/src/Entity`, `field_70165_t`)
//! - **named**: human-readable MCP names (`net/minecraft/entity/Entity`, `posX`)
//!
//! A [`MappingSet`] is built once per build from an MCP archive ([`McpArchive`]) or read
//! back from its cached tiny file ([`tiny`]), and then handed to every stage that remaps.
//! Missing names fall back towards lower namespace ordinals: a member without a named name
//! keeps its intermediary name, and one without either keeps its official name.

pub mod csv;
pub mod set;
pub mod srg;
pub mod tiny;

pub use set::{ClassMapping, MappingSet, MappingView, MemberKind, MemberMapping, Names};

use crate::core::LoomError;
use crate::jar::Jar;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// A naming scheme, ordered official < intermediary < named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Namespace {
    Official = 0,
    #[default]
    Intermediary = 1,
    Named = 2,
}

impl Namespace {
    pub const ALL: [Self; 3] = [Self::Official, Self::Intermediary, Self::Named];

    pub const fn ordinal(self) -> usize {
        self as usize
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Official => "official",
            Self::Intermediary => "intermediary",
            Self::Named => "named",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Namespace {
    type Err = LoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "official" => Ok(Self::Official),
            "intermediary" | "srg" => Ok(Self::Intermediary),
            "named" | "mcp" => Ok(Self::Named),
            _ => Err(LoomError::Configuration {
                message: format!("unknown mapping namespace '{s}'"),
            }),
        }
    }
}

/// The text files of an MCP mappings archive.
#[derive(Debug, Clone, Default)]
pub struct McpArchive {
    /// `joined.srg`, or `client.srg` followed by `server.srg`
    pub srg: Vec<String>,
    pub fields: Option<String>,
    pub methods: Option<String>,
    pub packages: Option<String>,
}

impl McpArchive {
    /// Locate the mapping files in `jar` by file name, at any depth.
    pub fn from_jar(jar: &Jar, origin: &str) -> Result<Self> {
        let text = |file: &str| -> Result<Option<String>> {
            let Some((name, data)) = jar
                .entries()
                .find(|(name, _)| name.rsplit('/').next() == Some(file))
            else {
                return Ok(None);
            };
            String::from_utf8(data.to_vec())
                .map(Some)
                .with_context(|| format!("{name} in {origin} is not UTF-8"))
        };

        let srg = match text("joined.srg")? {
            Some(joined) => vec![joined],
            None => ["client.srg", "server.srg"]
                .into_iter()
                .filter_map(|file| text(file).transpose())
                .collect::<Result<Vec<_>>>()?,
        };
        if srg.is_empty() {
            return Err(LoomError::DataIntegrity {
                path: origin.into(),
                reason: "no joined.srg or client.srg/server.srg found".to_string(),
            }
            .into());
        }

        Ok(Self {
            srg,
            fields: text("fields.csv")?,
            methods: text("methods.csv")?,
            packages: text("packages.csv")?,
        })
    }

    /// Merge the sources in order: SRG, fields, methods, packages.
    pub fn build(&self) -> Result<MappingSet> {
        let mut set = MappingSet::new();
        for srg in &self.srg {
            srg::read_srg(srg, &mut set).context("Failed to read SRG mappings")?;
        }
        if let Some(fields) = &self.fields {
            let table = csv::read_member_names(fields).context("Failed to read fields.csv")?;
            let renamed = set.apply_member_names(MemberKind::Field, &table);
            debug!("Named {renamed} fields");
        }
        if let Some(methods) = &self.methods {
            let table = csv::read_member_names(methods).context("Failed to read methods.csv")?;
            let renamed = set.apply_member_names(MemberKind::Method, &table);
            debug!("Named {renamed} methods");
        }
        if let Some(packages) = &self.packages {
            let table = csv::read_packages(packages).context("Failed to read packages.csv")?;
            let moved = set.apply_packages(&table);
            debug!("Moved {moved} classes into packages");
        }
        Ok(set)
    }
}
