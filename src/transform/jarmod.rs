//! Overlaying jar mods onto a jar.

use crate::core::LoomError;
use crate::jar::{Jar, is_meta_inf};
use anyhow::Result;
use glob::Pattern;
use tracing::debug;

/// Entry names never copied from an overlay, as glob patterns.
#[derive(Debug, Clone, Default)]
pub struct Denylist {
    patterns: Vec<Pattern>,
}

impl Denylist {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p.as_ref()).map_err(|err| LoomError::Configuration {
                    message: format!("invalid jarmod denylist pattern '{}': {err}", p.as_ref()),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Matches either the full entry name or its file name.
    pub fn matches(&self, entry: &str) -> bool {
        let file = entry.rsplit('/').next().unwrap_or(entry);
        self.patterns.iter().any(|p| p.matches(entry) || p.matches(file))
    }
}

/// `base` without `META-INF/`, then every allowed entry of each overlay in order, later
/// entries replacing earlier ones.
pub fn overlay(base: &Jar, overlays: &[&Jar], denylist: &Denylist) -> Jar {
    let mut combined: Jar = base
        .entries()
        .filter(|(name, _)| !is_meta_inf(name))
        .map(|(name, data)| (name.to_string(), data.to_vec()))
        .collect();
    for jar in overlays {
        let mut replaced = 0;
        for (name, data) in jar.entries() {
            if is_meta_inf(name) || denylist.matches(name) {
                continue;
            }
            replaced += usize::from(combined.contains(name));
            combined.insert(name, data.to_vec());
        }
        debug!("Overlay of {} entries replaced {replaced}", jar.len());
    }
    combined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_replaces_and_filters() {
        let mut base = Jar::new();
        base.insert("a.class", vec![1]);
        base.insert("b.class", vec![2]);
        base.insert("META-INF/MOJANG_C.SF", vec![3]);
        let mut forge = Jar::new();
        forge.insert("a.class", vec![10]);
        forge.insert("forge/Hooks.class", vec![11]);
        forge.insert("deobfuscation_data_1.5.2.lzma", vec![12]);
        forge.insert("META-INF/MANIFEST.MF", vec![13]);
        let mut extra = Jar::new();
        extra.insert("forge/Hooks.class", vec![20]);

        let denylist = Denylist::new(&["deobfuscation_data*.lzma"]).unwrap();
        let combined = overlay(&base, &[&forge, &extra], &denylist);
        assert_eq!(
            combined.names().collect::<Vec<_>>(),
            vec!["a.class", "b.class", "forge/Hooks.class"]
        );
        assert_eq!(combined.get("a.class"), Some([10u8].as_slice()));
        assert_eq!(combined.get("forge/Hooks.class"), Some([20u8].as_slice()));
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let err = Denylist::new(&["[unclosed"]).unwrap_err();
        assert!(err.downcast_ref::<LoomError>().is_some_and(LoomError::is_configuration_error));
    }
}
