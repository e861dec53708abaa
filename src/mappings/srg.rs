//! SRG structural renames (`joined.srg`, `client.srg`, `server.srg`).
//!
//! ```text
//! PK: . net/minecraft/src
//! CL: a net/minecraft/src/Entity
//! FD: a/b net/minecraft/src/Entity/field_70165_t
//! MD: a/c (La;)V net/minecraft/src/Entity/func_70029_a (Lnet/minecraft/src/Entity;)V
//! ```
//!
//! The left column is official, the right intermediary. Field lines may also carry
//! descriptors (`FD: a/b I net/.../field_1_b I`).

use crate::mappings::{MappingSet, Namespace};
use anyhow::{Result, bail};

/// Merge the SRG lines of `content` into `set`. Later lines overwrite earlier ones.
pub fn read_srg(content: &str, set: &mut MappingSet) -> Result<()> {
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut parse = || -> Result<()> {
            let (kind, rest) = line.split_once(':').unwrap_or((line, ""));
            let parts: Vec<&str> = rest.split_whitespace().collect();
            match (kind, parts.as_slice()) {
                ("PK", _) => {}
                ("CL", [official, intermediary]) => {
                    set.class_mut(official).names.set(Namespace::Intermediary, *intermediary);
                }
                ("FD", [official, intermediary]) => {
                    let (owner, name) = split_member(official)?;
                    let (_, target) = split_member(intermediary)?;
                    set.class_mut(owner).field_mut(name, None).names.set(Namespace::Intermediary, target);
                }
                ("FD", [official, descriptor, intermediary, _]) => {
                    let (owner, name) = split_member(official)?;
                    let (_, target) = split_member(intermediary)?;
                    set.class_mut(owner)
                        .field_mut(name, Some(*descriptor))
                        .names
                        .set(Namespace::Intermediary, target);
                }
                ("MD", [official, descriptor, intermediary, _]) => {
                    let (owner, name) = split_member(official)?;
                    let (_, target) = split_member(intermediary)?;
                    set.class_mut(owner)
                        .method_mut(name, descriptor)
                        .names
                        .set(Namespace::Intermediary, target);
                }
                _ => bail!("unrecognised SRG line"),
            }
            Ok(())
        };
        if let Err(err) = parse() {
            bail!("line {}: {err}: {line}", number + 1);
        }
    }
    Ok(())
}

fn split_member(path: &str) -> Result<(&str, &str)> {
    match path.rsplit_once('/') {
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Ok((owner, name)),
        _ => bail!("'{path}' is not an owner/member path"),
    }
}
