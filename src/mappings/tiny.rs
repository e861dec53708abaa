//! Tiny v1, the on-disk cache format for built mapping sets
//!
//! ```text
//! v1	official	intermediary	named
//! CLASS	a	net/minecraft/src/Entity	net/minecraft/entity/Entity
//! FIELD	a	D	b	field_1_b	posX
//! METHOD	a	(La;)V	c	func_2_c	setWorld
//! ```
//!
//! Member owners and descriptors are in the first namespace of the header. Names are
//! written after fallback, so every column is filled; a field whose descriptor is unknown is
//! written with an empty descriptor column.

use crate::mappings::{MappingSet, Namespace};
use anyhow::{Context, Result, bail};
use std::fmt::Write as _;

const HEADER: &str = "v1\tofficial\tintermediary\tnamed";

/// Serialize `set` in class order.
pub fn write_tiny(set: &MappingSet) -> String {
    let mut out = String::new();
    out.push_str(HEADER);
    out.push('\n');
    for class in set.classes() {
        let names = &class.names;
        let _ = writeln!(
            out,
            "CLASS\t{}\t{}\t{}",
            names.official(),
            names.get(Namespace::Intermediary),
            names.get(Namespace::Named)
        );
        for field in class.fields() {
            let _ = writeln!(
                out,
                "FIELD\t{}\t{}\t{}\t{}\t{}",
                names.official(),
                field.descriptor.as_deref().unwrap_or_default(),
                field.names.official(),
                field.names.get(Namespace::Intermediary),
                field.names.get(Namespace::Named)
            );
        }
        for method in class.methods() {
            let _ = writeln!(
                out,
                "METHOD\t{}\t{}\t{}\t{}\t{}",
                names.official(),
                method.descriptor.as_deref().unwrap_or_default(),
                method.names.official(),
                method.names.get(Namespace::Intermediary),
                method.names.get(Namespace::Named)
            );
        }
    }
    out
}

/// Parse a tiny v1 file whose first namespace is `official`.
pub fn read_tiny(content: &str) -> Result<MappingSet> {
    let mut lines = content.lines();
    let header: Vec<&str> = lines.next().context("empty tiny file")?.split('\t').collect();
    if header.first() != Some(&"v1") {
        bail!("not a tiny v1 file (header '{}')", header.join(" "));
    }
    let namespaces = header[1..]
        .iter()
        .map(|ns| ns.parse::<Namespace>())
        .collect::<Result<Vec<_>, _>>()?;
    if namespaces.first() != Some(&Namespace::Official) {
        bail!("tiny file must list 'official' as its first namespace");
    }

    let mut set = MappingSet::new();
    for (number, line) in lines.enumerate() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let columns: Vec<&str> = line.split('\t').collect();
        let line_no = number + 2;
        match columns.first().copied() {
            Some("CLASS") => {
                let names = columns.get(1..).filter(|n| n.len() == namespaces.len());
                let Some(names) = names else {
                    bail!("line {line_no}: CLASS needs {} names", namespaces.len());
                };
                let class = set.class_mut(names[0]);
                for (namespace, name) in namespaces.iter().zip(names).skip(1) {
                    class.names.set(*namespace, *name);
                }
            }
            Some(kind @ ("FIELD" | "METHOD")) => {
                if columns.len() != 3 + namespaces.len() {
                    bail!("line {line_no}: {kind} needs {} columns", 3 + namespaces.len());
                }
                let (owner, descriptor, names) = (columns[1], columns[2], &columns[3..]);
                let class = set.class_mut(owner);
                let member = if kind == "FIELD" {
                    class.field_mut(names[0], (!descriptor.is_empty()).then_some(descriptor))
                } else {
                    class.method_mut(names[0], descriptor)
                };
                for (namespace, name) in namespaces.iter().zip(names).skip(1) {
                    member.names.set(*namespace, *name);
                }
            }
            _ => bail!("line {line_no}: unrecognised entry '{line}'"),
        }
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_preserves_resolved_names() {
        let mut set = MappingSet::new();
        let class = set.class_mut("a");
        class.names.set(Namespace::Intermediary, "net/minecraft/src/Entity");
        class.field_mut("b", None).names.set(Namespace::Intermediary, "field_1_b");
        let method = class.method_mut("c", "(La;)V");
        method.names.set(Namespace::Intermediary, "func_2_c");
        method.names.set(Namespace::Named, "setWorld");

        let text = write_tiny(&set);
        assert!(text.starts_with("v1\tofficial\tintermediary\tnamed\n"));
        assert!(text.contains("FIELD\ta\t\tb\tfield_1_b\tfield_1_b\n"));

        let read = read_tiny(&text).unwrap();
        let view = read.view(Namespace::Official, Namespace::Named);
        assert_eq!(view.map_class("a"), Some("net/minecraft/src/Entity"));
        assert_eq!(view.map_field("a", "b", "I"), Some("field_1_b"));
        assert_eq!(view.map_method("a", "c", "(La;)V"), Some("setWorld"));
        assert_eq!(write_tiny(&read), text);
    }

    #[test]
    fn test_rejects_other_formats() {
        assert!(read_tiny("tiny\t2\t0\tofficial\tnamed\n").is_err());
        assert!(read_tiny("v1\tnamed\tofficial\n").is_err());
        assert!(read_tiny("v1\tofficial\tnamed\nCLASS\ta\n").is_err());
    }
}
