//! Merging the client and server jars into one.
//!
//! Classes present on one side only are copied with a side marker annotation on the class.
//! Classes present on both sides with identical bytes pass through. Otherwise the two
//! versions are combined member by member into a class with a freshly built constant pool:
//! client members first, in client order, then server-only members. A member present on both
//! sides is taken from the client and left unmarked; one-sided members get the marker.
//! Resources other than classes are taken from the client when both sides have them, and
//! `META-INF/` is dropped.

use crate::classfile::annotations::{EnumAnnotation, add_enum_annotation, find_enum_annotation};
use crate::classfile::{Attribute, ClassFile, ConstantPool, Member, Slot, rewrite_attribute};
use crate::core::{LoomError, Side};
use crate::jar::{Jar, class_name_of, is_meta_inf};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, warn};

/// Which annotation marks side-only classes and members.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SideAnnotationStyle {
    /// `@cpw.mods.fml.relauncher.SideOnly(Side.CLIENT)`
    #[default]
    Fml,
    /// `@net.fabricmc.api.Environment(EnvType.CLIENT)`
    Fabric,
}

impl SideAnnotationStyle {
    /// Annotation type descriptor.
    pub const fn annotation_descriptor(self) -> &'static str {
        match self {
            Self::Fml => "Lcpw/mods/fml/relauncher/SideOnly;",
            Self::Fabric => "Lnet/fabricmc/api/Environment;",
        }
    }

    const fn enum_descriptor(self) -> &'static str {
        match self {
            Self::Fml => "Lcpw/mods/fml/relauncher/Side;",
            Self::Fabric => "Lnet/fabricmc/api/EnvType;",
        }
    }

    /// The annotation marking something as present on `side` only.
    pub const fn marker(self, side: Side) -> EnumAnnotation<'static> {
        EnumAnnotation {
            annotation: self.annotation_descriptor(),
            element: "value",
            enum_type: self.enum_descriptor(),
            constant: side.constant_name(),
        }
    }
}

/// Counters reported after a merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    pub identical: usize,
    pub merged: usize,
    pub client_only: usize,
    pub server_only: usize,
}

/// Merge `client` and `server` into one jar.
pub fn merge_jars(client: &Jar, server: &Jar, style: SideAnnotationStyle) -> Result<(Jar, MergeStats)> {
    let names: BTreeSet<&str> = client
        .names()
        .chain(server.names())
        .filter(|name| !is_meta_inf(name))
        .collect();

    let mut stats = MergeStats::default();
    let mut merged = Jar::new();
    for name in names {
        let data = match (client.get(name), server.get(name)) {
            (Some(c), Some(s)) if c == s => {
                stats.identical += 1;
                c.to_vec()
            }
            (Some(c), Some(s)) if class_name_of(name).is_some() => {
                stats.merged += 1;
                merge_classes(c, s, name, style)?
            }
            (Some(c), Some(_)) => c.to_vec(),
            (Some(c), None) if class_name_of(name).is_some() => {
                stats.client_only += 1;
                mark_class(c, name, Side::Client, style)?
            }
            (None, Some(s)) if class_name_of(name).is_some() => {
                stats.server_only += 1;
                mark_class(s, name, Side::Server, style)?
            }
            (Some(data), None) | (None, Some(data)) => data.to_vec(),
            (None, None) => continue,
        };
        merged.insert(name, data);
    }
    debug!(
        "Merged jars: {} identical, {} merged, {} client-only, {} server-only classes",
        stats.identical, stats.merged, stats.client_only, stats.server_only
    );
    Ok((merged, stats))
}

/// Annotate a whole class as existing on `side` only.
pub fn mark_class(bytes: &[u8], origin: &str, side: Side, style: SideAnnotationStyle) -> Result<Vec<u8>> {
    let mut class = ClassFile::parse(bytes, origin)?;
    if find_enum_annotation(&class.pool, &class.attributes, style.annotation_descriptor())?.is_some() {
        return Ok(bytes.to_vec());
    }
    add_enum_annotation(&mut class.pool, &mut class.attributes, &style.marker(side))?;
    class.to_bytes()
}

/// Combine two versions of the same class.
pub fn merge_classes(client: &[u8], server: &[u8], origin: &str, style: SideAnnotationStyle) -> Result<Vec<u8>> {
    let client = ClassFile::parse(client, origin)?;
    let server = ClassFile::parse(server, origin)?;
    let merged = merge_parsed(&client, &server, style).map_err(|err| LoomError::ClassFormat {
        class: origin.to_string(),
        reason: format!("{err:#}"),
    })?;
    merged.to_bytes().with_context(|| format!("Failed to write merged {origin}"))
}

fn merge_parsed(client: &ClassFile, server: &ClassFile, style: SideAnnotationStyle) -> Result<ClassFile> {
    for class in [client, server] {
        if crate::classfile::find_attribute(&class.pool, &class.attributes, "BootstrapMethods").is_some() {
            anyhow::bail!("classes using invokedynamic cannot be merged");
        }
    }

    let fields = plan_members(&client.pool, &client.fields, &server.pool, &server.fields)?;
    let methods = plan_members(&client.pool, &client.methods, &server.pool, &server.methods)?;

    let mut pool = ConstantPool::new();
    let mut client_memo = HashMap::new();
    let mut server_memo = HashMap::new();

    // Constants loaded by `ldc` take a one-byte index, so they are placed first.
    for (side, member) in fields.iter().chain(&methods) {
        let (source, memo) = match side {
            Some(Side::Server) => (&server.pool, &mut server_memo),
            _ => (&client.pool, &mut client_memo),
        };
        for index in ldc_constants(source, member)? {
            pool.import_loadable(source, index, memo)?;
        }
    }

    let this_class = pool.import(&client.pool, client.this_class, &mut client_memo)?;
    let super_class = if client.super_class == 0 {
        0
    } else {
        pool.import(&client.pool, client.super_class, &mut client_memo)?
    };

    let mut interfaces = Vec::new();
    let mut seen = HashSet::new();
    for (source, list, memo) in [
        (&client.pool, &client.interfaces, &mut client_memo),
        (&server.pool, &server.interfaces, &mut server_memo),
    ] {
        for &interface in list {
            if seen.insert(source.class_name(interface)?) {
                interfaces.push(pool.import(source, interface, memo)?);
            }
        }
    }

    let mut relocate = |side: Option<Side>, member: &Member, pool: &mut ConstantPool| -> Result<Member> {
        let (source, memo) = match side {
            Some(Side::Server) => (&server.pool, &mut server_memo),
            _ => (&client.pool, &mut client_memo),
        };
        let mut moved = relocate_member(pool, source, member, memo)?;
        if let Some(side) = side
            && find_enum_annotation(pool, &moved.attributes, style.annotation_descriptor())?.is_none()
        {
            add_enum_annotation(pool, &mut moved.attributes, &style.marker(side))?;
        }
        Ok(moved)
    };
    let fields = fields
        .iter()
        .map(|(side, member)| relocate(*side, member, &mut pool))
        .collect::<Result<Vec<_>>>()?;
    let methods = methods
        .iter()
        .map(|(side, member)| relocate(*side, member, &mut pool))
        .collect::<Result<Vec<_>>>()?;

    let attributes = relocate_attributes(&mut pool, &client.pool, &client.attributes, &mut client_memo)?;

    Ok(ClassFile {
        minor_version: client.minor_version,
        major_version: client.major_version.max(server.major_version),
        pool,
        access: client.access,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    })
}

/// Members in output order, tagged with the side they are exclusive to.
fn plan_members<'a>(
    client_pool: &ConstantPool,
    client: &'a [Member],
    server_pool: &ConstantPool,
    server: &'a [Member],
) -> Result<Vec<(Option<Side>, &'a Member)>> {
    let server_keys = server
        .iter()
        .map(|m| m.key(server_pool))
        .collect::<Result<HashSet<_>>>()?;
    let client_keys = client
        .iter()
        .map(|m| m.key(client_pool))
        .collect::<Result<HashSet<_>>>()?;

    let mut plan = Vec::with_capacity(client.len() + server.len());
    for member in client {
        let shared = server_keys.contains(&member.key(client_pool)?);
        plan.push(((!shared).then_some(Side::Client), member));
    }
    for member in server {
        if !client_keys.contains(&member.key(server_pool)?) {
            plan.push((Some(Side::Server), member));
        }
    }
    Ok(plan)
}

fn ldc_constants(source: &ConstantPool, member: &Member) -> Result<Vec<u16>> {
    let mut found = Vec::new();
    for attribute in &member.attributes {
        let mut scratch = attribute.clone();
        rewrite_attribute(source, &mut scratch, true, &mut |slot, index| {
            if slot == Slot::Ldc {
                found.push(index);
            }
            Ok(index)
        })?;
    }
    Ok(found)
}

fn relocate_member(
    target: &mut ConstantPool,
    source: &ConstantPool,
    member: &Member,
    memo: &mut HashMap<u16, u16>,
) -> Result<Member> {
    Ok(Member {
        access: member.access,
        name_index: target.import(source, member.name_index, memo)?,
        descriptor_index: target.import(source, member.descriptor_index, memo)?,
        attributes: relocate_attributes(target, source, &member.attributes, memo)?,
    })
}

fn relocate_attributes(
    target: &mut ConstantPool,
    source: &ConstantPool,
    attributes: &[Attribute],
    memo: &mut HashMap<u16, u16>,
) -> Result<Vec<Attribute>> {
    let mut relocated = Vec::with_capacity(attributes.len());
    for attribute in attributes {
        let mut moved = attribute.clone();
        let known = rewrite_attribute(source, &mut moved, false, &mut |_, index| {
            target.import(source, index, memo)
        })?;
        if !known {
            warn!("Dropping attribute '{}' that cannot be relocated", attribute.name(source)?);
            continue;
        }
        moved.name_index = target.import(source, attribute.name_index, memo)?;
        relocated.push(moved);
    }
    Ok(relocated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::Constant;
    use crate::classfile::code::INVOKEVIRTUAL;
    use crate::test_utils::ClassBuilder;

    fn side_of(class: &ClassFile, member: &Member) -> Option<String> {
        find_enum_annotation(&class.pool, &member.attributes, SideAnnotationStyle::Fml.annotation_descriptor())
            .unwrap()
    }

    #[test]
    fn test_merge_unions_members_and_tags_one_sided() {
        let client = ClassBuilder::new("a")
            .field("shared", "I")
            .method_with_code("render", "()V", |code| {
                code.ldc_string("client");
                code.invoke(INVOKEVIRTUAL, "a", "tick", "()V");
                code.op(0xb1);
            })
            .method("tick", "()V")
            .build();
        let server = ClassBuilder::new("a")
            .interface("java/lang/Runnable")
            .field("shared", "I")
            .method("tick", "()V")
            .method_with_code("run", "()V", |code| {
                code.ldc_string("server");
                code.op(0xb1);
            })
            .build();

        let bytes = merge_classes(&client, &server, "a.class", SideAnnotationStyle::Fml).unwrap();
        let merged = ClassFile::parse(&bytes, "a.class").unwrap();
        assert_eq!(merged.interface_names().unwrap(), vec!["java/lang/Runnable"]);

        let render = merged.find_method("render", "()V").unwrap();
        let run = merged.find_method("run", "()V").unwrap();
        let tick = merged.find_method("tick", "()V").unwrap();
        assert_eq!(side_of(&merged, render).as_deref(), Some("CLIENT"));
        assert_eq!(side_of(&merged, run).as_deref(), Some("SERVER"));
        assert_eq!(side_of(&merged, tick), None);
        assert_eq!(side_of(&merged, merged.find_field("shared", "I").unwrap()), None);

        let names: Vec<String> = merged.methods.iter().map(|m| m.name(&merged.pool).unwrap()).collect();
        assert_eq!(names, vec!["render", "tick", "run"]);
    }

    #[test]
    fn test_merge_keeps_ldc_strings_in_one_byte_range() {
        let strings = |prefix: &str| (0..100).map(|i| format!("{prefix}{i}")).collect::<Vec<_>>();
        let (client_strings, server_strings) = (strings("client"), strings("server"));
        let client = ClassBuilder::new("a")
            .method_with_code("render", "()V", |code| {
                for value in &client_strings {
                    code.ldc_string(value);
                    code.op(0x57);
                }
                code.op(0xb1);
            })
            .build();
        let server = ClassBuilder::new("a")
            .method_with_code("run", "()V", |code| {
                for value in &server_strings {
                    code.ldc_string(value);
                    code.op(0x57);
                }
                code.op(0xb1);
            })
            .build();

        let bytes = merge_classes(&client, &server, "a.class", SideAnnotationStyle::Fml).unwrap();
        let merged = ClassFile::parse(&bytes, "a.class").unwrap();
        let loadable: Vec<u16> = merged
            .pool
            .indices()
            .filter(|&i| matches!(merged.pool.get(i), Ok(Constant::String(_))))
            .collect();
        assert_eq!(loadable.len(), 200);
        assert!(loadable.iter().all(|&i| i < 256));
    }

    #[test]
    fn test_merge_jars_passes_identical_and_marks_one_sided_classes() {
        let shared = ClassBuilder::new("shared").build();
        let mut client = Jar::new();
        client.insert("shared.class", shared.clone());
        client.insert("gui.class", ClassBuilder::new("gui").build());
        client.insert("META-INF/MANIFEST.MF", b"Manifest-Version: 1.0\n".to_vec());
        client.insert("lang.txt", b"client".to_vec());
        let mut server = Jar::new();
        server.insert("shared.class", shared.clone());
        server.insert("dedicated.class", ClassBuilder::new("dedicated").build());
        server.insert("lang.txt", b"server".to_vec());

        let (merged, stats) = merge_jars(&client, &server, SideAnnotationStyle::Fabric).unwrap();
        assert_eq!(stats.identical, 1);
        assert_eq!(stats.client_only, 1);
        assert_eq!(stats.server_only, 1);
        assert_eq!(merged.get("shared.class"), Some(shared.as_slice()));
        assert_eq!(merged.get("lang.txt"), Some(b"client".as_slice()));
        assert!(!merged.contains("META-INF/MANIFEST.MF"));

        let dedicated = ClassFile::parse(merged.get("dedicated.class").unwrap(), "dedicated").unwrap();
        let side = find_enum_annotation(
            &dedicated.pool,
            &dedicated.attributes,
            SideAnnotationStyle::Fabric.annotation_descriptor(),
        )
        .unwrap();
        assert_eq!(side.as_deref(), Some("SERVER"));
    }

    #[test]
    fn test_merge_is_deterministic() {
        let client = ClassBuilder::new("a").method("x", "()V").build();
        let server = ClassBuilder::new("a").method("y", "()V").build();
        let first = merge_classes(&client, &server, "a", SideAnnotationStyle::Fml).unwrap();
        let second = merge_classes(&client, &server, "a", SideAnnotationStyle::Fml).unwrap();
        assert_eq!(first, second);
    }
}
