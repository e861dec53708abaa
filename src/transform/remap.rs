//! Renaming a jar from one namespace into one or more others
//!
//! Every class is parsed once and then rewritten for each target namespace. The constant
//! pool is edited in place: `Class` entries and member references are pointed at new UTF-8
//! entries appended to the pool, so strings that merely look like class names are left
//! alone. Member references are resolved through the class hierarchy (the input jar plus
//! the classpath), so a call through a subclass finds the mapping of the declaring class.
//!
//! Names without a mapping keep their input name. Inner classes whose outer class is mapped
//! follow it (`a$1` becomes `Outer$1`).

use crate::classfile::descriptor::{map_class_reference, map_descriptor, map_signature};
use crate::classfile::{ACC_STATIC, ClassFile, Constant, ConstantPool, Slot, rewrite_attribute};
use crate::jar::{Jar, class_name_of, entry_name_of};
use crate::mappings::{MappingSet, MappingView, Namespace};
use crate::transform::hierarchy::Hierarchy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// What happens to classes matched by a [`ClassFilterRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterAction {
    /// Copy the class unchanged and never rename references to it
    Skip,
    /// Leave the class out of the output
    Drop,
}

/// Classes whose name (in the source namespace) starts with `prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassFilterRule {
    pub prefix: String,
    pub action: FilterAction,
}

/// Settings shared by every target of one remap.
#[derive(Debug, Clone, Default)]
pub struct RemapOptions {
    /// Give local variables generated names derived from their types
    pub rename_locals: bool,
    pub class_filter: Vec<ClassFilterRule>,
}

impl RemapOptions {
    fn filter(&self, class: &str) -> Option<FilterAction> {
        self.class_filter
            .iter()
            .find(|rule| class.starts_with(&rule.prefix))
            .map(|rule| rule.action)
    }
}

/// Remap `input` from `from` into every namespace in `targets` in one pass.
pub fn remap_jar(
    input: &Jar,
    mappings: &MappingSet,
    from: Namespace,
    targets: &[Namespace],
    classpath: &[&Jar],
    options: &RemapOptions,
) -> Result<BTreeMap<Namespace, Jar>> {
    let hierarchy = Hierarchy::new(input, classpath)?;
    let remappers: Vec<Remapper<'_>> = targets
        .iter()
        .map(|&to| Remapper::new(mappings.view(from, to), &hierarchy, options))
        .collect();
    let mut outputs: Vec<Jar> = targets.iter().map(|_| Jar::new()).collect();

    for (name, data) in input.entries() {
        let Some(class_name) = class_name_of(name) else {
            for output in &mut outputs {
                output.insert(name, data.to_vec());
            }
            continue;
        };
        match options.filter(class_name) {
            Some(FilterAction::Drop) => continue,
            Some(FilterAction::Skip) => {
                for output in &mut outputs {
                    output.insert(name, data.to_vec());
                }
                continue;
            }
            None => {}
        }

        let class = ClassFile::parse(data, name)?;
        for (remapper, output) in remappers.iter().zip(&mut outputs) {
            let (new_name, bytes) = remapper
                .remap_class(class.clone(), class_name)
                .with_context(|| format!("Failed to remap {name} to {}", remapper.view.to))?;
            output.insert(entry_name_of(&new_name), bytes);
        }
    }

    let mut result = BTreeMap::new();
    for (remapper, output) in remappers.iter().zip(outputs) {
        let missing = remapper.unmapped.borrow().len();
        if missing > 0 {
            let message = format!(
                "{missing} classes have no {} name and keep their {} name",
                remapper.view.to, remapper.view.from
            );
            if from == Namespace::Official {
                warn!("{message}");
            } else {
                debug!("{message}");
            }
        }
        info!("Remapped {} entries {} -> {}", output.len(), from, remapper.view.to);
        result.insert(remapper.view.to, output);
    }
    Ok(result)
}

/// Rewrites classes into one target namespace.
pub struct Remapper<'a> {
    view: MappingView,
    hierarchy: &'a Hierarchy<'a>,
    options: &'a RemapOptions,
    members: RefCell<HashMap<(bool, String, String, String), Option<String>>>,
    unmapped: RefCell<Vec<String>>,
}

impl<'a> Remapper<'a> {
    pub fn new(view: MappingView, hierarchy: &'a Hierarchy<'a>, options: &'a RemapOptions) -> Self {
        Self {
            view,
            hierarchy,
            options,
            members: RefCell::new(HashMap::new()),
            unmapped: RefCell::new(Vec::new()),
        }
    }

    /// Target name of a class, `None` when it keeps its name.
    pub fn map_class(&self, name: &str) -> Option<String> {
        if self.options.filter(name).is_some() {
            return None;
        }
        if let Some(mapped) = self.view.map_class(name) {
            return Some(mapped.to_string());
        }
        let (outer, inner) = name.rsplit_once('$')?;
        Some(format!("{}${inner}", self.map_class(outer)?))
    }

    fn descriptor(&self, descriptor: &str) -> Result<String> {
        map_descriptor(descriptor, &mut |name| self.map_class(name))
    }

    /// Target name of a field or method referenced through `owner`, searching the owner's
    /// ancestors for the declaring class.
    pub fn map_member(&self, method: bool, owner: &str, name: &str, descriptor: &str) -> Option<String> {
        let key = (method, owner.to_string(), name.to_string(), descriptor.to_string());
        if let Some(cached) = self.members.borrow().get(&key) {
            return cached.clone();
        }
        let mut found = None;
        if !name.starts_with('<') {
            for class in self.hierarchy.ancestors(owner) {
                let mapped = if method {
                    self.view.map_method(&class, name, descriptor)
                } else {
                    self.view.map_field(&class, name, descriptor)
                };
                if let Some(mapped) = mapped {
                    found = Some(mapped.to_string());
                    break;
                }
                // A field stops at the first class declaring it; methods may still be
                // mapped on an interface further up.
                let declares = self.hierarchy.get(&class).is_some_and(|info| {
                    !method && info.fields.contains(&(name.to_string(), descriptor.to_string()))
                });
                if declares {
                    break;
                }
            }
        }
        self.members.borrow_mut().insert(key, found.clone());
        found
    }

    /// Rewrite `class` (named `name` in the source namespace); returns its new name and bytes.
    pub fn remap_class(&self, mut class: ClassFile, name: &str) -> Result<(String, Vec<u8>)> {
        if self.map_class(name).is_none() {
            self.unmapped.borrow_mut().push(name.to_string());
        }
        let original = class.pool.clone();
        self.remap_pool(&original, &mut class.pool)?;

        for field in &mut class.fields {
            let (field_name, descriptor) = field.key(&original)?;
            if let Some(mapped) = self.map_member(false, name, &field_name, &descriptor) {
                field.name_index = class.pool.intern_utf8(&mapped)?;
            }
            field.descriptor_index = class.pool.intern_utf8(&self.descriptor(&descriptor)?)?;
        }
        for method in &mut class.methods {
            let (method_name, descriptor) = method.key(&original)?;
            if let Some(mapped) = self.map_member(true, name, &method_name, &descriptor) {
                method.name_index = class.pool.intern_utf8(&mapped)?;
            }
            method.descriptor_index = class.pool.intern_utf8(&self.descriptor(&descriptor)?)?;
        }

        let mut attributes = std::mem::take(&mut class.attributes);
        self.remap_attributes(&original, &mut class.pool, &mut attributes, false)?;
        class.attributes = attributes;
        for field in &mut class.fields {
            self.remap_attributes(&original, &mut class.pool, &mut field.attributes, false)?;
        }
        for method in &mut class.methods {
            let is_static = method.access & ACC_STATIC != 0;
            self.remap_attributes(&original, &mut class.pool, &mut method.attributes, is_static)?;
        }

        let new_name = class.name()?;
        Ok((new_name, class.to_bytes()?))
    }

    /// Point class entries and member references of `pool` at their target names.
    fn remap_pool(&self, original: &ConstantPool, pool: &mut ConstantPool) -> Result<()> {
        for index in original.indices() {
            let replacement = match original.get(index)? {
                Constant::Class(name_index) => {
                    let name = original.utf8(*name_index)?;
                    match map_class_reference(&name, &mut |n| self.map_class(n))? {
                        Some(mapped) => Some(Constant::Class(pool.intern_utf8(&mapped)?)),
                        None => None,
                    }
                }
                constant @ (Constant::Fieldref { class, .. }
                | Constant::Methodref { class, .. }
                | Constant::InterfaceMethodref { class, .. }) => {
                    let (owner, name, descriptor) = original.member_ref(index)?;
                    let is_field = matches!(constant, Constant::Fieldref { .. });
                    let owner = if owner.starts_with('[') { "java/lang/Object".to_string() } else { owner };
                    let new_name = self
                        .map_member(!is_field, &owner, &name, &descriptor)
                        .unwrap_or(name);
                    let name_and_type = pool.intern_name_and_type(&new_name, &self.descriptor(&descriptor)?)?;
                    let class = *class;
                    Some(match constant {
                        Constant::Fieldref { .. } => Constant::Fieldref { class, name_and_type },
                        Constant::Methodref { .. } => Constant::Methodref { class, name_and_type },
                        _ => Constant::InterfaceMethodref { class, name_and_type },
                    })
                }
                Constant::InvokeDynamic { bootstrap, name_and_type }
                | Constant::Dynamic { bootstrap, name_and_type } => {
                    let (name, descriptor) = original.name_and_type(*name_and_type)?;
                    let name_and_type = pool.intern_name_and_type(&name, &self.descriptor(&descriptor)?)?;
                    let bootstrap = *bootstrap;
                    Some(if matches!(original.get(index)?, Constant::Dynamic { .. }) {
                        Constant::Dynamic { bootstrap, name_and_type }
                    } else {
                        Constant::InvokeDynamic { bootstrap, name_and_type }
                    })
                }
                Constant::MethodType(descriptor) => {
                    let mapped = self.descriptor(&original.utf8(*descriptor)?)?;
                    Some(Constant::MethodType(pool.intern_utf8(&mapped)?))
                }
                _ => None,
            };
            if let Some(constant) = replacement {
                pool.replace(index, constant)?;
            }
        }
        Ok(())
    }

    fn remap_attributes(
        &self,
        original: &ConstantPool,
        pool: &mut ConstantPool,
        attributes: &mut [crate::classfile::Attribute],
        is_static: bool,
    ) -> Result<()> {
        // Locals keep one generated name across LocalVariableTable and
        // LocalVariableTypeTable, keyed by slot and start offset.
        let mut locals: HashMap<(u16, u16), u16> = HashMap::new();
        for attribute in attributes.iter_mut() {
            rewrite_attribute(original, attribute, true, &mut |slot, index| match slot {
                Slot::Descriptor => {
                    let value = original.utf8(index)?;
                    pool.intern_utf8(&self.descriptor(&value)?)
                }
                Slot::Signature => {
                    let value = original.utf8(index)?;
                    match map_signature(&value, &mut |name| self.map_class(name)) {
                        Ok(mapped) => pool.intern_utf8(&mapped),
                        Err(err) => {
                            warn!("Keeping unparseable signature '{value}': {err:#}");
                            Ok(index)
                        }
                    }
                }
                Slot::LocalName {
                    local,
                    start_pc,
                    type_index,
                    generic,
                } => {
                    if !self.options.rename_locals || (local == 0 && !is_static) {
                        return Ok(index);
                    }
                    if let Some(&named) = locals.get(&(local, start_pc)) {
                        return Ok(named);
                    }
                    let type_name = original.utf8(type_index)?;
                    let named = pool.intern_utf8(&local_name(&type_name, generic, local))?;
                    locals.insert((local, start_pc), named);
                    Ok(named)
                }
                Slot::InnerName { inner_class } => {
                    let current = original.utf8(index)?;
                    let inner = pool.class_name(inner_class)?;
                    match inner.rsplit_once('$') {
                        Some((_, simple)) if simple != current && original.class_name(inner_class)? != inner => {
                            pool.intern_utf8(simple)
                        }
                        _ => Ok(index),
                    }
                }
                Slot::EnclosingMethod { owner } => {
                    let (name, descriptor) = original.name_and_type(index)?;
                    let owner = original.class_name(owner)?;
                    let name = self.map_member(true, &owner, &name, &descriptor).unwrap_or(name);
                    pool.intern_name_and_type(&name, &self.descriptor(&descriptor)?)
                }
                Slot::Constant | Slot::Ldc | Slot::Utf8 => Ok(index),
            })?;
        }
        Ok(())
    }
}

/// Generated local variable name: a base derived from the type plus the slot number.
fn local_name(type_name: &str, generic: bool, local: u16) -> String {
    let mut ty = type_name;
    if generic && let Some(start) = ty.find('<') {
        ty = &ty[..start];
    }
    let mut arrays = 0;
    while let Some(rest) = ty.strip_prefix('[') {
        ty = rest;
        arrays += 1;
    }
    let base = match ty.as_bytes().first() {
        Some(b'Z') => "flag".to_string(),
        Some(b'B') => "b".to_string(),
        Some(b'C') => "c".to_string(),
        Some(b'S') => "s".to_string(),
        Some(b'I') => "i".to_string(),
        Some(b'J') => "l".to_string(),
        Some(b'F') => "f".to_string(),
        Some(b'D') => "d".to_string(),
        Some(b'L') => {
            let class = ty[1..].trim_end_matches(';');
            let simple = class.rsplit(['/', '$']).next().unwrap_or(class);
            let mut chars = simple.chars();
            match chars.next() {
                Some(first) if first.is_alphabetic() => first.to_lowercase().chain(chars).collect(),
                _ => "var".to_string(),
            }
        }
        Some(b'T') => ty[1..].trim_end_matches(';').to_lowercase(),
        _ => "var".to_string(),
    };
    let suffix = if arrays > 0 { "Array" } else { "" };
    format!("{base}{suffix}{local}")
}
