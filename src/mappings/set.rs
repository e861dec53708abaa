//! The in-memory mapping set and its per-namespace views.

use crate::classfile::descriptor::map_descriptor;
use crate::mappings::Namespace;
use std::collections::{BTreeMap, HashMap};

/// One name per namespace. The official name always exists; the others fall back by
/// ordinal, so a missing named name resolves to the intermediary one and then to the
/// official one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Names {
    official: String,
    intermediary: Option<String>,
    named: Option<String>,
}

impl Names {
    pub fn new(official: impl Into<String>) -> Self {
        Self {
            official: official.into(),
            intermediary: None,
            named: None,
        }
    }

    /// Name in `namespace` after fallback.
    pub fn get(&self, namespace: Namespace) -> &str {
        let named = match namespace {
            Namespace::Named => self.named.as_deref(),
            _ => None,
        };
        let intermediary = match namespace {
            Namespace::Named | Namespace::Intermediary => self.intermediary.as_deref(),
            Namespace::Official => None,
        };
        named.or(intermediary).unwrap_or(&self.official)
    }

    /// Name in `namespace` without fallback.
    pub fn exact(&self, namespace: Namespace) -> Option<&str> {
        match namespace {
            Namespace::Official => Some(&self.official),
            Namespace::Intermediary => self.intermediary.as_deref(),
            Namespace::Named => self.named.as_deref(),
        }
    }

    /// Set a name; the official name is the identity and cannot be replaced.
    pub fn set(&mut self, namespace: Namespace, name: impl Into<String>) {
        match namespace {
            Namespace::Official => {}
            Namespace::Intermediary => self.intermediary = Some(name.into()),
            Namespace::Named => self.named = Some(name.into()),
        }
    }

    pub fn official(&self) -> &str {
        &self.official
    }
}

/// A field or method of a mapped class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberMapping {
    pub names: Names,
    /// Descriptor in the official namespace. Always present for methods.
    pub descriptor: Option<String>,
}

/// A class and its members, keyed by official name and descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMapping {
    pub names: Names,
    fields: BTreeMap<(String, Option<String>), MemberMapping>,
    methods: BTreeMap<(String, String), MemberMapping>,
}

impl ClassMapping {
    fn new(official: &str) -> Self {
        Self {
            names: Names::new(official),
            fields: BTreeMap::new(),
            methods: BTreeMap::new(),
        }
    }

    pub fn fields(&self) -> impl Iterator<Item = &MemberMapping> {
        self.fields.values()
    }

    pub fn methods(&self) -> impl Iterator<Item = &MemberMapping> {
        self.methods.values()
    }

    pub fn field_mut(&mut self, name: &str, descriptor: Option<&str>) -> &mut MemberMapping {
        self.fields
            .entry((name.to_string(), descriptor.map(str::to_string)))
            .or_insert_with(|| MemberMapping {
                names: Names::new(name),
                descriptor: descriptor.map(str::to_string),
            })
    }

    pub fn method_mut(&mut self, name: &str, descriptor: &str) -> &mut MemberMapping {
        self.methods
            .entry((name.to_string(), descriptor.to_string()))
            .or_insert_with(|| MemberMapping {
                names: Names::new(name),
                descriptor: Some(descriptor.to_string()),
            })
    }
}

/// Which member table a rename table applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
}

/// Classes with their names in every namespace
///
/// Built once by merging the sources in a fixed order (structural renames, then member
/// renames, then package renames), each later source overwriting earlier names. Read-only
/// afterwards; [`MappingSet::view`] derives the lookup tables a remap needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingSet {
    classes: BTreeMap<String, ClassMapping>,
}

impl MappingSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn class(&self, official: &str) -> Option<&ClassMapping> {
        self.classes.get(official)
    }

    /// The class with official name `official`, created when absent.
    pub fn class_mut(&mut self, official: &str) -> &mut ClassMapping {
        self.classes
            .entry(official.to_string())
            .or_insert_with(|| ClassMapping::new(official))
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassMapping> {
        self.classes.values()
    }

    /// Rename members whose intermediary name is a key of `table` to the value in the named
    /// namespace.
    pub fn apply_member_names(&mut self, kind: MemberKind, table: &HashMap<String, String>) -> usize {
        let mut renamed = 0;
        for class in self.classes.values_mut() {
            let members: Box<dyn Iterator<Item = &mut MemberMapping>> = match kind {
                MemberKind::Field => Box::new(class.fields.values_mut()),
                MemberKind::Method => Box::new(class.methods.values_mut()),
            };
            for member in members {
                if let Some(intermediary) = member.names.exact(Namespace::Intermediary)
                    && let Some(named) = table.get(intermediary)
                {
                    member.names.set(Namespace::Named, named.clone());
                    renamed += 1;
                }
            }
        }
        renamed
    }

    /// Move classes of the flat `net/minecraft/src` package into the packages given by
    /// `table` (simple class name to package) in the named namespace.
    pub fn apply_packages(&mut self, table: &HashMap<String, String>) -> usize {
        let mut moved = 0;
        for class in self.classes.values_mut() {
            let current = class.names.get(Namespace::Intermediary);
            let Some(simple) = current.strip_prefix(FLAT_PACKAGE) else {
                continue;
            };
            if let Some(package) = table.get(simple) {
                let named = format!("{}/{simple}", package.trim_end_matches('/'));
                class.names.set(Namespace::Named, named);
                moved += 1;
            }
        }
        moved
    }

    /// Fill in missing field descriptors from `lookup(owner, name)`, both in official names.
    pub fn fill_field_descriptors(&mut self, mut lookup: impl FnMut(&str, &str) -> Option<String>) -> usize {
        let mut filled = 0;
        for (owner, class) in &mut self.classes {
            let fields = std::mem::take(&mut class.fields);
            for ((name, descriptor), mut member) in fields {
                let descriptor = match descriptor {
                    Some(descriptor) => Some(descriptor),
                    None => {
                        let found = lookup(owner, &name);
                        filled += usize::from(found.is_some());
                        found
                    }
                };
                member.descriptor.clone_from(&descriptor);
                class.fields.insert((name, descriptor), member);
            }
        }
        filled
    }

    /// Lookup tables translating names in `from` to names in `to`.
    pub fn view(&self, from: Namespace, to: Namespace) -> MappingView {
        let mut view = MappingView {
            from,
            to,
            classes: HashMap::with_capacity(self.classes.len()),
            fields: HashMap::new(),
            loose_fields: HashMap::new(),
            methods: HashMap::new(),
        };
        let official_to_from: HashMap<&str, &str> = self
            .classes
            .values()
            .map(|c| (c.names.official(), c.names.get(from)))
            .collect();
        let mut descriptor_in_from = |descriptor: &str| {
            map_descriptor(descriptor, &mut |name| official_to_from.get(name).map(|n| (*n).to_string()))
                .unwrap_or_else(|_| descriptor.to_string())
        };

        for class in self.classes.values() {
            let owner = class.names.get(from).to_string();
            view.classes.insert(owner.clone(), class.names.get(to).to_string());
            for field in class.fields.values() {
                let target = field.names.get(to).to_string();
                let name = field.names.get(from).to_string();
                match &field.descriptor {
                    Some(descriptor) => {
                        let descriptor = descriptor_in_from(descriptor);
                        view.fields.insert((owner.clone(), name.clone(), descriptor), target.clone());
                        view.loose_fields.entry((owner.clone(), name)).or_insert(target);
                    }
                    None => {
                        view.loose_fields.insert((owner.clone(), name), target);
                    }
                }
            }
            for method in class.methods.values() {
                let descriptor = descriptor_in_from(method.descriptor.as_deref().unwrap_or_default());
                view.methods.insert(
                    (owner.clone(), method.names.get(from).to_string(), descriptor),
                    method.names.get(to).to_string(),
                );
            }
        }
        view
    }
}

const FLAT_PACKAGE: &str = "net/minecraft/src/";

/// Name lookups from one namespace into another, keyed by names in the source namespace.
#[derive(Debug, Clone)]
pub struct MappingView {
    pub from: Namespace,
    pub to: Namespace,
    classes: HashMap<String, String>,
    fields: HashMap<(String, String, String), String>,
    loose_fields: HashMap<(String, String), String>,
    methods: HashMap<(String, String, String), String>,
}

impl MappingView {
    pub fn map_class(&self, name: &str) -> Option<&str> {
        self.classes.get(name).map(String::as_str)
    }

    /// Field declared by `owner`; the descriptor is used when the mappings carry one.
    pub fn map_field(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.fields
            .get(&(owner.to_string(), name.to_string(), descriptor.to_string()))
            .or_else(|| self.loose_fields.get(&(owner.to_string(), name.to_string())))
            .map(String::as_str)
    }

    /// Method declared by `owner`.
    pub fn map_method(&self, owner: &str, name: &str, descriptor: &str) -> Option<&str> {
        self.methods
            .get(&(owner.to_string(), name.to_string(), descriptor.to_string()))
            .map(String::as_str)
    }
}
