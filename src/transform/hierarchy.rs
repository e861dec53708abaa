//! Class hierarchy lookups for member resolution during remapping.
//!
//! Classes of the jar being remapped are indexed up front; classpath jars are only parsed
//! when a lookup walks into one of their classes.

use crate::classfile::ClassFile;
use crate::jar::{Jar, class_name_of, entry_name_of};
use anyhow::Result;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use tracing::debug;

/// Superclass, interfaces and declared members of one class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassInfo {
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: HashSet<(String, String)>,
    pub methods: HashSet<(String, String)>,
}

impl ClassInfo {
    pub fn of(class: &ClassFile) -> Result<Self> {
        let pool = &class.pool;
        Ok(Self {
            super_name: class.super_name()?,
            interfaces: class.interface_names()?,
            fields: class.fields.iter().map(|f| f.key(pool)).collect::<Result<_>>()?,
            methods: class.methods.iter().map(|m| m.key(pool)).collect::<Result<_>>()?,
        })
    }
}

/// Inheritance information for the input jar and its classpath.
pub struct Hierarchy<'a> {
    classes: RefCell<HashMap<String, Option<Rc<ClassInfo>>>>,
    classpath: &'a [&'a Jar],
}

impl<'a> Hierarchy<'a> {
    /// Index every class of `input`; `classpath` is consulted lazily.
    pub fn new(input: &Jar, classpath: &'a [&'a Jar]) -> Result<Self> {
        let mut classes = HashMap::new();
        for (name, data) in input.entries() {
            let Some(class_name) = class_name_of(name) else {
                continue;
            };
            let class = ClassFile::parse(data, name)?;
            classes.insert(class_name.to_string(), Some(Rc::new(ClassInfo::of(&class)?)));
        }
        Ok(Self {
            classes: RefCell::new(classes),
            classpath,
        })
    }

    /// Build from already parsed information, for callers that index classes themselves.
    pub fn from_infos(infos: impl IntoIterator<Item = (String, ClassInfo)>, classpath: &'a [&'a Jar]) -> Self {
        let classes = infos.into_iter().map(|(name, info)| (name, Some(Rc::new(info)))).collect();
        Self {
            classes: RefCell::new(classes),
            classpath,
        }
    }

    /// Information about `name`, or `None` when no jar defines it.
    pub fn get(&self, name: &str) -> Option<Rc<ClassInfo>> {
        if let Some(known) = self.classes.borrow().get(name) {
            return known.clone();
        }
        let entry = entry_name_of(name);
        let info = self.classpath.iter().find_map(|jar| jar.get(&entry)).and_then(|data| {
            match ClassFile::parse(data, &entry).and_then(|class| ClassInfo::of(&class)) {
                Ok(info) => Some(Rc::new(info)),
                Err(err) => {
                    debug!("Ignoring unreadable classpath class {entry}: {err:#}");
                    None
                }
            }
        });
        self.classes.borrow_mut().insert(name.to_string(), info.clone());
        info
    }

    /// `name` followed by its ancestors breadth-first: superclasses before interfaces at
    /// each level, each class once.
    pub fn ancestors(&self, name: &str) -> Vec<String> {
        let mut order = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([name.to_string()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(info) = self.get(&current) {
                queue.extend(info.super_name.iter().cloned());
                queue.extend(info.interfaces.iter().cloned());
            }
            order.push(current);
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ClassBuilder;

    #[test]
    fn test_ancestors_cross_into_classpath() {
        let mut input = Jar::new();
        input.insert("a.class", ClassBuilder::new("a").super_class("b").interface("c").build());
        let mut library = Jar::new();
        library.insert("b.class", ClassBuilder::new("b").interface("c").method("m", "()V").build());
        library.insert("c.class", ClassBuilder::new("c").build());

        let classpath = [&library];
        let hierarchy = Hierarchy::new(&input, &classpath).unwrap();
        assert_eq!(hierarchy.ancestors("a"), vec!["a", "b", "c", "java/lang/Object"]);
        assert!(hierarchy.get("b").unwrap().methods.contains(&("m".to_string(), "()V".to_string())));
        assert!(hierarchy.get("missing").is_none());
    }
}
