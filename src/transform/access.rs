//! Forge access transformers.
//!
//! Directive files (`*_at.cfg`) list one change per line:
//!
//! ```text
//! public net.minecraft.src.Entity field_70165_t   # a field
//! protected-f net.minecraft.src.Block func_71861_g(III)V
//! public net.minecraft.src.Gui *                   # every field
//! public net.minecraft.src.Gui *()                 # every method
//! public+f net.minecraft.src.Item                  # the class itself
//! ```
//!
//! Directives from every source are merged into one [`AccessTransformerSet`] keyed by
//! target. When a target is named more than once the most permissive visibility wins and
//! removing `final` beats adding it. A member takes the directive naming it exactly, or the
//! wildcard for its kind when there is none; class directives change the class only.
//! The chosen directive's visibility replaces the element's, so a member directive can
//! narrow an element a broader directive would have widened.

use crate::classfile::code::{INVOKESPECIAL, INVOKEVIRTUAL, walk_instructions};
use crate::classfile::descriptor::map_descriptor;
use crate::classfile::{
    ACC_FINAL, ACC_PRIVATE, ACC_PROTECTED, ACC_PUBLIC, ACC_VISIBILITY, ClassFile, Constant,
};
use crate::core::LoomError;
use crate::jar::{Jar, entry_name_of};
use crate::mappings::MappingView;
use anyhow::{Context, Result, bail};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

/// Visibility ordered from least to most permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Visibility {
    Private,
    Default,
    Protected,
    Public,
}

impl Visibility {
    const fn flag(self) -> u16 {
        match self {
            Self::Private => ACC_PRIVATE,
            Self::Default => 0,
            Self::Protected => ACC_PROTECTED,
            Self::Public => ACC_PUBLIC,
        }
    }
}

/// What happens to the `final` flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FinalChange {
    Keep,
    Add,
    Remove,
}

/// The change a directive requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AccessChange {
    pub visibility: Visibility,
    pub finality: FinalChange,
}

impl AccessChange {
    /// Combine two changes for the same target.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        Self {
            visibility: self.visibility.max(other.visibility),
            finality: self.finality.max(other.finality),
        }
    }

    /// New access flags for an element currently at `access`.
    pub fn apply(self, access: u16) -> u16 {
        let mut access = (access & !ACC_VISIBILITY) | self.visibility.flag();
        match self.finality {
            FinalChange::Keep => {}
            FinalChange::Add => access |= ACC_FINAL,
            FinalChange::Remove => access &= !ACC_FINAL,
        }
        access
    }
}

/// The member part of a directive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MemberTarget {
    Field(String),
    Method { name: String, descriptor: String },
    AllFields,
    AllMethods,
}

/// What a directive applies to: a class, or a member of it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Target {
    /// Internal class name
    pub class: String,
    pub member: Option<MemberTarget>,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.member {
            None => write!(f, "{}", self.class),
            Some(MemberTarget::Field(name)) => write!(f, "{}.{name}", self.class),
            Some(MemberTarget::Method { name, descriptor }) => write!(f, "{}.{name}{descriptor}", self.class),
            Some(MemberTarget::AllFields) => write!(f, "{}.*", self.class),
            Some(MemberTarget::AllMethods) => write!(f, "{}.*()", self.class),
        }
    }
}

/// Merged directives from every source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessTransformerSet {
    entries: BTreeMap<Target, AccessChange>,
}

impl AccessTransformerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a directive file and merge it in; `source` names the file in errors.
    pub fn read(&mut self, content: &str, source: &str) -> Result<()> {
        for (number, raw) in content.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let (target, change) = parse_directive(line).map_err(|message| LoomError::Configuration {
                message: format!("{source}:{}: {message}", number + 1),
            })?;
            self.add(target, change);
        }
        Ok(())
    }

    pub fn add(&mut self, target: Target, change: AccessChange) {
        self.entries
            .entry(target)
            .and_modify(|existing| *existing = existing.merge(change))
            .or_insert(change);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.entries.keys()
    }

    /// Translate every target through `view`; names it does not know are kept.
    pub fn remap(&self, view: &MappingView) -> Self {
        let mut remapped = Self::new();
        for (target, change) in &self.entries {
            let class = view.map_class(&target.class).unwrap_or(&target.class).to_string();
            let member = target.member.as_ref().map(|member| match member {
                MemberTarget::Field(name) => {
                    MemberTarget::Field(view.map_field(&target.class, name, "").unwrap_or(name).to_string())
                }
                MemberTarget::Method { name, descriptor } => MemberTarget::Method {
                    name: view
                        .map_method(&target.class, name, descriptor)
                        .unwrap_or(name)
                        .to_string(),
                    descriptor: map_descriptor(descriptor, &mut |c| view.map_class(c).map(str::to_string))
                        .unwrap_or_else(|_| descriptor.clone()),
                },
                other => other.clone(),
            });
            remapped.add(Target { class, member }, *change);
        }
        remapped
    }

    fn classes(&self) -> BTreeSet<&str> {
        self.entries.keys().map(|t| t.class.as_str()).collect()
    }

    fn lookup(&self, class: &str, member: Option<MemberTarget>) -> Option<(Target, AccessChange)> {
        let target = Target {
            class: class.to_string(),
            member,
        };
        self.entries.get(&target).map(|change| (target, *change))
    }
}

fn parse_directive(line: &str) -> Result<(Target, AccessChange), String> {
    let mut parts = line.split_whitespace();
    let access = parts.next().ok_or("missing access modifier")?;
    let class = parts.next().ok_or("missing class name")?.replace('.', "/");
    let member = parts.next();
    if let Some(extra) = parts.next() {
        return Err(format!("unexpected token '{extra}'"));
    }

    let (modifier, finality) = if let Some(m) = access.strip_suffix("-f") {
        (m, FinalChange::Remove)
    } else if let Some(m) = access.strip_suffix("+f") {
        (m, FinalChange::Add)
    } else {
        (access, FinalChange::Keep)
    };
    let visibility = match modifier {
        "public" => Visibility::Public,
        "protected" => Visibility::Protected,
        "default" => Visibility::Default,
        "private" => Visibility::Private,
        other => return Err(format!("unknown access modifier '{other}'")),
    };

    let member = member.map(|member| match member {
        "*" => MemberTarget::AllFields,
        "*()" => MemberTarget::AllMethods,
        _ => match member.find('(') {
            Some(paren) => MemberTarget::Method {
                name: member[..paren].to_string(),
                descriptor: member[paren..].replace('.', "/"),
            },
            None => MemberTarget::Field(member.to_string()),
        },
    });
    Ok((Target { class, member }, AccessChange { visibility, finality }))
}

/// Apply `set` to `input`. Classes without directives are copied byte for byte.
pub fn transform_jar(input: &Jar, set: &AccessTransformerSet) -> Result<Jar> {
    let mut output = input.clone();
    let mut used = HashSet::new();
    let mut changed = 0;
    for class in set.classes() {
        let entry = entry_name_of(class);
        let Some(bytes) = input.get(&entry) else {
            continue;
        };
        let transformed = transform_class(bytes, &entry, set, &mut used)?;
        if transformed.as_slice() != bytes {
            changed += 1;
            output.insert(entry, transformed);
        }
    }
    for target in set.targets() {
        if !used.contains(target) {
            warn!("Access transformer for {target} did not match anything");
        }
    }
    info!("Access transformers changed {changed} classes ({} directives)", set.len());
    Ok(output)
}

fn transform_class(bytes: &[u8], origin: &str, set: &AccessTransformerSet, used: &mut HashSet<Target>) -> Result<Vec<u8>> {
    let mut class = ClassFile::parse(bytes, origin)?;
    let name = class.name()?;
    let mut dirty = false;

    if let Some((target, change)) = set.lookup(&name, None) {
        let access = change.apply(class.access);
        dirty |= access != class.access;
        class.access = access;
        used.insert(target);
    }

    let wildcard_fields = set.lookup(&name, Some(MemberTarget::AllFields));
    for field in &mut class.fields {
        let field_name = field.name(&class.pool)?;
        let exact = set.lookup(&name, Some(MemberTarget::Field(field_name)));
        if let Some((target, change)) = exact.or_else(|| wildcard_fields.clone()) {
            let access = change.apply(field.access);
            dirty |= access != field.access;
            field.access = access;
            used.insert(target);
        }
    }

    let wildcard_methods = set.lookup(&name, Some(MemberTarget::AllMethods));
    let mut unprivated = HashSet::new();
    for method in &mut class.methods {
        let (method_name, descriptor) = method.key(&class.pool)?;
        let exact = set.lookup(
            &name,
            Some(MemberTarget::Method {
                name: method_name.clone(),
                descriptor: descriptor.clone(),
            }),
        );
        if let Some((target, change)) = exact.or_else(|| wildcard_methods.clone()) {
            let access = change.apply(method.access);
            if method.access & ACC_PRIVATE != 0 && access & ACC_PRIVATE == 0 && method_name != "<init>" {
                unprivated.insert((method_name, descriptor));
            }
            dirty |= access != method.access;
            method.access = access;
            used.insert(target);
        }
    }

    if !dirty {
        return Ok(bytes.to_vec());
    }
    if !unprivated.is_empty() {
        let calls = retarget_private_calls(&mut class, &name, &unprivated)
            .with_context(|| format!("Failed to rewrite calls in {origin}"))?;
        debug!("Rewrote {calls} invokespecial calls in {name}");
    }
    class.to_bytes()
}

/// Turn `invokespecial` calls to methods of this class that are no longer private into
/// `invokevirtual`, which non-private instance methods require.
fn retarget_private_calls(
    class: &mut ClassFile,
    this: &str,
    methods: &HashSet<(String, String)>,
) -> Result<usize> {
    let pool = &class.pool;
    let Some(code_name) = pool.indices().find(|&i| matches!(pool.get(i), Ok(Constant::Utf8(b)) if b == b"Code")) else {
        return Ok(0);
    };
    let mut count = 0;
    for method in &mut class.methods {
        for attribute in method.attributes.iter_mut().filter(|a| a.name_index == code_name) {
            let code_len = match attribute.data.get(4..8) {
                Some(len) => u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize,
                None => bail!("truncated Code attribute"),
            };
            let Some(code) = attribute.data.get_mut(8..8 + code_len) else {
                bail!("Code attribute shorter than its code_length");
            };
            let mut calls = Vec::new();
            walk_instructions(code, |pc, opcode, operands| {
                if opcode == INVOKESPECIAL {
                    let index = u16::from_be_bytes([operands[0], operands[1]]);
                    let (owner, name, descriptor) = pool.member_ref(index)?;
                    if owner == this && methods.contains(&(name, descriptor)) {
                        calls.push(pc);
                    }
                }
                Ok(())
            })?;
            for pc in calls {
                code[pc] = INVOKEVIRTUAL;
                count += 1;
            }
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::ACC_STATIC;
    use crate::test_utils::ClassBuilder;

    fn class_bytes() -> Vec<u8> {
        ClassBuilder::new("a")
            .access(ACC_FINAL)
            .field_with_access(ACC_PRIVATE | ACC_FINAL, "b", "I")
            .field_with_access(ACC_PRIVATE, "c", "I")
            .method_with_access_and_code(ACC_PRIVATE, "d", "()V", |code| {
                code.op(0xb1);
            })
            .method_with_code("e", "()V", |code| {
                code.op(0x2a);
                code.invoke(INVOKESPECIAL, "a", "d", "()V");
                code.op(0xb1);
            })
            .method_with_access(ACC_PRIVATE | ACC_STATIC, "f", "()V")
            .build()
    }

    fn jar() -> Jar {
        let mut jar = Jar::new();
        jar.insert("a.class", class_bytes());
        jar.insert("untouched.class", ClassBuilder::new("untouched").build());
        jar
    }

    #[test]
    fn test_member_directive_beats_wildcard() {
        let mut set = AccessTransformerSet::new();
        set.read("public-f a\nprotected a *\npublic-f a b\npublic a d()V\n", "test_at.cfg").unwrap();
        let output = transform_jar(&jar(), &set).unwrap();
        let class = ClassFile::parse(output.get("a.class").unwrap(), "a").unwrap();

        assert_eq!(class.access & (ACC_PUBLIC | ACC_FINAL), ACC_PUBLIC);
        assert_eq!(class.find_field("b", "I").unwrap().access, ACC_PUBLIC);
        assert_eq!(class.find_field("c", "I").unwrap().access, ACC_PROTECTED);
        assert_eq!(class.find_method("d", "()V").unwrap().access, ACC_PUBLIC);
        assert_eq!(class.find_method("f", "()V").unwrap().access, ACC_PRIVATE | ACC_STATIC);
        assert_eq!(output.get("untouched.class"), jar().get("untouched.class"));
    }

    #[test]
    fn test_directive_order_does_not_matter() {
        let lines = ["public a *()", "protected-f a b", "public a c", "default+f a b", "public-f a"];
        let mut forward = AccessTransformerSet::new();
        forward.read(&lines.join("\n"), "forward").unwrap();
        let mut reversed = AccessTransformerSet::new();
        for line in lines.iter().rev() {
            reversed.read(line, "reversed").unwrap();
        }
        assert_eq!(forward, reversed);
        assert_eq!(
            transform_jar(&jar(), &forward).unwrap(),
            transform_jar(&jar(), &reversed).unwrap()
        );
    }

    #[test]
    fn test_unprivated_calls_become_virtual() {
        let mut set = AccessTransformerSet::new();
        set.read("public a d()V", "at").unwrap();
        let output = transform_jar(&jar(), &set).unwrap();
        let class = ClassFile::parse(output.get("a.class").unwrap(), "a").unwrap();
        let code = &class.find_method("e", "()V").unwrap().attributes[0].data;
        assert_eq!(code[9], INVOKEVIRTUAL);
    }

    #[test]
    fn test_merge_prefers_permissive_and_remove_final() {
        let a = AccessChange {
            visibility: Visibility::Protected,
            finality: FinalChange::Add,
        };
        let b = AccessChange {
            visibility: Visibility::Public,
            finality: FinalChange::Remove,
        };
        assert_eq!(a.merge(b), b);
        assert_eq!(b.merge(a), b);
        assert_eq!(a.apply(ACC_PUBLIC), ACC_PROTECTED | ACC_FINAL);
    }

    #[test]
    fn test_member_directive_can_narrow() {
        let bytes = ClassBuilder::new("a")
            .field_with_access(ACC_PUBLIC, "b", "I")
            .build();
        let mut input = Jar::new();
        input.insert("a.class", bytes);

        let lines = ["public a", "private a b"];
        let mut forward = AccessTransformerSet::new();
        forward.read(&lines.join("\n"), "forward").unwrap();
        let mut reversed = AccessTransformerSet::new();
        reversed.read(&lines.iter().rev().copied().collect::<Vec<_>>().join("\n"), "reversed").unwrap();

        let output = transform_jar(&input, &forward).unwrap();
        let class = ClassFile::parse(output.get("a.class").unwrap(), "a").unwrap();
        assert_eq!(class.access & ACC_VISIBILITY, ACC_PUBLIC);
        assert_eq!(class.find_field("b", "I").unwrap().access & ACC_VISIBILITY, ACC_PRIVATE);
        assert_eq!(transform_jar(&input, &reversed).unwrap(), output);
    }

    #[test]
    fn test_bad_lines_name_the_source() {
        let mut set = AccessTransformerSet::new();
        let err = set.read("# header\nfriendly a\n", "forge_at.cfg").unwrap_err();
        assert!(err.to_string().contains("forge_at.cfg:2"));
    }
}
