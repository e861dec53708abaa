//! The constant pool.
//!
//! UTF-8 entries keep their raw modified-UTF-8 bytes so strings that are never touched are
//! written back exactly as read. Interning deduplicates against every entry already present.

use crate::classfile::bytes::{Reader, Writer};
use anyhow::{Result, bail};
use std::collections::HashMap;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

/// One constant-pool entry
///
/// Float and double values are stored as their raw bits so entries can be hashed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Constant {
    Utf8(Vec<u8>),
    Integer(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref { class: u16, name_and_type: u16 },
    Methodref { class: u16, name_and_type: u16 },
    InterfaceMethodref { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
    /// Slot 0 and the slot following a long or double
    Unusable,
}

impl Constant {
    /// Long and double entries occupy two slots.
    pub const fn is_wide(&self) -> bool {
        matches!(self, Self::Long(_) | Self::Double(_))
    }

    /// Whether an `ldc` / `ldc_w` may load this constant.
    pub const fn is_loadable(&self) -> bool {
        matches!(
            self,
            Self::Integer(_)
                | Self::Float(_)
                | Self::String(_)
                | Self::Class(_)
                | Self::MethodType(_)
                | Self::MethodHandle { .. }
                | Self::Dynamic { .. }
        )
    }

    /// Pool indices this entry refers to.
    pub fn references(&self) -> Vec<u16> {
        match *self {
            Self::Class(i) | Self::String(i) | Self::MethodType(i) | Self::Module(i) | Self::Package(i) => {
                vec![i]
            }
            Self::Fieldref { class, name_and_type }
            | Self::Methodref { class, name_and_type }
            | Self::InterfaceMethodref { class, name_and_type } => vec![class, name_and_type],
            Self::NameAndType { name, descriptor } => vec![name, descriptor],
            Self::MethodHandle { reference, .. } => vec![reference],
            Self::Dynamic { name_and_type, .. } | Self::InvokeDynamic { name_and_type, .. } => {
                vec![name_and_type]
            }
            _ => Vec::new(),
        }
    }
}

/// A class file's constant pool.
#[derive(Debug, Clone)]
pub struct ConstantPool {
    entries: Vec<Constant>,
    lookup: HashMap<Constant, u16>,
}

impl Default for ConstantPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstantPool {
    pub fn new() -> Self {
        Self {
            entries: vec![Constant::Unusable],
            lookup: HashMap::new(),
        }
    }

    /// `constant_pool_count` as written in the class file.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn parse(reader: &mut Reader<'_>) -> Result<Self> {
        let count = reader.u16()?;
        if count == 0 {
            bail!("constant_pool_count is zero");
        }
        let mut pool = Self::new();
        while pool.entries.len() < usize::from(count) {
            let index = pool.entries.len();
            let tag = reader.u8()?;
            let constant = match tag {
                TAG_UTF8 => {
                    let len = reader.u16()?;
                    Constant::Utf8(reader.bytes(usize::from(len))?.to_vec())
                }
                TAG_INTEGER => Constant::Integer(reader.i32()?),
                TAG_FLOAT => Constant::Float(reader.u32()?),
                TAG_LONG => Constant::Long(reader.u64()? as i64),
                TAG_DOUBLE => Constant::Double(reader.u64()?),
                TAG_CLASS => Constant::Class(reader.u16()?),
                TAG_STRING => Constant::String(reader.u16()?),
                TAG_FIELDREF => Constant::Fieldref {
                    class: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                TAG_METHODREF => Constant::Methodref {
                    class: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                TAG_INTERFACE_METHODREF => Constant::InterfaceMethodref {
                    class: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                TAG_NAME_AND_TYPE => Constant::NameAndType {
                    name: reader.u16()?,
                    descriptor: reader.u16()?,
                },
                TAG_METHOD_HANDLE => Constant::MethodHandle {
                    kind: reader.u8()?,
                    reference: reader.u16()?,
                },
                TAG_METHOD_TYPE => Constant::MethodType(reader.u16()?),
                TAG_DYNAMIC => Constant::Dynamic {
                    bootstrap: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                TAG_INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap: reader.u16()?,
                    name_and_type: reader.u16()?,
                },
                TAG_MODULE => Constant::Module(reader.u16()?),
                TAG_PACKAGE => Constant::Package(reader.u16()?),
                other => bail!("unknown constant pool tag {other} at index {index}"),
            };
            let wide = constant.is_wide();
            pool.lookup.entry(constant.clone()).or_insert(index as u16);
            pool.entries.push(constant);
            if wide {
                if pool.entries.len() >= usize::from(count) {
                    bail!("long/double constant at index {index} overruns the pool");
                }
                pool.entries.push(Constant::Unusable);
            }
        }
        Ok(pool)
    }

    pub(crate) fn write(&self, out: &mut Writer) -> Result<()> {
        out.count(self.entries.len())?;
        for constant in &self.entries {
            match constant {
                Constant::Unusable => {}
                Constant::Utf8(bytes) => {
                    out.u8(TAG_UTF8);
                    out.count(bytes.len())?;
                    out.bytes(bytes);
                }
                Constant::Integer(v) => {
                    out.u8(TAG_INTEGER);
                    out.u32(*v as u32);
                }
                Constant::Float(bits) => {
                    out.u8(TAG_FLOAT);
                    out.u32(*bits);
                }
                Constant::Long(v) => {
                    out.u8(TAG_LONG);
                    out.u64(*v as u64);
                }
                Constant::Double(bits) => {
                    out.u8(TAG_DOUBLE);
                    out.u64(*bits);
                }
                Constant::Class(i) => {
                    out.u8(TAG_CLASS);
                    out.u16(*i);
                }
                Constant::String(i) => {
                    out.u8(TAG_STRING);
                    out.u16(*i);
                }
                Constant::Fieldref { class, name_and_type } => {
                    out.u8(TAG_FIELDREF);
                    out.u16(*class);
                    out.u16(*name_and_type);
                }
                Constant::Methodref { class, name_and_type } => {
                    out.u8(TAG_METHODREF);
                    out.u16(*class);
                    out.u16(*name_and_type);
                }
                Constant::InterfaceMethodref { class, name_and_type } => {
                    out.u8(TAG_INTERFACE_METHODREF);
                    out.u16(*class);
                    out.u16(*name_and_type);
                }
                Constant::NameAndType { name, descriptor } => {
                    out.u8(TAG_NAME_AND_TYPE);
                    out.u16(*name);
                    out.u16(*descriptor);
                }
                Constant::MethodHandle { kind, reference } => {
                    out.u8(TAG_METHOD_HANDLE);
                    out.u8(*kind);
                    out.u16(*reference);
                }
                Constant::MethodType(i) => {
                    out.u8(TAG_METHOD_TYPE);
                    out.u16(*i);
                }
                Constant::Dynamic { bootstrap, name_and_type } => {
                    out.u8(TAG_DYNAMIC);
                    out.u16(*bootstrap);
                    out.u16(*name_and_type);
                }
                Constant::InvokeDynamic { bootstrap, name_and_type } => {
                    out.u8(TAG_INVOKE_DYNAMIC);
                    out.u16(*bootstrap);
                    out.u16(*name_and_type);
                }
                Constant::Module(i) => {
                    out.u8(TAG_MODULE);
                    out.u16(*i);
                }
                Constant::Package(i) => {
                    out.u8(TAG_PACKAGE);
                    out.u16(*i);
                }
            }
        }
        Ok(())
    }

    /// Entry at `index`; slot 0 and long/double shadows are errors.
    pub fn get(&self, index: u16) -> Result<&Constant> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Unusable) | None => {
                bail!("invalid constant pool index {index} (pool has {} slots)", self.entries.len())
            }
            Some(constant) => Ok(constant),
        }
    }

    /// Indices of every usable entry.
    pub fn indices(&self) -> impl Iterator<Item = u16> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, c)| !matches!(c, Constant::Unusable))
            .map(|(i, _)| i as u16)
    }

    pub fn utf8_bytes(&self, index: u16) -> Result<&[u8]> {
        match self.get(index)? {
            Constant::Utf8(bytes) => Ok(bytes),
            other => bail!("constant {index} is not UTF-8 but {other:?}"),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<String> {
        Ok(decode_modified_utf8(self.utf8_bytes(index)?))
    }

    /// Internal name of the `Class` entry at `index`.
    pub fn class_name(&self, index: u16) -> Result<String> {
        match self.get(index)? {
            Constant::Class(name) => self.utf8(*name),
            other => bail!("constant {index} is not a class but {other:?}"),
        }
    }

    /// `(name, descriptor)` of the `NameAndType` entry at `index`.
    pub fn name_and_type(&self, index: u16) -> Result<(String, String)> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => Ok((self.utf8(*name)?, self.utf8(*descriptor)?)),
            other => bail!("constant {index} is not a name-and-type but {other:?}"),
        }
    }

    /// `(owner, name, descriptor)` of a field or method reference.
    pub fn member_ref(&self, index: u16) -> Result<(String, String, String)> {
        match self.get(index)? {
            Constant::Fieldref { class, name_and_type }
            | Constant::Methodref { class, name_and_type }
            | Constant::InterfaceMethodref { class, name_and_type } => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok((self.class_name(*class)?, name, descriptor))
            }
            other => bail!("constant {index} is not a member reference but {other:?}"),
        }
    }

    /// Index of `constant`, appending it when not yet present.
    pub fn intern(&mut self, constant: Constant) -> Result<u16> {
        if matches!(constant, Constant::Unusable) {
            bail!("cannot intern an unusable slot");
        }
        if let Some(&index) = self.lookup.get(&constant) {
            return Ok(index);
        }
        let needed = if constant.is_wide() { 2 } else { 1 };
        if self.entries.len() + needed > usize::from(u16::MAX) {
            bail!("constant pool overflow: more than 65535 slots");
        }
        let index = self.entries.len() as u16;
        let wide = constant.is_wide();
        self.lookup.insert(constant.clone(), index);
        self.entries.push(constant);
        if wide {
            self.entries.push(Constant::Unusable);
        }
        Ok(index)
    }

    pub fn intern_utf8(&mut self, value: &str) -> Result<u16> {
        self.intern(Constant::Utf8(encode_modified_utf8(value)))
    }

    pub fn intern_class(&mut self, internal_name: &str) -> Result<u16> {
        let name = self.intern_utf8(internal_name)?;
        self.intern(Constant::Class(name))
    }

    pub fn intern_name_and_type(&mut self, name: &str, descriptor: &str) -> Result<u16> {
        let name = self.intern_utf8(name)?;
        let descriptor = self.intern_utf8(descriptor)?;
        self.intern(Constant::NameAndType { name, descriptor })
    }

    /// Overwrite the entry at `index`, keeping the dedup table consistent.
    pub fn replace(&mut self, index: u16, constant: Constant) -> Result<()> {
        let old = self.get(index)?.clone();
        if old.is_wide() != constant.is_wide() {
            bail!("cannot replace constant {index} with an entry of different width");
        }
        if self.lookup.get(&old) == Some(&index) {
            self.lookup.remove(&old);
            if let Some(other) = self.entries.iter().enumerate().position(|(i, c)| i != usize::from(index) && *c == old) {
                self.lookup.insert(old, other as u16);
            }
        }
        self.lookup.entry(constant.clone()).or_insert(index);
        self.entries[usize::from(index)] = constant;
        Ok(())
    }

    /// Copy entry `index` of `source` (and everything it references) into this pool.
    ///
    /// `memo` maps source indices to indices in `self` and should be reused for every import
    /// from the same source.
    pub fn import(&mut self, source: &Self, index: u16, memo: &mut HashMap<u16, u16>) -> Result<u16> {
        if let Some(&mapped) = memo.get(&index) {
            return Ok(mapped);
        }
        let mut constant = source.get(index)?.clone();
        match &mut constant {
            Constant::Class(i)
            | Constant::String(i)
            | Constant::MethodType(i)
            | Constant::Module(i)
            | Constant::Package(i) => *i = self.import(source, *i, memo)?,
            Constant::Fieldref { class, name_and_type }
            | Constant::Methodref { class, name_and_type }
            | Constant::InterfaceMethodref { class, name_and_type } => {
                *class = self.import(source, *class, memo)?;
                *name_and_type = self.import(source, *name_and_type, memo)?;
            }
            Constant::NameAndType { name, descriptor } => {
                *name = self.import(source, *name, memo)?;
                *descriptor = self.import(source, *descriptor, memo)?;
            }
            Constant::MethodHandle { reference, .. } => {
                *reference = self.import(source, *reference, memo)?;
            }
            // Bootstrap indices point into the BootstrapMethods attribute, which is not
            // relocated; only the name-and-type moves.
            Constant::Dynamic { name_and_type, .. } | Constant::InvokeDynamic { name_and_type, .. } => {
                *name_and_type = self.import(source, *name_and_type, memo)?;
            }
            _ => {}
        }
        let mapped = self.intern(constant)?;
        memo.insert(index, mapped);
        Ok(mapped)
    }
}

impl ConstantPool {
    /// [`import`](Self::import) for an `ldc` operand: the entry claims the next slot before
    /// the UTF-8 entry it names, so a run of loadable constants occupies consecutive low
    /// indices that fit the one-byte operand.
    pub fn import_loadable(&mut self, source: &Self, index: u16, memo: &mut HashMap<u16, u16>) -> Result<u16> {
        if let Some(&mapped) = memo.get(&index) {
            return Ok(mapped);
        }
        let constant = source.get(index)?.clone();
        let (Constant::Class(target) | Constant::String(target) | Constant::MethodType(target)) = constant else {
            return self.import(source, index, memo);
        };

        // Reuse an identical entry imported from the other side.
        if let Some(&utf8) = self.lookup.get(source.get(target)?)
            && let Some(&existing) = self.lookup.get(&with_reference(&constant, utf8))
        {
            memo.insert(index, existing);
            return Ok(existing);
        }

        let slot = self.reserve()?;
        let utf8 = self.import(source, target, memo)?;
        self.replace(slot, with_reference(&constant, utf8))?;
        memo.insert(index, slot);
        Ok(slot)
    }

    /// Append a placeholder slot that the dedup table does not know about.
    fn reserve(&mut self) -> Result<u16> {
        if self.entries.len() + 1 > usize::from(u16::MAX) {
            bail!("constant pool overflow: more than 65535 slots");
        }
        let index = self.entries.len() as u16;
        self.entries.push(Constant::Integer(0));
        Ok(index)
    }
}

/// `constant`, a single-reference entry, pointing at `target` instead.
fn with_reference(constant: &Constant, target: u16) -> Constant {
    match constant {
        Constant::Class(_) => Constant::Class(target),
        Constant::MethodType(_) => Constant::MethodType(target),
        _ => Constant::String(target),
    }
}

/// Decode the JVM's modified UTF-8. Unpaired surrogates become U+FFFD.
pub fn decode_modified_utf8(bytes: &[u8]) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xE0 == 0xC0 && i + 1 < bytes.len() {
            units.push((u16::from(b & 0x1F) << 6) | u16::from(bytes[i + 1] & 0x3F));
            i += 2;
        } else if b & 0xF0 == 0xE0 && i + 2 < bytes.len() {
            units.push(
                (u16::from(b & 0x0F) << 12)
                    | (u16::from(bytes[i + 1] & 0x3F) << 6)
                    | u16::from(bytes[i + 2] & 0x3F),
            );
            i += 3;
        } else {
            units.push(0xFFFD);
            i += 1;
        }
    }
    String::from_utf16_lossy(&units)
}

/// Encode a string as modified UTF-8 (NUL as two bytes, supplementary characters as
/// surrogate pairs).
pub fn encode_modified_utf8(value: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(value.len());
    for unit in value.encode_utf16() {
        match unit {
            0x0001..=0x007F => out.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((unit >> 6) as u8 & 0x1F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) as u8 & 0x0F));
                out.push(0x80 | ((unit >> 6) as u8 & 0x3F));
                out.push(0x80 | (unit as u8 & 0x3F));
            }
        }
    }
    out
}
