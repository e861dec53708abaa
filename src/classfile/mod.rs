//! A minimal class-file codec
//!
//! Just enough structure for the transform stages: the constant pool, access flags, the
//! class hierarchy, and fields and methods with their attributes kept as raw bytes. Stages
//! edit this representation directly and serialize it back with [`ClassFile::to_bytes`];
//! [`attributes::rewrite_attribute`] walks every constant-pool reference inside the
//! attributes that matter, so members can be moved between pools and descriptors rewritten.
//!
//! ```rust
//! use oldloom_cli::classfile::ClassFile;
//! use oldloom_cli::test_utils::ClassBuilder;
//!
//! let bytes = ClassBuilder::new("net/minecraft/a").method("b", "()V").build();
//! let class = ClassFile::parse(&bytes, "a.class").unwrap();
//! assert_eq!(class.name().unwrap(), "net/minecraft/a");
//! assert_eq!(class.to_bytes().unwrap(), bytes);
//! ```

pub mod annotations;
pub mod attributes;
pub(crate) mod bytes;
pub mod code;
pub mod descriptor;
pub mod pool;

pub use attributes::{Slot, rewrite_attribute};
pub use pool::{Constant, ConstantPool};

use crate::core::LoomError;
use anyhow::Result;
use bytes::{Reader, Writer};

pub const MAGIC: u32 = 0xCAFE_BABE;

pub const ACC_PUBLIC: u16 = 0x0001;
pub const ACC_PRIVATE: u16 = 0x0002;
pub const ACC_PROTECTED: u16 = 0x0004;
pub const ACC_STATIC: u16 = 0x0008;
pub const ACC_FINAL: u16 = 0x0010;
pub const ACC_SYNCHRONIZED: u16 = 0x0020;
pub const ACC_INTERFACE: u16 = 0x0200;
pub const ACC_ABSTRACT: u16 = 0x0400;
pub const ACC_SYNTHETIC: u16 = 0x1000;
pub const ACC_ANNOTATION: u16 = 0x2000;
pub const ACC_ENUM: u16 = 0x4000;

/// Mask of the three visibility bits.
pub const ACC_VISIBILITY: u16 = ACC_PUBLIC | ACC_PRIVATE | ACC_PROTECTED;

/// An attribute with its name index and undecoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: u16,
    pub data: Vec<u8>,
}

impl Attribute {
    pub fn name(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.name_index)
    }
}

/// A field or method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub access: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

impl Member {
    pub fn name(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.name_index)
    }

    pub fn descriptor(&self, pool: &ConstantPool) -> Result<String> {
        pool.utf8(self.descriptor_index)
    }

    /// `(name, descriptor)`, the identity of a member within its class.
    pub fn key(&self, pool: &ConstantPool) -> Result<(String, String)> {
        Ok((self.name(pool)?, self.descriptor(pool)?))
    }
}

/// A parsed class file.
#[derive(Debug, Clone)]
pub struct ClassFile {
    pub minor_version: u16,
    pub major_version: u16,
    pub pool: ConstantPool,
    pub access: u16,
    pub this_class: u16,
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<Member>,
    pub methods: Vec<Member>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Parse class bytes; `origin` names the entry in error messages.
    pub fn parse(data: &[u8], origin: &str) -> Result<Self> {
        Self::parse_inner(data).map_err(|err| {
            LoomError::ClassFormat {
                class: origin.to_string(),
                reason: err.to_string(),
            }
            .into()
        })
    }

    fn parse_inner(data: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(data);
        let magic = reader.u32()?;
        if magic != MAGIC {
            anyhow::bail!("bad magic 0x{magic:08X}");
        }
        let minor_version = reader.u16()?;
        let major_version = reader.u16()?;
        let pool = ConstantPool::parse(&mut reader)?;
        let access = reader.u16()?;
        let this_class = reader.u16()?;
        let super_class = reader.u16()?;
        let interface_count = reader.u16()?;
        let interfaces = (0..interface_count).map(|_| reader.u16()).collect::<Result<Vec<_>>>()?;
        let fields = read_members(&mut reader)?;
        let methods = read_members(&mut reader)?;
        let attributes = read_attributes(&mut reader)?;
        if reader.remaining() != 0 {
            anyhow::bail!("{} trailing bytes after offset {}", reader.remaining(), reader.position());
        }
        Ok(Self {
            minor_version,
            major_version,
            pool,
            access,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Writer::new();
        out.u32(MAGIC);
        out.u16(self.minor_version);
        out.u16(self.major_version);
        self.pool.write(&mut out)?;
        out.u16(self.access);
        out.u16(self.this_class);
        out.u16(self.super_class);
        out.count(self.interfaces.len())?;
        for interface in &self.interfaces {
            out.u16(*interface);
        }
        write_members(&mut out, &self.fields)?;
        write_members(&mut out, &self.methods)?;
        write_attributes(&mut out, &self.attributes)?;
        Ok(out.into_inner())
    }

    /// Internal name of this class.
    pub fn name(&self) -> Result<String> {
        self.pool.class_name(self.this_class)
    }

    /// Internal name of the superclass (`None` for `java/lang/Object`).
    pub fn super_name(&self) -> Result<Option<String>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.pool.class_name(self.super_class).map(Some)
    }

    pub fn interface_names(&self) -> Result<Vec<String>> {
        self.interfaces.iter().map(|&i| self.pool.class_name(i)).collect()
    }

    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<&Member> {
        find_member(&self.pool, &self.fields, name, descriptor)
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&Member> {
        find_member(&self.pool, &self.methods, name, descriptor)
    }

    /// First class-level attribute called `name`.
    pub fn find_attribute(&self, name: &str) -> Option<&Attribute> {
        find_attribute(&self.pool, &self.attributes, name)
    }
}

fn find_member<'a>(pool: &ConstantPool, members: &'a [Member], name: &str, descriptor: &str) -> Option<&'a Member> {
    members.iter().find(|m| {
        m.name(pool).is_ok_and(|n| n == name) && m.descriptor(pool).is_ok_and(|d| d == descriptor)
    })
}

/// First attribute in `attributes` called `name`.
pub fn find_attribute<'a>(pool: &ConstantPool, attributes: &'a [Attribute], name: &str) -> Option<&'a Attribute> {
    attributes.iter().find(|a| a.name(pool).is_ok_and(|n| n == name))
}

fn read_members(reader: &mut Reader<'_>) -> Result<Vec<Member>> {
    let count = reader.u16()?;
    let mut members = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        members.push(Member {
            access: reader.u16()?,
            name_index: reader.u16()?,
            descriptor_index: reader.u16()?,
            attributes: read_attributes(reader)?,
        });
    }
    Ok(members)
}

pub(crate) fn read_attributes(reader: &mut Reader<'_>) -> Result<Vec<Attribute>> {
    let count = reader.u16()?;
    let mut attributes = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name_index = reader.u16()?;
        let len = reader.u32()? as usize;
        attributes.push(Attribute {
            name_index,
            data: reader.bytes(len)?.to_vec(),
        });
    }
    Ok(attributes)
}

fn write_members(out: &mut Writer, members: &[Member]) -> Result<()> {
    out.count(members.len())?;
    for member in members {
        out.u16(member.access);
        out.u16(member.name_index);
        out.u16(member.descriptor_index);
        write_attributes(out, &member.attributes)?;
    }
    Ok(())
}

pub(crate) fn write_attributes(out: &mut Writer, attributes: &[Attribute]) -> Result<()> {
    out.count(attributes.len())?;
    for attribute in attributes {
        out.u16(attribute.name_index);
        let Ok(len) = u32::try_from(attribute.data.len()) else {
            anyhow::bail!("attribute larger than 4 GiB");
        };
        out.u32(len);
        out.bytes(&attribute.data);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ClassBuilder;

    #[test]
    fn test_parse_reads_hierarchy_and_members() {
        let bytes = ClassBuilder::new("a")
            .super_class("b")
            .interface("java/lang/Runnable")
            .field("c", "I")
            .method("run", "()V")
            .build();
        let class = ClassFile::parse(&bytes, "a.class").unwrap();
        assert_eq!(class.name().unwrap(), "a");
        assert_eq!(class.super_name().unwrap().as_deref(), Some("b"));
        assert_eq!(class.interface_names().unwrap(), vec!["java/lang/Runnable"]);
        assert!(class.find_field("c", "I").is_some());
        assert!(class.find_method("run", "()V").is_some());
        assert_eq!(class.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_parse_errors_are_class_format_errors() {
        let err = ClassFile::parse(b"not a class", "x.class").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<LoomError>(),
            Some(LoomError::ClassFormat { class, .. }) if class == "x.class"
        ));

        let mut bytes = ClassBuilder::new("a").build();
        bytes.push(0);
        assert!(ClassFile::parse(&bytes, "a.class").is_err());
    }
}
