//! Constant-pool references inside attributes.
//!
//! [`rewrite_attribute`] decodes the attributes the stages care about, hands every
//! constant-pool index to a callback together with what kind of entry it is, and writes the
//! returned index back. Relocating a member into another class's pool and rewriting
//! descriptors during remapping are both expressed as such callbacks.

use crate::classfile::bytes::{Reader, Writer};
use crate::classfile::code::{LDC, has_pool_operand, walk_instructions};
use crate::classfile::{Attribute, ConstantPool, read_attributes, write_attributes};
use anyhow::{Result, bail};
use tracing::warn;

/// What a constant-pool index inside an attribute refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Any entry whose meaning does not depend on where it is used
    Constant,
    /// The one-byte operand of `ldc`; the result must stay below 256
    Ldc,
    /// A UTF-8 entry that is neither a name nor a type (attribute names, string values)
    Utf8,
    /// A UTF-8 field or method descriptor
    Descriptor,
    /// A UTF-8 generic signature
    Signature,
    /// A local variable name; `type_index` is its descriptor (or signature when `generic`)
    LocalName {
        local: u16,
        start_pc: u16,
        type_index: u16,
        generic: bool,
    },
    /// The simple name of the inner class `inner_class` (a `Class` entry)
    InnerName { inner_class: u16 },
    /// The `NameAndType` of an enclosing method declared by `owner` (a `Class` entry)
    EnclosingMethod { owner: u16 },
}

/// Callback receiving each reference and returning its replacement.
pub type Visitor<'a> = dyn FnMut(Slot, u16) -> Result<u16> + 'a;

/// Rewrite the pool references of `attribute` in place
///
/// `pool` is the pool the attribute's current indices refer to; the attribute name index is
/// left for the caller. Returns `false`, leaving the data untouched, for attributes whose
/// layout is unknown. Unknown attributes nested inside `Code` are kept when `keep_unknown`
/// is set and dropped with a warning otherwise.
pub fn rewrite_attribute(
    pool: &ConstantPool,
    attribute: &mut Attribute,
    keep_unknown: bool,
    visit: &mut Visitor<'_>,
) -> Result<bool> {
    let name = attribute.name(pool)?;
    let data = &attribute.data;
    let rewritten = match name.as_str() {
        "Code" => rewrite_code(pool, data, keep_unknown, visit)?,
        "ConstantValue" | "NestHost" => rewrite_u16(data, Slot::Constant, visit)?,
        "SourceFile" => rewrite_u16(data, Slot::Utf8, visit)?,
        "Signature" => rewrite_u16(data, Slot::Signature, visit)?,
        "Exceptions" | "NestMembers" | "PermittedSubclasses" => {
            rewrite_u16_list(data, Slot::Constant, visit)?
        }
        "InnerClasses" => rewrite_inner_classes(data, visit)?,
        "EnclosingMethod" => rewrite_enclosing_method(data, visit)?,
        "StackMapTable" => rewrite_stack_map(data, visit)?,
        "LocalVariableTable" => rewrite_local_variables(data, false, visit)?,
        "LocalVariableTypeTable" => rewrite_local_variables(data, true, visit)?,
        "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
            transcode(data, |r, w| annotations(r, w, visit))?
        }
        "RuntimeVisibleParameterAnnotations" | "RuntimeInvisibleParameterAnnotations" => {
            transcode(data, |r, w| {
                let count = r.u8()?;
                w.u8(count);
                for _ in 0..count {
                    annotations(r, w, visit)?;
                }
                Ok(())
            })?
        }
        "AnnotationDefault" => transcode(data, |r, w| element_value(r, w, visit))?,
        "BootstrapMethods" => rewrite_bootstrap_methods(data, visit)?,
        "MethodParameters" => transcode(data, |r, w| {
            let count = r.u8()?;
            w.u8(count);
            for _ in 0..count {
                let name = r.u16()?;
                w.u16(optional(name, Slot::Utf8, visit)?);
                w.u16(r.u16()?);
            }
            Ok(())
        })?,
        "Deprecated" | "Synthetic" | "SourceDebugExtension" => return Ok(true),
        _ => return Ok(false),
    };
    attribute.data = rewritten;
    Ok(true)
}

/// Decode `data` with `f`, which copies it into a writer while translating indices.
fn transcode(data: &[u8], f: impl FnOnce(&mut Reader<'_>, &mut Writer) -> Result<()>) -> Result<Vec<u8>> {
    let mut reader = Reader::new(data);
    let mut writer = Writer::new();
    f(&mut reader, &mut writer)?;
    if reader.remaining() != 0 {
        bail!("{} unexpected trailing bytes in attribute", reader.remaining());
    }
    Ok(writer.into_inner())
}

fn optional(index: u16, slot: Slot, visit: &mut Visitor<'_>) -> Result<u16> {
    if index == 0 { Ok(0) } else { visit(slot, index) }
}

fn rewrite_u16(data: &[u8], slot: Slot, visit: &mut Visitor<'_>) -> Result<Vec<u8>> {
    transcode(data, |r, w| {
        w.u16(visit(slot, r.u16()?)?);
        Ok(())
    })
}

fn rewrite_u16_list(data: &[u8], slot: Slot, visit: &mut Visitor<'_>) -> Result<Vec<u8>> {
    transcode(data, |r, w| {
        let count = r.u16()?;
        w.u16(count);
        for _ in 0..count {
            w.u16(visit(slot, r.u16()?)?);
        }
        Ok(())
    })
}

fn rewrite_inner_classes(data: &[u8], visit: &mut Visitor<'_>) -> Result<Vec<u8>> {
    transcode(data, |r, w| {
        let count = r.u16()?;
        w.u16(count);
        for _ in 0..count {
            let inner = r.u16()?;
            let outer = r.u16()?;
            let name = r.u16()?;
            let access = r.u16()?;
            w.u16(visit(Slot::Constant, inner)?);
            w.u16(optional(outer, Slot::Constant, visit)?);
            w.u16(optional(name, Slot::InnerName { inner_class: inner }, visit)?);
            w.u16(access);
        }
        Ok(())
    })
}

fn rewrite_enclosing_method(data: &[u8], visit: &mut Visitor<'_>) -> Result<Vec<u8>> {
    transcode(data, |r, w| {
        let owner = r.u16()?;
        let method = r.u16()?;
        w.u16(visit(Slot::Constant, owner)?);
        w.u16(optional(method, Slot::EnclosingMethod { owner }, visit)?);
        Ok(())
    })
}

fn rewrite_local_variables(data: &[u8], generic: bool, visit: &mut Visitor<'_>) -> Result<Vec<u8>> {
    transcode(data, |r, w| {
        let count = r.u16()?;
        w.u16(count);
        for _ in 0..count {
            let start_pc = r.u16()?;
            let length = r.u16()?;
            let name = r.u16()?;
            let type_index = r.u16()?;
            let local = r.u16()?;
            let slot = Slot::LocalName {
                local,
                start_pc,
                type_index,
                generic,
            };
            w.u16(start_pc);
            w.u16(length);
            w.u16(visit(slot, name)?);
            w.u16(visit(if generic { Slot::Signature } else { Slot::Descriptor }, type_index)?);
            w.u16(local);
        }
        Ok(())
    })
}

fn verification_type(r: &mut Reader<'_>, w: &mut Writer, visit: &mut Visitor<'_>) -> Result<()> {
    let tag = r.u8()?;
    w.u8(tag);
    match tag {
        0..=6 => {}
        7 => w.u16(visit(Slot::Constant, r.u16()?)?),
        8 => w.u16(r.u16()?),
        other => bail!("invalid verification type tag {other}"),
    }
    Ok(())
}

fn rewrite_stack_map(data: &[u8], visit: &mut Visitor<'_>) -> Result<Vec<u8>> {
    transcode(data, |r, w| {
        let count = r.u16()?;
        w.u16(count);
        for _ in 0..count {
            let frame = r.u8()?;
            w.u8(frame);
            match frame {
                0..=63 => {}
                64..=127 => verification_type(r, w, visit)?,
                247 => {
                    w.u16(r.u16()?);
                    verification_type(r, w, visit)?;
                }
                248..=251 => w.u16(r.u16()?),
                252..=254 => {
                    w.u16(r.u16()?);
                    for _ in 0..(frame - 251) {
                        verification_type(r, w, visit)?;
                    }
                }
                255 => {
                    w.u16(r.u16()?);
                    for _ in 0..2 {
                        let items = r.u16()?;
                        w.u16(items);
                        for _ in 0..items {
                            verification_type(r, w, visit)?;
                        }
                    }
                }
                other => bail!("reserved stack map frame type {other}"),
            }
        }
        Ok(())
    })
}

fn annotations(r: &mut Reader<'_>, w: &mut Writer, visit: &mut Visitor<'_>) -> Result<()> {
    let count = r.u16()?;
    w.u16(count);
    for _ in 0..count {
        annotation(r, w, visit)?;
    }
    Ok(())
}

fn annotation(r: &mut Reader<'_>, w: &mut Writer, visit: &mut Visitor<'_>) -> Result<()> {
    w.u16(visit(Slot::Descriptor, r.u16()?)?);
    let pairs = r.u16()?;
    w.u16(pairs);
    for _ in 0..pairs {
        w.u16(visit(Slot::Utf8, r.u16()?)?);
        element_value(r, w, visit)?;
    }
    Ok(())
}

fn element_value(r: &mut Reader<'_>, w: &mut Writer, visit: &mut Visitor<'_>) -> Result<()> {
    let tag = r.u8()?;
    w.u8(tag);
    match tag {
        b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' => w.u16(visit(Slot::Constant, r.u16()?)?),
        b's' => w.u16(visit(Slot::Utf8, r.u16()?)?),
        b'e' => {
            w.u16(visit(Slot::Descriptor, r.u16()?)?);
            w.u16(visit(Slot::Utf8, r.u16()?)?);
        }
        b'c' => w.u16(visit(Slot::Descriptor, r.u16()?)?),
        b'@' => annotation(r, w, visit)?,
        b'[' => {
            let count = r.u16()?;
            w.u16(count);
            for _ in 0..count {
                element_value(r, w, visit)?;
            }
        }
        other => bail!("invalid element value tag '{}'", char::from(other)),
    }
    Ok(())
}

fn rewrite_bootstrap_methods(data: &[u8], visit: &mut Visitor<'_>) -> Result<Vec<u8>> {
    transcode(data, |r, w| {
        let count = r.u16()?;
        w.u16(count);
        for _ in 0..count {
            w.u16(visit(Slot::Constant, r.u16()?)?);
            let args = r.u16()?;
            w.u16(args);
            for _ in 0..args {
                w.u16(visit(Slot::Constant, r.u16()?)?);
            }
        }
        Ok(())
    })
}

fn rewrite_code(pool: &ConstantPool, data: &[u8], keep_unknown: bool, visit: &mut Visitor<'_>) -> Result<Vec<u8>> {
    let mut r = Reader::new(data);
    let mut w = Writer::new();
    w.u16(r.u16()?);
    w.u16(r.u16()?);

    let code_len = r.u32()? as usize;
    let mut code = r.bytes(code_len)?.to_vec();
    walk_instructions(&mut code, |pc, opcode, operands| {
        if opcode == LDC {
            let mapped = visit(Slot::Ldc, u16::from(operands[0]))?;
            let Ok(byte) = u8::try_from(mapped) else {
                bail!("ldc at offset {pc} needs constant #{mapped}, beyond the one-byte operand");
            };
            operands[0] = byte;
        } else if has_pool_operand(opcode) {
            let index = u16::from_be_bytes([operands[0], operands[1]]);
            let [hi, lo] = visit(Slot::Constant, index)?.to_be_bytes();
            operands[0] = hi;
            operands[1] = lo;
        }
        Ok(())
    })?;
    w.u32(code_len as u32);
    w.bytes(&code);

    let handlers = r.u16()?;
    w.u16(handlers);
    for _ in 0..handlers {
        w.u16(r.u16()?);
        w.u16(r.u16()?);
        w.u16(r.u16()?);
        let catch_type = r.u16()?;
        w.u16(optional(catch_type, Slot::Constant, visit)?);
    }

    let mut nested = read_attributes(&mut r)?;
    if r.remaining() != 0 {
        bail!("{} unexpected trailing bytes in Code attribute", r.remaining());
    }
    let mut kept = Vec::with_capacity(nested.len());
    for mut attribute in nested.drain(..) {
        let known = rewrite_attribute(pool, &mut attribute, keep_unknown, visit)?;
        if !known && !keep_unknown {
            warn!("Dropping unknown Code attribute '{}'", attribute.name(pool)?);
            continue;
        }
        attribute.name_index = visit(Slot::Utf8, attribute.name_index)?;
        kept.push(attribute);
    }
    write_attributes(&mut w, &kept)?;
    Ok(w.into_inner())
}
