//! Runtime-visible annotation helpers for side markers.

use crate::classfile::bytes::{Reader, Writer};
use crate::classfile::{Attribute, ConstantPool};
use anyhow::Result;

const RUNTIME_VISIBLE: &str = "RuntimeVisibleAnnotations";

/// An annotation with a single enum-valued element, e.g.
/// `@SideOnly(Side.CLIENT)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumAnnotation<'a> {
    /// Annotation type descriptor, `Lcpw/mods/fml/relauncher/SideOnly;`
    pub annotation: &'a str,
    /// Element name, usually `value`
    pub element: &'a str,
    /// Enum type descriptor, `Lcpw/mods/fml/relauncher/Side;`
    pub enum_type: &'a str,
    /// Enum constant name
    pub constant: &'a str,
}

/// Append `marker` to the runtime-visible annotations in `attributes`, creating the
/// attribute when absent.
pub fn add_enum_annotation(
    pool: &mut ConstantPool,
    attributes: &mut Vec<Attribute>,
    marker: &EnumAnnotation<'_>,
) -> Result<()> {
    let mut encoded = Writer::new();
    encoded.u16(pool.intern_utf8(marker.annotation)?);
    encoded.u16(1);
    encoded.u16(pool.intern_utf8(marker.element)?);
    encoded.u8(b'e');
    encoded.u16(pool.intern_utf8(marker.enum_type)?);
    encoded.u16(pool.intern_utf8(marker.constant)?);
    let encoded = encoded.into_inner();

    for attribute in attributes.iter_mut() {
        if attribute.name(pool)? == RUNTIME_VISIBLE {
            let count = Reader::new(&attribute.data).u16()?;
            let [hi, lo] = count
                .checked_add(1)
                .ok_or_else(|| anyhow::anyhow!("too many annotations"))?
                .to_be_bytes();
            attribute.data[0] = hi;
            attribute.data[1] = lo;
            attribute.data.extend_from_slice(&encoded);
            return Ok(());
        }
    }

    let mut data = vec![0, 1];
    data.extend_from_slice(&encoded);
    attributes.push(Attribute {
        name_index: pool.intern_utf8(RUNTIME_VISIBLE)?,
        data,
    });
    Ok(())
}

/// Constant of the first `annotation` element whose value is an enum, if present.
pub fn find_enum_annotation(
    pool: &ConstantPool,
    attributes: &[Attribute],
    annotation: &str,
) -> Result<Option<String>> {
    for attribute in attributes {
        if attribute.name(pool)? != RUNTIME_VISIBLE {
            continue;
        }
        let mut r = Reader::new(&attribute.data);
        let count = r.u16()?;
        for _ in 0..count {
            if let Some(found) = read_annotation(pool, &mut r, annotation)? {
                return Ok(Some(found));
            }
        }
    }
    Ok(None)
}

fn read_annotation(pool: &ConstantPool, r: &mut Reader<'_>, wanted: &str) -> Result<Option<String>> {
    let matches = pool.utf8(r.u16()?)? == wanted;
    let pairs = r.u16()?;
    let mut found = None;
    for _ in 0..pairs {
        r.u16()?;
        if let Some(constant) = skip_element(pool, r)?
            && matches
            && found.is_none()
        {
            found = Some(constant);
        }
    }
    Ok(found)
}

/// Skip one element value, returning the constant name when it is an enum.
fn skip_element(pool: &ConstantPool, r: &mut Reader<'_>) -> Result<Option<String>> {
    match r.u8()? {
        b'e' => {
            r.u16()?;
            Ok(Some(pool.utf8(r.u16()?)?))
        }
        b'@' => {
            read_annotation(pool, r, "")?;
            Ok(None)
        }
        b'[' => {
            for _ in 0..r.u16()? {
                skip_element(pool, r)?;
            }
            Ok(None)
        }
        _ => {
            r.u16()?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: EnumAnnotation<'static> = EnumAnnotation {
        annotation: "Lcpw/mods/fml/relauncher/SideOnly;",
        element: "value",
        enum_type: "Lcpw/mods/fml/relauncher/Side;",
        constant: "CLIENT",
    };

    #[test]
    fn test_creates_then_extends_attribute() {
        let mut pool = ConstantPool::new();
        let mut attributes = Vec::new();
        add_enum_annotation(&mut pool, &mut attributes, &MARKER).unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(
            find_enum_annotation(&pool, &attributes, MARKER.annotation).unwrap().as_deref(),
            Some("CLIENT")
        );

        let other = EnumAnnotation {
            annotation: "Lexample/Other;",
            constant: "SERVER",
            ..MARKER
        };
        add_enum_annotation(&mut pool, &mut attributes, &other).unwrap();
        assert_eq!(attributes.len(), 1);
        assert_eq!(&attributes[0].data[..2], &[0, 2]);
        assert_eq!(
            find_enum_annotation(&pool, &attributes, "Lexample/Other;").unwrap().as_deref(),
            Some("SERVER")
        );
        assert!(find_enum_annotation(&pool, &attributes, "Lmissing;").unwrap().is_none());
    }
}
