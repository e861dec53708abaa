//! Forge binary patches
//!
//! A forge archive carries one record per patched class under `binpatch/{side}/`. Each
//! record names the class, says whether the class exists in the vanilla jar, carries the
//! Adler-32 checksum of the vanilla bytes, and holds a GDIFF stream turning those bytes into
//! the patched class:
//!
//! ```text
//! utf    name
//! utf    source class   (dotted, e.g. "net.minecraft.a")
//! utf    target class
//! u8     exists
//! i32    input checksum  (only when exists)
//! i32    patch length
//! [u8]   GDIFF stream
//! ```
//!
//! Strings are Java `DataOutput.writeUTF` values: a u16 byte length followed by modified
//! UTF-8. Integers are big-endian.

use crate::core::{LoomError, Side};
use crate::jar::{Jar, entry_name_of};
use anyhow::Result;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// GDIFF magic number.
pub const GDIFF_MAGIC: u32 = 0xD1FF_D1FF;
/// GDIFF version understood by [`gdiff_apply`].
pub const GDIFF_VERSION: u8 = 4;

/// One class patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassPatch {
    pub name: String,
    /// Internal name of the class in the vanilla jar
    pub source_class: String,
    pub target_class: String,
    /// Adler-32 of the vanilla class, `None` when the patch creates a new class
    pub input_checksum: Option<u32>,
    pub patch: Vec<u8>,
}

impl ClassPatch {
    /// Decode a record; `origin` names it in errors.
    pub fn decode(data: &[u8], origin: &str) -> Result<Self> {
        let malformed = |reason: String| LoomError::MalformedPatch {
            class: origin.to_string(),
            reason,
        };
        let mut cursor = Cursor { data, pos: 0 };
        let mut record = || -> Result<Self, String> {
            let name = cursor.utf()?;
            let source_class = cursor.utf()?.replace('.', "/");
            let target_class = cursor.utf()?.replace('.', "/");
            let exists = cursor.u8()? != 0;
            let input_checksum = if exists { Some(cursor.i32()? as u32) } else { None };
            let len = cursor.length()?;
            let patch = cursor.take(len)?.to_vec();
            Ok(Self {
                name,
                source_class,
                target_class,
                input_checksum,
                patch,
            })
        };
        let patch = record().map_err(malformed)?;
        if cursor.pos != data.len() {
            return Err(malformed(format!("{} trailing bytes after record", data.len() - cursor.pos)).into());
        }
        Ok(patch)
    }

    /// Encode the record in the layout [`ClassPatch::decode`] reads.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for value in [&self.name, &self.source_class.replace('/', "."), &self.target_class.replace('/', ".")] {
            let bytes = value.as_bytes();
            out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
            out.extend_from_slice(bytes);
        }
        match self.input_checksum {
            Some(checksum) => {
                out.push(1);
                out.extend_from_slice(&checksum.to_be_bytes());
            }
            None => out.push(0),
        }
        out.extend_from_slice(&(self.patch.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.patch);
        out
    }

    /// Patched bytes for `input`, which must be the class the record was made against.
    pub fn apply(&self, input: Option<&[u8]>) -> Result<Vec<u8>> {
        let original = match (self.input_checksum, input) {
            (Some(expected), Some(input)) => {
                let actual = adler32(input);
                if actual != expected {
                    return Err(LoomError::MalformedPatch {
                        class: self.source_class.clone(),
                        reason: format!(
                            "input checksum {actual:08x} does not match the patched original {expected:08x}"
                        ),
                    }
                    .into());
                }
                input
            }
            (Some(_), None) => {
                return Err(LoomError::MalformedPatch {
                    class: self.source_class.clone(),
                    reason: "the class to patch is missing from the input jar".to_string(),
                }
                .into());
            }
            (None, _) => &[][..],
        };
        gdiff_apply(original, &self.patch).map_err(|reason| {
            LoomError::MalformedPatch {
                class: self.source_class.clone(),
                reason,
            }
            .into()
        })
    }
}

/// Every class patch for one side, keyed by vanilla class name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinpatchSet {
    patches: BTreeMap<String, ClassPatch>,
}

impl BinpatchSet {
    /// Directory inside the forge archive holding `side`'s patches.
    pub fn directory(side: Side) -> String {
        format!("binpatch/{side}/")
    }

    /// Whether `archive` carries binary patches for either side.
    pub fn present_in(archive: &Jar) -> bool {
        archive
            .names()
            .any(|name| name.starts_with("binpatch/") && name.ends_with(".binpatch"))
    }

    /// Read `side`'s patches from a forge archive.
    pub fn from_archive(archive: &Jar, side: Side) -> Result<Self> {
        let prefix = Self::directory(side);
        let mut patches = BTreeMap::new();
        for (name, data) in archive.entries() {
            if name.starts_with(&prefix) && name.ends_with(".binpatch") {
                let patch = ClassPatch::decode(data, name)?;
                patches.insert(patch.source_class.clone(), patch);
            }
        }
        debug!("Read {} {side} binpatches", patches.len());
        Ok(Self { patches })
    }

    pub fn insert(&mut self, patch: ClassPatch) {
        self.patches.insert(patch.source_class.clone(), patch);
    }

    pub fn get(&self, class: &str) -> Option<&ClassPatch> {
        self.patches.get(class)
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Apply every patch to `input`. Fails without output on the first bad patch.
    pub fn apply(&self, input: &Jar) -> Result<Jar> {
        let mut output = input.clone();
        for (class, patch) in &self.patches {
            let entry = entry_name_of(class);
            let patched = patch.apply(input.get(&entry))?;
            output.insert(entry, patched);
        }
        info!("Applied {} binpatches", self.patches.len());
        Ok(output)
    }
}

/// Adler-32 as computed by `java.util.zip.Adler32`.
pub fn adler32(data: &[u8]) -> u32 {
    const MOD: u32 = 65_521;
    let (mut a, mut b) = (1u32, 0u32);
    for chunk in data.chunks(5552) {
        for &byte in chunk {
            a += u32::from(byte);
            b += a;
        }
        a %= MOD;
        b %= MOD;
    }
    (b << 16) | a
}

/// Apply a GDIFF stream to `original`
///
/// | opcode     | meaning                                        |
/// |------------|------------------------------------------------|
/// | `0`        | end of stream                                  |
/// | `1..=246`  | that many literal bytes follow                 |
/// | `247`      | u16 length, then literal bytes                 |
/// | `248`      | i32 length, then literal bytes                 |
/// | `249..=251`| copy from u16 offset, length u8 / u16 / i32     |
/// | `252..=254`| copy from i32 offset, length u8 / u16 / i32     |
/// | `255`      | copy from i64 offset, i32 length               |
pub fn gdiff_apply(original: &[u8], patch: &[u8]) -> Result<Vec<u8>, String> {
    let mut cursor = Cursor { data: patch, pos: 0 };
    if cursor.u32()? != GDIFF_MAGIC {
        return Err("bad GDIFF magic".to_string());
    }
    let version = cursor.u8()?;
    if version != GDIFF_VERSION {
        return Err(format!("unsupported GDIFF version {version}"));
    }

    let mut out = Vec::with_capacity(original.len());
    loop {
        let opcode = cursor.u8()?;
        match opcode {
            0 => break,
            1..=246 => out.extend_from_slice(cursor.take(usize::from(opcode))?),
            247 => {
                let len = usize::from(cursor.u16()?);
                out.extend_from_slice(cursor.take(len)?);
            }
            248 => {
                let len = cursor.length()?;
                out.extend_from_slice(cursor.take(len)?);
            }
            249..=255 => {
                let offset = match opcode {
                    249..=251 => u64::from(cursor.u16()?),
                    252..=254 => cursor.length()? as u64,
                    _ => {
                        let offset = cursor.i64()?;
                        u64::try_from(offset).map_err(|_| format!("negative copy offset {offset}"))?
                    }
                };
                let len = match opcode {
                    249 | 252 => usize::from(cursor.u8()?),
                    250 | 253 => usize::from(cursor.u16()?),
                    _ => cursor.length()?,
                };
                let start = usize::try_from(offset).map_err(|_| format!("copy offset {offset} is not addressable"))?;
                let end = start
                    .checked_add(len)
                    .filter(|end| *end <= original.len())
                    .ok_or_else(|| format!("copy of {len} bytes at {start} exceeds the {} byte original", original.len()))?;
                out.extend_from_slice(&original[start..end]);
            }
        }
    }
    if cursor.pos != patch.len() {
        return Err(format!("{} bytes after end of stream", patch.len() - cursor.pos));
    }
    Ok(out)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], String> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| format!("truncated: needed {len} bytes at offset {}", self.pos))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], String> {
        let mut array = [0; N];
        array.copy_from_slice(self.take(N)?);
        Ok(array)
    }

    fn u8(&mut self) -> Result<u8, String> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, String> {
        Ok(u16::from_be_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, String> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn i32(&mut self) -> Result<i32, String> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    fn i64(&mut self) -> Result<i64, String> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    /// A non-negative i32 length or offset.
    fn length(&mut self) -> Result<usize, String> {
        let value = self.i32()?;
        usize::try_from(value).map_err(|_| format!("negative length {value}"))
    }

    fn utf(&mut self) -> Result<String, String> {
        let len = usize::from(self.u16()?);
        Ok(crate::classfile::pool::decode_modified_utf8(self.take(len)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(body: &[u8]) -> Vec<u8> {
        let mut patch = GDIFF_MAGIC.to_be_bytes().to_vec();
        patch.push(GDIFF_VERSION);
        patch.extend_from_slice(body);
        patch.push(0);
        patch
    }

    #[test]
    fn test_literal_and_copy_opcodes() {
        let original = b"ABCDEFGH";
        let mut body = vec![5];
        body.extend_from_slice(b"hello");
        body.extend_from_slice(&[247, 0, 2]);
        body.extend_from_slice(b"!!");
        body.extend_from_slice(&[249, 0, 0, 4]);
        body.push(252);
        body.extend_from_slice(&6i32.to_be_bytes());
        body.push(2);

        let patched = gdiff_apply(original, &stream(&body)).unwrap();
        assert_eq!(patched, b"hello!!ABCDGH");
    }

    #[test]
    fn test_rejects_malformed_streams() {
        assert!(gdiff_apply(b"", &[0, 0, 0, 0, 4, 0]).is_err());
        // copy past the end of the original
        assert!(gdiff_apply(b"AB", &stream(&[249, 0, 1, 4])).is_err());
        // negative i32 length
        let mut body = vec![248];
        body.extend_from_slice(&(-1i32).to_be_bytes());
        assert!(gdiff_apply(b"", &stream(&body)).is_err());
        // negative i64 offset
        let mut body = vec![255];
        body.extend_from_slice(&(-1i64).to_be_bytes());
        body.extend_from_slice(&1i32.to_be_bytes());
        assert!(gdiff_apply(b"A", &stream(&body)).is_err());
        // truncated literal
        let mut truncated = stream(&[3, b'a']);
        truncated.pop();
        assert!(gdiff_apply(b"", &truncated).is_err());
    }

    #[test]
    fn test_adler32_matches_known_value() {
        assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
        assert_eq!(adler32(b""), 1);
    }

    #[test]
    fn test_record_round_trip_and_checksum_validation() {
        let original = b"vanilla".to_vec();
        let patch = ClassPatch {
            name: "a".to_string(),
            source_class: "net/minecraft/a".to_string(),
            target_class: "net/minecraft/a".to_string(),
            input_checksum: Some(adler32(&original)),
            patch: stream(&[249, 0, 0, 7, 1, b'!']),
        };
        let decoded = ClassPatch::decode(&patch.encode(), "a.binpatch").unwrap();
        assert_eq!(decoded, patch);
        assert_eq!(decoded.apply(Some(original.as_slice())).unwrap(), b"vanilla!");

        let err = decoded.apply(Some(&b"modified"[..])).unwrap_err();
        assert!(matches!(err.downcast_ref::<LoomError>(), Some(LoomError::MalformedPatch { .. })));
        assert!(decoded.apply(None).is_err());
    }

    #[test]
    fn test_set_applies_to_jar_and_creates_new_classes() {
        let mut archive = Jar::new();
        let created = ClassPatch {
            name: "b".to_string(),
            source_class: "b".to_string(),
            target_class: "b".to_string(),
            input_checksum: None,
            patch: stream(&[3, 1, 2, 3]),
        };
        archive.insert("binpatch/client/b.binpatch", created.encode());
        archive.insert("binpatch/server/ignored.binpatch", created.encode());
        assert!(BinpatchSet::present_in(&archive));

        let set = BinpatchSet::from_archive(&archive, Side::Client).unwrap();
        assert_eq!(set.len(), 1);
        let mut input = Jar::new();
        input.insert("a.class", vec![9]);
        let output = set.apply(&input).unwrap();
        assert_eq!(output.get("b.class"), Some([1u8, 2, 3].as_slice()));
        assert_eq!(output.get("a.class"), Some([9u8].as_slice()));
    }
}
