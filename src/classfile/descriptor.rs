//! Rewriting class names inside descriptors and generic signatures.

use anyhow::{Result, bail};

/// Replace every class name in a field or method descriptor
///
/// `map` receives internal names (`net/minecraft/a`) and returns the replacement, or `None`
/// to keep the name.
///
/// ```rust
/// use oldloom_cli::classfile::descriptor::map_descriptor;
///
/// let mapped = map_descriptor("(La;[Lb;I)La;", &mut |name| {
///     (name == "a").then(|| "net/minecraft/World".to_string())
/// })
/// .unwrap();
/// assert_eq!(mapped, "(Lnet/minecraft/World;[Lb;I)Lnet/minecraft/World;");
/// ```
pub fn map_descriptor(descriptor: &str, map: &mut dyn FnMut(&str) -> Option<String>) -> Result<String> {
    let mut out = String::with_capacity(descriptor.len());
    let mut rest = descriptor;
    while let Some(start) = rest.find('L') {
        out.push_str(&rest[..start]);
        let Some(len) = rest[start..].find(';') else {
            bail!("unterminated class type in descriptor '{descriptor}'");
        };
        let name = &rest[start + 1..start + len];
        out.push('L');
        out.push_str(&map(name).unwrap_or_else(|| name.to_string()));
        out.push(';');
        rest = &rest[start + len + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Map the name in a `Class` constant, which is either an internal name or an array
/// descriptor.
pub fn map_class_reference(name: &str, map: &mut dyn FnMut(&str) -> Option<String>) -> Result<Option<String>> {
    if name.starts_with('[') {
        let mapped = map_descriptor(name, map)?;
        Ok((mapped != name).then_some(mapped))
    } else {
        Ok(map(name))
    }
}

/// Replace every class name in a generic signature (class, method or field)
///
/// Inner classes written as `LOuter<TT;>.Inner;` are looked up by their binary name
/// `Outer$Inner`, and only the simple part of the mapped name is written after the dot.
pub fn map_signature(signature: &str, map: &mut dyn FnMut(&str) -> Option<String>) -> Result<String> {
    let mut parser = SignatureMapper {
        input: signature.as_bytes(),
        pos: 0,
        out: String::with_capacity(signature.len()),
        map,
    };
    parser.signature().map_err(|err| anyhow::anyhow!("malformed signature '{signature}': {err}"))?;
    Ok(parser.out)
}

struct SignatureMapper<'a, 'm> {
    input: &'a [u8],
    pos: usize,
    out: String,
    map: &'m mut dyn FnMut(&str) -> Option<String>,
}

impl SignatureMapper<'_, '_> {
    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() != Some(byte) {
            bail!("expected '{}' at {}", char::from(byte), self.pos);
        }
        self.out.push(char::from(byte));
        self.pos += 1;
        Ok(())
    }

    /// Identifier up to (not including) one of `stops`.
    fn identifier(&mut self, stops: &[u8]) -> Result<String> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if stops.contains(&b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start || self.peek().is_none() {
            bail!("truncated identifier at {start}");
        }
        Ok(String::from_utf8_lossy(&self.input[start..self.pos]).into_owned())
    }

    fn signature(&mut self) -> Result<()> {
        if self.peek() == Some(b'<') {
            self.formal_type_parameters()?;
        }
        if self.peek() == Some(b'(') {
            self.expect(b'(')?;
            while self.peek() != Some(b')') {
                self.type_signature()?;
            }
            self.expect(b')')?;
            self.type_signature()?;
            while self.peek() == Some(b'^') {
                self.expect(b'^')?;
                self.type_signature()?;
            }
        } else {
            while self.peek().is_some() {
                self.type_signature()?;
            }
        }
        if self.pos != self.input.len() {
            bail!("trailing characters at {}", self.pos);
        }
        Ok(())
    }

    fn formal_type_parameters(&mut self) -> Result<()> {
        self.expect(b'<')?;
        while self.peek() != Some(b'>') {
            let name = self.identifier(b":>")?;
            self.out.push_str(&name);
            self.expect(b':')?;
            if matches!(self.peek(), Some(b'L' | b'[' | b'T')) {
                self.type_signature()?;
            }
            while self.peek() == Some(b':') {
                self.expect(b':')?;
                self.type_signature()?;
            }
        }
        self.expect(b'>')
    }

    fn type_signature(&mut self) -> Result<()> {
        match self.peek() {
            Some(b'L') => self.class_type_signature(),
            Some(b'T') => {
                self.expect(b'T')?;
                let name = self.identifier(b";")?;
                self.out.push_str(&name);
                self.expect(b';')
            }
            Some(b'[') => {
                self.expect(b'[')?;
                self.type_signature()
            }
            Some(b @ (b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b'V')) => self.expect(b),
            Some(other) => bail!("unexpected '{}' at {}", char::from(other), self.pos),
            None => bail!("unexpected end"),
        }
    }

    fn class_type_signature(&mut self) -> Result<()> {
        self.expect(b'L')?;
        let mut binary = self.identifier(b"<.;")?;
        let mut mapped = (self.map)(&binary).unwrap_or_else(|| binary.clone());
        self.out.push_str(&mapped);
        loop {
            match self.peek() {
                Some(b'<') => self.type_arguments()?,
                Some(b'.') => {
                    self.expect(b'.')?;
                    let simple = self.identifier(b"<.;")?;
                    binary = format!("{binary}${simple}");
                    mapped = (self.map)(&binary).unwrap_or_else(|| format!("{mapped}${simple}"));
                    let inner = mapped.rsplit('$').next().unwrap_or(&simple).to_string();
                    self.out.push_str(&inner);
                }
                Some(b';') => return self.expect(b';'),
                _ => bail!("unterminated class type at {}", self.pos),
            }
        }
    }

    fn type_arguments(&mut self) -> Result<()> {
        self.expect(b'<')?;
        while self.peek() != Some(b'>') {
            match self.peek() {
                Some(b'*') => self.expect(b'*')?,
                Some(b @ (b'+' | b'-')) => {
                    self.expect(b)?;
                    self.type_signature()?;
                }
                Some(_) => self.type_signature()?,
                None => bail!("unterminated type arguments"),
            }
        }
        self.expect(b'>')
    }
}

/// Parameter type descriptors of a method descriptor.
pub fn parameter_types(descriptor: &str) -> Result<Vec<&str>> {
    let Some(params) = descriptor.strip_prefix('(').and_then(|d| d.split(')').next()) else {
        bail!("'{descriptor}' is not a method descriptor");
    };
    let bytes = params.as_bytes();
    let mut types = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let start = i;
        while bytes[i] == b'[' {
            i += 1;
            if i == bytes.len() {
                bail!("truncated array type in '{descriptor}'");
            }
        }
        if bytes[i] == b'L' {
            match params[i..].find(';') {
                Some(end) => i += end,
                None => bail!("unterminated class type in '{descriptor}'"),
            }
        }
        i += 1;
        types.push(&params[start..i]);
    }
    Ok(types)
}
