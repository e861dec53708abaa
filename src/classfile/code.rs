//! Bytecode instruction walking.

use anyhow::{Result, bail};

pub const LDC: u8 = 0x12;
pub const LDC_W: u8 = 0x13;
pub const LDC2_W: u8 = 0x14;
pub const INVOKEVIRTUAL: u8 = 0xb6;
pub const INVOKESPECIAL: u8 = 0xb7;
pub const INVOKEINTERFACE: u8 = 0xb9;
pub const INVOKEDYNAMIC: u8 = 0xba;
const TABLESWITCH: u8 = 0xaa;
const LOOKUPSWITCH: u8 = 0xab;
const WIDE: u8 = 0xc4;
const IINC: u8 = 0x84;

/// Whether the first two operand bytes of `opcode` are a constant-pool index.
pub const fn has_pool_operand(opcode: u8) -> bool {
    matches!(
        opcode,
        LDC_W | LDC2_W | 0xb2..=0xb8 | INVOKEINTERFACE | INVOKEDYNAMIC | 0xbb | 0xbd | 0xc0 | 0xc1 | 0xc5
    )
}

/// Operand length of fixed-size instructions; `None` for switches and `wide`.
const fn fixed_operand_len(opcode: u8) -> Option<Option<usize>> {
    let len = match opcode {
        0x00..=0x0f => 0,
        0x10 => 1,
        0x11 => 2,
        LDC => 1,
        LDC_W | LDC2_W => 2,
        0x15..=0x19 => 1,
        0x1a..=0x35 => 0,
        0x36..=0x3a => 1,
        0x3b..=0x83 => 0,
        IINC => 2,
        0x85..=0x98 => 0,
        0x99..=0xa8 => 2,
        0xa9 => 1,
        TABLESWITCH | LOOKUPSWITCH | WIDE => return Some(None),
        0xac..=0xb1 => 0,
        0xb2..=0xb8 => 2,
        INVOKEINTERFACE | INVOKEDYNAMIC => 4,
        0xbb => 2,
        0xbc => 1,
        0xbd => 2,
        0xbe | 0xbf => 0,
        0xc0 | 0xc1 => 2,
        0xc2 | 0xc3 => 0,
        0xc5 => 3,
        0xc6 | 0xc7 => 2,
        0xc8 | 0xc9 => 4,
        _ => return None,
    };
    Some(Some(len))
}

fn read_i32(code: &[u8], at: usize) -> Result<i32> {
    match code.get(at..at + 4) {
        Some(b) => Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]])),
        None => bail!("switch table truncated at offset {at}"),
    }
}

/// Call `visit(offset, opcode, operands)` for every instruction in `code`
///
/// `operands` is mutable so callers can rewrite constant-pool indices in place. Switch
/// padding is computed from the start of `code`.
pub fn walk_instructions(
    code: &mut [u8],
    mut visit: impl FnMut(usize, u8, &mut [u8]) -> Result<()>,
) -> Result<()> {
    let mut pc = 0;
    while pc < code.len() {
        let opcode = code[pc];
        let operand_len = match fixed_operand_len(opcode) {
            Some(Some(len)) => len,
            Some(None) => match opcode {
                WIDE => match code.get(pc + 1) {
                    Some(&IINC) => 5,
                    Some(&(0x15..=0x19 | 0x36..=0x3a | 0xa9)) => 3,
                    Some(other) => bail!("invalid wide target 0x{other:02x} at offset {pc}"),
                    None => bail!("truncated wide instruction at offset {pc}"),
                },
                TABLESWITCH => {
                    let pad = (4 - (pc + 1) % 4) % 4;
                    let base = pc + 1 + pad;
                    let low = read_i32(code, base + 4)?;
                    let high = read_i32(code, base + 8)?;
                    if high < low {
                        bail!("tableswitch with high < low at offset {pc}");
                    }
                    let cases = (i64::from(high) - i64::from(low) + 1) as usize;
                    pad + 12 + cases * 4
                }
                _ => {
                    let pad = (4 - (pc + 1) % 4) % 4;
                    let pairs = read_i32(code, pc + 1 + pad + 4)?;
                    if pairs < 0 {
                        bail!("lookupswitch with negative pair count at offset {pc}");
                    }
                    pad + 8 + pairs as usize * 8
                }
            },
            None => bail!("invalid opcode 0x{opcode:02x} at offset {pc}"),
        };
        let end = pc + 1 + operand_len;
        if end > code.len() {
            bail!("instruction at offset {pc} runs past the end of the code");
        }
        visit(pc, opcode, &mut code[pc + 1..end])?;
        pc = end;
    }
    Ok(())
}
