//! Dalvik instruction formats.
//!
//! A format fixes the width of an instruction in code units and how its
//! operands are packed. Format names follow the Dalvik documentation: width,
//! operand count, then operand type (`x` none, `n`/`s`/`i`/`l` signed literal,
//! `h` high-bits literal, `b` byte literal, `t` branch, `c` pool index,
//! `rc` register range).

use crate::errors::{DalvikError, DalvikResult};
use crate::Addr;

/// Raw operands of an instruction, in format letter order (A, B, C...).
/// Invoke-like formats list the pool index first, then argument registers.
pub type Operands = Vec<i64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Format10x,
    Format12x,
    Format11n,
    Format11x,
    Format10t,
    Format20t,
    Format22x,
    Format21t,
    Format21s,
    Format21h,
    Format21c,
    Format23x,
    Format22b,
    Format22t,
    Format22s,
    Format22c,
    Format30t,
    Format32x,
    Format31i,
    Format31t,
    Format31c,
    Format35c,
    Format3rc,
    Format51l,
}

impl Format {
    #[must_use]
    pub const fn of(opcode: u8) -> Self {
        match opcode {
            0x01 | 0x04 | 0x07 | 0x21 => Self::Format12x,
            0x02 | 0x05 | 0x08 => Self::Format22x,
            0x03 | 0x06 | 0x09 => Self::Format32x,
            0x0a..=0x0d | 0x0f..=0x11 | 0x1d | 0x1e | 0x27 => Self::Format11x,
            0x12 => Self::Format11n,
            0x13 | 0x16 => Self::Format21s,
            0x14 | 0x17 => Self::Format31i,
            0x15 | 0x19 => Self::Format21h,
            0x18 => Self::Format51l,
            0x1a | 0x1c | 0x1f | 0x22 | 0x60..=0x6d => Self::Format21c,
            0x1b => Self::Format31c,
            0x20 | 0x23 | 0x52..=0x5f => Self::Format22c,
            0x24 | 0x6e..=0x72 => Self::Format35c,
            0x25 | 0x74..=0x78 => Self::Format3rc,
            0x26 | 0x2b | 0x2c => Self::Format31t,
            0x28 => Self::Format10t,
            0x29 => Self::Format20t,
            0x2a => Self::Format30t,
            0x2d..=0x31 | 0x44..=0x51 | 0x90..=0xaf => Self::Format23x,
            0x32..=0x37 => Self::Format22t,
            0x38..=0x3d => Self::Format21t,
            0x7b..=0x8f | 0xb0..=0xcf => Self::Format12x,
            0xd0..=0xd7 => Self::Format22s,
            0xd8..=0xe2 => Self::Format22b,
            _ => Self::Format10x,
        }
    }

    /// Width of the encoding, in code units.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Format10x
            | Self::Format12x
            | Self::Format11n
            | Self::Format11x
            | Self::Format10t => 1,
            Self::Format20t
            | Self::Format22x
            | Self::Format21t
            | Self::Format21s
            | Self::Format21h
            | Self::Format21c
            | Self::Format23x
            | Self::Format22b
            | Self::Format22t
            | Self::Format22s
            | Self::Format22c => 2,
            Self::Format30t
            | Self::Format32x
            | Self::Format31i
            | Self::Format31t
            | Self::Format31c
            | Self::Format35c
            | Self::Format3rc => 3,
            Self::Format51l => 5,
        }
    }
}

/// Decodes the fixed-width part of the instruction at `addr`.
///
/// Returns the address right after the encoding and the operands. Branch
/// operands are resolved to absolute addresses.
pub fn decode(code: &[u16], addr: Addr, opcode: u8) -> DalvikResult<(Addr, Operands)> {
    let format = Format::of(opcode);
    let size = format.size();
    let units = code
        .get(addr.0..addr.0.saturating_add(size))
        .ok_or(DalvikError::Truncated {
            addr,
            needed: size,
            available: code.len().saturating_sub(addr.0),
        })?;

    let w = units[0];
    let high = i64::from(w >> 8);
    let nib_a = i64::from((w >> 8) & 0xf);
    let nib_b = i64::from(w >> 12);
    let target = |offset: i64| addr.0 as i64 + offset;
    let word32 = || u32::from(units[1]) | (u32::from(units[2]) << 16);

    let operands = match format {
        Format::Format10x => vec![],
        Format::Format12x => vec![nib_a, nib_b],
        Format::Format11n => vec![nib_a, i64::from(((w >> 8) as u8 as i8) >> 4)],
        Format::Format11x => vec![high],
        Format::Format10t => vec![target(i64::from((w >> 8) as u8 as i8))],
        Format::Format20t => vec![target(i64::from(units[1] as i16))],
        Format::Format22x | Format::Format21c => vec![high, i64::from(units[1])],
        Format::Format21t => vec![high, target(i64::from(units[1] as i16))],
        Format::Format21s => vec![high, i64::from(units[1] as i16)],
        Format::Format21h => {
            if opcode == 0x15 {
                vec![high, i64::from((u32::from(units[1]) << 16) as i32)]
            } else {
                vec![high, (u64::from(units[1]) << 48) as i64]
            }
        }
        Format::Format23x => vec![
            high,
            i64::from(units[1] & 0xff),
            i64::from(units[1] >> 8),
        ],
        Format::Format22b => vec![
            high,
            i64::from(units[1] & 0xff),
            i64::from((units[1] >> 8) as u8 as i8),
        ],
        Format::Format22t => vec![nib_a, nib_b, target(i64::from(units[1] as i16))],
        Format::Format22s => vec![nib_a, nib_b, i64::from(units[1] as i16)],
        Format::Format22c => vec![nib_a, nib_b, i64::from(units[1])],
        Format::Format30t => vec![target(i64::from(word32() as i32))],
        Format::Format32x => vec![i64::from(units[1]), i64::from(units[2])],
        Format::Format31i => vec![high, i64::from(word32() as i32)],
        Format::Format31t => vec![high, target(i64::from(word32() as i32))],
        Format::Format31c => vec![high, i64::from(word32())],
        Format::Format35c => {
            let count = usize::from(w >> 12);
            if count > 5 {
                return Err(DalvikError::Structure(format!(
                    "instruction at {addr} lists {count} argument registers"
                )));
            }
            let args = units[2];
            let regs = [
                args & 0xf,
                (args >> 4) & 0xf,
                (args >> 8) & 0xf,
                args >> 12,
                (w >> 8) & 0xf,
            ];
            let mut operands = Vec::with_capacity(count + 1);
            operands.push(i64::from(units[1]));
            operands.extend(regs[..count].iter().map(|r| i64::from(*r)));
            operands
        }
        Format::Format3rc => {
            let first = i64::from(units[2]);
            let mut operands = vec![i64::from(units[1])];
            operands.extend(first..first + high);
            operands
        }
        Format::Format51l => {
            let literal = units[1..5]
                .iter()
                .rev()
                .fold(0u64, |acc, unit| (acc << 16) | u64::from(*unit));
            vec![high, literal as i64]
        }
    };

    Ok((Addr(addr.0 + size), operands))
}
