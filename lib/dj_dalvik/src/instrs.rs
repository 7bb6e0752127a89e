//! Decoded Dalvik instructions.
//!
//! An [`Instruction`] keeps the raw operands of its encoding together with the
//! kind of its opcode. Switch and array-data payloads, which the format stores
//! inline in the code stream, are decoded into the instruction that holds them.

use crate::errors::{DalvikError, DalvikResult};
use crate::formats::{self, Operands};
use crate::image::ByteReader;
use crate::opcodes::{Kind, OPCODES};
use crate::types::Type;
use crate::Addr;
use serde::Serialize;
use std::fmt;

const PACKED_SWITCH_MARKER: u16 = 0x0100;
const SPARSE_SWITCH_MARKER: u16 = 0x0200;
const FILL_ARRAY_DATA_MARKER: u16 = 0x0300;

/// Switch cases, as `(key, target)` pairs in payload order.
///
/// Targets are kept as stored: code-unit offsets relative to the switch
/// instruction that references the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SwitchTable(Vec<(i32, i32)>);

impl SwitchTable {
    /// Target of the given key. When a malformed payload repeats a key, the
    /// last occurrence wins.
    #[must_use]
    pub fn get(&self, key: i32) -> Option<i32> {
        self.0
            .iter()
            .rev()
            .find(|(k, _)| *k == key)
            .map(|(_, target)| *target)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(i32, i32)> {
        self.0.iter()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<(i32, i32)>> for SwitchTable {
    fn from(cases: Vec<(i32, i32)>) -> Self {
        Self(cases)
    }
}

/// Content of a fill-array-data payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArrayData {
    /// Element width in bytes: 1, 2, 4 or 8.
    pub width: u8,
    pub values: Vec<u64>,
}

/// Registers known to hold an instance of the tested type when a zero-test
/// branch on an instance-of result is not taken.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImplicitCasts {
    pub type_idx: u32,
    /// Ascending, without duplicates.
    pub registers: Vec<u16>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Instruction {
    pub(crate) addr: Addr,
    pub(crate) next_addr: Addr,
    pub(crate) opcode: u8,
    pub(crate) kind: Kind,
    pub(crate) operands: Operands,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) move_result_type: Option<Type>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) implicit_casts: Option<ImplicitCasts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) switch_table: Option<SwitchTable>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) array_data: Option<ArrayData>,
}

impl Instruction {
    fn new(addr: Addr, next_addr: Addr, opcode: u8, kind: Kind, operands: Operands) -> Self {
        Self {
            addr,
            next_addr,
            opcode,
            kind,
            operands,
            move_result_type: None,
            implicit_casts: None,
            switch_table: None,
            array_data: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn addr(&self) -> Addr {
        self.addr
    }

    /// Address following the instruction and its inline payload, if any.
    #[inline]
    #[must_use]
    pub const fn next_addr(&self) -> Addr {
        self.next_addr
    }

    /// Size in code units, payload included.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.next_addr.0 - self.addr.0
    }

    #[inline]
    #[must_use]
    pub const fn opcode(&self) -> u8 {
        self.opcode
    }

    #[inline]
    #[must_use]
    pub const fn kind(&self) -> Kind {
        self.kind
    }

    #[inline]
    #[must_use]
    pub fn operands(&self) -> &[i64] {
        &self.operands
    }

    pub fn operand(&self, index: usize) -> DalvikResult<i64> {
        self.operands
            .get(index)
            .copied()
            .ok_or(DalvikError::MissingOperand {
                addr: self.addr,
                index,
            })
    }

    /// Operand read as a register number.
    pub fn reg(&self, index: usize) -> DalvikResult<u16> {
        self.operand(index).map(|v| v as u16)
    }

    /// Operand read as a constant pool index.
    pub fn index(&self, index: usize) -> DalvikResult<u32> {
        self.operand(index).map(|v| v as u32)
    }

    /// Inline switch or array data. Payloads keep the `nop` kind of their
    /// opcode byte.
    #[inline]
    #[must_use]
    pub const fn is_payload(&self) -> bool {
        self.switch_table.is_some() || self.array_data.is_some()
    }

    /// Type of the value captured by a move-result, when it could be linked to
    /// the instruction producing it.
    #[inline]
    #[must_use]
    pub const fn move_result_type(&self) -> Option<&Type> {
        self.move_result_type.as_ref()
    }

    #[inline]
    #[must_use]
    pub const fn implicit_casts(&self) -> Option<&ImplicitCasts> {
        self.implicit_casts.as_ref()
    }

    #[inline]
    #[must_use]
    pub const fn switch_table(&self) -> Option<&SwitchTable> {
        self.switch_table.as_ref()
    }

    #[inline]
    #[must_use]
    pub const fn array_data(&self) -> Option<&ArrayData> {
        self.array_data.as_ref()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:5}: {}", self.addr.0, self.kind)?;
        for (i, operand) in self.operands.iter().enumerate() {
            let sep = if i == 0 { " " } else { ", " };
            write!(f, "{sep}{operand}")?;
        }
        Ok(())
    }
}

fn truncated(code: &[u16], addr: Addr, needed: u64) -> DalvikError {
    DalvikError::Truncated {
        addr,
        needed: usize::try_from(needed).unwrap_or(usize::MAX),
        available: code.len().saturating_sub(addr.0),
    }
}

/// End of a payload spanning `units` code units from `addr`, checked against
/// the end of the stream.
fn payload_end(code: &[u16], addr: Addr, units: u64) -> DalvikResult<Addr> {
    let available = code.len().saturating_sub(addr.0) as u64;
    if units > available {
        return Err(truncated(code, addr, units));
    }
    Ok(Addr(addr.0 + units as usize))
}

fn unit_at(code: &[u16], addr: Addr, index: usize) -> DalvikResult<u16> {
    code.get(addr.0 + index)
        .copied()
        .ok_or_else(|| truncated(code, addr, index as u64 + 1))
}

fn parse_switch_payload<R: ByteReader + ?Sized>(
    image: &R,
    base: usize,
    code: &[u16],
    addr: Addr,
    packed: bool,
) -> DalvikResult<(Addr, SwitchTable)> {
    let size = unit_at(code, addr, 1)?;
    let count = u64::from(size);
    let key_words = if packed { 1 } else { count };
    let next_addr = payload_end(code, addr, 2 + (key_words + count) * 2)?;

    // Payloads are 4-byte aligned in the image, right after their 2 units header.
    let start = addr.byte_offset(base + 4) & !3;
    let word = |i: usize| image.u32_at(start + 4 * i).map(|v| v as i32);

    let size = usize::from(size);
    let cases = if packed {
        let first_key = word(0)?;
        (0..size)
            .map(|i| Ok((first_key.wrapping_add(i as i32), word(1 + i)?)))
            .collect::<DalvikResult<Vec<_>>>()?
    } else {
        (0..size)
            .map(|i| Ok((word(i)?, word(size + i)?)))
            .collect::<DalvikResult<Vec<_>>>()?
    };

    log::debug!(
        "{} switch payload at {addr}: {} cases",
        if packed { "packed" } else { "sparse" },
        cases.len()
    );
    Ok((next_addr, SwitchTable(cases)))
}

fn parse_array_payload<R: ByteReader + ?Sized>(
    image: &R,
    base: usize,
    code: &[u16],
    addr: Addr,
) -> DalvikResult<(Addr, ArrayData)> {
    let width = unit_at(code, addr, 1)? & 0xf;
    let count = u32::from(unit_at(code, addr, 2)?) | (u32::from(unit_at(code, addr, 3)?) << 16);
    if !matches!(width, 1 | 2 | 4 | 8) {
        return Err(DalvikError::InvalidArrayWidth { addr, width });
    }

    let data_len = u64::from(count) * u64::from(width);
    let next_addr = payload_end(code, addr, (data_len + 1) / 2 + 4)?;

    let width = usize::from(width);
    let start = addr.byte_offset(base + 8);
    let values = (0..count as usize)
        .map(|i| image.uint_at(start + i * width, width))
        .collect::<DalvikResult<Vec<u64>>>()?;

    log::debug!(
        "fill-array-data payload at {addr}: {} elements of {width} bytes",
        values.len()
    );
    Ok((
        next_addr,
        ArrayData {
            width: width as u8,
            values,
        },
    ))
}

/// Decodes the instruction starting at `addr`.
///
/// `base` is the byte offset of the first code unit of `code` in `image`.
/// The returned instruction's next address accounts for any inline payload.
pub fn parse_instruction<R: ByteReader + ?Sized>(
    image: &R,
    base: usize,
    code: &[u16],
    addr: Addr,
) -> DalvikResult<Instruction> {
    let word = unit_at(code, addr, 0)?;
    let opcode = (word & 0xff) as u8;
    let kind = OPCODES.get(usize::from(opcode))?;
    if kind == Kind::Unused {
        return Err(DalvikError::InvalidOpcode { opcode, addr });
    }

    let (next_addr, operands) = formats::decode(code, addr, opcode)?;

    // Payload end must be known before the instruction is built.
    let instr = match word {
        PACKED_SWITCH_MARKER | SPARSE_SWITCH_MARKER => {
            let packed = word == PACKED_SWITCH_MARKER;
            let (next_addr, table) = parse_switch_payload(image, base, code, addr, packed)?;
            let mut instr = Instruction::new(addr, next_addr, opcode, kind, operands);
            instr.switch_table = Some(table);
            instr
        }
        FILL_ARRAY_DATA_MARKER => {
            let (next_addr, data) = parse_array_payload(image, base, code, addr)?;
            let mut instr = Instruction::new(addr, next_addr, opcode, kind, operands);
            instr.array_data = Some(data);
            instr
        }
        _ => Instruction::new(addr, next_addr, opcode, kind, operands),
    };

    log::trace!("{instr}");
    Ok(instr)
}
