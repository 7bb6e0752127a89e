//! nom parsers for the code item container.

use crate::errors::DalvikError;
use dj_utils::leb::{Sleb128, Uleb128};
use nom::bytes::complete::{take, take_till};
use nom::combinator::{cond, verify};
use nom::multi::count;
use nom::number::complete::{le_u16, le_u32, le_u8};
use nom::{IResult, Offset};

pub(crate) const CODE_ITEM_HEADER_SIZE: usize = 16;

#[derive(Debug)]
pub(crate) struct CodeItemHeader {
    pub(crate) registers_size: u16,
    pub(crate) ins_size: u16,
    pub(crate) outs_size: u16,
    pub(crate) tries_size: u16,
    pub(crate) debug_info_off: u32,
    pub(crate) insns_size: u32,
}

#[derive(Debug)]
pub(crate) struct RawTryItem {
    pub(crate) start_addr: u32,
    pub(crate) insn_count: u16,
    pub(crate) handler_off: u16,
}

/// Encoded catch handler: typed `(type_idx, addr)` pairs, then an optional
/// catch-all address.
#[derive(Debug)]
pub(crate) struct RawCatchHandler {
    pub(crate) pairs: Vec<(Uleb128, Uleb128)>,
    pub(crate) catch_all_addr: Option<Uleb128>,
}

pub(crate) fn code_item_header(input: &[u8]) -> IResult<&[u8], CodeItemHeader, DalvikError> {
    let (input, registers_size) = le_u16(input)?;
    let (input, ins_size) = le_u16(input)?;
    let (input, outs_size) = le_u16(input)?;
    let (input, tries_size) = le_u16(input)?;
    let (input, debug_info_off) = le_u32(input)?;
    let (input, insns_size) = le_u32(input)?;

    Ok((
        input,
        CodeItemHeader {
            registers_size,
            ins_size,
            outs_size,
            tries_size,
            debug_info_off,
            insns_size,
        },
    ))
}

/// Code units of the instruction array, followed by the alignment padding
/// present when try items follow an odd number of units.
pub(crate) fn code_units(
    insns_size: usize,
    padded: bool,
) -> impl Fn(&[u8]) -> IResult<&[u8], Vec<u16>, DalvikError> {
    move |input: &[u8]| {
        let (input, units) = count(le_u16, insns_size)(input)?;
        let (input, _) = cond(padded && insns_size % 2 == 1, take(2usize))(input)?;
        Ok((input, units))
    }
}

pub(crate) fn try_item(input: &[u8]) -> IResult<&[u8], RawTryItem, DalvikError> {
    let (input, start_addr) = le_u32(input)?;
    let (input, insn_count) = le_u16(input)?;
    let (input, handler_off) = le_u16(input)?;

    Ok((
        input,
        RawTryItem {
            start_addr,
            insn_count,
            handler_off,
        },
    ))
}

/// Handlers of the list, keyed by their byte offset from the start of the
/// list, which is how try items reference them.
pub(crate) fn catch_handler_list(
    input: &[u8],
) -> IResult<&[u8], Vec<(usize, RawCatchHandler)>, DalvikError> {
    let (i, nb) = uleb128(input)?;

    let mut current = i;
    let mut list = Vec::new();
    for _ in 0..nb.as_usize() {
        let offset = input.offset(current);
        let (i, handler) = catch_handler(current)?;
        current = i;
        list.push((offset, handler));
    }

    Ok((current, list))
}

fn catch_handler(input: &[u8]) -> IResult<&[u8], RawCatchHandler, DalvikError> {
    let (input, size) = sleb128(input)?;
    let (input, pairs) = count(type_addr_pair, size.unsigned_abs())(input)?;
    let (input, catch_all_addr) = cond(size.value() <= 0, uleb128)(input)?;

    Ok((
        input,
        RawCatchHandler {
            pairs,
            catch_all_addr,
        },
    ))
}

fn type_addr_pair(input: &[u8]) -> IResult<&[u8], (Uleb128, Uleb128), DalvikError> {
    let (input, type_idx) = uleb128(input)?;
    let (input, addr) = uleb128(input)?;
    Ok((input, (type_idx, addr)))
}

/// Continuation bytes, then the final byte; at most 5 bytes in total.
fn leb128_bytes(input: &[u8]) -> IResult<&[u8], (&[u8], u8), DalvikError> {
    let (input, bs) = verify(take_till(|b| b & 0x80 == 0), |bs: &[u8]| bs.len() < 5)(input)?;
    let (input, last) = le_u8(input)?;
    Ok((input, (bs, last)))
}

fn leb128_value(bs: &[u8], last: u8) -> u32 {
    bs.iter()
        .rev()
        .fold(u32::from(last), |acc, v| (acc << 7) | u32::from(v & 0x7f))
}

pub(crate) fn uleb128(input: &[u8]) -> IResult<&[u8], Uleb128, DalvikError> {
    let start = input;
    let (input, (bs, last)) = leb128_bytes(input)?;

    let value = Uleb128::new(leb128_value(bs, last), start.offset(input));
    if value.size() > value.minimal_size() {
        log::trace!(
            "uleb128 {} encoded on {} bytes instead of {}",
            value.value(),
            value.size(),
            value.minimal_size()
        );
    }
    Ok((input, value))
}

#[allow(clippy::cast_possible_wrap)]
pub(crate) fn sleb128(input: &[u8]) -> IResult<&[u8], Sleb128, DalvikError> {
    let start = input;
    let (input, (bs, last)) = leb128_bytes(input)?;

    let mut value = leb128_value(bs, last);
    let nbits = 7 * (bs.len() + 1);
    if nbits < 32 && last & 0x40 != 0 {
        value |= u32::MAX << nbits;
    }
    Ok((input, Sleb128::new(value as i32, start.offset(input))))
}
