//! Code items: the container of a method body in the binary image.

use crate::bytecode::parse_bytecode;
use crate::errors::{DalvikError, DalvikResult};
use crate::instrs::Instruction;
use crate::parsers::{self, RawCatchHandler, CODE_ITEM_HEADER_SIZE};
use crate::pool::ConstantPool;
use crate::Addr;
use nom::multi::count;
use serde::Serialize;
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatchHandler {
    /// Caught type, `None` for a catch-all handler.
    pub type_idx: Option<u32>,
    pub addr: Addr,
}

#[derive(Debug, Clone, Serialize)]
pub struct TryItem {
    pub start_addr: Addr,
    /// Number of code units covered.
    pub insn_count: usize,
    pub handlers: Vec<CatchHandler>,
}

impl TryItem {
    #[must_use]
    pub fn covers(&self, addr: Addr) -> bool {
        addr >= self.start_addr && addr.0 < self.start_addr.0 + self.insn_count
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CodeItem {
    registers_size: usize,
    ins_size: usize,
    outs_size: usize,
    debug_info_off: Option<usize>,
    insns: Vec<Instruction>,
    tries: Vec<TryItem>,
}

fn handler_addrs(tries: &[TryItem]) -> BTreeSet<Addr> {
    tries
        .iter()
        .flat_map(|t| t.handlers.iter().map(|h| h.addr))
        .collect()
}

fn resolve_handler(
    handlers: &[(usize, RawCatchHandler)],
    handler_off: usize,
) -> DalvikResult<Vec<CatchHandler>> {
    let (_, raw) = handlers
        .iter()
        .find(|(offset, _)| *offset == handler_off)
        .ok_or_else(|| {
            DalvikError::Structure(format!("no catch handler at list offset {handler_off}"))
        })?;

    let mut resolved: Vec<CatchHandler> = raw
        .pairs
        .iter()
        .map(|(type_idx, addr)| CatchHandler {
            type_idx: Some(type_idx.value()),
            addr: Addr(addr.as_usize()),
        })
        .collect();
    if let Some(addr) = raw.catch_all_addr {
        resolved.push(CatchHandler {
            type_idx: None,
            addr: Addr(addr.as_usize()),
        });
    }
    Ok(resolved)
}

impl CodeItem {
    /// Parses the code item at `offset` in `image` and decodes its
    /// instructions.
    pub fn parse<P: ConstantPool + ?Sized>(
        image: &[u8],
        offset: usize,
        pool: &P,
    ) -> DalvikResult<Self> {
        let input = image
            .get(offset..)
            .ok_or(DalvikError::ImageOutOfBounds {
                offset,
                width: CODE_ITEM_HEADER_SIZE,
            })?;
        let (input, header) = parsers::code_item_header(input)?;

        let insns_size = header.insns_size as usize;
        let base = offset + CODE_ITEM_HEADER_SIZE;
        if input.len() / 2 < insns_size {
            return Err(DalvikError::ImageOutOfBounds {
                offset: base,
                width: insns_size.saturating_mul(2),
            });
        }
        let (input, code) = parsers::code_units(insns_size, header.tries_size != 0)(input)?;

        let (input, raw_tries) = count(parsers::try_item, usize::from(header.tries_size))(input)?;
        let handlers = if raw_tries.is_empty() {
            Vec::new()
        } else {
            parsers::catch_handler_list(input)?.1
        };

        let tries = raw_tries
            .iter()
            .map(|raw| {
                Ok(TryItem {
                    start_addr: Addr::from(raw.start_addr),
                    insn_count: usize::from(raw.insn_count),
                    handlers: resolve_handler(&handlers, usize::from(raw.handler_off))?,
                })
            })
            .collect::<DalvikResult<Vec<_>>>()?;

        let catch_addrs = handler_addrs(&tries);
        log::debug!(
            "code item at {offset:#x}: {insns_size} code units, {} tries, {} handler entries",
            tries.len(),
            catch_addrs.len()
        );

        let insns = parse_bytecode(image, pool, base, &code, &catch_addrs)?;

        Ok(Self {
            registers_size: usize::from(header.registers_size),
            ins_size: usize::from(header.ins_size),
            outs_size: usize::from(header.outs_size),
            debug_info_off: match header.debug_info_off {
                0 => None,
                off => Some(off as usize),
            },
            insns,
            tries,
        })
    }

    #[inline]
    #[must_use]
    pub const fn registers_size(&self) -> usize {
        self.registers_size
    }

    #[inline]
    #[must_use]
    pub const fn ins_size(&self) -> usize {
        self.ins_size
    }

    #[inline]
    #[must_use]
    pub const fn outs_size(&self) -> usize {
        self.outs_size
    }

    #[inline]
    #[must_use]
    pub const fn debug_info_off(&self) -> Option<usize> {
        self.debug_info_off
    }

    #[inline]
    #[must_use]
    pub fn insns(&self) -> &[Instruction] {
        &self.insns
    }

    #[inline]
    #[must_use]
    pub fn tries(&self) -> &[TryItem] {
        &self.tries
    }

    /// Entry addresses of all exception handlers.
    #[must_use]
    pub fn catch_addrs(&self) -> BTreeSet<Addr> {
        handler_addrs(&self.tries)
    }
}
