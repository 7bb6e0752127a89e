//! Dalvik decoding errors definitions.

use crate::Addr;
use thiserror::Error;

const PARSING_CONTEXT: usize = 16;

/// An alias for result that can be a [`DalvikError`].
pub type DalvikResult<T> = Result<T, DalvikError>;

/// The decoding error type.
///
/// Any of these aborts the decoding of the enclosing method: no partial
/// instruction list is ever returned.
#[derive(Debug, Error)]
pub enum DalvikError {
    /// Error that can be returned by the nom container parsers, with the
    /// leading bytes of the input that failed.
    #[error("parsing error ({1:?})")]
    Parsing(Vec<u8>, nom::error::ErrorKind),

    /// The opcode byte is marked unused in the opcode table.
    #[error("unsupported or invalid opcode {opcode:#04x} at {addr}")]
    InvalidOpcode { opcode: u8, addr: Addr },

    #[error("opcode table lookup out of range: {0}")]
    OpcodeOutOfRange(usize),

    #[error("invalid opcode table: {0}")]
    OpcodeTable(String),

    /// An instruction or its inline payload runs past the code-unit stream.
    #[error("truncated bytecode at {addr}: needs {needed} code units, {available} available")]
    Truncated {
        addr: Addr,
        needed: usize,
        available: usize,
    },

    #[error("read of {width} bytes at image offset {offset:#x} is out of bounds")]
    ImageOutOfBounds { offset: usize, width: usize },

    #[error("invalid fill-array-data element width {width} at {addr}")]
    InvalidArrayWidth { addr: Addr, width: u16 },

    #[error("bytecode structure is invalid: {0}")]
    Structure(String),

    #[error("instruction at {addr} has no operand #{index}")]
    MissingOperand { addr: Addr, index: usize },

    #[error("could not convert {} into {}", from, to)]
    Conversion { from: String, to: String },

    #[error("resource not found in constant pool: {0}")]
    ResNotFound(String),
}

impl nom::error::ParseError<&[u8]> for DalvikError {
    fn from_error_kind(input: &[u8], kind: nom::error::ErrorKind) -> Self {
        Self::Parsing(input.iter().take(PARSING_CONTEXT).copied().collect(), kind)
    }

    fn append(_: &[u8], _: nom::error::ErrorKind, other: Self) -> Self {
        other
    }
}

impl From<nom::Err<DalvikError>> for DalvikError {
    fn from(err: nom::Err<DalvikError>) -> Self {
        match err {
            nom::Err::Error(e) | nom::Err::Failure(e) => e,
            nom::Err::Incomplete(_) => {
                Self::Parsing(Vec::new(), nom::error::ErrorKind::Complete)
            }
        }
    }
}
