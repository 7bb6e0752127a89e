//! Dalvik bytecode decoding.
//!
//! Method bodies are decoded into gapless lists of [`Instruction`]s, annotated
//! with the type information a translator to a stack-based format needs and
//! cannot recover locally: the type captured by each move-result and the
//! implicit casts following instance-of tests.

mod addr;
mod formats;
mod parsers;

#[cfg(test)]
mod testing;

pub mod bytecode;
pub mod code;
pub mod errors;
pub mod image;
pub mod instrs;
pub mod opcodes;
pub mod pool;
pub mod types;

pub use crate::addr::Addr;
pub use crate::bytecode::parse_bytecode;
pub use crate::code::CodeItem;
pub use crate::formats::Operands;
pub use crate::image::ByteReader;
pub use crate::instrs::{parse_instruction, Instruction};
pub use crate::opcodes::{Kind, OPCODES};
pub use crate::pool::ConstantPool;
pub use crate::types::Type;
