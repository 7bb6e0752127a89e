//! Random access to the binary image holding the bytecode.
//!
//! Payloads of switch and array-data instructions are read at absolute byte
//! offsets in the image rather than from the code-unit array of the method.

use crate::errors::{DalvikError, DalvikResult};
use nom::number::complete::{le_u16, le_u32, le_u64, le_u8};
use nom::IResult;

/// Fixed-width little-endian reads at absolute offsets.
pub trait ByteReader {
    fn u8_at(&self, offset: usize) -> DalvikResult<u8>;
    fn u16_at(&self, offset: usize) -> DalvikResult<u16>;
    fn u32_at(&self, offset: usize) -> DalvikResult<u32>;
    fn u64_at(&self, offset: usize) -> DalvikResult<u64>;

    /// Reads an unsigned value of 1, 2, 4 or 8 bytes.
    fn uint_at(&self, offset: usize, width: usize) -> DalvikResult<u64> {
        match width {
            1 => self.u8_at(offset).map(u64::from),
            2 => self.u16_at(offset).map(u64::from),
            4 => self.u32_at(offset).map(u64::from),
            8 => self.u64_at(offset),
            _ => Err(DalvikError::ImageOutOfBounds { offset, width }),
        }
    }
}

fn read_at<'a, T>(
    image: &'a [u8],
    offset: usize,
    width: usize,
    parser: impl Fn(&'a [u8]) -> IResult<&'a [u8], T, DalvikError>,
) -> DalvikResult<T> {
    let input = image
        .get(offset..)
        .ok_or(DalvikError::ImageOutOfBounds { offset, width })?;
    parser(input)
        .map(|(_, value)| value)
        .map_err(|_| DalvikError::ImageOutOfBounds { offset, width })
}

impl ByteReader for [u8] {
    fn u8_at(&self, offset: usize) -> DalvikResult<u8> {
        read_at(self, offset, 1, le_u8)
    }

    fn u16_at(&self, offset: usize) -> DalvikResult<u16> {
        read_at(self, offset, 2, le_u16)
    }

    fn u32_at(&self, offset: usize) -> DalvikResult<u32> {
        read_at(self, offset, 4, le_u32)
    }

    fn u64_at(&self, offset: usize) -> DalvikResult<u64> {
        read_at(self, offset, 8, le_u64)
    }
}
