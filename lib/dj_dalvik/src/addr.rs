//! Code address representation.
//!
//! Addresses count 16-bit code units from the start of a method body.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Addr(pub usize);

impl Addr {
    #[inline]
    #[must_use]
    pub const fn entry() -> Self {
        Self(0)
    }

    /// Byte offset of this address within the binary image, given the offset
    /// of the first code unit.
    #[inline]
    #[must_use]
    pub const fn byte_offset(self, base: usize) -> usize {
        base + self.0 * 2
    }

    /// Address reached by a signed branch offset, wrapping like the VM does on
    /// malformed input rather than panicking.
    #[must_use]
    pub const fn offset(self, offset: i32) -> Self {
        if offset.is_negative() {
            Self(self.0.wrapping_sub(offset.unsigned_abs() as usize))
        } else {
            Self(self.0.wrapping_add(offset.unsigned_abs() as usize))
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Addr {
    fn from(addr: u32) -> Self {
        Self(addr as usize)
    }
}
