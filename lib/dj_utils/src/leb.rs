//! LEB128 values as read from a binary image.
//!
//! Both wrappers remember how many bytes the value occupied in its input, so
//! that lists of variable-length items can be addressed by byte offset.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Uleb128 {
    value: u32,
    size: usize,
}

impl Uleb128 {
    #[must_use]
    pub const fn new(value: u32, size: usize) -> Self {
        Self { value, size }
    }

    #[inline]
    #[must_use]
    pub const fn value(self) -> u32 {
        self.value
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.value as usize
    }

    /// Number of bytes the value was encoded on.
    #[inline]
    #[must_use]
    pub const fn size(self) -> usize {
        self.size
    }

    /// Smallest number of bytes able to hold the value.
    #[must_use]
    pub const fn minimal_size(self) -> usize {
        if self.value == 0 {
            1
        } else {
            let nbits = 32 - self.value.leading_zeros() as usize;
            1 + (nbits - 1) / 7
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sleb128 {
    value: i32,
    size: usize,
}

impl Sleb128 {
    #[must_use]
    pub const fn new(value: i32, size: usize) -> Self {
        Self { value, size }
    }

    #[inline]
    #[must_use]
    pub const fn value(self) -> i32 {
        self.value
    }

    #[inline]
    #[must_use]
    pub const fn size(self) -> usize {
        self.size
    }

    #[inline]
    #[must_use]
    pub const fn unsigned_abs(self) -> usize {
        self.value.unsigned_abs() as usize
    }
}
