//! Dalvik type descriptors.
//!
//! Descriptors are only parsed into their structural form here; nothing is
//! resolved against loaded classes.

use crate::errors::{DalvikError, DalvikResult};
use serde::Serialize;
use std::fmt;

const MAX_ARRAY_DIMENSIONS: usize = 255;

/// Dalvik concrete type descriptor type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Type {
    /// `void` type, only valid for return types.
    Void,
    /// `boolean` type.
    Boolean,
    /// `byte` type.
    Byte,
    /// `short` type.
    Short,
    /// `char` type.
    Char,
    /// `int` type.
    Int,
    /// `long` type.
    Long,
    /// `float` type.
    Float,
    /// `double` type.
    Double,
    /// Array with the given number of dimensions over a non-array element type.
    Array(usize, Box<Self>),
    /// Fully-qualified class, in its internal slash-separated form.
    Class(String),
}

impl Type {
    /// The type given to the value captured at the entry of an exception handler.
    #[must_use]
    pub fn throwable() -> Self {
        Self::Class("java/lang/Throwable".to_string())
    }

    #[inline]
    #[must_use]
    pub const fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    /// Component type of an array type: the same type with one dimension less.
    #[must_use]
    pub fn component(&self) -> Option<Self> {
        match self {
            Self::Array(1, elem) => Some(elem.as_ref().clone()),
            Self::Array(n, elem) => Some(Self::Array(n - 1, elem.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Void => write!(f, "V"),
            Self::Boolean => write!(f, "Z"),
            Self::Byte => write!(f, "B"),
            Self::Short => write!(f, "S"),
            Self::Char => write!(f, "C"),
            Self::Int => write!(f, "I"),
            Self::Long => write!(f, "J"),
            Self::Float => write!(f, "F"),
            Self::Double => write!(f, "D"),
            Self::Array(n, inner) => {
                for _ in 0..*n {
                    write!(f, "[")?;
                }
                write!(f, "{inner}")
            }
            Self::Class(classname) => write!(f, "L{classname};"),
        }
    }
}

fn conversion_error(s: &str) -> DalvikError {
    DalvikError::Conversion {
        from: format!("&str ({s:?})"),
        to: "Type".to_string(),
    }
}

impl TryFrom<&str> for Type {
    type Error = DalvikError;

    fn try_from(s: &str) -> DalvikResult<Self> {
        if s == "V" {
            return Ok(Self::Void);
        }

        let dims = s.bytes().take_while(|b| *b == b'[').count();
        if dims >= s.len() || dims > MAX_ARRAY_DIMENSIONS {
            return Err(conversion_error(s));
        }

        let elem = match &s[dims..] {
            "Z" => Self::Boolean,
            "B" => Self::Byte,
            "S" => Self::Short,
            "C" => Self::Char,
            "I" => Self::Int,
            "J" => Self::Long,
            "F" => Self::Float,
            "D" => Self::Double,
            sub => match sub.strip_prefix('L').and_then(|s| s.strip_suffix(';')) {
                Some(name) if !name.is_empty() => Self::Class(name.to_string()),
                _ => return Err(conversion_error(s)),
            },
        };

        if dims == 0 {
            Ok(elem)
        } else {
            Ok(Self::Array(dims, Box::new(elem)))
        }
    }
}
