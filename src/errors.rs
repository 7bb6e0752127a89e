//! Global error handling.
//!
//! Sub-crates define their own error types, unified here when winding results
//! at the top-level. Decoding failures reported by the method pipeline are
//! tagged with the method they come from.

use dj_dalvik::errors::DalvikError;
use thiserror::Error;

/// An alias for result that can be a [`DjError`].
pub type DjResult<T> = Result<T, DjError>;

#[derive(Debug, Error)]
pub enum DjError {
    /// A method body could not be decoded.
    #[error("cannot decode method #{method}: {source}")]
    Decode {
        method: u32,
        #[source]
        source: DalvikError,
    },

    /// Error that can be returned from [`dj_dalvik`] functions.
    #[error(transparent)]
    Dalvik(#[from] DalvikError),

    #[error("cannot install logger: {0}")]
    Logger(#[from] log::SetLoggerError),
}

impl DjError {
    /// Method whose decoding failed, if the error comes from the pipeline.
    #[must_use]
    pub const fn method(&self) -> Option<u32> {
        match self {
            Self::Decode { method, .. } => Some(*method),
            _ => None,
        }
    }
}
