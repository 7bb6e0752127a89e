//! # `DroidJar`
//!
//! `droidjar` is the main crate of the `DroidJar` project, decoding Dalvik
//! bytecode into instruction lists ready for translation to JVM bytecode. It
//! acts as entry point by reexporting the sub-crates and hosts the pipeline
//! decoding the method bodies of a binary image.
//!
//! ```rust
//! use droidjar::prelude::*;
//!
//! struct NoPool;
//!
//! impl ConstantPool for NoPool {
//!     fn method_return_type(&self, idx: u32) -> DalvikResult<&str> {
//!         Err(DalvikError::ResNotFound(format!("method {idx}")))
//!     }
//!
//!     fn type_descriptor(&self, idx: u32) -> DalvikResult<&str> {
//!         Err(DalvikError::ResNotFound(format!("type {idx}")))
//!     }
//! }
//!
//! // code item with one register, no tries and a single `return-void`
//! let image: [u8; 18] = [1, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 0x0e, 0x00];
//! let methods = [MethodCode { method_idx: 0, code_off: 0 }];
//!
//! let decoded = decode_methods(&image, &NoPool, &methods)?;
//! assert_eq!(decoded[0].1.insns()[0].kind(), Kind::Return);
//! # Ok::<(), DjError>(())
//! ```
//!
//! ## Sub-crates
//!
//!  - [`dj_dalvik`] decodes and annotates method bodies,
//!  - [`dj_utils`] contains the small value types the other crates share.

mod errors;

pub mod pipeline;

pub use dj_dalvik as dalvik;
pub use dj_utils as utils;

/// Reexport module of commonly used structures and functions:
///
/// ```rust
/// use droidjar::prelude::*;
/// ```
pub mod prelude {
    pub use crate::errors::{DjError, DjResult};
    pub use crate::pipeline::{decode_method, decode_methods, decode_methods_lenient, MethodCode};

    pub use dj_dalvik::errors::{DalvikError, DalvikResult};
    pub use dj_dalvik::{
        Addr, ByteReader, CodeItem, ConstantPool, Instruction, Kind, Type, OPCODES,
    };

    /// Installs the process logger, filtered by the `DJ_LOG` environment
    /// variable unless a level is forced.
    pub fn init_logger(level: Option<log::LevelFilter>, ecslog: bool) -> DjResult<()> {
        let env = env_logger::Env::new()
            .filter_or("DJ_LOG", "info")
            .write_style("DJ_LOG_STYLE");

        let mut builder = env_logger::Builder::from_env(env);
        if let Some(level) = level {
            builder.filter_level(level);
        }
        if ecslog {
            builder.format(ecs_logger::format);
        }
        builder.try_init()?;
        Ok(())
    }
}
