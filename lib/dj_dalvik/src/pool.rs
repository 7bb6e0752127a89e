//! Constant pool lookups needed while decoding.
//!
//! The container format owning the pools is not handled by this crate; callers
//! supply descriptors by numeric reference id.

use crate::errors::DalvikResult;
use crate::types::Type;

pub trait ConstantPool {
    /// Declared return type descriptor of the referenced method.
    fn method_return_type(&self, method_idx: u32) -> DalvikResult<&str>;

    /// Descriptor of the referenced type.
    fn type_descriptor(&self, type_idx: u32) -> DalvikResult<&str>;
}

pub(crate) fn return_type<P: ConstantPool + ?Sized>(pool: &P, method_idx: u32) -> DalvikResult<Type> {
    Type::try_from(pool.method_return_type(method_idx)?)
}

pub(crate) fn type_of<P: ConstantPool + ?Sized>(pool: &P, type_idx: u32) -> DalvikResult<Type> {
    Type::try_from(pool.type_descriptor(type_idx)?)
}
