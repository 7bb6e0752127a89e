//! Helpers shared by unit tests.

use crate::errors::{DalvikError, DalvikResult};
use crate::pool::ConstantPool;

pub(crate) fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Splits 32-bit values into little-endian code units.
pub(crate) fn words(values: &[u32]) -> Vec<u16> {
    values
        .iter()
        .flat_map(|v| [(*v & 0xffff) as u16, (*v >> 16) as u16])
        .collect()
}

/// Image made of `base` zero bytes followed by the code units.
pub(crate) fn image_of(base: usize, code: &[u16]) -> Vec<u8> {
    let mut image = vec![0; base];
    image.extend(code.iter().flat_map(|unit| unit.to_le_bytes()));
    image
}

pub(crate) struct TestPool {
    return_types: Vec<String>,
    types: Vec<String>,
}

impl TestPool {
    pub(crate) fn new(return_types: &[&str], types: &[&str]) -> Self {
        Self {
            return_types: return_types.iter().map(|s| s.to_string()).collect(),
            types: types.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ConstantPool for TestPool {
    fn method_return_type(&self, method_idx: u32) -> DalvikResult<&str> {
        self.return_types
            .get(method_idx as usize)
            .map(String::as_str)
            .ok_or_else(|| DalvikError::ResNotFound(format!("method {method_idx}")))
    }

    fn type_descriptor(&self, type_idx: u32) -> DalvikResult<&str> {
        self.types
            .get(type_idx as usize)
            .map(String::as_str)
            .ok_or_else(|| DalvikError::ResNotFound(format!("type {type_idx}")))
    }
}
