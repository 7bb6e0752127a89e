//! Method pipeline: decoding many method bodies of a same image.
//!
//! Method bodies share no state, they are decoded in parallel. Two failure
//! policies are offered: [`decode_methods`] gives up on the first method that
//! fails, [`decode_methods_lenient`] reports every outcome and lets the caller
//! skip the methods it could not decode.

use crate::errors::{DjError, DjResult};
use dj_dalvik::{CodeItem, ConstantPool};
use rayon::prelude::*;
use serde::Serialize;

/// Location of a method body in the binary image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MethodCode {
    pub method_idx: u32,
    /// Byte offset of the code item.
    pub code_off: usize,
}

pub fn decode_method<P: ConstantPool + ?Sized>(
    image: &[u8],
    pool: &P,
    method: MethodCode,
) -> DjResult<CodeItem> {
    log::trace!(
        "decoding method #{} at {:#x}",
        method.method_idx,
        method.code_off
    );
    CodeItem::parse(image, method.code_off, pool).map_err(|source| DjError::Decode {
        method: method.method_idx,
        source,
    })
}

/// Decodes all methods, failing with the error of the first failing method
/// in input order.
pub fn decode_methods<P: ConstantPool + Sync + ?Sized>(
    image: &[u8],
    pool: &P,
    methods: &[MethodCode],
) -> DjResult<Vec<(u32, CodeItem)>> {
    let decoded: Vec<DjResult<(u32, CodeItem)>> = methods
        .par_iter()
        .map(|method| Ok((method.method_idx, decode_method(image, pool, *method)?)))
        .collect();
    let decoded = decoded.into_iter().collect::<DjResult<Vec<_>>>()?;
    log::debug!("{} methods decoded", decoded.len());
    Ok(decoded)
}

/// Decodes all methods, returning each outcome in input order.
pub fn decode_methods_lenient<P: ConstantPool + Sync + ?Sized>(
    image: &[u8],
    pool: &P,
    methods: &[MethodCode],
) -> Vec<(u32, DjResult<CodeItem>)> {
    let decoded: Vec<(u32, DjResult<CodeItem>)> = methods
        .par_iter()
        .map(|method| (method.method_idx, decode_method(image, pool, *method)))
        .collect();

    let failed = decoded
        .iter()
        .filter_map(|(_, res)| res.as_ref().err())
        .inspect(|err| log::warn!("{err}"))
        .count();
    log::debug!(
        "{} methods decoded, {failed} skipped",
        decoded.len() - failed
    );
    decoded
}

#[cfg(test)]
mod tests {
    use super::*;
    use dj_dalvik::errors::{DalvikError, DalvikResult};
    use dj_dalvik::{Kind, Type};

    struct Pool(Vec<&'static str>);

    impl ConstantPool for Pool {
        fn method_return_type(&self, method_idx: u32) -> DalvikResult<&str> {
            self.0
                .get(method_idx as usize)
                .copied()
                .ok_or_else(|| DalvikError::ResNotFound(format!("method {method_idx}")))
        }

        fn type_descriptor(&self, type_idx: u32) -> DalvikResult<&str> {
            Err(DalvikError::ResNotFound(format!("type {type_idx}")))
        }
    }

    fn push_code_item(image: &mut Vec<u8>, code: &[u16]) -> usize {
        while image.len() % 4 != 0 {
            image.push(0);
        }
        let offset = image.len();
        for v in [2u16, 0, 0, 0] {
            image.extend(v.to_le_bytes());
        }
        image.extend(0u32.to_le_bytes());
        image.extend((code.len() as u32).to_le_bytes());
        for unit in code {
            image.extend(unit.to_le_bytes());
        }
        offset
    }

    fn sample() -> (Vec<u8>, Vec<MethodCode>) {
        let mut image = Vec::new();
        let bodies: [&[u16]; 3] = [
            &[0x000e],
            &[0x00ff],
            &[0x0071, 0x0000, 0x0000, 0x000a, 0x000f],
        ];
        let methods = bodies
            .iter()
            .enumerate()
            .map(|(i, code)| MethodCode {
                method_idx: 10 + i as u32,
                code_off: push_code_item(&mut image, code),
            })
            .collect();
        (image, methods)
    }

    #[test]
    fn single_method() {
        let (image, methods) = sample();
        let pool = Pool(vec!["J"]);

        let item = decode_method(&image, &pool, methods[2]).unwrap();
        assert_eq!(item.insns()[1].kind(), Kind::MoveResult);
        assert_eq!(item.insns()[1].move_result_type(), Some(&Type::Long));

        let err = decode_method(&image, &pool, methods[1]).unwrap_err();
        assert_eq!(err.method(), Some(11));
        assert!(matches!(
            err,
            DjError::Decode {
                source: DalvikError::InvalidOpcode { opcode: 0xff, .. },
                ..
            }
        ));
    }

    #[test]
    fn strict_pipeline_stops_on_failure() {
        let (image, methods) = sample();
        let pool = Pool(vec!["J"]);

        let err = decode_methods(&image, &pool, &methods).unwrap_err();
        assert_eq!(err.method(), Some(11));

        let decoded = decode_methods(&image, &pool, &[methods[0], methods[2]]).unwrap();
        let ids: Vec<u32> = decoded.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![10, 12]);
    }

    #[test]
    fn lenient_pipeline_keeps_going() {
        let (image, methods) = sample();
        let pool = Pool(vec!["J"]);

        let decoded = decode_methods_lenient(&image, &pool, &methods);
        assert_eq!(decoded.len(), 3);
        assert!(decoded[0].1.is_ok());
        assert!(decoded[1].1.is_err());
        assert_eq!(decoded[2].0, 12);
        assert_eq!(decoded[2].1.as_ref().unwrap().insns().len(), 3);
    }

    #[test]
    fn pool_failures_are_tagged() {
        let (image, methods) = sample();
        let err = decode_method(&image, &Pool(vec![]), methods[2]).unwrap_err();
        assert!(matches!(
            err,
            DjError::Decode {
                method: 12,
                source: DalvikError::ResNotFound(_)
            }
        ));
    }

    #[test]
    fn decoded_methods_serialize() {
        let (image, methods) = sample();
        let decoded = decode_methods(&image, &Pool(vec!["J"]), &methods[2..]).unwrap();
        let json = serde_json::to_value(&decoded).unwrap();
        assert_eq!(json[0][0], 12);
        assert_eq!(json[0][1]["insns"][1]["move_result_type"], "Long");
        assert_eq!(
            serde_json::to_value(methods[0]).unwrap(),
            serde_json::json!({"method_idx": 10, "code_off": 0})
        );
    }
}
