//! Method body decoding.
//!
//! The code-unit stream of a method is decoded linearly into a gapless list of
//! instructions, which is then annotated in two forward scans:
//!
//! - move-result instructions get the type of the value they capture, when it
//!   can be linked to the instruction right before them or to an exception
//!   handler entry;
//! - zero-test branches on an instance-of result get the registers proven to
//!   hold the tested type when the branch falls through.

use crate::errors::{DalvikError, DalvikResult};
use crate::image::ByteReader;
use crate::instrs::{parse_instruction, ArrayData, ImplicitCasts, Instruction, SwitchTable};
use crate::opcodes::Kind;
use crate::pool::{self, ConstantPool};
use crate::types::Type;
use crate::Addr;
use std::collections::BTreeSet;

const IF_EQZ: u8 = 0x38;
const IF_NEZ: u8 = 0x39;

/// Decodes and annotates a whole method body.
///
/// `base` is the byte offset of `code` within `image`, and `catch_addrs` the
/// entry addresses of the method's exception handlers. Any failure aborts the
/// whole method.
pub fn parse_bytecode<R, P>(
    image: &R,
    pool: &P,
    base: usize,
    code: &[u16],
    catch_addrs: &BTreeSet<Addr>,
) -> DalvikResult<Vec<Instruction>>
where
    R: ByteReader + ?Sized,
    P: ConstantPool + ?Sized,
{
    if catch_addrs.contains(&Addr::entry()) {
        return Err(DalvikError::Structure(
            "exception handler at method entry".to_string(),
        ));
    }

    let mut ops = decode_all(image, base, code)?;
    link_move_results(&mut ops, pool, catch_addrs)?;
    infer_implicit_casts(&mut ops)?;
    Ok(ops)
}

fn decode_all<R: ByteReader + ?Sized>(
    image: &R,
    base: usize,
    code: &[u16],
) -> DalvikResult<Vec<Instruction>> {
    let mut ops = Vec::new();
    let mut addr = Addr::entry();
    while addr.0 < code.len() {
        let instr = parse_instruction(image, base, code, addr)?;
        addr = instr.next_addr();
        ops.push(instr);
    }
    log::debug!("decoded {} instructions from {} code units", ops.len(), code.len());
    Ok(ops)
}

fn captured_type<P: ConstantPool + ?Sized>(
    pool: &P,
    producer: &Instruction,
    addr: Addr,
    catch_addrs: &BTreeSet<Addr>,
) -> DalvikResult<Option<Type>> {
    if producer.kind().is_invoke() {
        let ret = pool::return_type(pool, producer.index(0)?)?;
        return Ok(if ret.is_void() { None } else { Some(ret) });
    }

    if producer.kind() == Kind::FilledNewArray {
        let array = pool::type_of(pool, producer.index(0)?)?;
        return match array.component() {
            Some(component) => Ok(Some(component)),
            None => Err(DalvikError::Structure(format!(
                "filled-new-array at {} builds non-array type {array}",
                producer.addr()
            ))),
        };
    }

    if catch_addrs.contains(&addr) {
        return Ok(Some(Type::throwable()));
    }

    Ok(None)
}

fn link_move_results<P: ConstantPool + ?Sized>(
    ops: &mut [Instruction],
    pool: &P,
    catch_addrs: &BTreeSet<Addr>,
) -> DalvikResult<()> {
    let mut linked = 0;
    for i in 1..ops.len() {
        if ops[i].kind() != Kind::MoveResult {
            continue;
        }
        let typ = captured_type(pool, &ops[i - 1], ops[i].addr(), catch_addrs)?;
        if typ.is_some() {
            linked += 1;
        }
        ops[i].move_result_type = typ;
    }
    log::debug!("{linked} move-result instructions linked");
    Ok(())
}

fn implicit_casts(ops: &[Instruction], i: usize) -> DalvikResult<Option<ImplicitCasts>> {
    let branch = &ops[i];
    if branch.kind() != Kind::IfZ || !matches!(branch.opcode(), IF_EQZ | IF_NEZ) || i == 0 {
        return Ok(None);
    }
    let test = &ops[i - 1];
    if test.kind() != Kind::InstanceOf {
        return Ok(None);
    }

    let dest = test.reg(0)?;
    let tested = test.reg(1)?;

    let mut registers = BTreeSet::new();
    registers.insert(tested);
    if let Some(copy) = i.checked_sub(2).map(|j| &ops[j]) {
        if copy.kind() == Kind::Move && copy.reg(0)? == tested {
            registers.insert(copy.reg(1)?);
        }
    }
    registers.remove(&dest);

    if registers.is_empty() {
        return Ok(None);
    }
    Ok(Some(ImplicitCasts {
        type_idx: test.index(2)?,
        registers: registers.into_iter().collect(),
    }))
}

fn infer_implicit_casts(ops: &mut [Instruction]) -> DalvikResult<()> {
    let mut inferred = 0;
    for i in 0..ops.len() {
        let casts = implicit_casts(ops, i)?;
        if casts.is_some() {
            inferred += 1;
            ops[i].implicit_casts = casts;
        }
    }
    log::debug!("{inferred} implicit casts inferred");
    Ok(())
}

/// Payload instruction located at `addr`, if any.
#[must_use]
pub fn payload_at(ops: &[Instruction], addr: Addr) -> Option<&Instruction> {
    ops.binary_search_by_key(&addr, Instruction::addr)
        .ok()
        .map(|i| &ops[i])
        .filter(|instr| instr.is_payload())
}

fn payload_of<'a>(
    ops: &'a [Instruction],
    instr: &Instruction,
    kind: Kind,
) -> DalvikResult<&'a Instruction> {
    if instr.kind() != kind {
        return Err(DalvikError::Structure(format!(
            "{} at {} does not reference a {kind} payload",
            instr.kind(),
            instr.addr()
        )));
    }
    let target = instr.operand(1)?;
    usize::try_from(target)
        .ok()
        .and_then(|target| payload_at(ops, Addr(target)))
        .ok_or_else(|| {
            DalvikError::Structure(format!(
                "{kind} at {} references no payload at {target}",
                instr.addr()
            ))
        })
}

/// Cases of a switch instruction, read from the payload it references.
pub fn switch_table_for<'a>(
    ops: &'a [Instruction],
    instr: &Instruction,
) -> DalvikResult<&'a SwitchTable> {
    let payload = payload_of(ops, instr, Kind::Switch)?;
    payload.switch_table().ok_or_else(|| {
        DalvikError::Structure(format!(
            "switch at {} references array data at {}",
            instr.addr(),
            payload.addr()
        ))
    })
}

/// Elements of a fill-array-data instruction, read from the payload it
/// references.
pub fn array_data_for<'a>(
    ops: &'a [Instruction],
    instr: &Instruction,
) -> DalvikResult<&'a ArrayData> {
    let payload = payload_of(ops, instr, Kind::FillArrayData)?;
    payload.array_data().ok_or_else(|| {
        DalvikError::Structure(format!(
            "fill-array-data at {} references a switch table at {}",
            instr.addr(),
            payload.addr()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{image_of, init_logger, words, TestPool};

    fn parse(code: &[u16], pool: &TestPool, catch_addrs: &[usize]) -> DalvikResult<Vec<Instruction>> {
        init_logger();
        let image = image_of(0, code);
        let catch_addrs = catch_addrs.iter().map(|a| Addr(*a)).collect();
        parse_bytecode(&image[..], pool, 0, code, &catch_addrs)
    }

    fn empty_pool() -> TestPool {
        TestPool::new(&[], &[])
    }

    fn with_switch_and_array() -> Vec<u16> {
        let mut code = vec![
            0x0112, // 0: const/4 v1, #0
            0x012b, 0x0007, 0x0000, // 1: packed-switch v1, +7
            0x0026, 0x000a, 0x0000, // 4: fill-array-data v0, +10
            0x000e, // 7: return-void
            // 8: packed-switch-payload
            0x0100, 0x0001,
        ];
        code.extend(words(&[0, 6]));
        // 14: fill-array-data-payload
        code.extend([0x0300, 0x0001, 0x0003, 0x0000, 0x0201, 0x0003]);
        code
    }

    #[test]
    fn decoded_list_is_gapless() {
        let code = with_switch_and_array();
        let ops = parse(&code, &empty_pool(), &[]).unwrap();

        let addrs: Vec<Addr> = ops.iter().map(Instruction::addr).collect();
        assert_eq!(addrs, vec![Addr(0), Addr(1), Addr(4), Addr(7), Addr(8), Addr(14)]);
        assert_eq!(ops[0].addr(), Addr::entry());
        for pair in ops.windows(2) {
            assert_eq!(pair[1].addr(), pair[0].next_addr());
        }
        assert_eq!(ops.last().unwrap().next_addr(), Addr(code.len()));
    }

    #[test]
    fn payload_resolution() {
        let code = with_switch_and_array();
        let ops = parse(&code, &empty_pool(), &[]).unwrap();

        let payload = payload_at(&ops, Addr(8)).unwrap();
        assert_eq!(payload.kind(), Kind::Nop);
        assert!(payload.switch_table().is_some());
        assert!(payload_at(&ops, Addr(14)).unwrap().array_data().is_some());
        assert!(payload_at(&ops, Addr(7)).is_none());
        assert!(payload_at(&ops, Addr(9)).is_none());

        let json = serde_json::to_value(&ops).unwrap();
        assert_eq!(json[4]["kind"], "Nop");
        assert_eq!(json[4]["switch_table"], serde_json::json!([[0, 6]]));
        assert!(json[4].get("array_data").is_none());
        assert_eq!(json[5]["array_data"]["values"], serde_json::json!([1, 2, 3]));

        let table = switch_table_for(&ops, &ops[1]).unwrap();
        assert_eq!(table.get(0), Some(6));
        assert_eq!(array_data_for(&ops, &ops[2]).unwrap().values, vec![1, 2, 3]);

        assert!(matches!(
            switch_table_for(&ops, &ops[2]),
            Err(DalvikError::Structure(_))
        ));
        assert!(matches!(
            array_data_for(&ops, &ops[0]),
            Err(DalvikError::Structure(_))
        ));
    }

    #[test]
    fn invoke_result_outranks_handler_entry() {
        let pool = TestPool::new(&["I"], &[]);
        let code = [
            0x0071, 0x0000, 0x0000, // 0: invoke-static {}, method@0
            0x000a, // 3: move-result v0
            0x000f, // 4: return v0
        ];
        let ops = parse(&code, &pool, &[3]).unwrap();
        assert_eq!(ops[1].move_result_type(), Some(&Type::Int));
        assert_eq!(ops[0].move_result_type(), None);
    }

    #[test]
    fn handler_entry_after_goto_is_throwable() {
        let code = [
            0x0228, // 0: goto +2
            0x000e, // 1: return-void
            0x000d, // 2: move-exception v0
            0x0027, // 3: throw v0
        ];
        let ops = parse(&code, &empty_pool(), &[2]).unwrap();
        assert_eq!(ops[2].move_result_type(), Some(&Type::throwable()));

        let ops = parse(&code, &empty_pool(), &[]).unwrap();
        assert_eq!(ops[2].move_result_type(), None);
    }

    #[test]
    fn void_invoke_captures_nothing() {
        let pool = TestPool::new(&["V"], &[]);
        let code = [0x0071, 0x0000, 0x0000, 0x000a, 0x000e];
        let ops = parse(&code, &pool, &[3]).unwrap();
        assert_eq!(ops[1].move_result_type(), None);
    }

    #[test]
    fn filled_new_array_captures_component() {
        let pool = TestPool::new(&[], &["[I", "I"]);
        // filled-new-array {v0, v1}, type@0; move-result-object v2
        let code = [0x2024, 0x0000, 0x0010, 0x020c, 0x000e];
        let ops = parse(&code, &pool, &[]).unwrap();
        assert_eq!(ops[1].move_result_type(), Some(&Type::Int));

        // Not an array type.
        let code = [0x2024, 0x0001, 0x0010, 0x020c, 0x000e];
        assert!(matches!(
            parse(&code, &pool, &[]),
            Err(DalvikError::Structure(_))
        ));
    }

    #[test]
    fn filled_new_array_outranks_handler_entry() {
        let pool = TestPool::new(&[], &["[I"]);
        let code = [
            0x2024, 0x0000, 0x0010, // 0: filled-new-array {v0, v1}, type@0
            0x020c, // 3: move-result-object v2
            0x000e, // 4: return-void
        ];
        let ops = parse(&code, &pool, &[3]).unwrap();
        assert_eq!(ops[1].move_result_type(), Some(&Type::Int));
        assert_ne!(ops[1].move_result_type(), Some(&Type::throwable()));
    }

    #[test]
    fn missing_pool_entry_fails() {
        let code = [0x0071, 0x0004, 0x0000, 0x000a, 0x000e];
        assert!(matches!(
            parse(&code, &empty_pool(), &[]),
            Err(DalvikError::ResNotFound(_))
        ));
    }

    #[test]
    fn instance_of_overwriting_tested_register() {
        let code = [
            0x2220, 0x0000, // 0: instance-of v2, v2, type@0
            0x0238, 0x0002, // 2: if-eqz v2, +2
            0x000e, // 4: return-void
        ];
        let ops = parse(&code, &empty_pool(), &[]).unwrap();
        assert_eq!(ops[1].implicit_casts(), None);
    }

    #[test]
    fn implicit_casts_include_alias() {
        let code = [
            0x1201, // 0: move v2, v1
            0x2520, 0x0003, // 1: instance-of v5, v2, type@3
            0x0538, 0x0002, // 3: if-eqz v5, +2
            0x000e, // 5: return-void
        ];
        let ops = parse(&code, &empty_pool(), &[]).unwrap();
        assert_eq!(
            ops[2].implicit_casts(),
            Some(&ImplicitCasts {
                type_idx: 3,
                registers: vec![1, 2]
            })
        );
    }

    #[test]
    fn alias_overwritten_by_test_result() {
        let code = [
            0x1201, // 0: move v2, v1
            0x2120, 0x0000, // 1: instance-of v1, v2, type@0
            0x0139, 0x0002, // 3: if-nez v1, +2
            0x000e, // 5: return-void
        ];
        let ops = parse(&code, &empty_pool(), &[]).unwrap();
        assert_eq!(ops[2].implicit_casts().unwrap().registers, vec![2]);
    }

    #[test]
    fn implicit_casts_need_equality_test() {
        let code = [
            0x2520, 0x0000, // 0: instance-of v5, v2, type@0
            0x053a, 0x0002, // 2: if-ltz v5, +2
            0x000e, // 4: return-void
        ];
        let ops = parse(&code, &empty_pool(), &[]).unwrap();
        assert_eq!(ops[1].implicit_casts(), None);

        // Alias farther than two instructions back is not traced.
        let code = [
            0x1201, // 0: move v2, v1
            0x0000, // 1: nop
            0x2520, 0x0000, // 2: instance-of v5, v2, type@0
            0x0538, 0x0002, // 4: if-eqz v5, +2
            0x000e, // 6: return-void
        ];
        let ops = parse(&code, &empty_pool(), &[]).unwrap();
        assert_eq!(ops[3].implicit_casts().unwrap().registers, vec![2]);
    }

    #[test]
    fn handler_at_entry_is_rejected() {
        let code = [0x000d, 0x0027];
        assert!(matches!(
            parse(&code, &empty_pool(), &[0]),
            Err(DalvikError::Structure(_))
        ));
    }

    #[test]
    fn decode_failure_aborts_method() {
        let code = [0x0000, 0x00ff, 0x000e];
        assert!(matches!(
            parse(&code, &empty_pool(), &[]),
            Err(DalvikError::InvalidOpcode {
                opcode: 0xff,
                addr: Addr(1)
            })
        ));

        let code = [0x0000, 0x0014, 0x0001];
        assert!(matches!(
            parse(&code, &empty_pool(), &[]),
            Err(DalvikError::Truncated { .. })
        ));
    }

    #[test]
    fn empty_body() {
        assert!(parse(&[], &empty_pool(), &[]).unwrap().is_empty());
    }

    #[test]
    fn annotated_list_serializes() {
        let pool = TestPool::new(&["Ljava/lang/String;"], &[]);
        let code = [0x0071, 0x0000, 0x0000, 0x000c, 0x0011];
        let ops = parse(&code, &pool, &[]).unwrap();

        let json = serde_json::to_value(&ops).unwrap();
        assert_eq!(json[0]["kind"], "InvokeStatic");
        assert_eq!(json[0]["addr"], 0);
        assert_eq!(json[0]["next_addr"], 3);
        assert!(json[0].get("move_result_type").is_none());
        assert_eq!(json[1]["kind"], "MoveResult");
        assert_eq!(json[1]["move_result_type"]["Class"], "java/lang/String");
    }
}
