//! Opcode classification.
//!
//! Every opcode byte maps to exactly one [`Kind`]. The mapping is described by a
//! sparse list of milestones, each one giving the first byte of a run of
//! opcodes sharing the same kind, and is expanded once into a total table.

use crate::errors::{DalvikError, DalvikResult};
use lazy_static::lazy_static;
use serde::Serialize;
use std::fmt;

/// Number of distinct opcode bytes.
pub const OPCODE_COUNT: usize = 256;

/// Classification tag of a decoded instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Kind {
    Nop,
    Move,
    MoveWide,
    MoveResult,
    Return,
    Const32,
    Const64,
    ConstString,
    ConstClass,
    MonitorEnter,
    MonitorExit,
    CheckCast,
    InstanceOf,
    ArrayLen,
    NewInstance,
    NewArray,
    FilledNewArray,
    FillArrayData,
    Throw,
    Goto,
    Switch,
    Cmp,
    If,
    IfZ,
    ArrayGet,
    ArrayPut,
    InstanceGet,
    InstancePut,
    StaticGet,
    StaticPut,
    InvokeVirtual,
    InvokeSuper,
    InvokeDirect,
    InvokeStatic,
    InvokeInterface,
    UnaryOp,
    BinaryOp,
    BinaryOpConst,

    /// Opcode byte with no instruction assigned.
    Unused,
}

impl Kind {
    /// Any of the invoke flavours, range forms included.
    #[must_use]
    pub const fn is_invoke(self) -> bool {
        matches!(
            self,
            Self::InvokeVirtual
                | Self::InvokeSuper
                | Self::InvokeDirect
                | Self::InvokeStatic
                | Self::InvokeInterface
        )
    }

    /// Instructions the VM considers able to throw. Binary operations only
    /// throw for integer division and remainder.
    #[must_use]
    pub const fn can_throw(self) -> bool {
        matches!(self, Self::ConstString | Self::ConstClass | Self::InstanceOf) || self.pruned_throw()
    }

    /// Same as [`Kind::can_throw`], ignoring linkage errors: constants and
    /// instance-of are considered not to throw.
    #[must_use]
    pub const fn pruned_throw(self) -> bool {
        self.is_invoke()
            || matches!(
                self,
                Self::MonitorEnter
                    | Self::MonitorExit
                    | Self::CheckCast
                    | Self::ArrayLen
                    | Self::NewArray
                    | Self::NewInstance
                    | Self::FilledNewArray
                    | Self::FillArrayData
                    | Self::Throw
                    | Self::ArrayGet
                    | Self::ArrayPut
                    | Self::InstanceGet
                    | Self::InstancePut
                    | Self::StaticGet
                    | Self::StaticPut
                    | Self::BinaryOp
                    | Self::BinaryOpConst
            )
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::Nop => "nop",
            Self::Move => "move",
            Self::MoveWide => "move-wide",
            Self::MoveResult => "move-result",
            Self::Return => "return",
            Self::Const32 => "const",
            Self::Const64 => "const-wide",
            Self::ConstString => "const-string",
            Self::ConstClass => "const-class",
            Self::MonitorEnter => "monitor-enter",
            Self::MonitorExit => "monitor-exit",
            Self::CheckCast => "check-cast",
            Self::InstanceOf => "instance-of",
            Self::ArrayLen => "array-length",
            Self::NewInstance => "new-instance",
            Self::NewArray => "new-array",
            Self::FilledNewArray => "filled-new-array",
            Self::FillArrayData => "fill-array-data",
            Self::Throw => "throw",
            Self::Goto => "goto",
            Self::Switch => "switch",
            Self::Cmp => "cmp",
            Self::If => "if-test",
            Self::IfZ => "if-testz",
            Self::ArrayGet => "aget",
            Self::ArrayPut => "aput",
            Self::InstanceGet => "iget",
            Self::InstancePut => "iput",
            Self::StaticGet => "sget",
            Self::StaticPut => "sput",
            Self::InvokeVirtual => "invoke-virtual",
            Self::InvokeSuper => "invoke-super",
            Self::InvokeDirect => "invoke-direct",
            Self::InvokeStatic => "invoke-static",
            Self::InvokeInterface => "invoke-interface",
            Self::UnaryOp => "unop",
            Self::BinaryOp => "binop",
            Self::BinaryOpConst => "binop/lit",
            Self::Unused => "unused",
        };
        write!(f, "{name}")
    }
}

/// First opcode of each run of same-kind opcodes.
const MILESTONES: &[(usize, Kind)] = &[
    (0x00, Kind::Nop),
    (0x01, Kind::Move),
    (0x04, Kind::MoveWide),
    (0x07, Kind::Move),
    (0x0a, Kind::MoveResult),
    (0x0e, Kind::Return),
    (0x12, Kind::Const32),
    (0x16, Kind::Const64),
    (0x1a, Kind::ConstString),
    (0x1c, Kind::ConstClass),
    (0x1d, Kind::MonitorEnter),
    (0x1e, Kind::MonitorExit),
    (0x1f, Kind::CheckCast),
    (0x20, Kind::InstanceOf),
    (0x21, Kind::ArrayLen),
    (0x22, Kind::NewInstance),
    (0x23, Kind::NewArray),
    (0x24, Kind::FilledNewArray),
    (0x26, Kind::FillArrayData),
    (0x27, Kind::Throw),
    (0x28, Kind::Goto),
    (0x2b, Kind::Switch),
    (0x2d, Kind::Cmp),
    (0x32, Kind::If),
    (0x38, Kind::IfZ),
    (0x3e, Kind::Unused),
    (0x44, Kind::ArrayGet),
    (0x4b, Kind::ArrayPut),
    (0x52, Kind::InstanceGet),
    (0x59, Kind::InstancePut),
    (0x60, Kind::StaticGet),
    (0x67, Kind::StaticPut),
    (0x6e, Kind::InvokeVirtual),
    (0x6f, Kind::InvokeSuper),
    (0x70, Kind::InvokeDirect),
    (0x71, Kind::InvokeStatic),
    (0x72, Kind::InvokeInterface),
    (0x73, Kind::Unused),
    (0x74, Kind::InvokeVirtual),
    (0x75, Kind::InvokeSuper),
    (0x76, Kind::InvokeDirect),
    (0x77, Kind::InvokeStatic),
    (0x78, Kind::InvokeInterface),
    (0x79, Kind::Unused),
    (0x7b, Kind::UnaryOp),
    (0x90, Kind::BinaryOp),
    (0xd0, Kind::BinaryOpConst),
    (0xe3, Kind::Unused),
];

lazy_static! {
    /// Process-wide opcode table, read-only once built.
    pub static ref OPCODES: OpcodeTable = OpcodeTable::from_milestones(MILESTONES, OPCODE_COUNT)
        .expect("failed to expand opcode milestones");
}

/// Total mapping from opcode byte to [`Kind`].
#[derive(Debug, Clone)]
pub struct OpcodeTable {
    kinds: Vec<Kind>,
}

impl OpcodeTable {
    /// Expands milestones into a table of `size` entries, each entry taking the
    /// kind of the closest milestone at or below it.
    ///
    /// Milestones may be given in any order but must define index 0, must not
    /// repeat a key, and must stay within the table.
    pub fn from_milestones(milestones: &[(usize, Kind)], size: usize) -> DalvikResult<Self> {
        let mut sorted = milestones.to_vec();
        sorted.sort_by_key(|(key, _)| *key);

        if sorted.first().map(|(key, _)| *key) != Some(0) {
            return Err(DalvikError::OpcodeTable(
                "milestones must define index 0".to_string(),
            ));
        }
        if let Some(pair) = sorted.windows(2).find(|pair| pair[0].0 == pair[1].0) {
            return Err(DalvikError::OpcodeTable(format!(
                "milestone {:#x} is defined twice",
                pair[0].0
            )));
        }
        if let Some((key, _)) = sorted.iter().find(|(key, _)| *key >= size) {
            return Err(DalvikError::OpcodeTable(format!(
                "milestone {key:#x} is outside of a {size} entries table"
            )));
        }

        let mut kinds = Vec::with_capacity(size);
        let mut next = sorted.iter().peekable();
        let mut current = Kind::Unused;
        for i in 0..size {
            while let Some((_, kind)) = next.next_if(|(key, _)| *key <= i) {
                current = *kind;
            }
            kinds.push(current);
        }

        log::trace!("opcode table expanded from {} milestones", sorted.len());
        Ok(Self { kinds })
    }

    /// Kind of the given opcode; `Unused` is returned as is, it is up to the
    /// caller to reject it.
    pub fn get(&self, opcode: usize) -> DalvikResult<Kind> {
        self.kinds
            .get(opcode)
            .copied()
            .ok_or(DalvikError::OpcodeOutOfRange(opcode))
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}
