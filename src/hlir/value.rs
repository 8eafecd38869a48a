use super::{BasicBlock, Type};
use crate::arena::Handle;

/// A constant value. Floating point constants carry their width in the
/// variant; integer constants of any width share one variant.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Constant {
    Float(f32),
    Double(f64),
    /// Two's-complement bits, zero-extended to 64.
    Integer { width: u8, value: u64 },
}

/// One SSA value: a constant, an undef, or an instruction result.
///
/// Instructions double as values; a block lists its instructions as handles
/// into the function's value arena. Operands of an instruction may refer to
/// values defined later (phis do), which is why lowering hands out forward
/// ids.
pub enum Value {
    Constant(Constant),
    Undef(Handle<Type>),
    Instruction {
        /// Result type; `Type::Void` when the instruction produces nothing.
        ty: Handle<Type>,
        /// Result name from the bitcode, empty when unnamed.
        name: String,
        op: Instruction,
    },
}

/// The closed set of HLIR instructions lowering understands.
#[derive(Clone, Debug)]
pub enum Instruction {
    Binary {
        op: BinaryOp,
        lhs: Handle<Value>,
        rhs: Handle<Value>,
    },
    Unary {
        op: UnaryOp,
        value: Handle<Value>,
    },
    Cast {
        op: CastOp,
        value: Handle<Value>,
    },
    Compare {
        op: ComparePredicate,
        lhs: Handle<Value>,
        rhs: Handle<Value>,
    },
    Load {
        pointer: Handle<Value>,
    },
    /// Operand order is (value, pointer), as in the bitcode.
    Store {
        value: Handle<Value>,
        pointer: Handle<Value>,
    },
    GetElementPtr {
        in_bounds: bool,
        base: Handle<Value>,
        indices: Vec<Handle<Value>>,
    },
    ExtractValue {
        aggregate: Handle<Value>,
        indices: Vec<u32>,
    },
    Alloca {
        array_size: Handle<Value>,
    },
    Select {
        condition: Handle<Value>,
        accept: Handle<Value>,
        reject: Handle<Value>,
    },
    Phi {
        incoming: Vec<(Handle<Value>, Handle<BasicBlock>)>,
    },
    Call {
        callee: String,
        arguments: Vec<Handle<Value>>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    FAdd,
    FSub,
    FMul,
    FDiv,
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    Shl,
    LShr,
    AShr,
    SRem,
    URem,
    FRem,
    And,
    Or,
    Xor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    FNeg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CastOp {
    BitCast,
    Trunc,
    ZExt,
    SExt,
    FpTrunc,
    FpExt,
    FpToUi,
    FpToSi,
    UiToFp,
    SiToFp,
}

/// Comparison predicates, float and integer in one namespace as the bitcode
/// has them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComparePredicate {
    FcmpFalse,
    FcmpOeq,
    FcmpOgt,
    FcmpOge,
    FcmpOlt,
    FcmpOle,
    FcmpOne,
    FcmpUeq,
    FcmpUgt,
    FcmpUge,
    FcmpUlt,
    FcmpUle,
    FcmpUne,
    FcmpTrue,
    IcmpEq,
    IcmpNe,
    IcmpSgt,
    IcmpSge,
    IcmpSlt,
    IcmpSle,
    IcmpUgt,
    IcmpUge,
    IcmpUlt,
    IcmpUle,
}

/// Resource class selector of a handle-creation intrinsic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceClass {
    Srv,
    Uav,
    Cbv,
    Sampler,
}

impl ResourceClass {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => Self::Srv,
            1 => Self::Uav,
            2 => Self::Cbv,
            3 => Self::Sampler,
            _ => return None,
        })
    }
}

/// Op-table sub-opcodes understood by lowering, with their published
/// encodings. A call whose callee is prefixed `dx.op` carries one of these
/// as its first, constant argument.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpTableCode {
    LoadInput = 4,
    StoreOutput = 5,
    CreateHandle = 57,
    CBufferLoadLegacy = 59,
    Sample = 60,
    SampleBias = 61,
    SampleLevel = 62,
    SampleCmp = 64,
    SampleCmpLevelZero = 65,
}

impl OpTableCode {
    pub fn from_u32(raw: u32) -> Option<Self> {
        Some(match raw {
            4 => Self::LoadInput,
            5 => Self::StoreOutput,
            57 => Self::CreateHandle,
            59 => Self::CBufferLoadLegacy,
            60 => Self::Sample,
            61 => Self::SampleBias,
            62 => Self::SampleLevel,
            64 => Self::SampleCmp,
            65 => Self::SampleCmpLevelZero,
            _ => return None,
        })
    }
}
