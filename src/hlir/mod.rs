/*! The HLIR input dialect.

HLIR is the DXIL-flavored, LLVM-shaped IR this crate lowers: functions made
of basic blocks of typed SSA values, plus module-level metadata nodes that
describe resource bindings, stage signatures, and the entry point. The
bitcode reader that produces these structures lives outside the crate;
lowering consumes them read-only.

Everything cross-references through [`Handle`]s into arenas owned by the
[`Module`] and its [`Function`]s, so no raw pointers survive parsing.
*/

mod metadata;
mod types;
mod value;

pub use metadata::{
    CbvEntry, ComponentType, MetadataError, MetadataNode, MetadataOperand, NodeView, ResourceKind,
    SamplerEntry, Semantic, SignatureElement, SrvEntry,
};
pub use types::Type;
pub use value::{
    BinaryOp, CastOp, ComparePredicate, Constant, Instruction, OpTableCode, ResourceClass, UnaryOp,
    Value,
};

use crate::arena::{Arena, Handle, UniqueArena};
use crate::FastHashMap;

/// A parsed HLIR module.
#[derive(Default)]
pub struct Module {
    /// Structurally interned types, shared by all functions.
    pub types: UniqueArena<Type>,
    /// All metadata nodes of the module.
    pub metadata: Arena<MetadataNode>,
    /// Named metadata: name to the list of its top-level nodes.
    pub named_metadata: FastHashMap<String, Vec<Handle<MetadataNode>>>,
    pub functions: Vec<Function>,
}

impl Module {
    pub fn function_by_name(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// The first node of the named metadata entry `name`, if any.
    pub fn named_metadata_node(&self, name: &str) -> Option<Handle<MetadataNode>> {
        self.named_metadata
            .get(name)
            .and_then(|nodes| nodes.first().copied())
    }
}

/// A function definition. SSA values are function-scoped.
pub struct Function {
    pub name: String,
    /// Every value an instruction operand can refer to: constants, undefs,
    /// and instruction results.
    pub values: Arena<Value>,
    pub blocks: Arena<BasicBlock>,
    pub entry: Handle<BasicBlock>,
}

/// A basic block: instructions in program order, closed by a terminator.
pub struct BasicBlock {
    pub name: String,
    /// Handles of `Value::Instruction` entries in the owning function's
    /// value arena.
    pub instructions: Vec<Handle<Value>>,
    pub terminator: Terminator,
}

/// Block terminators, as the bitcode reader hands them over.
#[derive(Clone, Debug)]
pub enum Terminator {
    Branch {
        target: Handle<BasicBlock>,
    },
    BranchConditional {
        condition: Handle<Value>,
        true_block: Handle<BasicBlock>,
        false_block: Handle<BasicBlock>,
    },
    Switch {
        selector: Handle<Value>,
        default: Handle<BasicBlock>,
        cases: Vec<(u32, Handle<BasicBlock>)>,
    },
    Return {
        value: Option<Handle<Value>>,
    },
    Unreachable,
}

impl Terminator {
    /// Successor blocks in the order the bitcode reader reports them:
    /// branch target, then-else pair, or switch default followed by cases.
    pub fn successors(&self) -> Vec<Handle<BasicBlock>> {
        match *self {
            Terminator::Branch { target } => vec![target],
            Terminator::BranchConditional {
                true_block,
                false_block,
                ..
            } => vec![true_block, false_block],
            Terminator::Switch {
                default, ref cases, ..
            } => {
                let mut successors = vec![default];
                successors.extend(cases.iter().map(|&(_, block)| block));
                successors
            }
            Terminator::Return { .. } | Terminator::Unreachable => Vec::new(),
        }
    }
}
