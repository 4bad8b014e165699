// This module holds the IR data structures: register, block and function identifiers, the
// operation enum, blocks, function signatures and the two function variants. A defined
// function owns its blocks, the type of every register it has created (indexed by register
// id) and the types of its stack slots. An external function is only a signature and a
// native symbol name whose body is supplied by the host. Operations refer to registers,
// blocks and functions by dense index; nothing here points at anything else directly, so a
// function can call itself without any shared ownership.

//! IR functions, blocks and operations.

use std::fmt;

use super::types::Type;

/// Register id, dense within one defined function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u32);

impl Reg {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// Block index within one defined function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// Function index within a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuncId(pub u32);

impl FuncId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index of a stack slot reserved by a stack allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(pub u32);

impl SlotId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

impl BinaryOp {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Rem => "rem",
            BinaryOp::Eq => "eq",
            BinaryOp::Ne => "ne",
            BinaryOp::Gt => "gt",
            BinaryOp::Lt => "lt",
            BinaryOp::Ge => "ge",
            BinaryOp::Le => "le",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub const fn mnemonic(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "not",
        }
    }
}

/// A single IR instruction.
///
/// Value-producing variants carry their target register; terminators and
/// `WriteMemory` produce nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    ReadArg {
        target: Reg,
        index: u32,
    },
    LiteralInt {
        target: Reg,
        value: i32,
    },
    ReadMemory {
        target: Reg,
        pointer: Reg,
    },
    WriteMemory {
        pointer: Reg,
        source: Reg,
    },
    Unary {
        target: Reg,
        op: UnaryOp,
        operand: Reg,
    },
    Binary {
        target: Reg,
        op: BinaryOp,
        lhs: Reg,
        rhs: Reg,
    },
    StackAlloc {
        target: Reg,
        slot: SlotId,
    },
    Call {
        target: Reg,
        callee: FuncId,
        args: Vec<Reg>,
    },
    Branch {
        target: BlockId,
    },
    CondBranch {
        test: Reg,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return {
        value: Reg,
    },
}

impl Operation {
    /// Branch, conditional branch and return end a block.
    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Operation::Branch { .. } | Operation::CondBranch { .. } | Operation::Return { .. }
        )
    }

    /// The register this operation defines, if any.
    pub fn target(&self) -> Option<Reg> {
        match self {
            Operation::ReadArg { target, .. }
            | Operation::LiteralInt { target, .. }
            | Operation::ReadMemory { target, .. }
            | Operation::Unary { target, .. }
            | Operation::Binary { target, .. }
            | Operation::StackAlloc { target, .. }
            | Operation::Call { target, .. } => Some(*target),
            Operation::WriteMemory { .. }
            | Operation::Branch { .. }
            | Operation::CondBranch { .. }
            | Operation::Return { .. } => None,
        }
    }

    /// Registers read by this operation, in operand order.
    pub fn uses(&self) -> Vec<Reg> {
        match self {
            Operation::ReadArg { .. }
            | Operation::LiteralInt { .. }
            | Operation::StackAlloc { .. }
            | Operation::Branch { .. } => Vec::new(),
            Operation::ReadMemory { pointer, .. } => vec![*pointer],
            Operation::WriteMemory { pointer, source } => vec![*pointer, *source],
            Operation::Unary { operand, .. } => vec![*operand],
            Operation::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            Operation::Call { args, .. } => args.clone(),
            Operation::CondBranch { test, .. } => vec![*test],
            Operation::Return { value } => vec![*value],
        }
    }

    /// Blocks this operation may transfer control to.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Operation::Branch { target } => vec![*target],
            Operation::CondBranch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Block {
    pub ops: Vec<Operation>,
}

impl Block {
    pub fn terminator(&self) -> Option<&Operation> {
        self.ops.last().filter(|op| op.is_terminator())
    }
}

/// Name, argument types and return type shared by both function variants.
#[derive(Debug, Clone, PartialEq)]
pub struct Signature {
    pub name: String,
    pub args: Vec<Type>,
    pub ret: Type,
}

impl Signature {
    pub fn new(name: impl Into<String>, args: Vec<Type>, ret: Type) -> Self {
        Self {
            name: name.into(),
            args,
            ret,
        }
    }

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }
}

/// A function with an interpretable body.
#[derive(Debug, Clone, PartialEq)]
pub struct DefinedFunction {
    pub signature: Signature,
    pub blocks: Vec<Block>,
    /// Type of each register, indexed by register id.
    pub reg_types: Vec<Type>,
    /// Type of each stack slot, indexed by slot id.
    pub slot_types: Vec<Type>,
}

impl DefinedFunction {
    pub fn new(signature: Signature) -> Self {
        Self {
            signature,
            blocks: Vec::new(),
            reg_types: Vec::new(),
            slot_types: Vec::new(),
        }
    }

    pub fn reg_type(&self, reg: Reg) -> Option<Type> {
        self.reg_types.get(reg.index()).copied()
    }

    pub fn block(&self, block: BlockId) -> Option<&Block> {
        self.blocks.get(block.index())
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.ops.len()).sum()
    }
}

/// A declaration whose body lives in the host environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ExternalFunction {
    pub signature: Signature,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Function {
    Defined(DefinedFunction),
    External(ExternalFunction),
}

impl Function {
    pub fn signature(&self) -> &Signature {
        match self {
            Function::Defined(f) => &f.signature,
            Function::External(f) => &f.signature,
        }
    }

    pub fn name(&self) -> &str {
        &self.signature().name
    }

    pub fn as_defined(&self) -> Option<&DefinedFunction> {
        match self {
            Function::Defined(f) => Some(f),
            Function::External(_) => None,
        }
    }

    pub fn is_defined(&self) -> bool {
        matches!(self, Function::Defined(_))
    }
}
