// This module provides FunctionBuilder, the only way IR bodies are produced. A builder
// borrows the module mutably and appends to one defined function: it opens blocks, creates
// registers in strict construction order (one per value-producing call, ids never reused),
// records each register's type, and checks operand types against what the operation needs.
// Every check happens before anything is appended, so a failed call leaves the function
// exactly as it was and the caller can report the error and keep going. Control-flow shape
// (one terminator per block, branch targets that exist) is deliberately not checked here
// because blocks are routinely referenced before they are opened; Module::finalize does it.

//! Builder API for defined functions.

use super::error::{BuildError, BuildResult};
use super::function::{
    BinaryOp, BlockId, DefinedFunction, FuncId, Function, Operation, Reg, SlotId, UnaryOp,
};
use super::module::Module;
use super::types::Type;

/// Appends blocks and instructions to one defined function.
pub struct FunctionBuilder<'m> {
    module: &'m mut Module,
    id: FuncId,
    current: Option<BlockId>,
}

impl<'m> FunctionBuilder<'m> {
    pub(crate) fn new(module: &'m mut Module, id: FuncId) -> Self {
        let mut builder = Self {
            module,
            id,
            current: None,
        };
        // Resume after the last block when reopening a partially built function.
        let blocks = builder.function().blocks.len();
        if blocks > 0 {
            builder.current = Some(BlockId(blocks as u32 - 1));
        }
        builder
    }

    /// The function being built.
    pub fn function(&self) -> &DefinedFunction {
        match self.module.function(self.id) {
            Some(Function::Defined(f)) => f,
            _ => unreachable!("builders are only created for defined functions"),
        }
    }

    fn function_mut(&mut self) -> &mut DefinedFunction {
        match self.module.function_mut(self.id) {
            Some(Function::Defined(f)) => f,
            _ => unreachable!("builders are only created for defined functions"),
        }
    }

    pub fn id(&self) -> FuncId {
        self.id
    }

    /// Append an empty block and make it the append target.
    pub fn open_block(&mut self) -> BlockId {
        let func = self.function_mut();
        func.blocks.push(Default::default());
        let block = BlockId(func.blocks.len() as u32 - 1);
        self.current = Some(block);
        block
    }

    /// Make an existing block the append target.
    pub fn switch_to_block(&mut self, block: BlockId) -> BuildResult<()> {
        if block.index() >= self.function().blocks.len() {
            return Err(BuildError::UnknownBlock { block });
        }
        self.current = Some(block);
        Ok(())
    }

    pub fn current_block(&self) -> Option<BlockId> {
        self.current
    }

    fn open(&self) -> BuildResult<BlockId> {
        self.current.ok_or_else(|| BuildError::NoOpenBlock {
            function: self.function().signature.name.clone(),
        })
    }

    fn type_of(&self, reg: Reg) -> BuildResult<Type> {
        self.function()
            .reg_type(reg)
            .ok_or(BuildError::UnknownRegister { reg })
    }

    fn expect_type(&self, reg: Reg, expected: Type) -> BuildResult<()> {
        let found = self.type_of(reg)?;
        if !found.compatible(&expected) {
            return Err(BuildError::TypeMismatch {
                reg,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Create a register of type `ty` and append the operation defining it.
    fn emit_value(&mut self, block: BlockId, ty: Type, make: impl FnOnce(Reg) -> Operation) -> Reg {
        let func = self.function_mut();
        let reg = Reg(func.reg_types.len() as u32);
        func.reg_types.push(ty);
        let op = make(reg);
        log::trace!("{}: {reg} = {op:?}", func.signature.name);
        func.blocks[block.index()].ops.push(op);
        reg
    }

    fn emit(&mut self, block: BlockId, op: Operation) {
        let func = self.function_mut();
        log::trace!("{}: {op:?}", func.signature.name);
        func.blocks[block.index()].ops.push(op);
    }

    /// Copy declared argument `index` into a new register.
    pub fn read_argument(&mut self, index: u32) -> BuildResult<Reg> {
        let block = self.open()?;
        let args = &self.function().signature.args;
        let ty = *args
            .get(index as usize)
            .ok_or(BuildError::ArgumentIndexOutOfRange {
                index,
                count: args.len(),
            })?;
        Ok(self.emit_value(block, ty, |target| Operation::ReadArg { target, index }))
    }

    pub fn literal_integer(&mut self, value: i32) -> BuildResult<Reg> {
        let block = self.open()?;
        Ok(self.emit_value(block, Type::INT, |target| Operation::LiteralInt {
            target,
            value,
        }))
    }

    /// Integer arithmetic or comparison; comparisons produce 0 or 1.
    pub fn binary_op(&mut self, op: BinaryOp, lhs: Reg, rhs: Reg) -> BuildResult<Reg> {
        let block = self.open()?;
        self.expect_type(lhs, Type::INT)?;
        self.expect_type(rhs, Type::INT)?;
        Ok(self.emit_value(block, Type::INT, |target| Operation::Binary {
            target,
            op,
            lhs,
            rhs,
        }))
    }

    pub fn unary_op(&mut self, op: UnaryOp, operand: Reg) -> BuildResult<Reg> {
        let block = self.open()?;
        self.expect_type(operand, Type::INT)?;
        Ok(self.emit_value(block, Type::INT, |target| Operation::Unary {
            target,
            op,
            operand,
        }))
    }

    /// Call `callee` with `args`; the result register has the callee's return type.
    pub fn call(&mut self, callee: FuncId, args: &[Reg]) -> BuildResult<Reg> {
        let block = self.open()?;
        let signature = self
            .module
            .function(callee)
            .ok_or(BuildError::UnknownFunction { index: callee.0 })?
            .signature()
            .clone();

        if args.len() != signature.arg_count() {
            let reason = format!(
                "expected {} arguments, got {}",
                signature.arg_count(),
                args.len()
            );
            return Err(BuildError::ArityOrTypeMismatch {
                callee: signature.name,
                reason,
            });
        }
        for (position, (&reg, expected)) in args.iter().zip(&signature.args).enumerate() {
            let found = self.type_of(reg)?;
            if !found.compatible(expected) {
                return Err(BuildError::ArityOrTypeMismatch {
                    callee: signature.name,
                    reason: format!(
                        "argument {position} is {found} ({reg}), expected {expected}"
                    ),
                });
            }
        }

        let args = args.to_vec();
        Ok(self.emit_value(block, signature.ret, |target| Operation::Call {
            target,
            callee,
            args,
        }))
    }

    /// Reserve a frame slot of type `ty`; the register holds a pointer to it.
    pub fn stack_allocate(&mut self, ty: Type) -> BuildResult<Reg> {
        let block = self.open()?;
        let func = self.function_mut();
        let slot = SlotId(func.slot_types.len() as u32);
        func.slot_types.push(ty);
        Ok(self.emit_value(block, Type::POINTER, |target| Operation::StackAlloc {
            target,
            slot,
        }))
    }

    /// Load a value of type `ty` through `pointer`.
    pub fn read_memory(&mut self, pointer: Reg, ty: Type) -> BuildResult<Reg> {
        let block = self.open()?;
        self.expect_type(pointer, Type::POINTER)?;
        Ok(self.emit_value(block, ty, |target| Operation::ReadMemory { target, pointer }))
    }

    /// Store `source` through `pointer`. Produces no register.
    pub fn write_memory(&mut self, pointer: Reg, source: Reg) -> BuildResult<()> {
        let block = self.open()?;
        self.expect_type(pointer, Type::POINTER)?;
        self.type_of(source)?;
        self.emit(block, Operation::WriteMemory { pointer, source });
        Ok(())
    }

    pub fn branch(&mut self, target: BlockId) -> BuildResult<()> {
        let block = self.open()?;
        self.emit(block, Operation::Branch { target });
        Ok(())
    }

    /// Non-zero `test` continues at `then_block`, zero at `else_block`.
    pub fn conditional_branch(
        &mut self,
        test: Reg,
        then_block: BlockId,
        else_block: BlockId,
    ) -> BuildResult<()> {
        let block = self.open()?;
        self.expect_type(test, Type::INT)?;
        self.emit(
            block,
            Operation::CondBranch {
                test,
                then_block,
                else_block,
            },
        );
        Ok(())
    }

    pub fn return_value(&mut self, value: Reg) -> BuildResult<()> {
        let block = self.open()?;
        let found = self.type_of(value)?;
        let expected = self.function().signature.ret;
        if !found.compatible(&expected) {
            return Err(BuildError::ReturnTypeMismatch {
                reg: value,
                expected,
                found,
            });
        }
        self.emit(block, Operation::Return { value });
        Ok(())
    }
}
