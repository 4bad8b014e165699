// This module implements the IR interpreter. Each invocation walks the blocks of a defined
// function with a (block, instruction) cursor, reading and writing registers in a byte frame
// laid out by the frame layout calculator. Nested calls do not recurse on the host stack:
// the caller lays out the callee's argument block from the callee's declared argument types,
// copies the argument registers into it, and pushes a new activation on an explicit stack.
// Frames and argument blocks live contiguously in one byte buffer that is truncated when an
// activation returns and cleared when a fault aborts the call tree, so storage is released on
// every exit path. Pointers produced by stack allocations are offsets into that buffer,
// biased so that a zeroed pointer register is never a valid address. An access through a
// pointer must land on the start of a stack slot of a live activation and use the slot's own
// type, so integers can never be reinterpreted as pointers. A pointer may only be stored into
// a slot of the frame it points to or of a newer one, and may only be returned to a caller
// when it points below the returning frame; together these keep every reachable pointer
// inside a live frame, so reused stack memory is never reached through a stale address.

//! Tree-walking interpreter over finalized programs.

use std::ops::Range;

use super::config::InterpreterConfig;
use super::host::HostFunctions;
use crate::core::function::{
    BinaryOp, DefinedFunction, FuncId, Function, Operation, Reg, SlotId, UnaryOp,
};
use crate::core::layout::{FrameLayout, Layout};
use crate::core::module::Program;
use crate::core::types::Type;
use crate::core::{ExecError, ExecResult};

/// Bias added to stack offsets to form pointer values.
const STACK_BASE: u64 = 0x1_0000;

/// Minimum alignment of frames and argument blocks within the stack.
const FRAME_ALIGN: u32 = 16;

/// Evaluate a binary operator with 32-bit two's-complement semantics.
///
/// Returns `None` on division or remainder by zero.
pub fn eval_binary(op: BinaryOp, lhs: i32, rhs: i32) -> Option<i32> {
    Some(match op {
        BinaryOp::Add => lhs.wrapping_add(rhs),
        BinaryOp::Sub => lhs.wrapping_sub(rhs),
        BinaryOp::Mul => lhs.wrapping_mul(rhs),
        BinaryOp::Div => {
            if rhs == 0 {
                return None;
            }
            lhs.wrapping_div(rhs)
        }
        BinaryOp::Rem => {
            if rhs == 0 {
                return None;
            }
            lhs.wrapping_rem(rhs)
        }
        BinaryOp::Eq => (lhs == rhs) as i32,
        BinaryOp::Ne => (lhs != rhs) as i32,
        BinaryOp::Gt => (lhs > rhs) as i32,
        BinaryOp::Lt => (lhs < rhs) as i32,
        BinaryOp::Ge => (lhs >= rhs) as i32,
        BinaryOp::Le => (lhs <= rhs) as i32,
    })
}

pub fn eval_unary(op: UnaryOp, operand: i32) -> i32 {
    match op {
        UnaryOp::Neg => operand.wrapping_neg(),
        UnaryOp::Not => (operand == 0) as i32,
    }
}

/// Where a returning activation delivers its value.
#[derive(Debug, Clone, Copy)]
enum ReturnTo {
    /// The caller-supplied return slot of the outermost invocation.
    Outer,
    /// A register in the caller's frame, as an absolute stack offset.
    Register { offset: usize },
}

#[derive(Debug, Clone, Copy)]
struct Activation<'p> {
    func: &'p DefinedFunction,
    frame: &'p FrameLayout,
    args: &'p Layout,
    args_base: usize,
    frame_base: usize,
    block: usize,
    instr: usize,
    ret_to: ReturnTo,
}

impl Activation<'_> {
    fn name(&self) -> String {
        self.func.signature.name.clone()
    }

    /// Absolute stack range of `reg`.
    fn reg(&self, reg: Reg) -> ExecResult<Range<usize>> {
        let range = self
            .frame
            .reg_range(reg)
            .ok_or_else(|| ExecError::RegisterOutOfRange {
                function: self.name(),
                reg,
            })?;
        Ok(self.frame_base + range.start..self.frame_base + range.end)
    }

    fn reg_type(&self, reg: Reg) -> ExecResult<Type> {
        self.func
            .reg_type(reg)
            .ok_or_else(|| ExecError::RegisterOutOfRange {
                function: self.name(),
                reg,
            })
    }
}

/// Counters collected across invocations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterpreterStats {
    pub invocations: u64,
    pub calls: u64,
    pub instructions: u64,
    pub max_depth: usize,
}

/// Executes defined functions of one program.
pub struct Interpreter<'p> {
    program: &'p Program,
    host: Option<&'p HostFunctions>,
    config: InterpreterConfig,
    stack: Vec<u8>,
    activations: Vec<Activation<'p>>,
    stats: InterpreterStats,
}

impl<'p> Interpreter<'p> {
    pub fn new(program: &'p Program) -> Self {
        Self::with_config(program, InterpreterConfig::default())
    }

    pub fn with_config(program: &'p Program, config: InterpreterConfig) -> Self {
        Self {
            program,
            host: None,
            config,
            stack: Vec::with_capacity(config.initial_stack_capacity),
            activations: Vec::new(),
            stats: InterpreterStats::default(),
        }
    }

    /// Supply bodies for external functions.
    pub fn with_host_functions(mut self, host: &'p HostFunctions) -> Self {
        self.host = Some(host);
        self
    }

    pub fn program(&self) -> &'p Program {
        self.program
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    pub fn stats(&self) -> InterpreterStats {
        self.stats
    }

    /// Call a function whose arguments and result are all i32.
    pub fn call_i32(&mut self, id: FuncId, args: &[i32]) -> ExecResult<i32> {
        let bytes: Vec<[u8; 4]> = args.iter().map(|a| a.to_ne_bytes()).collect();
        let slices: Vec<&[u8]> = bytes.iter().map(|b| b.as_slice()).collect();
        let mut ret = [0u8; 4];
        self.invoke_raw(id, &slices, &mut ret)?;
        Ok(i32::from_ne_bytes(ret))
    }

    /// Run `id` with one native-endian byte slice per declared argument,
    /// writing the result's bytes into `ret`.
    pub fn invoke_raw(&mut self, id: FuncId, args: &[&[u8]], ret: &mut [u8]) -> ExecResult<()> {
        self.stats.invocations += 1;
        let result = self
            .enter_outer(id, args, ret.len())
            .and_then(|()| self.run(ret));
        // Frames of every activation still live (a fault) are dropped here.
        self.activations.clear();
        self.stack.clear();
        if let Err(err) = &result {
            log::debug!("invocation aborted: {err}");
        }
        result
    }

    fn defined(&self, id: FuncId) -> ExecResult<(&'p DefinedFunction, &'p FrameLayout, &'p Layout)> {
        let program = self.program;
        let not_defined = || ExecError::NotDefined {
            function: program
                .function(id)
                .map(|f| f.name().to_string())
                .unwrap_or_else(|| format!("#{}", id.0)),
        };
        let func = program
            .function(id)
            .and_then(Function::as_defined)
            .ok_or_else(not_defined)?;
        let frame = program.frame_layout(id).ok_or_else(not_defined)?;
        let args = program.arg_layout(id).ok_or_else(not_defined)?;
        Ok((func, frame, args))
    }

    /// Reserve `size` bytes at the top of the stack, zeroed and aligned.
    fn reserve(&mut self, size: u32, align: u32) -> usize {
        let align = align.max(FRAME_ALIGN) as usize;
        let base = (self.stack.len() + align - 1) & !(align - 1);
        self.stack.resize(base + size as usize, 0);
        base
    }

    fn check_depth(&self) -> ExecResult<()> {
        if let Some(limit) = self.config.max_call_depth {
            if self.activations.len() >= limit {
                return Err(ExecError::CallDepthExceeded { limit });
            }
        }
        Ok(())
    }

    fn push_activation(&mut self, id: FuncId, args_base: usize, ret_to: ReturnTo) -> ExecResult<()> {
        let (func, frame, args) = self.defined(id)?;
        let frame_base = self.reserve(frame.size(), frame.layout().align());
        self.activations.push(Activation {
            func,
            frame,
            args,
            args_base,
            frame_base,
            block: 0,
            instr: 0,
            ret_to,
        });
        self.stats.max_depth = self.stats.max_depth.max(self.activations.len());
        Ok(())
    }

    fn enter_outer(&mut self, id: FuncId, args: &[&[u8]], ret_len: usize) -> ExecResult<()> {
        let (func, _, layout) = self.defined(id)?;
        let sig = &func.signature;
        log::debug!("invoking `{}` with {} arguments", sig.name, args.len());

        if args.len() != sig.arg_count() {
            return Err(ExecError::ArgumentCount {
                function: sig.name.clone(),
                expected: sig.arg_count(),
                found: args.len(),
            });
        }
        if ret_len != sig.ret.size() as usize {
            return Err(ExecError::ReturnSlotSize {
                function: sig.name.clone(),
                expected: sig.ret.size() as usize,
                found: ret_len,
            });
        }

        let args_base = self.reserve(layout.size(), layout.align());
        for (index, (bytes, ty)) in args.iter().zip(&sig.args).enumerate() {
            if bytes.len() != ty.size() as usize {
                return Err(ExecError::ArgumentSize {
                    function: sig.name.clone(),
                    index,
                    expected: ty.size() as usize,
                    found: bytes.len(),
                });
            }
            let offset = args_base + layout.offsets()[index] as usize;
            self.stack[offset..offset + bytes.len()].copy_from_slice(bytes);
        }

        self.push_activation(id, args_base, ReturnTo::Outer)
    }

    fn read_i32(&self, act: &Activation<'_>, reg: Reg) -> ExecResult<i32> {
        let range = act.reg(reg)?;
        let bytes: [u8; 4] = self
            .stack
            .get(range.start..range.start + 4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| ExecError::RegisterOutOfRange {
                function: act.name(),
                reg,
            })?;
        Ok(i32::from_ne_bytes(bytes))
    }

    fn write_i32(&mut self, act: &Activation<'_>, reg: Reg, value: i32) -> ExecResult<()> {
        let range = act.reg(reg)?;
        let bytes = value.to_ne_bytes();
        self.stack
            .get_mut(range.start..range.start + bytes.len())
            .ok_or_else(|| ExecError::RegisterOutOfRange {
                function: act.name(),
                reg,
            })?
            .copy_from_slice(&bytes);
        Ok(())
    }

    fn read_pointer(&self, act: &Activation<'_>, reg: Reg) -> ExecResult<u64> {
        let range = act.reg(reg)?;
        let bytes: [u8; 8] = self
            .stack
            .get(range.start..range.start + 8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| ExecError::RegisterOutOfRange {
                function: act.name(),
                reg,
            })?;
        Ok(u64::from_ne_bytes(bytes))
    }

    /// Index of the live activation whose frame contains stack offset `offset`.
    fn owner_of(&self, offset: usize) -> Option<usize> {
        // Frames are stacked at increasing offsets.
        let depth = self
            .activations
            .partition_point(|a| a.frame_base <= offset)
            .checked_sub(1)?;
        let owner = &self.activations[depth];
        (offset < owner.frame_base + owner.frame.size() as usize).then_some(depth)
    }

    /// Translate a pointer value into the stack offset of a live slot of type `ty`.
    ///
    /// Returns the offset and the index of the activation that owns the slot.
    fn resolve_pointer(
        &self,
        act: &Activation<'_>,
        address: u64,
        ty: Type,
    ) -> ExecResult<(usize, usize)> {
        let invalid = || ExecError::InvalidPointer {
            address,
            size: ty.size(),
        };
        let offset = address
            .checked_sub(STACK_BASE)
            .and_then(|o| usize::try_from(o).ok())
            .ok_or_else(invalid)?;
        let depth = self.owner_of(offset).ok_or_else(invalid)?;
        let owner = &self.activations[depth];
        let relative = offset - owner.frame_base;

        let mut mismatch = None;
        for (index, slot_ty) in owner.func.slot_types.iter().enumerate() {
            let starts_here = owner
                .frame
                .slot_range(SlotId(index as u32))
                .is_some_and(|r| r.start == relative);
            if !starts_here {
                continue;
            }
            if slot_ty.compatible(&ty) {
                return Ok((offset, depth));
            }
            mismatch.get_or_insert(*slot_ty);
        }
        match mismatch {
            Some(expected) => Err(ExecError::AccessTypeMismatch {
                function: act.name(),
                address,
                expected,
                found: ty,
            }),
            None => Err(invalid()),
        }
    }

    fn advance(&mut self) {
        if let Some(act) = self.activations.last_mut() {
            act.instr += 1;
        }
    }

    fn jump(&mut self, block: usize) {
        if let Some(act) = self.activations.last_mut() {
            act.block = block;
            act.instr = 0;
        }
    }

    fn run(&mut self, ret: &mut [u8]) -> ExecResult<()> {
        while let Some(act) = self.activations.last().copied() {
            let op = act
                .func
                .blocks
                .get(act.block)
                .and_then(|b| b.ops.get(act.instr))
                .ok_or_else(|| ExecError::MissingTerminator {
                    function: act.name(),
                    block: crate::core::BlockId(act.block as u32),
                })?;
            self.stats.instructions += 1;

            match op {
                Operation::ReadArg { target, index } => {
                    let src = act
                        .args
                        .range(*index as usize)
                        .map(|r| act.args_base + r.start..act.args_base + r.end)
                        .ok_or_else(|| ExecError::ArgumentCount {
                            function: act.name(),
                            expected: act.args.len(),
                            found: *index as usize + 1,
                        })?;
                    let dst = act.reg(*target)?;
                    if dst.len() != src.len() {
                        return Err(ExecError::RegisterOutOfRange {
                            function: act.name(),
                            reg: *target,
                        });
                    }
                    self.stack.copy_within(src, dst.start);
                    self.advance();
                }
                Operation::LiteralInt { target, value } => {
                    self.write_i32(&act, *target, *value)?;
                    self.advance();
                }
                Operation::Binary {
                    target,
                    op,
                    lhs,
                    rhs,
                } => {
                    let l = self.read_i32(&act, *lhs)?;
                    let r = self.read_i32(&act, *rhs)?;
                    let value = eval_binary(*op, l, r).ok_or_else(|| ExecError::DivisionByZero {
                        function: act.name(),
                    })?;
                    self.write_i32(&act, *target, value)?;
                    self.advance();
                }
                Operation::Unary {
                    target,
                    op,
                    operand,
                } => {
                    let value = eval_unary(*op, self.read_i32(&act, *operand)?);
                    self.write_i32(&act, *target, value)?;
                    self.advance();
                }
                Operation::StackAlloc { target, slot } => {
                    let slot_range = act.frame.slot_range(*slot).ok_or_else(|| {
                        ExecError::RegisterOutOfRange {
                            function: act.name(),
                            reg: *target,
                        }
                    })?;
                    let address = STACK_BASE + (act.frame_base + slot_range.start) as u64;
                    let dst = act.reg(*target)?;
                    self.stack[dst.start..dst.start + 8].copy_from_slice(&address.to_ne_bytes());
                    self.advance();
                }
                Operation::ReadMemory { target, pointer } => {
                    let ty = act.reg_type(*target)?;
                    let address = self.read_pointer(&act, *pointer)?;
                    let (src, _) = self.resolve_pointer(&act, address, ty)?;
                    let dst = act.reg(*target)?;
                    self.stack.copy_within(src..src + ty.size() as usize, dst.start);
                    self.advance();
                }
                Operation::WriteMemory { pointer, source } => {
                    let ty = act.reg_type(*source)?;
                    let address = self.read_pointer(&act, *pointer)?;
                    let (dst, dst_depth) = self.resolve_pointer(&act, address, ty)?;
                    if ty.is_pointer() {
                        let stored = self.read_pointer(&act, *source)?;
                        let pointee_depth = stored
                            .checked_sub(STACK_BASE)
                            .and_then(|o| usize::try_from(o).ok())
                            .and_then(|o| self.owner_of(o));
                        if pointee_depth.is_some_and(|d| d > dst_depth) {
                            return Err(ExecError::PointerEscape {
                                function: act.name(),
                            });
                        }
                    }
                    let src = act.reg(*source)?;
                    self.stack.copy_within(src, dst);
                    self.advance();
                }
                Operation::Call {
                    target,
                    callee,
                    args,
                } => {
                    self.advance();
                    self.stats.calls += 1;
                    let program = self.program;
                    match program.function(*callee) {
                        Some(Function::External(ext)) => {
                            let mut values = Vec::with_capacity(args.len());
                            for reg in args {
                                values.push(self.read_i32(&act, *reg)?);
                            }
                            let value = self.call_host(ext, &values)?;
                            self.write_i32(&act, *target, value)?;
                        }
                        _ => self.enter_call(&act, *target, *callee, args)?,
                    }
                }
                Operation::Branch { target } => self.jump(target.index()),
                Operation::CondBranch {
                    test,
                    then_block,
                    else_block,
                } => {
                    let taken = if self.read_i32(&act, *test)? != 0 {
                        then_block
                    } else {
                        else_block
                    };
                    self.jump(taken.index());
                }
                Operation::Return { value } => {
                    let src = act.reg(*value)?;
                    if act.reg_type(*value)?.is_pointer() {
                        let address = self.read_pointer(&act, *value)?;
                        let escapes = address
                            .checked_sub(STACK_BASE)
                            .is_some_and(|o| o >= act.args_base as u64);
                        if escapes {
                            return Err(ExecError::DanglingPointer {
                                function: act.name(),
                            });
                        }
                    }
                    self.activations.pop();
                    match act.ret_to {
                        ReturnTo::Outer => {
                            ret.copy_from_slice(&self.stack[src]);
                            self.stack.truncate(act.args_base);
                            log::trace!("`{}` returned to host", act.func.signature.name);
                            return Ok(());
                        }
                        ReturnTo::Register { offset } => {
                            self.stack.copy_within(src, offset);
                            self.stack.truncate(act.args_base);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Lay out the callee's argument block, copy the arguments and push its activation.
    fn enter_call(
        &mut self,
        caller: &Activation<'p>,
        target: Reg,
        callee: FuncId,
        args: &[Reg],
    ) -> ExecResult<()> {
        self.check_depth()?;
        let (func, _, layout) = self.defined(callee)?;
        log::trace!(
            "call `{}` at depth {}",
            func.signature.name,
            self.activations.len()
        );
        if args.len() != layout.len() {
            return Err(ExecError::ArgumentCount {
                function: func.signature.name.clone(),
                expected: layout.len(),
                found: args.len(),
            });
        }

        let args_base = self.reserve(layout.size(), layout.align());
        for (index, reg) in args.iter().enumerate() {
            let src = caller.reg(*reg)?;
            let dst = layout
                .range(index)
                .map(|r| args_base + r.start..args_base + r.end)
                .filter(|r| r.len() == src.len())
                .ok_or_else(|| ExecError::ArgumentSize {
                    function: func.signature.name.clone(),
                    index,
                    expected: layout.range(index).map_or(0, |r| r.len()),
                    found: src.len(),
                })?;
            self.stack.copy_within(src, dst.start);
        }

        let ret_offset = caller.reg(target)?.start;
        self.push_activation(callee, args_base, ReturnTo::Register { offset: ret_offset })
    }

    fn call_host(
        &self,
        ext: &crate::core::ExternalFunction,
        values: &[i32],
    ) -> ExecResult<i32> {
        let sig = &ext.signature;
        if !sig.ret.is_int() || !sig.args.iter().all(Type::is_int) {
            return Err(ExecError::UnsupportedExternalSignature {
                symbol: ext.symbol.clone(),
            });
        }
        let binding = self
            .host
            .and_then(|host| host.get(&ext.symbol))
            .ok_or_else(|| ExecError::UnboundExternal {
                symbol: ext.symbol.clone(),
            })?;
        log::trace!("host call `{}`", ext.symbol);
        Ok(binding(values))
    }
}
