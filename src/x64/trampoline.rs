// This module generates native entry points for IR functions. A trampoline is a small x86-64
// stub with the System V signature of the IR function: it spills its incoming arguments into
// its own frame, builds an array of pointers to them, and calls a Rust bridge with a context
// pointer, the address of a return slot and that array. The bridge runs the interpreter on a
// fresh activation stack and writes the result into the return slot, which the stub loads into
// RAX before returning. Interpreter faults cannot unwind through the native frame, so the bridge
// catches them (including panics in host bindings), writes zero as the result and records the
// fault in a thread-local slot that callers inspect after the call returns. The stub and its
// context stay alive exactly as long as the Trampoline value, and the Trampoline borrows the
// Program, so native code can never outlive the IR it runs.

//! Native entry stubs that dispatch into the interpreter.

use std::any::Any;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};

use bumpalo::Bump;

use super::calling_convention::{CCAssignment, EntryFrame, SysVAssigner};
use super::encoder::{EncodingError, X64Encoder};
use super::exec_memory::ExecutableMemory;
use super::registers::AsmReg;
use crate::core::{Error, ExecError, FuncId, Function, Program, TrampolineError};
use crate::interp::{HostFunctions, Interpreter, InterpreterConfig};

thread_local! {
    static BRIDGE_ERROR: RefCell<Option<ExecError>> = const { RefCell::new(None) };
}

fn set_bridge_error(err: ExecError) {
    BRIDGE_ERROR.with(|slot| *slot.borrow_mut() = Some(err));
}

fn clear_bridge_error() {
    BRIDGE_ERROR.with(|slot| slot.borrow_mut().take());
}

/// Take the fault recorded by the most recent native call on this thread, if any.
///
/// Only needed when calling a stub through [`Trampoline::cast`];
/// [`Trampoline::invoke`] checks and clears it itself.
pub fn take_last_fault() -> Option<ExecError> {
    BRIDGE_ERROR.with(|slot| slot.borrow_mut().take())
}

/// Everything the bridge needs to run one function, addressed by the stub.
struct BridgeContext {
    program: *const Program,
    host: Option<*const HostFunctions>,
    config: InterpreterConfig,
    function: FuncId,
    name: String,
    arg_sizes: Vec<usize>,
    ret_size: usize,
}

type BridgeFn = unsafe extern "C" fn(*const BridgeContext, *mut u8, *const *const u8);

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Called from generated stubs.
///
/// `ret` points to at least `ret_size` writable bytes and `args` to one pointer per
/// argument, each addressing `arg_sizes[i]` readable bytes.
unsafe extern "C" fn interpreter_bridge(
    ctx: *const BridgeContext,
    ret: *mut u8,
    args: *const *const u8,
) {
    clear_bridge_error();
    let ctx = unsafe { &*ctx };
    let ret = unsafe { std::slice::from_raw_parts_mut(ret, ctx.ret_size) };
    let args: Vec<&[u8]> = ctx
        .arg_sizes
        .iter()
        .enumerate()
        .map(|(i, &size)| unsafe { std::slice::from_raw_parts(*args.add(i), size) })
        .collect();
    let program = unsafe { &*ctx.program };
    let host = ctx.host.map(|h| unsafe { &*h });

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        let mut interp = Interpreter::with_config(program, ctx.config);
        if let Some(host) = host {
            interp = interp.with_host_functions(host);
        }
        interp.invoke_raw(ctx.function, &args, &mut *ret)
    }));

    // Faults of nested native calls made by host bindings do not belong to this call.
    let fault = match outcome {
        Ok(Ok(())) => {
            clear_bridge_error();
            return;
        }
        Ok(Err(err)) => err,
        Err(payload) => ExecError::HostPanic {
            message: panic_message(&*payload),
        },
    };
    log::warn!("native call into `{}` faulted: {fault}", ctx.name);
    ret.fill(0);
    set_bridge_error(fault);
}

/// Emit the entry stub for a planned frame.
fn emit_stub(frame: &EntryFrame<'_>, context: *const BridgeContext) -> Result<Vec<u8>, EncodingError> {
    let rbp = AsmReg::RBP;
    let scratch = AsmReg::RAX;
    let mut enc = X64Encoder::new()?;
    enc.emit_prologue(frame.frame_size)?;

    // Register arguments first, before anything clobbers them.
    for (i, arg) in frame.arg_assignments.iter().enumerate() {
        if let Some(reg) = arg.reg {
            enc.mov32_mem_reg(rbp, frame.value_offset(i), reg)?;
        }
    }
    for (i, arg) in frame.arg_assignments.iter().enumerate() {
        if let Some(off) = arg.stack_off {
            enc.mov32_reg_mem(scratch, rbp, EntryFrame::incoming_offset(off))?;
            enc.mov32_mem_reg(rbp, frame.value_offset(i), scratch)?;
        }
    }

    let array = frame.pointer_array_offset();
    for i in 0..frame.arg_assignments.len() {
        enc.lea(scratch, rbp, frame.value_offset(i))?;
        enc.mov64_mem_reg(rbp, array + 8 * i as i32, scratch)?;
    }
    enc.mov32_mem_imm(rbp, EntryFrame::RET_SLOT, 0)?;

    enc.mov_reg_imm(AsmReg::RDI, context as i64)?;
    enc.lea(AsmReg::RSI, rbp, EntryFrame::RET_SLOT)?;
    enc.lea(AsmReg::RDX, rbp, array)?;
    enc.mov_reg_imm(scratch, interpreter_bridge as BridgeFn as usize as i64)?;
    enc.call_reg(scratch)?;

    let ret_reg = frame
        .ret_assignment
        .and_then(|r| r.reg)
        .unwrap_or(SysVAssigner::RET_REG);
    enc.mov32_reg_mem(ret_reg, rbp, EntryFrame::RET_SLOT)?;
    enc.emit_epilogue()?;
    log::trace!("entry stub: {} instructions", enc.instruction_count());
    enc.finalize()
}

/// A native entry point for one defined function.
///
/// The generated code follows the platform C calling convention for the
/// function's signature, with every i32 argument and result passed as a C `int`.
pub struct Trampoline<'p> {
    memory: ExecutableMemory,
    context: Box<BridgeContext>,
    arity: usize,
    _program: PhantomData<&'p Program>,
}

impl<'p> Trampoline<'p> {
    /// Generate a stub that runs `id` of `program` in the interpreter.
    pub fn new(program: &'p Program, id: FuncId) -> Result<Self, TrampolineError> {
        let func = program
            .function(id)
            .and_then(Function::as_defined)
            .ok_or_else(|| TrampolineError::NotDefined {
                function: program
                    .function(id)
                    .map(|f| f.name().to_string())
                    .unwrap_or_else(|| format!("#{}", id.0)),
            })?;
        let sig = &func.signature;
        for (i, ty) in sig.args.iter().enumerate() {
            if !ty.is_int() {
                return Err(TrampolineError::UnsupportedType {
                    function: sig.name.clone(),
                    position: format!("argument {i}"),
                    ty: *ty,
                });
            }
        }
        if !sig.ret.is_int() {
            return Err(TrampolineError::UnsupportedType {
                function: sig.name.clone(),
                position: "return".to_string(),
                ty: sig.ret,
            });
        }
        if !cfg!(all(target_arch = "x86_64", unix)) {
            return Err(TrampolineError::UnsupportedTarget);
        }

        let context = Box::new(BridgeContext {
            program: program as *const Program,
            host: None,
            config: InterpreterConfig::default(),
            function: id,
            name: sig.name.clone(),
            arg_sizes: sig.args.iter().map(|ty| ty.size() as usize).collect(),
            ret_size: sig.ret.size() as usize,
        });

        let arena = Bump::new();
        let mut assigner = SysVAssigner::new();
        let frame = EntryFrame::plan(
            &arena,
            &mut assigner,
            sig.args.iter().map(|ty| CCAssignment::new(ty.size(), ty.align())),
            CCAssignment::new(sig.ret.size(), sig.ret.align()),
        );
        let code = emit_stub(&frame, &*context as *const BridgeContext)?;
        let memory = ExecutableMemory::from_code(&code)?;
        log::info!(
            "generated {}-byte entry stub for `{}` ({} args)",
            code.len(),
            sig.name,
            sig.arg_count()
        );

        Ok(Self {
            memory,
            context,
            arity: sig.arg_count(),
            _program: PhantomData,
        })
    }

    /// Supply bodies for external functions reached from this entry point.
    pub fn with_host_functions(mut self, host: &'p HostFunctions) -> Self {
        self.context.host = Some(host as *const HostFunctions);
        self
    }

    /// Interpreter settings used for every call through the stub.
    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.context.config = config;
        self
    }

    pub fn function(&self) -> FuncId {
        self.context.function
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    /// Address of the generated code.
    pub fn as_ptr(&self) -> *const u8 {
        self.memory.as_ptr()
    }

    /// Reinterpret the stub as a function pointer.
    ///
    /// # Safety
    ///
    /// `F` must be an `extern "C"` function pointer type whose parameters are exactly
    /// `arity()` `i32` values and whose result is `i32`, and the pointer must not be
    /// called after this trampoline is dropped.
    pub unsafe fn cast<F: Copy>(&self) -> F {
        let ptr = self.as_ptr();
        unsafe { std::mem::transmute_copy::<*const u8, F>(&ptr) }
    }

    /// Call the stub natively with i32 arguments.
    ///
    /// A fault raised by the interpreter is reported as an error rather than as the
    /// zero the native code returns.
    pub fn invoke(&self, args: &[i32]) -> Result<i32, Error> {
        if args.len() != self.arity {
            return Err(ExecError::ArgumentCount {
                function: self.context.name.clone(),
                expected: self.arity,
                found: args.len(),
            }
            .into());
        }

        type F0 = extern "C" fn() -> i32;
        type F1 = extern "C" fn(i32) -> i32;
        type F2 = extern "C" fn(i32, i32) -> i32;
        type F3 = extern "C" fn(i32, i32, i32) -> i32;
        type F4 = extern "C" fn(i32, i32, i32, i32) -> i32;
        type F5 = extern "C" fn(i32, i32, i32, i32, i32) -> i32;
        type F6 = extern "C" fn(i32, i32, i32, i32, i32, i32) -> i32;
        type F7 = extern "C" fn(i32, i32, i32, i32, i32, i32, i32) -> i32;
        type F8 = extern "C" fn(i32, i32, i32, i32, i32, i32, i32, i32) -> i32;

        clear_bridge_error();
        // SAFETY: the stub was generated for exactly `arity` i32 arguments and an i32 result.
        let value = unsafe {
            match *args {
                [] => self.cast::<F0>()(),
                [a] => self.cast::<F1>()(a),
                [a, b] => self.cast::<F2>()(a, b),
                [a, b, c] => self.cast::<F3>()(a, b, c),
                [a, b, c, d] => self.cast::<F4>()(a, b, c, d),
                [a, b, c, d, e] => self.cast::<F5>()(a, b, c, d, e),
                [a, b, c, d, e, f] => self.cast::<F6>()(a, b, c, d, e, f),
                [a, b, c, d, e, f, g] => self.cast::<F7>()(a, b, c, d, e, f, g),
                [a, b, c, d, e, f, g, h] => self.cast::<F8>()(a, b, c, d, e, f, g, h),
                _ => {
                    return Err(TrampolineError::UnsupportedArity { count: args.len() }.into());
                }
            }
        };

        match take_last_fault() {
            Some(fault) => Err(fault.into()),
            None => Ok(value),
        }
    }
}

impl std::fmt::Debug for Trampoline<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trampoline")
            .field("function", &self.context.name)
            .field("arity", &self.arity)
            .field("code", &self.memory.as_ptr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_shape() {
        let arena = Bump::new();
        let mut assigner = SysVAssigner::new();
        let frame = EntryFrame::plan(
            &arena,
            &mut assigner,
            (0..8).map(|_| CCAssignment::new(4, 4)),
            CCAssignment::new(4, 4),
        );
        let code = emit_stub(&frame, std::ptr::null()).unwrap();

        assert_eq!(code[0], 0x55); // push rbp
        assert_eq!(*code.last().unwrap(), 0xC3); // ret
        assert!(code.windows(2).any(|w| *w == [0xFF, 0xD0])); // call rax
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*payload), "bang");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*payload), "unknown panic");
    }

    #[test]
    fn test_fault_slot() {
        set_bridge_error(ExecError::CallDepthExceeded { limit: 3 });
        assert_eq!(
            take_last_fault(),
            Some(ExecError::CallDepthExceeded { limit: 3 })
        );
        assert_eq!(take_last_fault(), None);
    }
}
