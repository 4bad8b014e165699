//! irbridge - a register IR with an interpreter and native entry points.
//!
//! IR functions are built through [`core::FunctionBuilder`], checked and frozen
//! by [`core::Module::finalize`], and executed by [`interp::Interpreter`]. Any
//! defined function with integer arguments and result can also be exposed to
//! native code through [`x64::Trampoline`], which generates a small x86-64 stub
//! following the platform C calling convention and forwards each call into the
//! interpreter.
//!
//! # Primary Usage
//!
//! ```ignore
//! use irbridge::core::Module;
//! use irbridge::interp::Interpreter;
//! use irbridge::samples::build_ackermann;
//! use irbridge::x64::Trampoline;
//!
//! let mut module = Module::new();
//! let ack = build_ackermann(&mut module)?;
//! let program = module.finalize()?;
//!
//! let direct = Interpreter::new(&program).call_i32(ack, &[2, 2])?;
//! let native = Trampoline::new(&program, ack)?;
//! let f: extern "C" fn(i32, i32) -> i32 = unsafe { native.cast() };
//! assert_eq!(f(2, 2), direct);
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Types, functions, builder, layout, validation, printing
//! - [`interp`] - Interpreter, its configuration and host bindings
//! - [`x64`] - x86-64 encoder, calling convention and trampolines
//! - [`samples`] - Sample programs

pub mod core;
pub mod interp;
pub mod samples;
pub mod x64;

pub use self::core::{
    BuildError, Error, ExecError, FuncId, FunctionBuilder, Module, Program, Reg, Result,
    TrampolineError, Type, ValidationError,
};
pub use interp::{HostFunctions, Interpreter, InterpreterConfig};
pub use x64::Trampoline;
