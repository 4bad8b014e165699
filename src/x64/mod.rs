//! x86-64 architecture-specific components.
//!
//! This module contains all x86-64 specific code:
//! - Instruction encoding using iced-x86
//! - System V argument assignment and entry stub frames
//! - Executable memory for generated code
//! - Native trampolines that enter the interpreter

pub mod calling_convention;
pub mod encoder;
pub mod exec_memory;
pub mod registers;
pub mod trampoline;

pub use calling_convention::{CCAssigner, CCAssignment, EntryFrame, SysVAssigner};
pub use encoder::{EncodingError, X64Encoder as Encoder};
pub use exec_memory::ExecutableMemory;
pub use registers::AsmReg;
pub use trampoline::{take_last_fault, Trampoline};
