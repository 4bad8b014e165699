// This module is the central hub for the IR itself: the type model, function and operation
// definitions, the builder API, frame layout, finalize-time validation, modules and programs,
// and the textual printer. Everything the interpreter and the trampoline generator consume
// is defined here, and everything here is plain data plus checks; nothing executes IR.

//! Core IR infrastructure.
//!
//! # Key Components
//!
//! ## Types (`types`)
//! - `Type` descriptors with size and alignment
//! - `TypeRegistry` for user aggregates
//!
//! ## Functions (`function`, `builder`)
//! - Defined and external functions, blocks, operations
//! - `FunctionBuilder` with typed, recoverable precondition checks
//!
//! ## Layout (`layout`)
//! - Linear-scan frame and argument block layout
//!
//! ## Modules (`module`, `validate`)
//! - `Module` under construction, `Program` once finalized

pub mod builder;
pub mod display;
pub mod error;
pub mod function;
pub mod layout;
pub mod module;
pub mod types;
pub mod validate;

pub use builder::FunctionBuilder;
pub use error::{
    BuildError, BuildResult, Error, ExecError, ExecResult, Result, TrampolineError,
    ValidationError,
};
pub use function::{
    BinaryOp, Block, BlockId, DefinedFunction, ExternalFunction, FuncId, Function, Operation,
    Reg, Signature, SlotId, UnaryOp,
};
pub use layout::{align_up, FrameLayout, Layout};
pub use module::{Module, Program};
pub use types::{Type, TypeError, TypeKind, TypeRegistry, MAX_STRUCT_SIZE};
