// This module defines the error types of irbridge using the thiserror crate. Each layer has
// its own enum: BuildError for builder precondition violations (recoverable, the function is
// left unchanged), ValidationError for malformed control flow found when a module is
// finalized, ExecError for faults raised while interpreting (fatal for the whole call tree),
// and TrampolineError for failures while generating a native entry point. The crate-level
// Error wraps all of them with From conversions so callers can use `?` across layers, and
// Result<T> is the matching alias.

//! Error types for irbridge.

use thiserror::Error;

use super::function::{BlockId, Reg};
use super::types::{Type, TypeError};
use crate::x64::EncodingError;

/// Builder precondition violations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    #[error("no block is open in function `{function}`")]
    NoOpenBlock { function: String },

    #[error("argument index {index} out of range ({count} declared)")]
    ArgumentIndexOutOfRange { index: u32, count: usize },

    #[error("register {reg} does not exist")]
    UnknownRegister { reg: Reg },

    #[error("block {block} does not exist")]
    UnknownBlock { block: BlockId },

    #[error("type mismatch on {reg}: expected {expected}, found {found}")]
    TypeMismatch { reg: Reg, expected: Type, found: Type },

    #[error("call to `{callee}`: {reason}")]
    ArityOrTypeMismatch { callee: String, reason: String },

    #[error("return type mismatch: function returns {expected}, {reg} is {found}")]
    ReturnTypeMismatch { reg: Reg, expected: Type, found: Type },

    #[error("function index {index} does not exist")]
    UnknownFunction { index: u32 },

    #[error("`{name}` is not a defined function")]
    NotDefined { name: String },

    #[error("symbol `{name}` is already declared")]
    DuplicateSymbol { name: String },

    #[error("invalid type: {0}")]
    Type(#[from] TypeError),
}

/// Control-flow problems found by `Module::finalize`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("function `{function}` has no blocks")]
    EmptyFunction { function: String },

    #[error("{block} in `{function}` does not end in a terminator")]
    MissingTerminator { function: String, block: BlockId },

    #[error("{block} in `{function}` has a terminator before its last instruction")]
    TerminatorNotLast { function: String, block: BlockId },

    #[error("{block} in `{function}` branches to missing {target}")]
    BranchTargetOutOfRange {
        function: String,
        block: BlockId,
        target: BlockId,
    },

    #[error("frame or argument block of `{function}` exceeds 4 GiB")]
    FrameTooLarge { function: String },

    #[error("{reg} used in {block} of `{function}` is not defined on every path")]
    UseNotDominated {
        function: String,
        block: BlockId,
        reg: Reg,
    },
}

/// Faults raised while interpreting. Any fault aborts the whole call tree.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    #[error("`{function}` is not a defined function")]
    NotDefined { function: String },

    #[error("`{function}` expects {expected} arguments, got {found}")]
    ArgumentCount {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("argument {index} of `{function}` must be {expected} bytes, got {found}")]
    ArgumentSize {
        function: String,
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("return slot for `{function}` must be {expected} bytes, got {found}")]
    ReturnSlotSize {
        function: String,
        expected: usize,
        found: usize,
    },

    #[error("register {reg} out of range in `{function}`")]
    RegisterOutOfRange { function: String, reg: Reg },

    #[error("fell off the end of {block} in `{function}`")]
    MissingTerminator { function: String, block: BlockId },

    #[error("division by zero in `{function}`")]
    DivisionByZero { function: String },

    #[error("call depth limit of {limit} exceeded")]
    CallDepthExceeded { limit: usize },

    #[error("invalid pointer {address:#x} for a {size}-byte access")]
    InvalidPointer { address: u64, size: u32 },

    #[error("`{function}` returned a pointer into its own frame")]
    DanglingPointer { function: String },

    #[error("`{function}` stored a pointer into a frame older than the one it points to")]
    PointerEscape { function: String },

    #[error("`{function}` accessed a {expected} slot at {address:#x} as {found}")]
    AccessTypeMismatch {
        function: String,
        address: u64,
        expected: Type,
        found: Type,
    },

    #[error("external function `{symbol}` has no host binding")]
    UnboundExternal { symbol: String },

    #[error("external function `{symbol}` must take and return i32 values")]
    UnsupportedExternalSignature { symbol: String },

    #[error("host code panicked: {message}")]
    HostPanic { message: String },
}

/// Failures while generating a native trampoline.
#[derive(Error, Debug)]
pub enum TrampolineError {
    #[error("`{function}` is not a defined function")]
    NotDefined { function: String },

    #[error("`{function}`: {position} type {ty} has no native representation")]
    UnsupportedType {
        function: String,
        position: String,
        ty: Type,
    },

    #[error("native trampolines are not supported on this target")]
    UnsupportedTarget,

    #[error("cannot call a {count}-argument stub through `invoke`; use `cast`")]
    UnsupportedArity { count: usize },

    #[error("encoding failed: {0}")]
    Encoding(#[from] EncodingError),

    #[error("executable memory: {0}")]
    ExecutableMemory(String),
}

/// Any error produced by irbridge.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Trampoline(#[from] TrampolineError),
}

pub type BuildResult<T> = std::result::Result<T, BuildError>;
pub type ExecResult<T> = std::result::Result<T, ExecError>;

/// Result type alias for crate-level operations.
pub type Result<T> = std::result::Result<T, Error>;
