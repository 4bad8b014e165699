// This module hosts the interpreter: its configuration, the host binding table for external
// functions, and the execution engine itself. The interpreter only accepts finalized programs,
// so every function it runs has passed control-flow validation and carries a precomputed frame
// layout and argument layout.

//! IR interpreter.

pub mod config;
pub mod host;
pub mod interpreter;

pub use config::{InterpreterConfig, DEFAULT_MAX_CALL_DEPTH, DEFAULT_STACK_CAPACITY};
pub use host::HostFunctions;
pub use interpreter::{eval_binary, eval_unary, Interpreter, InterpreterStats};
