//! Interpreter configuration.

/// Default limit on nested IR calls.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1 << 16;

/// Default initial capacity of the interpreter stack, in bytes.
pub const DEFAULT_STACK_CAPACITY: usize = 64 * 1024;

/// Tunables for one interpreter.
///
/// Nested calls run on an explicit activation stack, so the depth limit is
/// independent of the host thread's stack size. `None` disables the guard and
/// lets recursion grow until memory runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterpreterConfig {
    pub max_call_depth: Option<usize>,
    pub initial_stack_capacity: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            max_call_depth: Some(DEFAULT_MAX_CALL_DEPTH),
            initial_stack_capacity: DEFAULT_STACK_CAPACITY,
        }
    }
}

impl InterpreterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_call_depth(mut self, depth: Option<usize>) -> Self {
        self.max_call_depth = depth;
        self
    }

    pub fn with_initial_stack_capacity(mut self, bytes: usize) -> Self {
        self.initial_stack_capacity = bytes;
        self
    }
}
