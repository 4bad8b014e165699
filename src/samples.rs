//! Sample IR programs.

use crate::core::{BinaryOp, BuildResult, FuncId, Module, Type};

/// Define `ack(m, n)` in `module` and return its id.
///
/// ```text
/// bb0: m == 0 ? bb1 : bb2
/// bb1: return n + 1
/// bb2: n == 0 ? bb3 : bb4
/// bb3: return ack(m - 1, 1)
/// bb4: return ack(m - 1, ack(m, n - 1))
/// ```
pub fn build_ackermann(module: &mut Module) -> BuildResult<FuncId> {
    let ack = module.declare_function("ack", vec![Type::INT, Type::INT], Type::INT)?;
    let mut b = module.builder(ack)?;

    let entry = b.open_block();
    let m_zero = b.open_block();
    let m_pos = b.open_block();
    let n_zero = b.open_block();
    let n_pos = b.open_block();

    b.switch_to_block(entry)?;
    let m = b.read_argument(0)?;
    let zero = b.literal_integer(0)?;
    let test = b.binary_op(BinaryOp::Eq, m, zero)?;
    b.conditional_branch(test, m_zero, m_pos)?;

    b.switch_to_block(m_zero)?;
    let n = b.read_argument(1)?;
    let one = b.literal_integer(1)?;
    let result = b.binary_op(BinaryOp::Add, n, one)?;
    b.return_value(result)?;

    b.switch_to_block(m_pos)?;
    let n = b.read_argument(1)?;
    let zero = b.literal_integer(0)?;
    let test = b.binary_op(BinaryOp::Eq, n, zero)?;
    b.conditional_branch(test, n_zero, n_pos)?;

    b.switch_to_block(n_zero)?;
    let m = b.read_argument(0)?;
    let one = b.literal_integer(1)?;
    let m_dec = b.binary_op(BinaryOp::Sub, m, one)?;
    let result = b.call(ack, &[m_dec, one])?;
    b.return_value(result)?;

    b.switch_to_block(n_pos)?;
    let m = b.read_argument(0)?;
    let n = b.read_argument(1)?;
    let one = b.literal_integer(1)?;
    let n_dec = b.binary_op(BinaryOp::Sub, n, one)?;
    let inner = b.call(ack, &[m, n_dec])?;
    let m_dec = b.binary_op(BinaryOp::Sub, m, one)?;
    let result = b.call(ack, &[m_dec, inner])?;
    b.return_value(result)?;

    Ok(ack)
}

/// Compiled reference implementation.
pub fn ack_native(m: i32, n: i32) -> i32 {
    match (m, n) {
        (0, n) => n + 1,
        (m, 0) => ack_native(m - 1, 1),
        (m, n) => ack_native(m - 1, ack_native(m, n - 1)),
    }
}
