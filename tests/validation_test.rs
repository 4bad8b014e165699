//! Finalize-time validation tests.

use irbridge::core::{BinaryOp, BlockId, Module, Reg, Type, ValidationError};

#[test]
fn test_empty_function_rejected() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut module = Module::new();
    module.declare_function("f", vec![], Type::INT).unwrap();
    assert_eq!(
        module.finalize().unwrap_err(),
        ValidationError::EmptyFunction {
            function: "f".to_string()
        }
    );
}

#[test]
fn test_block_without_terminator_rejected() {
    let mut module = Module::new();
    let f = module.declare_function("f", vec![], Type::INT).unwrap();
    {
        let mut b = module.builder(f).unwrap();
        b.open_block();
        let x = b.literal_integer(1).unwrap();
        b.return_value(x).unwrap();
        b.open_block();
        b.literal_integer(2).unwrap();
    }
    assert_eq!(
        module.finalize().unwrap_err(),
        ValidationError::MissingTerminator {
            function: "f".to_string(),
            block: BlockId(1)
        }
    );
}

#[test]
fn test_terminator_must_be_last() {
    let mut module = Module::new();
    let f = module.declare_function("f", vec![], Type::INT).unwrap();
    {
        let mut b = module.builder(f).unwrap();
        b.open_block();
        let x = b.literal_integer(1).unwrap();
        b.return_value(x).unwrap();
        b.return_value(x).unwrap();
    }
    assert!(matches!(
        module.finalize(),
        Err(ValidationError::TerminatorNotLast { .. })
    ));
}

#[test]
fn test_branch_target_must_exist() {
    let mut module = Module::new();
    let f = module.declare_function("f", vec![], Type::INT).unwrap();
    {
        let mut b = module.builder(f).unwrap();
        b.open_block();
        b.branch(BlockId(7)).unwrap();
    }
    assert_eq!(
        module.finalize().unwrap_err(),
        ValidationError::BranchTargetOutOfRange {
            function: "f".to_string(),
            block: BlockId(0),
            target: BlockId(7)
        }
    );
}

#[test]
fn test_use_must_be_dominated() {
    let mut module = Module::new();
    let f = module.declare_function("f", vec![Type::INT], Type::INT).unwrap();
    {
        // bb0: condbr %0, bb1, bb2
        // bb1: %1 = const 5; br bb2
        // bb2: ret %1   (not defined when coming from bb0)
        let mut b = module.builder(f).unwrap();
        let entry = b.open_block();
        let then_block = b.open_block();
        let join = b.open_block();

        b.switch_to_block(entry).unwrap();
        let t = b.read_argument(0).unwrap();
        b.conditional_branch(t, then_block, join).unwrap();

        b.switch_to_block(then_block).unwrap();
        let five = b.literal_integer(5).unwrap();
        b.branch(join).unwrap();

        b.switch_to_block(join).unwrap();
        b.return_value(five).unwrap();
    }
    assert_eq!(
        module.finalize().unwrap_err(),
        ValidationError::UseNotDominated {
            function: "f".to_string(),
            block: BlockId(2),
            reg: Reg(1)
        }
    );
}

#[test]
fn test_loop_with_dominating_definitions_accepted() {
    let mut module = Module::new();
    let f = module.declare_function("f", vec![Type::INT], Type::INT).unwrap();
    {
        // bb0: %0 = arg 0; br bb1
        // bb1: %1 = const 0; %2 = gt %0, %1; condbr %2, bb1, bb2
        // bb2: ret %0
        let mut b = module.builder(f).unwrap();
        let entry = b.open_block();
        let head = b.open_block();
        let exit = b.open_block();

        b.switch_to_block(entry).unwrap();
        let x = b.read_argument(0).unwrap();
        b.branch(head).unwrap();

        b.switch_to_block(head).unwrap();
        let zero = b.literal_integer(0).unwrap();
        let test = b.binary_op(BinaryOp::Gt, x, zero).unwrap();
        b.conditional_branch(test, head, exit).unwrap();

        b.switch_to_block(exit).unwrap();
        b.return_value(x).unwrap();
    }
    let program = module.finalize().unwrap();
    assert_eq!(program.len(), 1);
}
