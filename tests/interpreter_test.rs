//! Interpreter tests: control flow, calls, memory, faults and host bindings.

use irbridge::core::{BinaryOp, ExecError, FuncId, Module, Program, Type, UnaryOp};
use irbridge::interp::{HostFunctions, Interpreter, InterpreterConfig};

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// `select(t, a, b) = t != 0 ? a : b`
fn build_select() -> (Program, FuncId) {
    let mut module = Module::new();
    let f = module
        .declare_function("select", vec![Type::INT, Type::INT, Type::INT], Type::INT)
        .unwrap();
    {
        let mut b = module.builder(f).unwrap();
        let entry = b.open_block();
        let then_block = b.open_block();
        let else_block = b.open_block();

        b.switch_to_block(entry).unwrap();
        let t = b.read_argument(0).unwrap();
        b.conditional_branch(t, then_block, else_block).unwrap();

        b.switch_to_block(then_block).unwrap();
        let a = b.read_argument(1).unwrap();
        b.return_value(a).unwrap();

        b.switch_to_block(else_block).unwrap();
        let c = b.read_argument(2).unwrap();
        b.return_value(c).unwrap();
    }
    (module.finalize().unwrap(), f)
}

/// `binop(a, b)` for a single binary operator.
fn build_binary(op: BinaryOp) -> (Program, FuncId) {
    let mut module = Module::new();
    let f = module
        .declare_function("binop", vec![Type::INT, Type::INT], Type::INT)
        .unwrap();
    {
        let mut b = module.builder(f).unwrap();
        b.open_block();
        let x = b.read_argument(0).unwrap();
        let y = b.read_argument(1).unwrap();
        let r = b.binary_op(op, x, y).unwrap();
        b.return_value(r).unwrap();
    }
    (module.finalize().unwrap(), f)
}

/// `down(n) = n == 0 ? 0 : down(n - 1)`
fn build_countdown() -> (Program, FuncId) {
    let mut module = Module::new();
    let f = module
        .declare_function("down", vec![Type::INT], Type::INT)
        .unwrap();
    {
        let mut b = module.builder(f).unwrap();
        let entry = b.open_block();
        let done = b.open_block();
        let recurse = b.open_block();

        b.switch_to_block(entry).unwrap();
        let n = b.read_argument(0).unwrap();
        let zero = b.literal_integer(0).unwrap();
        let test = b.binary_op(BinaryOp::Eq, n, zero).unwrap();
        b.conditional_branch(test, done, recurse).unwrap();

        b.switch_to_block(done).unwrap();
        let zero = b.literal_integer(0).unwrap();
        b.return_value(zero).unwrap();

        b.switch_to_block(recurse).unwrap();
        let n = b.read_argument(0).unwrap();
        let one = b.literal_integer(1).unwrap();
        let next = b.binary_op(BinaryOp::Sub, n, one).unwrap();
        let r = b.call(f, &[next]).unwrap();
        b.return_value(r).unwrap();
    }
    (module.finalize().unwrap(), f)
}

#[test]
fn test_conditional_branch_selects_by_zero_test() {
    init();
    let (program, select) = build_select();
    let mut interp = Interpreter::new(&program);

    assert_eq!(interp.call_i32(select, &[1, 10, 20]).unwrap(), 10);
    assert_eq!(interp.call_i32(select, &[-7, 10, 20]).unwrap(), 10);
    assert_eq!(interp.call_i32(select, &[0, 10, 20]).unwrap(), 20);
}

#[test]
fn test_binary_operators() {
    init();
    let cases = [
        (BinaryOp::Add, 7, 5, 12),
        (BinaryOp::Sub, 7, 5, 2),
        (BinaryOp::Mul, 7, -5, -35),
        (BinaryOp::Div, 7, 2, 3),
        (BinaryOp::Rem, 7, 2, 1),
        (BinaryOp::Lt, 2, 3, 1),
        (BinaryOp::Ge, 2, 3, 0),
        (BinaryOp::Add, i32::MAX, 1, i32::MIN),
    ];
    for (op, a, b, expected) in cases {
        let (program, f) = build_binary(op);
        let result = Interpreter::new(&program).call_i32(f, &[a, b]).unwrap();
        assert_eq!(result, expected, "{op:?}({a}, {b})");
    }
}

#[test]
fn test_division_by_zero_faults() {
    init();
    for op in [BinaryOp::Div, BinaryOp::Rem] {
        let (program, f) = build_binary(op);
        let err = Interpreter::new(&program).call_i32(f, &[1, 0]).unwrap_err();
        assert_eq!(
            err,
            ExecError::DivisionByZero {
                function: "binop".to_string()
            }
        );
    }
}

#[test]
fn test_unary_operators() {
    let mut module = Module::new();
    let f = module.declare_function("f", vec![Type::INT], Type::INT).unwrap();
    {
        let mut b = module.builder(f).unwrap();
        b.open_block();
        let x = b.read_argument(0).unwrap();
        let neg = b.unary_op(UnaryOp::Neg, x).unwrap();
        let not = b.unary_op(UnaryOp::Not, neg).unwrap();
        let r = b.binary_op(BinaryOp::Add, neg, not).unwrap();
        b.return_value(r).unwrap();
    }
    let program = module.finalize().unwrap();
    let mut interp = Interpreter::new(&program);
    // -5 + !(-5) = -5 + 0
    assert_eq!(interp.call_i32(f, &[5]).unwrap(), -5);
    // -0 + !0 = 1
    assert_eq!(interp.call_i32(f, &[0]).unwrap(), 1);
}

#[test]
fn test_recursion_and_depth_guard() {
    init();
    let (program, down) = build_countdown();

    let mut interp = Interpreter::new(&program);
    assert_eq!(interp.call_i32(down, &[1000]).unwrap(), 0);
    assert_eq!(interp.stats().max_depth, 1001);

    let config = InterpreterConfig::new().with_max_call_depth(Some(10));
    let mut limited = Interpreter::with_config(&program, config);
    assert_eq!(limited.call_i32(down, &[9]).unwrap(), 0);
    assert_eq!(
        limited.call_i32(down, &[10]),
        Err(ExecError::CallDepthExceeded { limit: 10 })
    );
    // Frames of the aborted call tree are gone; the interpreter is reusable.
    assert_eq!(limited.call_i32(down, &[3]).unwrap(), 0);
}

#[test]
fn test_unbounded_depth() {
    let (program, down) = build_countdown();
    let config = InterpreterConfig::new().with_max_call_depth(None);
    let mut interp = Interpreter::with_config(&program, config);
    // Far deeper than the host stack would allow with native recursion.
    assert_eq!(interp.call_i32(down, &[200_000]).unwrap(), 0);
}

#[test]
fn test_pointer_passed_to_callee() {
    init();
    let mut module = Module::new();
    let bump = module
        .declare_function("bump", vec![Type::POINTER], Type::INT)
        .unwrap();
    let main = module.declare_function("main", vec![Type::INT], Type::INT).unwrap();
    {
        // bump(p): *p = *p + 1; return *p
        let mut b = module.builder(bump).unwrap();
        b.open_block();
        let p = b.read_argument(0).unwrap();
        let v = b.read_memory(p, Type::INT).unwrap();
        let one = b.literal_integer(1).unwrap();
        let next = b.binary_op(BinaryOp::Add, v, one).unwrap();
        b.write_memory(p, next).unwrap();
        let r = b.read_memory(p, Type::INT).unwrap();
        b.return_value(r).unwrap();
    }
    {
        // main(x): slot = x; bump(&slot); bump(&slot); return slot
        let mut b = module.builder(main).unwrap();
        b.open_block();
        let x = b.read_argument(0).unwrap();
        let slot = b.stack_allocate(Type::INT).unwrap();
        b.write_memory(slot, x).unwrap();
        b.call(bump, &[slot]).unwrap();
        b.call(bump, &[slot]).unwrap();
        let r = b.read_memory(slot, Type::INT).unwrap();
        b.return_value(r).unwrap();
    }
    let program = module.finalize().unwrap();
    let mut interp = Interpreter::new(&program);
    assert_eq!(interp.call_i32(main, &[40]).unwrap(), 42);
    assert_eq!(interp.stats().calls, 2);
}

#[test]
fn test_returning_own_frame_pointer_faults() {
    let mut module = Module::new();
    let leak = module.declare_function("leak", vec![], Type::POINTER).unwrap();
    let main = module.declare_function("main", vec![], Type::INT).unwrap();
    {
        let mut b = module.builder(leak).unwrap();
        b.open_block();
        let p = b.stack_allocate(Type::INT).unwrap();
        b.return_value(p).unwrap();
    }
    {
        let mut b = module.builder(main).unwrap();
        b.open_block();
        let p = b.call(leak, &[]).unwrap();
        let v = b.read_memory(p, Type::INT).unwrap();
        b.return_value(v).unwrap();
    }
    let program = module.finalize().unwrap();
    assert_eq!(
        Interpreter::new(&program).call_i32(main, &[]),
        Err(ExecError::DanglingPointer {
            function: "leak".to_string()
        })
    );
}

#[test]
fn test_pointer_into_caller_frame_may_be_stored_and_reused() {
    init();
    let mut module = Module::new();
    let set = module
        .declare_function("set", vec![Type::POINTER], Type::INT)
        .unwrap();
    let main = module.declare_function("main", vec![], Type::INT).unwrap();
    {
        // set(cell): *(*cell) = 5
        let mut b = module.builder(set).unwrap();
        b.open_block();
        let cell = b.read_argument(0).unwrap();
        let target = b.read_memory(cell, Type::POINTER).unwrap();
        let five = b.literal_integer(5).unwrap();
        b.write_memory(target, five).unwrap();
        b.return_value(five).unwrap();
    }
    {
        // main: x = 0; cell = &x; set(&cell); return x
        let mut b = module.builder(main).unwrap();
        b.open_block();
        let x = b.stack_allocate(Type::INT).unwrap();
        let cell = b.stack_allocate(Type::POINTER).unwrap();
        b.write_memory(cell, x).unwrap();
        b.call(set, &[cell]).unwrap();
        let r = b.read_memory(x, Type::INT).unwrap();
        b.return_value(r).unwrap();
    }
    let program = module.finalize().unwrap();
    assert_eq!(Interpreter::new(&program).call_i32(main, &[]).unwrap(), 5);
}

#[test]
fn test_storing_callee_slot_address_in_caller_faults() {
    init();
    let mut module = Module::new();
    let publish = module
        .declare_function("publish", vec![Type::POINTER], Type::INT)
        .unwrap();
    let clobber = module
        .declare_function("clobber", vec![Type::POINTER], Type::INT)
        .unwrap();
    let main = module.declare_function("main", vec![], Type::INT).unwrap();
    {
        // publish(out): *out = &own; return 0
        let mut b = module.builder(publish).unwrap();
        b.open_block();
        let out = b.read_argument(0).unwrap();
        let own = b.stack_allocate(Type::INT).unwrap();
        b.write_memory(out, own).unwrap();
        let zero = b.literal_integer(0).unwrap();
        b.return_value(zero).unwrap();
    }
    {
        // clobber(r): e = 7; *r = 1234; return e
        let mut b = module.builder(clobber).unwrap();
        b.open_block();
        let r = b.read_argument(0).unwrap();
        let e = b.literal_integer(7).unwrap();
        let junk = b.literal_integer(1234).unwrap();
        b.write_memory(r, junk).unwrap();
        b.return_value(e).unwrap();
    }
    {
        // main: publish(&cell); return clobber(cell)
        let mut b = module.builder(main).unwrap();
        b.open_block();
        let cell = b.stack_allocate(Type::POINTER).unwrap();
        b.call(publish, &[cell]).unwrap();
        let stale = b.read_memory(cell, Type::POINTER).unwrap();
        let r = b.call(clobber, &[stale]).unwrap();
        b.return_value(r).unwrap();
    }
    let program = module.finalize().unwrap();
    let mut interp = Interpreter::new(&program);
    let expected = Err(ExecError::PointerEscape {
        function: "publish".to_string(),
    });
    assert_eq!(interp.call_i32(main, &[]), expected);
    // Frames were released; the same fault is reported again.
    assert_eq!(interp.call_i32(main, &[]), expected);
}

#[test]
fn test_integer_stored_into_pointer_slot_faults() {
    init();
    let mut module = Module::new();
    let main = module.declare_function("main", vec![], Type::INT).unwrap();
    {
        let mut b = module.builder(main).unwrap();
        b.open_block();
        let cell = b.stack_allocate(Type::POINTER).unwrap();
        let forged = b.literal_integer(0x10000).unwrap();
        b.write_memory(cell, forged).unwrap();
        let p = b.read_memory(cell, Type::POINTER).unwrap();
        let v = b.read_memory(p, Type::INT).unwrap();
        b.return_value(v).unwrap();
    }
    let program = module.finalize().unwrap();
    match Interpreter::new(&program).call_i32(main, &[]) {
        Err(ExecError::AccessTypeMismatch {
            function,
            expected,
            found,
            ..
        }) => {
            assert_eq!(function, "main");
            assert_eq!(expected, Type::POINTER);
            assert_eq!(found, Type::INT);
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn test_pointer_loaded_from_integer_slot_faults() {
    init();
    let mut module = Module::new();
    let main = module.declare_function("main", vec![], Type::INT).unwrap();
    {
        let mut b = module.builder(main).unwrap();
        b.open_block();
        let big = b.stack_allocate(Type::INT).unwrap();
        let forged = b.literal_integer(0x10000).unwrap();
        b.write_memory(big, forged).unwrap();
        let p = b.read_memory(big, Type::POINTER).unwrap();
        let v = b.read_memory(p, Type::INT).unwrap();
        b.return_value(v).unwrap();
    }
    let program = module.finalize().unwrap();
    assert!(matches!(
        Interpreter::new(&program).call_i32(main, &[]),
        Err(ExecError::AccessTypeMismatch { expected, found, .. })
            if expected == Type::INT && found == Type::POINTER
    ));
}

#[test]
fn test_null_pointer_from_fresh_slot_faults() {
    let mut module = Module::new();
    let main = module.declare_function("main", vec![], Type::INT).unwrap();
    {
        let mut b = module.builder(main).unwrap();
        b.open_block();
        let cell = b.stack_allocate(Type::POINTER).unwrap();
        let p = b.read_memory(cell, Type::POINTER).unwrap();
        let v = b.read_memory(p, Type::INT).unwrap();
        b.return_value(v).unwrap();
    }
    let program = module.finalize().unwrap();
    assert_eq!(
        Interpreter::new(&program).call_i32(main, &[]),
        Err(ExecError::InvalidPointer {
            address: 0,
            size: 4
        })
    );
}

#[test]
fn test_host_functions() {
    init();
    let mut module = Module::new();
    let twice = module
        .declare_external("twice", "host_twice", vec![Type::INT], Type::INT)
        .unwrap();
    let missing = module
        .declare_external("missing", "host_missing", vec![], Type::INT)
        .unwrap();
    let f = module.declare_function("f", vec![Type::INT], Type::INT).unwrap();
    let g = module.declare_function("g", vec![], Type::INT).unwrap();
    {
        let mut b = module.builder(f).unwrap();
        b.open_block();
        let x = b.read_argument(0).unwrap();
        let r = b.call(twice, &[x]).unwrap();
        b.return_value(r).unwrap();
    }
    {
        let mut b = module.builder(g).unwrap();
        b.open_block();
        let r = b.call(missing, &[]).unwrap();
        b.return_value(r).unwrap();
    }
    let program = module.finalize().unwrap();

    let mut host = HostFunctions::new();
    host.bind("host_twice", |args| args[0] * 2);

    let mut interp = Interpreter::new(&program).with_host_functions(&host);
    assert_eq!(interp.call_i32(f, &[21]).unwrap(), 42);
    assert_eq!(
        interp.call_i32(g, &[]),
        Err(ExecError::UnboundExternal {
            symbol: "host_missing".to_string()
        })
    );
    assert!(matches!(
        interp.call_i32(twice, &[1]),
        Err(ExecError::NotDefined { .. })
    ));
}

#[test]
fn test_invoke_raw_checks_buffers() {
    let (program, select) = build_select();
    let mut interp = Interpreter::new(&program);
    let one = 1i32.to_ne_bytes();
    let two = 2i32.to_ne_bytes();
    let mut ret = [0u8; 4];

    assert!(matches!(
        interp.invoke_raw(select, &[&one, &two], &mut ret),
        Err(ExecError::ArgumentCount {
            expected: 3,
            found: 2,
            ..
        })
    ));
    assert!(matches!(
        interp.invoke_raw(select, &[&one, &two, &two[..2]], &mut ret),
        Err(ExecError::ArgumentSize { index: 2, .. })
    ));
    let mut short = [0u8; 2];
    assert!(matches!(
        interp.invoke_raw(select, &[&one, &two, &two], &mut short),
        Err(ExecError::ReturnSlotSize { .. })
    ));

    interp.invoke_raw(select, &[&one, &two, &one], &mut ret).unwrap();
    assert_eq!(i32::from_ne_bytes(ret), 2);
}
