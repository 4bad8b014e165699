//! Ackermann through the interpreter and, where supported, a native entry point.

use irbridge::core::Module;
use irbridge::interp::Interpreter;
use irbridge::samples::{ack_native, build_ackermann};

const CASES: [(i32, i32, i32); 5] = [(0, 0, 1), (1, 0, 2), (2, 2, 7), (3, 3, 61), (3, 8, 2045)];

#[test]
fn test_ackermann_interpreted() {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut module = Module::new();
    let ack = build_ackermann(&mut module).unwrap();
    let program = module.finalize().unwrap();
    let mut interp = Interpreter::new(&program);

    for (m, n, expected) in CASES {
        assert_eq!(ack_native(m, n), expected);
        assert_eq!(interp.call_i32(ack, &[m, n]).unwrap(), expected, "ack({m}, {n})");
    }
    assert!(interp.stats().calls > 0);
}

#[test]
fn test_ackermann_ir_dump() {
    let mut module = Module::new();
    let ack = build_ackermann(&mut module).unwrap();
    let program = module.finalize().unwrap();
    let text = program.display_function(ack).to_string();

    assert!(text.starts_with("define i32 @ack(i32, i32) {\n"));
    assert_eq!(text.matches("call @ack(").count(), 3);
    for block in ["bb0:", "bb1:", "bb2:", "bb3:", "bb4:"] {
        assert!(text.contains(block), "missing {block} in\n{text}");
    }
}

#[cfg(all(target_arch = "x86_64", unix))]
#[test]
fn test_ackermann_native_entry() {
    use irbridge::x64::Trampoline;

    let _ = env_logger::builder().is_test(true).try_init();

    let mut module = Module::new();
    let ack = build_ackermann(&mut module).unwrap();
    let program = module.finalize().unwrap();
    let trampoline = Trampoline::new(&program, ack).unwrap();
    let native: extern "C" fn(i32, i32) -> i32 = unsafe { trampoline.cast() };

    for (m, n, expected) in CASES {
        assert_eq!(native(m, n), expected, "ack({m}, {n})");
        assert_eq!(trampoline.invoke(&[m, n]).unwrap(), expected);
    }
}
