//! Ackermann demo: builds `ack` as IR and calls it through a native entry point.
//!
//! The result and wall-clock time are compared with a compiled implementation.
//! Logging is controlled by `RUST_LOG`.

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use irbridge::core::Module;
use irbridge::interp::{Interpreter, InterpreterConfig, DEFAULT_MAX_CALL_DEPTH};
use irbridge::samples::{ack_native, build_ackermann};
use irbridge::x64::Trampoline;

#[derive(Parser, Debug)]
#[command(name = "ackermann")]
#[command(about = "Run Ackermann through the IR interpreter and a native trampoline", long_about = None)]
struct Args {
    /// First argument
    #[arg(default_value_t = 3, value_parser = clap::value_parser!(i32).range(0..))]
    m: i32,

    /// Second argument
    #[arg(default_value_t = 8, value_parser = clap::value_parser!(i32).range(0..))]
    n: i32,

    /// Print the IR before running it
    #[arg(long)]
    dump_ir: bool,

    /// Maximum nested IR calls (0 disables the limit)
    #[arg(long, value_name = "D", default_value_t = DEFAULT_MAX_CALL_DEPTH)]
    max_call_depth: usize,

    /// Call the interpreter directly instead of through a native entry point
    #[arg(long)]
    interpreter_only: bool,
}

/// Returns whether both implementations agree.
fn run(args: &Args) -> irbridge::Result<bool> {
    let mut module = Module::new();
    let ack = build_ackermann(&mut module)?;
    let program = module.finalize()?;

    if args.dump_ir {
        print!("{}", program.display_function(ack));
    }

    let depth = (args.max_call_depth > 0).then_some(args.max_call_depth);
    let config = InterpreterConfig::new().with_max_call_depth(depth);

    let start = Instant::now();
    let expected = ack_native(args.m, args.n);
    let native_time = start.elapsed();
    println!(
        "compiled:    ack({}, {}) = {expected} in {:.3} ms",
        args.m,
        args.n,
        native_time.as_secs_f64() * 1000.0
    );

    let (label, result, elapsed) = if args.interpreter_only {
        let mut interp = Interpreter::with_config(&program, config);
        let start = Instant::now();
        let result = interp.call_i32(ack, &[args.m, args.n])?;
        let elapsed = start.elapsed();
        let stats = interp.stats();
        log::info!(
            "{} calls, {} instructions, max depth {}",
            stats.calls,
            stats.instructions,
            stats.max_depth
        );
        ("interpreted:", result, elapsed)
    } else {
        let trampoline = Trampoline::new(&program, ack)?.with_config(config);
        let start = Instant::now();
        let result = trampoline.invoke(&[args.m, args.n])?;
        ("trampoline:", result, start.elapsed())
    };
    println!(
        "{label} ack({}, {}) = {result} in {:.3} ms",
        args.m,
        args.n,
        elapsed.as_secs_f64() * 1000.0
    );

    if result != expected {
        log::error!("result mismatch: {result} != {expected}");
    }
    Ok(result == expected)
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(&args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
