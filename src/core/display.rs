//! Textual dump of finalized functions.
//!
//! ```text
//! define i32 @ack(i32, i32) {
//! bb0:
//!     %0 = arg 0 : i32
//!     %1 = const 0
//!     %2 = eq %0, %1
//!     condbr %2, bb1, bb2
//! }
//! ```

use std::fmt;

use super::function::{FuncId, Function, Operation};
use super::module::Program;

/// Prints one function of a program.
pub struct FunctionPrinter<'a> {
    program: &'a Program,
    id: FuncId,
}

impl<'a> FunctionPrinter<'a> {
    pub fn new(program: &'a Program, id: FuncId) -> Self {
        Self { program, id }
    }

    fn callee_name(&self, id: FuncId) -> &str {
        self.program
            .function(id)
            .map(Function::name)
            .unwrap_or("<unknown>")
    }

    fn write_op(&self, f: &mut fmt::Formatter<'_>, op: &Operation, ty: impl fmt::Display) -> fmt::Result {
        match op {
            Operation::ReadArg { target, index } => write!(f, "{target} = arg {index} : {ty}"),
            Operation::LiteralInt { target, value } => write!(f, "{target} = const {value}"),
            Operation::ReadMemory { target, pointer } => {
                write!(f, "{target} = load {ty}, {pointer}")
            }
            Operation::WriteMemory { pointer, source } => write!(f, "store {source}, {pointer}"),
            Operation::Unary {
                target,
                op,
                operand,
            } => write!(f, "{target} = {} {operand}", op.mnemonic()),
            Operation::Binary {
                target,
                op,
                lhs,
                rhs,
            } => write!(f, "{target} = {} {lhs}, {rhs}", op.mnemonic()),
            Operation::StackAlloc { target, slot } => {
                write!(f, "{target} = alloca slot{}", slot.0)
            }
            Operation::Call {
                target,
                callee,
                args,
            } => {
                write!(f, "{target} = call @{}(", self.callee_name(*callee))?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Operation::Branch { target } => write!(f, "br {target}"),
            Operation::CondBranch {
                test,
                then_block,
                else_block,
            } => write!(f, "condbr {test}, {then_block}, {else_block}"),
            Operation::Return { value } => write!(f, "ret {value}"),
        }
    }
}

impl fmt::Display for FunctionPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(function) = self.program.function(self.id) else {
            return write!(f, "; unknown function {}", self.id.0);
        };
        let sig = function.signature();
        let keyword = if function.is_defined() { "define" } else { "declare" };
        write!(f, "{keyword} {} @{}(", sig.ret, sig.name)?;
        for (i, arg) in sig.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")?;

        let func = match function {
            Function::External(ext) => return writeln!(f, " ; symbol {}", ext.symbol),
            Function::Defined(func) => func,
        };

        writeln!(f, " {{")?;
        for (b, block) in func.blocks.iter().enumerate() {
            writeln!(f, "bb{b}:")?;
            for op in &block.ops {
                write!(f, "    ")?;
                let ty = op
                    .target()
                    .and_then(|reg| func.reg_type(reg))
                    .map(|ty| ty.to_string())
                    .unwrap_or_default();
                self.write_op(f, op, ty)?;
                writeln!(f)?;
            }
        }
        writeln!(f, "}}")
    }
}

impl Program {
    /// Printable form of one function.
    pub fn display_function(&self, id: FuncId) -> FunctionPrinter<'_> {
        FunctionPrinter::new(self, id)
    }
}

#[cfg(test)]
mod tests {
    use crate::core::function::BinaryOp;
    use crate::core::module::Module;
    use crate::core::types::Type;

    #[test]
    fn test_print_add_one() {
        let mut module = Module::new();
        let f = module
            .declare_function("inc", vec![Type::INT], Type::INT)
            .unwrap();
        let ext = module
            .declare_external("host_inc", "rt_inc", vec![Type::INT], Type::INT)
            .unwrap();
        {
            let mut b = module.builder(f).unwrap();
            b.open_block();
            let x = b.read_argument(0).unwrap();
            let one = b.literal_integer(1).unwrap();
            let sum = b.binary_op(BinaryOp::Add, x, one).unwrap();
            let r = b.call(ext, &[sum]).unwrap();
            b.return_value(r).unwrap();
        }
        let program = module.finalize().unwrap();

        let text = program.display_function(f).to_string();
        assert_eq!(
            text,
            "define i32 @inc(i32) {\n\
             bb0:\n    \
             %0 = arg 0 : i32\n    \
             %1 = const 1\n    \
             %2 = add %0, %1\n    \
             %3 = call @host_inc(%2)\n    \
             ret %3\n\
             }\n"
        );
        assert_eq!(
            program.display_function(ext).to_string(),
            "declare i32 @host_inc(i32) ; symbol rt_inc\n"
        );
    }
}
