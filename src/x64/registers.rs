//! Machine register identifiers.
//!
//! Registers are named by bank and encoding id. Only the general-purpose bank is
//! used by the entry stubs; ids follow the hardware encoding order.

/// Register bank identifier.
pub type RegBank = u8;

/// Register id within a bank.
pub type RegId = u8;

/// General-purpose bank.
pub const GP_BANK: RegBank = 0;

/// Combined register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsmReg {
    pub bank: RegBank,
    pub id: RegId,
}

impl AsmReg {
    pub const RAX: AsmReg = AsmReg::gp(0);
    pub const RCX: AsmReg = AsmReg::gp(1);
    pub const RDX: AsmReg = AsmReg::gp(2);
    pub const RBX: AsmReg = AsmReg::gp(3);
    pub const RSP: AsmReg = AsmReg::gp(4);
    pub const RBP: AsmReg = AsmReg::gp(5);
    pub const RSI: AsmReg = AsmReg::gp(6);
    pub const RDI: AsmReg = AsmReg::gp(7);
    pub const R8: AsmReg = AsmReg::gp(8);
    pub const R9: AsmReg = AsmReg::gp(9);

    pub const fn new(bank: RegBank, id: RegId) -> Self {
        Self { bank, id }
    }

    pub const fn gp(id: RegId) -> Self {
        Self::new(GP_BANK, id)
    }

    pub fn is_gp(&self) -> bool {
        self.bank == GP_BANK
    }

    /// Conventional 64-bit name, for logging.
    pub fn name(&self) -> &'static str {
        const NAMES: [&str; 16] = [
            "rax", "rcx", "rdx", "rbx", "rsp", "rbp", "rsi", "rdi", "r8", "r9", "r10", "r11",
            "r12", "r13", "r14", "r15",
        ];
        match self.bank {
            GP_BANK => NAMES.get(self.id as usize).copied().unwrap_or("?"),
            _ => "?",
        }
    }
}

impl std::fmt::Display for AsmReg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
