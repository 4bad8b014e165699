// This module wraps the iced-x86 code assembler for the instruction subset entry stubs use:
// stack frame setup and teardown, 32-bit and 64-bit moves between registers and RBP-relative
// memory, address materialization with LEA, 64-bit immediates for embedding host pointers,
// indirect calls and returns. Register operands are given as AsmReg and mapped onto iced-x86
// register types by width. Assembly errors from iced-x86 are surfaced as EncodingError so
// stub generation can propagate them with `?`. The emitted code is position independent,
// since the only absolute values it carries are immediates.

//! x86-64 instruction encoding using iced-x86.

use super::registers::AsmReg;
use iced_x86::code_asm::*;
use iced_x86::IcedError;
use thiserror::Error;

/// Instruction encoding failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodingError {
    #[error("register {0} is not valid for this operation")]
    InvalidRegister(AsmReg),

    #[error("assembly error: {0}")]
    AssemblyError(String),
}

type EncodeResult = Result<(), EncodingError>;

fn asm_err(e: IcedError) -> EncodingError {
    EncodingError::AssemblyError(e.to_string())
}

/// x86-64 instruction encoder.
pub struct X64Encoder {
    assembler: CodeAssembler,
    position: u64,
}

impl X64Encoder {
    pub fn new() -> Result<Self, EncodingError> {
        let assembler = CodeAssembler::new(64).map_err(asm_err)?;
        Ok(Self {
            assembler,
            position: 0,
        })
    }

    fn gp64(reg: AsmReg) -> Result<AsmRegister64, EncodingError> {
        const GP64_REGS: [AsmRegister64; 16] = [
            rax, rcx, rdx, rbx, rsp, rbp, rsi, rdi, r8, r9, r10, r11, r12, r13, r14, r15,
        ];
        if !reg.is_gp() {
            return Err(EncodingError::InvalidRegister(reg));
        }
        GP64_REGS
            .get(reg.id as usize)
            .copied()
            .ok_or(EncodingError::InvalidRegister(reg))
    }

    fn gp32(reg: AsmReg) -> Result<AsmRegister32, EncodingError> {
        const GP32_REGS: [AsmRegister32; 16] = [
            eax, ecx, edx, ebx, esp, ebp, esi, edi, r8d, r9d, r10d, r11d, r12d, r13d, r14d, r15d,
        ];
        if !reg.is_gp() {
            return Err(EncodingError::InvalidRegister(reg));
        }
        GP32_REGS
            .get(reg.id as usize)
            .copied()
            .ok_or(EncodingError::InvalidRegister(reg))
    }

    pub fn push_reg(&mut self, reg: AsmReg) -> EncodeResult {
        let reg = Self::gp64(reg)?;
        self.assembler.push(reg).map_err(asm_err)
    }

    pub fn pop_reg(&mut self, reg: AsmReg) -> EncodeResult {
        let reg = Self::gp64(reg)?;
        self.assembler.pop(reg).map_err(asm_err)
    }

    /// `mov dst, src` on 64-bit registers.
    pub fn mov_reg_reg(&mut self, dst: AsmReg, src: AsmReg) -> EncodeResult {
        let (dst, src) = (Self::gp64(dst)?, Self::gp64(src)?);
        self.assembler.mov(dst, src).map_err(asm_err)
    }

    /// `mov dst, imm64`.
    pub fn mov_reg_imm(&mut self, dst: AsmReg, imm: i64) -> EncodeResult {
        let dst = Self::gp64(dst)?;
        self.assembler.mov(dst, imm).map_err(asm_err)
    }

    pub fn sub_reg_imm(&mut self, dst: AsmReg, imm: i32) -> EncodeResult {
        let dst = Self::gp64(dst)?;
        self.assembler.sub(dst, imm).map_err(asm_err)
    }

    /// `mov dst32, dword [base + offset]`.
    pub fn mov32_reg_mem(&mut self, dst: AsmReg, base: AsmReg, offset: i32) -> EncodeResult {
        let (dst, base) = (Self::gp32(dst)?, Self::gp64(base)?);
        self.assembler
            .mov(dst, dword_ptr(base + offset))
            .map_err(asm_err)
    }

    /// `mov dword [base + offset], src32`.
    pub fn mov32_mem_reg(&mut self, base: AsmReg, offset: i32, src: AsmReg) -> EncodeResult {
        let (base, src) = (Self::gp64(base)?, Self::gp32(src)?);
        self.assembler
            .mov(dword_ptr(base + offset), src)
            .map_err(asm_err)
    }

    /// `mov dword [base + offset], imm32`.
    pub fn mov32_mem_imm(&mut self, base: AsmReg, offset: i32, imm: i32) -> EncodeResult {
        let base = Self::gp64(base)?;
        self.assembler
            .mov(dword_ptr(base + offset), imm)
            .map_err(asm_err)
    }

    /// `mov qword [base + offset], src`.
    pub fn mov64_mem_reg(&mut self, base: AsmReg, offset: i32, src: AsmReg) -> EncodeResult {
        let (base, src) = (Self::gp64(base)?, Self::gp64(src)?);
        self.assembler
            .mov(qword_ptr(base + offset), src)
            .map_err(asm_err)
    }

    /// `lea dst, [base + offset]`.
    pub fn lea(&mut self, dst: AsmReg, base: AsmReg, offset: i32) -> EncodeResult {
        let (dst, base) = (Self::gp64(dst)?, Self::gp64(base)?);
        self.assembler.lea(dst, base + offset).map_err(asm_err)
    }

    pub fn call_reg(&mut self, reg: AsmReg) -> EncodeResult {
        let reg = Self::gp64(reg)?;
        self.assembler.call(reg).map_err(asm_err)
    }

    pub fn ret(&mut self) -> EncodeResult {
        self.assembler.ret().map_err(asm_err)
    }

    /// `push rbp; mov rbp, rsp; sub rsp, frame_size`.
    pub fn emit_prologue(&mut self, frame_size: u32) -> EncodeResult {
        self.push_reg(AsmReg::RBP)?;
        self.mov_reg_reg(AsmReg::RBP, AsmReg::RSP)?;
        if frame_size > 0 {
            self.sub_reg_imm(AsmReg::RSP, frame_size as i32)?;
        }
        Ok(())
    }

    /// `mov rsp, rbp; pop rbp; ret`.
    pub fn emit_epilogue(&mut self) -> EncodeResult {
        self.mov_reg_reg(AsmReg::RSP, AsmReg::RBP)?;
        self.pop_reg(AsmReg::RBP)?;
        self.ret()
    }

    pub fn instruction_count(&self) -> usize {
        self.assembler.instructions().len()
    }

    /// Assemble everything emitted so far into machine code.
    pub fn finalize(&mut self) -> Result<Vec<u8>, EncodingError> {
        self.assembler.assemble(self.position).map_err(asm_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prologue_epilogue_bytes() {
        let mut encoder = X64Encoder::new().unwrap();
        encoder.emit_prologue(0).unwrap();
        encoder.emit_epilogue().unwrap();
        let code = encoder.finalize().unwrap();
        // push rbp; mov rbp,rsp; mov rsp,rbp; pop rbp; ret
        assert_eq!(code[0], 0x55);
        assert_eq!(*code.last().unwrap(), 0xC3);
        assert_eq!(encoder.instruction_count(), 5);
    }

    #[test]
    fn test_memory_moves() {
        let mut encoder = X64Encoder::new().unwrap();
        encoder.mov32_mem_reg(AsmReg::RBP, -16, AsmReg::RDI).unwrap();
        encoder.mov32_reg_mem(AsmReg::RAX, AsmReg::RBP, 24).unwrap();
        encoder.lea(AsmReg::RAX, AsmReg::RBP, -16).unwrap();
        encoder.mov64_mem_reg(AsmReg::RBP, -40, AsmReg::RAX).unwrap();
        encoder.mov_reg_imm(AsmReg::RAX, 0x1234_5678_9abc).unwrap();
        encoder.call_reg(AsmReg::RAX).unwrap();
        let code = encoder.finalize().unwrap();
        assert!(!code.is_empty());
        // call rax
        assert!(code.windows(2).any(|w| *w == [0xFF, 0xD0]));
    }

    #[test]
    fn test_rejects_foreign_bank() {
        let mut encoder = X64Encoder::new().unwrap();
        let foreign = AsmReg::new(1, 0);
        assert_eq!(
            encoder.push_reg(foreign),
            Err(EncodingError::InvalidRegister(foreign))
        );
    }
}
