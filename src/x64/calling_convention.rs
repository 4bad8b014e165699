// This module implements the part of the System V AMD64 calling convention that entry stubs
// need. Every IR scalar the stubs accept is an integer class value, so only general-purpose
// assignment is modelled: the first six arguments arrive in RDI, RSI, RDX, RCX, R8 and R9,
// the rest in 8-byte stack slots above the return address, and the result leaves in RAX.
// EntryFrame records the assignment of each argument together with the stub's own frame:
// one spill slot per argument, the return slot, and the argument pointer array handed to
// the interpreter bridge. Frames are planned in a bumpalo arena because a plan only lives
// for the duration of one stub generation.

//! System V x86-64 argument assignment and entry stub frames.

use super::registers::AsmReg;
use bumpalo::{collections::Vec as BumpVec, Bump};

/// Argument or return value assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CCAssignment {
    /// Size of the value in bytes.
    pub size: u32,
    /// Required alignment in bytes.
    pub align: u32,
    /// Assigned register, if any.
    pub reg: Option<AsmReg>,
    /// Offset above the first stack argument, if passed in memory.
    pub stack_off: Option<i32>,
}

impl CCAssignment {
    pub fn new(size: u32, align: u32) -> Self {
        Self {
            size,
            align,
            reg: None,
            stack_off: None,
        }
    }
}

/// Argument assignment for one calling convention.
pub trait CCAssigner {
    /// Assign the next argument.
    fn assign_arg(&mut self, arg: &mut CCAssignment);

    /// Assign the return value.
    fn assign_ret(&mut self, ret: &mut CCAssignment);

    /// Reset state for a new signature.
    fn reset(&mut self);

    /// Stack bytes consumed by arguments so far.
    fn stack_size(&self) -> u32;
}

/// System V x86-64 assigner for integer class values.
#[derive(Debug, Default)]
pub struct SysVAssigner {
    gp_cnt: usize,
    stack: u32,
    ret_assigned: bool,
}

impl SysVAssigner {
    pub const GP_ARG_REGS: [AsmReg; 6] = [
        AsmReg::RDI,
        AsmReg::RSI,
        AsmReg::RDX,
        AsmReg::RCX,
        AsmReg::R8,
        AsmReg::R9,
    ];

    pub const RET_REG: AsmReg = AsmReg::RAX;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn gp_used(&self) -> usize {
        self.gp_cnt
    }
}

impl CCAssigner for SysVAssigner {
    fn assign_arg(&mut self, arg: &mut CCAssignment) {
        if let Some(&reg) = Self::GP_ARG_REGS.get(self.gp_cnt) {
            arg.reg = Some(reg);
            self.gp_cnt += 1;
        } else {
            self.stack = align_to(self.stack, arg.align.max(8));
            arg.stack_off = Some(self.stack as i32);
            self.stack += align_to(arg.size, 8);
        }
    }

    fn assign_ret(&mut self, ret: &mut CCAssignment) {
        if !self.ret_assigned && ret.size <= 8 {
            ret.reg = Some(Self::RET_REG);
            self.ret_assigned = true;
        }
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    fn stack_size(&self) -> u32 {
        align_to(self.stack, 16)
    }
}

fn align_to(value: u32, align: u32) -> u32 {
    (value + align - 1) & !(align - 1)
}

/// Frame of an entry stub, relative to RBP after the standard prologue.
///
/// ```text
/// rbp + 16 + k   incoming stack arguments
/// rbp + 8        return address
/// rbp            saved rbp
/// rbp - 8        return slot
/// rbp - 16 - 8i  spilled argument i
/// rbp - 8 - 16n  argument pointer array, entry i at +8i
/// ```
#[derive(Debug)]
pub struct EntryFrame<'a> {
    pub arg_assignments: BumpVec<'a, CCAssignment>,
    pub ret_assignment: Option<CCAssignment>,
    /// Bytes reserved below RBP, 16-byte aligned.
    pub frame_size: u32,
}

impl<'a> EntryFrame<'a> {
    pub const RET_SLOT: i32 = -8;

    pub fn new(arena: &'a Bump) -> Self {
        Self {
            arg_assignments: BumpVec::new_in(arena),
            ret_assignment: None,
            frame_size: 0,
        }
    }

    /// Assign `args` and the return value with `assigner`, then size the frame.
    pub fn plan(
        arena: &'a Bump,
        assigner: &mut impl CCAssigner,
        args: impl IntoIterator<Item = CCAssignment>,
        ret: CCAssignment,
    ) -> Self {
        let mut frame = Self::new(arena);
        assigner.reset();
        for mut arg in args {
            assigner.assign_arg(&mut arg);
            frame.arg_assignments.push(arg);
        }
        let mut ret = ret;
        assigner.assign_ret(&mut ret);
        frame.ret_assignment = Some(ret);
        frame.calculate_frame_size();
        frame
    }

    pub fn calculate_frame_size(&mut self) {
        let n = self.arg_assignments.len() as u32;
        self.frame_size = align_to(8 + 16 * n, 16);
    }

    /// RBP-relative offset of the spill slot for argument `index`.
    pub fn value_offset(&self, index: usize) -> i32 {
        -16 - 8 * index as i32
    }

    /// RBP-relative offset of the argument pointer array.
    pub fn pointer_array_offset(&self) -> i32 {
        -8 - 16 * self.arg_assignments.len() as i32
    }

    /// RBP-relative offset of an incoming stack argument.
    pub fn incoming_offset(stack_off: i32) -> i32 {
        16 + stack_off
    }
}
