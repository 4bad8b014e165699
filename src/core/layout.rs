// This module implements the frame layout calculation. Given an ordered sequence of types it
// assigns each one a byte offset with a single linear scan: round the running size up to the
// type's alignment, record the offset, then add the type's size. This is the same algorithm a
// C compiler uses for the fields of a packed-as-declared struct. The result is deterministic,
// which matters because argument blocks built by a caller must agree with the offsets the
// callee reads from. A function's frame covers its registers followed by its stack slots; a
// call's argument block covers the callee's declared argument types.

//! Frame and argument block layout.

use super::function::{DefinedFunction, Reg, SlotId};
use super::types::Type;

/// Round `value` up to the alignment described by `align_mask`, or `None` on overflow.
pub const fn align_up(value: u32, align_mask: u32) -> Option<u32> {
    match value.checked_add(align_mask) {
        Some(v) => Some(v & !align_mask),
        None => None,
    }
}

/// Byte offsets for a sequence of types.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Layout {
    offsets: Vec<u32>,
    sizes: Vec<u32>,
    size: u32,
    align: u32,
}

impl Layout {
    /// Lay out `types` in order. Returns `None` if the total size overflows `u32`.
    pub fn compute<'a, I>(types: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Type>,
    {
        let mut layout = Layout {
            align: 1,
            ..Default::default()
        };
        for ty in types {
            let offset = align_up(layout.size, ty.align_mask())?;
            layout.offsets.push(offset);
            layout.sizes.push(ty.size());
            layout.size = offset.checked_add(ty.size())?;
            layout.align = layout.align.max(ty.align());
        }
        Some(layout)
    }

    pub fn offset(&self, index: usize) -> Option<u32> {
        self.offsets.get(index).copied()
    }

    /// `[offset, offset + size)` of the entry at `index`.
    pub fn range(&self, index: usize) -> Option<std::ops::Range<usize>> {
        let offset = *self.offsets.get(index)? as usize;
        let size = *self.sizes.get(index)? as usize;
        Some(offset..offset + size)
    }

    pub fn offsets(&self) -> &[u32] {
        &self.offsets
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Total size in bytes, without trailing padding.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Largest alignment of any entry.
    pub fn align(&self) -> u32 {
        self.align
    }
}

/// Layout of one defined function's frame: registers first, then stack slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameLayout {
    layout: Layout,
    reg_count: usize,
}

impl FrameLayout {
    /// `None` if the frame does not fit in `u32` bytes.
    pub fn for_function(func: &DefinedFunction) -> Option<Self> {
        let layout = Layout::compute(func.reg_types.iter().chain(func.slot_types.iter()))?;
        log::debug!(
            "frame layout for `{}`: {} registers, {} slots, {} bytes",
            func.signature.name,
            func.reg_types.len(),
            func.slot_types.len(),
            layout.size()
        );
        Some(Self {
            layout,
            reg_count: func.reg_types.len(),
        })
    }

    pub fn reg_range(&self, reg: Reg) -> Option<std::ops::Range<usize>> {
        if reg.index() >= self.reg_count {
            return None;
        }
        self.layout.range(reg.index())
    }

    pub fn slot_range(&self, slot: SlotId) -> Option<std::ops::Range<usize>> {
        self.layout.range(self.reg_count + slot.index())
    }

    pub fn reg_count(&self) -> usize {
        self.reg_count
    }

    pub fn size(&self) -> u32 {
        self.layout.size()
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }
}
