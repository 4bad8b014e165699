// This module defines the value type model of the IR. A Type pairs a TypeKind tag with the
// size and alignment of the value it describes. Two built-in kinds exist: the 32-bit signed
// integer (type id 0) that all arithmetic operates on, and an opaque pointer into interpreter
// stack storage produced by stack allocations. User aggregates are registered through a
// TypeRegistry, which hands out ids starting at 1 and checks that the supplied alignment is a
// power of two and that the size is a multiple of it. Type compatibility is decided by kind
// equality alone; size and alignment are never compared directly since the kind already
// captures the full identity of a type.

//! Type descriptors for IR values.

use std::fmt;

use thiserror::Error;

/// Identity of a type. Compatibility checks compare kinds, never layouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// 32-bit signed integer, type id 0.
    Int,
    /// Opaque pointer into interpreter stack storage.
    Pointer,
    /// User-defined fixed-size aggregate, ids start at 1.
    Struct(u32),
}

/// Size and alignment of an IR value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Type {
    kind: TypeKind,
    size: u32,
    align_mask: u32,
}

impl Type {
    /// The built-in 32-bit signed integer.
    pub const INT: Type = Type {
        kind: TypeKind::Int,
        size: 4,
        align_mask: 3,
    };

    /// Pointer to a stack slot.
    pub const POINTER: Type = Type {
        kind: TypeKind::Pointer,
        size: 8,
        align_mask: 7,
    };

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Size in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Alignment in bytes (always a power of two).
    pub fn align(&self) -> u32 {
        self.align_mask + 1
    }

    /// `align() - 1`, the form used when rounding offsets.
    pub fn align_mask(&self) -> u32 {
        self.align_mask
    }

    /// Numeric type id: 0 for the integer, registry ids for structs.
    pub fn type_id(&self) -> Option<u32> {
        match self.kind {
            TypeKind::Int => Some(0),
            TypeKind::Struct(id) => Some(id),
            TypeKind::Pointer => None,
        }
    }

    pub fn is_int(&self) -> bool {
        self.kind == TypeKind::Int
    }

    pub fn is_pointer(&self) -> bool {
        self.kind == TypeKind::Pointer
    }

    /// Two types are compatible iff they have the same identity.
    pub fn compatible(&self, other: &Type) -> bool {
        self.kind == other.kind
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TypeKind::Int => write!(f, "i32"),
            TypeKind::Pointer => write!(f, "ptr"),
            TypeKind::Struct(id) => write!(f, "struct.{id}"),
        }
    }
}

/// Errors raised when registering a user type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    #[error("alignment {align} is not a power of two")]
    AlignmentNotPowerOfTwo { align: u32 },

    #[error("size {size} is not a multiple of alignment {align}")]
    SizeNotMultipleOfAlignment { size: u32, align: u32 },

    #[error("size {size} exceeds the 16 MiB limit")]
    TooLarge { size: u32 },
}

/// Largest size accepted by [`TypeRegistry::define_struct`].
pub const MAX_STRUCT_SIZE: u32 = 1 << 24;

/// Hands out ids for user-defined types.
#[derive(Debug)]
pub struct TypeRegistry {
    next_id: u32,
    defined: Vec<Type>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self {
            next_id: 1,
            defined: Vec::new(),
        }
    }
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new aggregate with the given size and alignment.
    pub fn define_struct(&mut self, size: u32, align: u32) -> Result<Type, TypeError> {
        if align == 0 || !align.is_power_of_two() {
            return Err(TypeError::AlignmentNotPowerOfTwo { align });
        }
        if size % align != 0 {
            return Err(TypeError::SizeNotMultipleOfAlignment { size, align });
        }
        if size > MAX_STRUCT_SIZE {
            return Err(TypeError::TooLarge { size });
        }

        let ty = Type {
            kind: TypeKind::Struct(self.next_id),
            size,
            align_mask: align - 1,
        };
        self.next_id += 1;
        self.defined.push(ty);
        Ok(ty)
    }

    /// All user types registered so far, in id order.
    pub fn defined(&self) -> &[Type] {
        &self.defined
    }
}
