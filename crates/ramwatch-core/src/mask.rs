//! Bit-field access within a memory cell.

use std::fmt;

use crate::marshal::ValueKind;

/// A contiguous run of set bits selecting a field inside a cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldMask(u64);

impl FieldMask {
    /// Returns `None` for zero or non-contiguous masks
    pub fn new(mask: u64) -> Option<Self> {
        if mask == 0 {
            return None;
        }
        let normalized = mask >> mask.trailing_zeros();
        // Contiguous ones shifted down form 2^n - 1
        if normalized & normalized.wrapping_add(1) != 0 {
            return None;
        }
        Some(Self(mask))
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    /// Position of the lowest set bit
    pub fn shift(&self) -> u32 {
        self.0.trailing_zeros()
    }

    /// Number of bits in the field
    pub fn width(&self) -> u32 {
        self.0.count_ones()
    }

    /// Largest value the field can hold
    pub fn full(&self) -> u64 {
        self.0 >> self.shift()
    }

    /// Whether every masked bit lies inside a cell of `kind`
    pub fn fits(&self, kind: ValueKind) -> bool {
        self.0 & !kind.cell_mask() == 0
    }

    pub fn get(&self, raw: u64) -> u64 {
        get_field(raw, self.0)
    }

    pub fn set(&self, raw: u64, value: u64) -> u64 {
        set_field(raw, self.0, value)
    }
}

impl fmt::Display for FieldMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:X}", self.0)
    }
}

/// Extract the field selected by `mask`, shifted down to bit 0
pub fn get_field(raw: u64, mask: u64) -> u64 {
    if mask == 0 {
        return 0;
    }
    (raw & mask) >> mask.trailing_zeros()
}

/// Replace the field selected by `mask`, leaving all other bits untouched
///
/// Bits of `value` that do not fit in the field are discarded.
pub fn set_field(raw: u64, mask: u64, value: u64) -> u64 {
    if mask == 0 {
        return raw;
    }
    let shifted = value.checked_shl(mask.trailing_zeros()).unwrap_or(0);
    (raw & !mask) | (shifted & mask)
}
