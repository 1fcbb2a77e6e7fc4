//! Translation between logical RAM addresses and host process addresses.
//!
//! Variable tables are written in the console's own address space
//! (e.g. `0x8033B170`). The emulator keeps that RAM somewhere inside its own
//! process, usually as 32-bit words in the host's byte order. When the host and
//! the console disagree on byte order, each word is stored reversed, so sub-word
//! accesses land at a swizzled address and multi-byte values must be flipped
//! word by word.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::memory::layout::ram;

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    EnumString,
    IntoStaticStr,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Endianness {
    #[default]
    Big,
    Little,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSpaceMapping {
    /// Host address of logical RAM offset 0
    #[serde(default, with = "crate::hex")]
    pub process_offset: u64,
    /// Byte order of the emulated CPU
    #[serde(default)]
    pub target: Endianness,
    /// Byte order the host uses for each stored RAM word
    #[serde(default = "default_host")]
    pub host: Endianness,
}

fn default_host() -> Endianness {
    Endianness::Little
}

impl Default for AddressSpaceMapping {
    fn default() -> Self {
        Self {
            process_offset: 0,
            target: Endianness::Big,
            host: Endianness::Little,
        }
    }
}

impl AddressSpaceMapping {
    pub fn new(process_offset: u64, target: Endianness, host: Endianness) -> Self {
        Self {
            process_offset,
            target,
            host,
        }
    }

    /// Mapping with RAM stored verbatim (no word swizzling)
    pub fn identity(process_offset: u64, order: Endianness) -> Self {
        Self::new(process_offset, order, order)
    }

    /// Whether stored words are byte-reversed relative to the target
    pub fn is_swizzled(&self) -> bool {
        self.target != self.host
    }

    /// Whether an access can be served by one contiguous host read
    ///
    /// Swizzled storage only keeps naturally aligned 1/2/4/8-byte values
    /// contiguous on the host side.
    pub fn is_contiguous(&self, address: u64, width: usize) -> bool {
        if !self.is_swizzled() {
            return true;
        }
        matches!(width, 1 | 2 | 4 | 8) && address % width as u64 == 0
    }

    /// Convert a logical RAM address to the host address of a `width`-byte access
    ///
    /// Only meaningful when [`Self::is_contiguous`] holds for the access;
    /// callers fall back to byte-sized accesses otherwise.
    pub fn to_process(&self, address: u64, width: usize) -> u64 {
        let physical = address & ram::PHYSICAL_MASK;
        self.process_offset + self.swizzle(physical, width)
    }

    /// Convert a host address back to a logical RAM address
    ///
    /// With `area` set the KSEG0 bit is applied; otherwise the bare physical
    /// offset is returned.
    pub fn to_ram(&self, process_address: u64, width: usize, area: bool) -> u64 {
        let physical = self.swizzle(process_address.wrapping_sub(self.process_offset), width);
        ram_address(physical, area)
    }

    fn swizzle(&self, address: u64, width: usize) -> u64 {
        if !self.is_swizzled() {
            return address;
        }
        match width {
            1 => address ^ 3,
            2 => address ^ 2,
            _ => address,
        }
    }

    /// Reorder bytes read from the host into target order, in place
    pub fn host_to_target(&self, bytes: &mut [u8]) {
        if self.is_swizzled() {
            for word in bytes.chunks_mut(ram::WORD as usize) {
                word.reverse();
            }
        }
    }

    /// Reorder target-order bytes into the host's stored order, in place
    pub fn target_to_host(&self, bytes: &mut [u8]) {
        // Reversing each word is its own inverse
        self.host_to_target(bytes);
    }
}

/// Apply the RAM address-area convention
pub fn ram_address(address: u64, area: bool) -> u64 {
    if area {
        (address & ram::PHYSICAL_MASK) | ram::KSEG0
    } else {
        address & ram::PHYSICAL_MASK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swizzled_sub_word_addresses() {
        let mapping = AddressSpaceMapping::new(0x1000_0000, Endianness::Big, Endianness::Little);

        assert_eq!(mapping.to_process(0x8033_B170, 4), 0x1033_B170);
        assert_eq!(mapping.to_process(0x8033_B170, 2), 0x1033_B172);
        assert_eq!(mapping.to_process(0x8033_B172, 2), 0x1033_B170);
        assert_eq!(mapping.to_process(0x8033_B171, 1), 0x1033_B172);
    }

    #[test]
    fn test_identity_mapping_is_not_swizzled() {
        let mapping = AddressSpaceMapping::identity(0x2000, Endianness::Big);
        assert!(!mapping.is_swizzled());
        assert_eq!(mapping.to_process(0x8000_0011, 1), 0x2011);
        assert!(mapping.is_contiguous(0x8000_0011, 4));
    }

    #[test]
    fn test_to_ram_inverts_to_process() {
        let mapping = AddressSpaceMapping::new(0x4000_0000, Endianness::Big, Endianness::Little);
        let process = mapping.to_process(0x8033_B17B, 1);
        assert_eq!(mapping.to_ram(process, 1, true), 0x8033_B17B);
        assert_eq!(mapping.to_ram(process, 1, false), 0x0033_B17B);
    }

    #[test]
    fn test_contiguity_requires_alignment_when_swizzled() {
        let mapping = AddressSpaceMapping::default();
        assert!(mapping.is_contiguous(0x8000_0004, 4));
        assert!(mapping.is_contiguous(0x8000_0008, 8));
        assert!(!mapping.is_contiguous(0x8000_0002, 4));
        assert!(!mapping.is_contiguous(0x8000_0000, 3));
    }

    #[test]
    fn test_host_to_target_reverses_each_word() {
        let mapping = AddressSpaceMapping::default();
        let mut bytes = [1, 2, 3, 4, 5, 6, 7, 8];
        mapping.host_to_target(&mut bytes);
        assert_eq!(bytes, [4, 3, 2, 1, 8, 7, 6, 5]);
    }

    #[test]
    fn test_ram_address_area() {
        assert_eq!(ram_address(0x0033_B170, true), 0x8033_B170);
        assert_eq!(ram_address(0x8033_B170, false), 0x0033_B170);
    }

    #[test]
    fn test_endianness_from_str() {
        assert_eq!("little".parse::<Endianness>().unwrap(), Endianness::Little);
        assert_eq!("BIG".parse::<Endianness>().unwrap(), Endianness::Big);
        assert!("middle".parse::<Endianness>().is_err());
    }
}
