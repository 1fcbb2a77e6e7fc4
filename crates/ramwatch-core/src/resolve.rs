//! Turning a variable's offsets into concrete addresses.
//!
//! A variable is either absolute (its offset is already a host address) or
//! relative to every live struct registered under a base tag. The live bases
//! are captured in a [`BaseSnapshot`] by a [`BaseEnumerator`], so resolution
//! itself is pure.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::marshal::ValueKind;
use crate::mask::FieldMask;
use crate::memory::MemoryStream;
use crate::memory::layout::{ram, tags};
use crate::region::{Region, RegionOffsetSet};

const ABSOLUTE: &str = "absolute";

/// Where a variable's offsets are measured from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum BaseAddressStrategy {
    /// The offset is a host process address
    #[default]
    Absolute,
    /// The offset is added to each live base under this tag
    Relative(String),
}

impl BaseAddressStrategy {
    pub fn is_absolute(&self) -> bool {
        matches!(self, Self::Absolute)
    }

    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Absolute => None,
            Self::Relative(tag) => Some(tag),
        }
    }
}

impl FromStr for BaseAddressStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::InvalidBase {
                tag: s.to_string(),
                reason: "base tag is empty".to_string(),
            });
        }
        if s.eq_ignore_ascii_case(ABSOLUTE) {
            Ok(Self::Absolute)
        } else {
            Ok(Self::Relative(s.to_string()))
        }
    }
}

impl TryFrom<String> for BaseAddressStrategy {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<BaseAddressStrategy> for String {
    fn from(strategy: BaseAddressStrategy) -> Self {
        strategy.to_string()
    }
}

impl fmt::Display for BaseAddressStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute => f.write_str(ABSOLUTE),
            Self::Relative(tag) => f.write_str(tag),
        }
    }
}

/// Live base addresses per tag, captured at one moment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BaseSnapshot {
    bases: HashMap<String, Vec<u64>>,
}

impl BaseSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: &str, base: u64) {
        self.bases.entry(tag.to_string()).or_default().push(base);
    }

    /// Bases under `tag` in enumeration order; empty for unknown tags
    pub fn get(&self, tag: &str) -> &[u64] {
        self.bases.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn first(&self, tag: &str) -> Option<u64> {
        self.get(tag).first().copied()
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.bases.keys().map(String::as_str)
    }
}

/// Concrete addresses for a variable in `region`
///
/// Returns an empty list when the region has no offset or the tag has no
/// live bases.
pub fn resolve(
    offsets: &RegionOffsetSet,
    strategy: &BaseAddressStrategy,
    region: Region,
    snapshot: &BaseSnapshot,
) -> Vec<u64> {
    let Some(offset) = offsets.offset_for(region) else {
        return Vec::new();
    };
    match strategy {
        BaseAddressStrategy::Absolute => vec![offset],
        BaseAddressStrategy::Relative(tag) => snapshot
            .get(tag)
            .iter()
            .map(|base| base.wrapping_add(offset))
            .collect(),
    }
}

/// Field that marks an object slot as occupied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveField {
    #[serde(with = "crate::hex")]
    pub offset: u64,
    #[serde(default = "default_active_kind")]
    pub kind: ValueKind,
    #[serde(default, with = "crate::hex::option")]
    pub mask: Option<u64>,
}

fn default_active_kind() -> ValueKind {
    ValueKind::U16
}

/// How the live structs under one tag are found
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaseDefinition {
    /// One struct at a fixed RAM address
    Fixed {
        tag: String,
        #[serde(with = "crate::hex")]
        address: u64,
    },
    /// A 32-bit pointer in RAM; null means no struct
    Pointer {
        tag: String,
        #[serde(with = "crate::hex")]
        address: u64,
    },
    /// A table of fixed-size slots, each live while its active field is non-zero
    SlotArray {
        tag: String,
        #[serde(with = "crate::hex")]
        first: u64,
        #[serde(with = "crate::hex")]
        stride: u64,
        count: usize,
        #[serde(default)]
        active: Option<ActiveField>,
    },
}

impl BaseDefinition {
    pub fn tag(&self) -> &str {
        match self {
            Self::Fixed { tag, .. } | Self::Pointer { tag, .. } | Self::SlotArray { tag, .. } => {
                tag
            }
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidBase {
            tag: self.tag().to_string(),
            reason: reason.to_string(),
        };

        let tag = self.tag();
        if tag.is_empty() || tag.eq_ignore_ascii_case(ABSOLUTE) || tag == tags::RAM {
            return Err(invalid("tag is empty or reserved"));
        }

        if let Self::SlotArray { stride, active, .. } = self {
            if *stride == 0 {
                return Err(invalid("slot stride must be non-zero"));
            }
            if let Some(active) = active
                && let Some(mask) = active.mask
            {
                let field = FieldMask::new(mask)
                    .ok_or_else(|| invalid("active mask must be one contiguous run of bits"))?;
                if !field.fits(active.kind) {
                    return Err(invalid("active mask is wider than its field"));
                }
            }
        }
        Ok(())
    }
}

/// Captures live bases from a set of definitions
#[derive(Debug, Clone, Default)]
pub struct BaseEnumerator {
    definitions: Vec<BaseDefinition>,
}

impl BaseEnumerator {
    pub fn new(definitions: Vec<BaseDefinition>) -> Result<Self> {
        for definition in &definitions {
            definition.validate()?;
        }
        Ok(Self { definitions })
    }

    pub fn definitions(&self) -> &[BaseDefinition] {
        &self.definitions
    }

    /// Every tag a variable may be relative to
    pub fn known_tags(&self) -> HashSet<String> {
        self.definitions
            .iter()
            .map(|d| d.tag().to_string())
            .chain(std::iter::once(tags::RAM.to_string()))
            .collect()
    }

    /// Read the current bases of every definition
    ///
    /// Unreadable pointers and slots are skipped.
    pub fn snapshot(&self, stream: &MemoryStream) -> BaseSnapshot {
        let mut snapshot = BaseSnapshot::new();
        snapshot.insert(tags::RAM, 0);

        for definition in &self.definitions {
            match definition {
                BaseDefinition::Fixed { tag, address } => snapshot.insert(tag, *address),
                BaseDefinition::Pointer { tag, address } => match stream.read_u32(*address) {
                    Ok(0) => {}
                    Ok(pointer) if is_ram_pointer(pointer as u64) => {
                        snapshot.insert(tag, pointer as u64)
                    }
                    Ok(pointer) => debug!("Ignoring {} pointer {:#x} outside RAM", tag, pointer),
                    Err(e) => debug!("Failed to read {} pointer: {}", tag, e),
                },
                BaseDefinition::SlotArray {
                    tag,
                    first,
                    stride,
                    count,
                    active,
                } => {
                    for i in 0..*count as u64 {
                        let slot = first + i * stride;
                        if slot_is_live(stream, slot, active.as_ref()) {
                            snapshot.insert(tag, slot);
                        }
                    }
                }
            }
        }

        snapshot
    }
}

fn is_ram_pointer(pointer: u64) -> bool {
    (pointer & ram::PHYSICAL_MASK) < ram::SIZE
}

fn slot_is_live(stream: &MemoryStream, slot: u64, active: Option<&ActiveField>) -> bool {
    let Some(active) = active else {
        return true;
    };
    let mask = active.mask.and_then(FieldMask::new);
    match stream.read_value(active.kind, slot + active.offset, false, mask) {
        Ok(value) => value.as_f64() != 0.0,
        Err(e) => {
            debug!("Failed to read slot {:#x}: {}", slot, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{AddressSpaceMapping, Endianness, MockProcessBuilder};
    use std::sync::Arc;

    fn snapshot() -> BaseSnapshot {
        let mut snapshot = BaseSnapshot::new();
        snapshot.insert("object", 0x8034_0000);
        snapshot.insert("object", 0x8034_0260);
        snapshot
    }

    #[test]
    fn test_absolute_yields_offset() {
        let offsets = RegionOffsetSet::uniform(0x10);
        let addresses = resolve(&offsets, &BaseAddressStrategy::Absolute, Region::Us, &snapshot());
        assert_eq!(addresses, vec![0x10]);
    }

    #[test]
    fn test_relative_adds_offset_to_each_base() {
        let offsets = RegionOffsetSet::uniform(0xA0);
        let strategy = BaseAddressStrategy::Relative("object".to_string());
        let addresses = resolve(&offsets, &strategy, Region::Jp, &snapshot());
        assert_eq!(addresses, vec![0x8034_00A0, 0x8034_0300]);
    }

    #[test]
    fn test_unknown_tag_resolves_empty() {
        let offsets = RegionOffsetSet::uniform(0xA0);
        let strategy = BaseAddressStrategy::Relative("camera".to_string());
        assert!(resolve(&offsets, &strategy, Region::Us, &snapshot()).is_empty());
    }

    #[test]
    fn test_missing_offset_resolves_empty() {
        let offsets = RegionOffsetSet {
            us: Some(4),
            ..RegionOffsetSet::default()
        };
        let addresses = resolve(&offsets, &BaseAddressStrategy::Absolute, Region::Pal, &snapshot());
        assert!(addresses.is_empty());
    }

    #[test]
    fn test_strategy_from_text() {
        assert_eq!(
            "Absolute".parse::<BaseAddressStrategy>().unwrap(),
            BaseAddressStrategy::Absolute
        );
        assert_eq!(
            "object".parse::<BaseAddressStrategy>().unwrap(),
            BaseAddressStrategy::Relative("object".to_string())
        );
        assert!("  ".parse::<BaseAddressStrategy>().is_err());
    }

    #[test]
    fn test_definitions_from_json() {
        let json = r#"[
            {"kind": "fixed", "tag": "player", "address": "0x8033B170"},
            {"kind": "pointer", "tag": "camera", "address": "0x8033C6D4"},
            {"kind": "slot_array", "tag": "object", "first": "0x8033D488",
             "stride": "0x260", "count": 240, "active": {"offset": "0x74"}}
        ]"#;
        let definitions: Vec<BaseDefinition> = serde_json::from_str(json).unwrap();
        assert_eq!(definitions[0].tag(), "player");
        assert!(matches!(
            definitions[2],
            BaseDefinition::SlotArray { count: 240, active: Some(ActiveField { kind: ValueKind::U16, .. }), .. }
        ));
        BaseEnumerator::new(definitions).unwrap();
    }

    #[test]
    fn test_rejects_reserved_and_degenerate_definitions() {
        let reserved = BaseDefinition::Fixed {
            tag: "absolute".to_string(),
            address: 0,
        };
        assert!(BaseEnumerator::new(vec![reserved]).is_err());

        let zero_stride = BaseDefinition::SlotArray {
            tag: "object".to_string(),
            first: 0,
            stride: 0,
            count: 4,
            active: None,
        };
        assert!(BaseEnumerator::new(vec![zero_stride]).is_err());
    }

    #[test]
    fn test_snapshot_reads_live_bases() {
        let process = MockProcessBuilder::new(0, 0x1000)
            // camera pointer -> 0x80000400
            .bytes(0x10, &[0x80, 0x00, 0x04, 0x00])
            // held object pointer is null
            .bytes(0x14, &[0, 0, 0, 0])
            // slot 0 live, slot 1 empty, slot 2 live
            .bytes(0x200, &[0x00, 0x01])
            .bytes(0x240, &[0x00, 0x00])
            .bytes(0x280, &[0x80, 0x00])
            .build();
        let stream = MemoryStream::new(
            Arc::new(process),
            AddressSpaceMapping::identity(0, Endianness::Big),
        );

        let enumerator = BaseEnumerator::new(vec![
            BaseDefinition::Fixed {
                tag: "player".to_string(),
                address: 0x8000_0100,
            },
            BaseDefinition::Pointer {
                tag: "camera".to_string(),
                address: 0x8000_0010,
            },
            BaseDefinition::Pointer {
                tag: "held".to_string(),
                address: 0x8000_0014,
            },
            BaseDefinition::SlotArray {
                tag: "object".to_string(),
                first: 0x8000_0200,
                stride: 0x40,
                count: 3,
                active: Some(ActiveField {
                    offset: 0,
                    kind: ValueKind::U16,
                    mask: None,
                }),
            },
        ])
        .unwrap();

        let snapshot = enumerator.snapshot(&stream);
        assert_eq!(snapshot.get("ram"), &[0]);
        assert_eq!(snapshot.get("player"), &[0x8000_0100]);
        assert_eq!(snapshot.get("camera"), &[0x8000_0400]);
        assert!(snapshot.get("held").is_empty());
        assert_eq!(snapshot.get("object"), &[0x8000_0200, 0x8000_0280]);
        assert!(enumerator.known_tags().contains("object"));
    }
}
