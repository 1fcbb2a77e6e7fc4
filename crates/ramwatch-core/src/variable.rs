//! Named live variables and the table they are loaded from.
//!
//! A [`LiveVariable`] binds a name to per-region offsets, a base strategy and
//! a codec (plain typed cell, masked bit-field, or special handler). Tables
//! are validated once at load and shared read-only afterwards.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::context::AccessContext;
use crate::error::{Error, Result};
use crate::marshal::{self, ValueKind};
use crate::mask::FieldMask;
use crate::memory::mapping::ram_address;
use crate::region::{Region, RegionOffsetSet, SignatureRegionDetector};
use crate::resolve::{self, BaseAddressStrategy, BaseDefinition, BaseEnumerator, BaseSnapshot};
use crate::special::{READ_ERROR, SpecialRegistry, SpecialVariable};

/// Shown when a variable resolves to no address
pub const NO_ADDRESS: &str = "(none)";

/// Declarative form of a variable as written in a table file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDefinition {
    pub name: String,
    #[serde(default)]
    pub offsets: RegionOffsetSet,
    #[serde(default)]
    pub base: BaseAddressStrategy,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub special: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::hex::option"
    )]
    pub mask: Option<u64>,
}

/// How a variable's value is read and written
#[derive(Clone)]
pub enum Codec {
    Marshaled {
        kind: ValueKind,
        mask: Option<FieldMask>,
    },
    Special {
        tag: String,
        handler: Arc<dyn SpecialVariable>,
    },
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Marshaled { kind, mask } => f
                .debug_struct("Marshaled")
                .field("kind", kind)
                .field("mask", mask)
                .finish(),
            Self::Special { tag, .. } => f.debug_struct("Special").field("tag", tag).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveVariable {
    name: String,
    offsets: RegionOffsetSet,
    base: BaseAddressStrategy,
    codec: Codec,
}

impl LiveVariable {
    /// Build a variable, rejecting definitions that can never work
    ///
    /// With `known_tags` set, relative bases must name one of them.
    pub fn from_definition(
        definition: &VariableDefinition,
        registry: &SpecialRegistry,
        known_tags: Option<&HashSet<String>>,
    ) -> Result<Self> {
        let name = definition.name.as_str();
        if name.trim().is_empty() {
            return Err(Error::invalid_variable(name, "name is empty"));
        }
        if definition.offsets.is_empty() {
            return Err(Error::invalid_variable(name, "no offset for any region"));
        }

        let codec = match (&definition.kind, &definition.special) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid_variable(name, "both type and special are set"));
            }
            (None, None) => {
                return Err(Error::invalid_variable(name, "one of type or special is required"));
            }
            (Some(kind), None) => {
                let kind: ValueKind = kind
                    .parse()
                    .map_err(|_| Error::invalid_variable(name, format!("unknown type '{}'", kind)))?;
                let mask = definition
                    .mask
                    .map(|bits| validate_mask(name, kind, bits))
                    .transpose()?;
                Codec::Marshaled { kind, mask }
            }
            (None, Some(tag)) => {
                if definition.mask.is_some() {
                    return Err(Error::invalid_variable(name, "special variables take no mask"));
                }
                if definition.base.is_absolute() {
                    return Err(Error::invalid_variable(
                        name,
                        "special variables need a relative base",
                    ));
                }
                let handler = registry.lookup(tag).ok_or_else(|| {
                    Error::invalid_variable(name, format!("unknown special '{}'", tag))
                })?;
                Codec::Special {
                    tag: tag.clone(),
                    handler,
                }
            }
        };

        if let (Some(known), Some(tag)) = (known_tags, definition.base.tag())
            && !known.contains(tag)
        {
            return Err(Error::invalid_variable(
                name,
                format!("unknown base '{}'", tag),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            offsets: definition.offsets,
            base: definition.base.clone(),
            codec,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn offsets(&self) -> &RegionOffsetSet {
        &self.offsets
    }

    pub fn base(&self) -> &BaseAddressStrategy {
        &self.base
    }

    pub fn codec(&self) -> &Codec {
        &self.codec
    }

    pub fn is_special(&self) -> bool {
        matches!(self.codec, Codec::Special { .. })
    }

    /// Bytes a single value occupies
    pub fn width(&self) -> usize {
        match &self.codec {
            Codec::Marshaled { kind, .. } => kind.width(),
            Codec::Special { .. } => 4,
        }
    }

    /// Current addresses of every instance of this variable
    pub fn addresses(&self, region: Region, snapshot: &BaseSnapshot) -> Vec<u64> {
        resolve::resolve(&self.offsets, &self.base, region, snapshot)
    }

    fn resolved(&self, ctx: &AccessContext<'_>, addresses: Option<&[u64]>) -> Vec<u64> {
        match addresses {
            Some(addresses) => addresses.to_vec(),
            None => self.addresses(ctx.region, ctx.bases),
        }
    }

    pub fn get_value(&self, ctx: &AccessContext<'_>, address: u64) -> String {
        match &self.codec {
            Codec::Marshaled { kind, mask } => {
                match ctx
                    .stream
                    .read_value(*kind, address, self.base.is_absolute(), *mask)
                {
                    Ok(value) => value.to_string(),
                    Err(e) => {
                        debug!("{}: {}", self.name, e);
                        READ_ERROR.to_string()
                    }
                }
            }
            Codec::Special { handler, .. } => handler.get(ctx, address),
        }
    }

    /// One display string per address, in address order
    ///
    /// Unreadable addresses show [`READ_ERROR`] instead of failing the list.
    pub fn get_values(&self, ctx: &AccessContext<'_>, addresses: Option<&[u64]>) -> Vec<String> {
        self.resolved(ctx, addresses)
            .into_iter()
            .map(|address| self.get_value(ctx, address))
            .collect()
    }

    /// Write `text` to every address inside one transaction
    ///
    /// Returns `Ok(false)` when nothing resolves, the text does not parse, or
    /// any single write fails; earlier writes are not rolled back. Fails only
    /// when the process cannot be paused.
    pub fn set_value(
        &self,
        ctx: &AccessContext<'_>,
        text: &str,
        addresses: Option<&[u64]>,
    ) -> Result<bool> {
        let addresses = self.resolved(ctx, addresses);
        if addresses.is_empty() {
            debug!("{} resolves to no address", self.name);
            return Ok(false);
        }

        let absolute = self.base.is_absolute();
        let setter: Box<dyn Fn(u64) -> bool + '_> = match &self.codec {
            Codec::Marshaled { kind, mask } => {
                let bits = match marshal::parse_bits(*kind, text) {
                    Ok(bits) => bits,
                    Err(e) => {
                        debug!("{}: {}", self.name, e);
                        return Ok(false);
                    }
                };
                let (kind, mask) = (*kind, *mask);
                Box::new(move |address| ctx.stream.write_bits(kind, bits, address, absolute, mask))
            }
            Codec::Special { handler, .. } => {
                Box::new(move |address| handler.set(ctx, text, address))
            }
        };

        let tx = ctx.begin()?;
        let mut success = true;
        for address in addresses {
            success &= setter(address);
        }
        // A failed resume is logged by the guard
        drop(tx);
        Ok(success)
    }

    /// Add `delta` to the value at one address
    ///
    /// The caller is expected to hold a transaction.
    pub fn adjust_value(&self, ctx: &AccessContext<'_>, delta: f64, address: u64) -> bool {
        match &self.codec {
            Codec::Marshaled { kind, mask } => {
                let absolute = self.base.is_absolute();
                match ctx.stream.read_value(*kind, address, absolute, *mask) {
                    Ok(value) => ctx.stream.write_value_numeric(
                        *kind,
                        value.as_f64() + delta,
                        address,
                        absolute,
                        *mask,
                    ),
                    Err(e) => {
                        debug!("{}: {}", self.name, e);
                        false
                    }
                }
            }
            Codec::Special { handler, .. } => match handler.get(ctx, address).parse::<f64>() {
                Ok(value) => handler.set(ctx, &(value + delta).to_string(), address),
                Err(_) => false,
            },
        }
    }

    /// `"u16"`, `"u8 with mask 0x0F"` or `"special (tag)"`
    pub fn type_description(&self) -> String {
        match &self.codec {
            Codec::Marshaled { kind, mask: None } => kind.to_string(),
            Codec::Marshaled {
                kind,
                mask: Some(mask),
            } => format!(
                "{} with mask 0x{:0width$X}",
                kind,
                mask.bits(),
                width = kind.width() * 2
            ),
            Codec::Special { tag, .. } => format!("special ({})", tag),
        }
    }

    /// Logical RAM address of the first instance
    ///
    /// With `area` set the address carries the KSEG0 segment bit. Special
    /// variables have no single cell and report `None`.
    pub fn ram_address(&self, ctx: &AccessContext<'_>, area: bool) -> Option<u64> {
        if self.is_special() {
            return None;
        }
        let address = *self.addresses(ctx.region, ctx.bases).first()?;
        Some(if self.base.is_absolute() {
            ctx.stream.mapping().to_ram(address, self.width(), area)
        } else {
            ram_address(address, area)
        })
    }

    /// Host process address of the first instance
    pub fn process_address(&self, ctx: &AccessContext<'_>) -> Option<u64> {
        if self.is_special() {
            return None;
        }
        let address = *self.addresses(ctx.region, ctx.bases).first()?;
        Some(
            ctx.stream
                .process_address(address, self.width(), self.base.is_absolute()),
        )
    }

    pub fn ram_address_string(&self, ctx: &AccessContext<'_>, area: bool) -> String {
        format_address(self.ram_address(ctx, area))
    }

    pub fn process_address_string(&self, ctx: &AccessContext<'_>) -> String {
        format_address(self.process_address(ctx))
    }
}

fn validate_mask(name: &str, kind: ValueKind, bits: u64) -> Result<FieldMask> {
    if kind.is_float() {
        return Err(Error::invalid_variable(name, "masks need an integer type"));
    }
    let mask = FieldMask::new(bits).ok_or_else(|| {
        Error::invalid_variable(
            name,
            format!("mask {:#x} is not one contiguous run of bits", bits),
        )
    })?;
    if !mask.fits(kind) {
        return Err(Error::invalid_variable(
            name,
            format!("mask {} is wider than {}", mask, kind),
        ));
    }
    Ok(mask)
}

fn format_address(address: Option<u64>) -> String {
    match address {
        Some(address) => format!("0x{:08X}", address),
        None => NO_ADDRESS.to_string(),
    }
}

/// On-disk layout of a variable table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableTableFile {
    #[serde(default)]
    pub bases: Vec<BaseDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_detection: Option<SignatureRegionDetector>,
    #[serde(default)]
    pub variables: Vec<VariableDefinition>,
}

/// Validated variables plus the base definitions they refer to
pub struct VariableTable {
    variables: Vec<Arc<LiveVariable>>,
    index: HashMap<String, usize>,
    enumerator: BaseEnumerator,
    detector: Option<SignatureRegionDetector>,
}

impl VariableTable {
    pub fn load(file: VariableTableFile, registry: &SpecialRegistry) -> Result<Self> {
        let enumerator = BaseEnumerator::new(file.bases)?;
        if let Some(detector) = &file.region_detection {
            detector.validate()?;
        }

        let known_tags = enumerator.known_tags();
        let mut variables = Vec::with_capacity(file.variables.len());
        let mut index = HashMap::new();
        for definition in &file.variables {
            let variable = LiveVariable::from_definition(definition, registry, Some(&known_tags))?;
            if index.insert(variable.name.clone(), variables.len()).is_some() {
                return Err(Error::invalid_variable(&variable.name, "defined twice"));
            }
            variables.push(Arc::new(variable));
        }

        info!(
            "Loaded {} variables over {} base definitions",
            variables.len(),
            enumerator.definitions().len()
        );

        Ok(Self {
            variables,
            index,
            enumerator,
            detector: file.region_detection,
        })
    }

    pub fn from_json(json: &str, registry: &SpecialRegistry) -> Result<Self> {
        let file: VariableTableFile = serde_json::from_str(json)?;
        Self::load(file, registry)
    }

    pub fn from_file<P: AsRef<Path>>(path: P, registry: &SpecialRegistry) -> Result<Self> {
        let content = fs::read_to_string(&path)?;
        debug!("Read variable table {}", path.as_ref().display());
        Self::from_json(&content, registry)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<LiveVariable>> {
        self.index.get(name).map(|&i| &self.variables[i])
    }

    /// Look up a variable that must exist
    pub fn require(&self, name: &str) -> Result<&Arc<LiveVariable>> {
        self.get(name)
            .ok_or_else(|| Error::UnknownVariable(name.to_string()))
    }

    /// Variables in table order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<LiveVariable>> {
        self.variables.iter()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn enumerator(&self) -> &BaseEnumerator {
        &self.enumerator
    }

    pub fn detector(&self) -> Option<&SignatureRegionDetector> {
        self.detector.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{AddressSpaceMapping, Endianness, MemoryStream, MockProcess, MockProcessBuilder};
    use crate::transaction::Transactor;
    use std::io::Write;
    use std::sync::atomic::Ordering;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn definition(json: &str) -> VariableDefinition {
        serde_json::from_str(json).unwrap()
    }

    fn build(json: &str) -> Result<LiveVariable> {
        LiveVariable::from_definition(&definition(json), &SpecialRegistry::with_builtins(), None)
    }

    struct Fixture {
        process: Arc<MockProcess>,
        stream: MemoryStream,
        transactor: Transactor,
        bases: BaseSnapshot,
    }

    impl Fixture {
        fn new(process: MockProcess) -> Self {
            let process = Arc::new(process);
            let stream = MemoryStream::new(process.clone(), AddressSpaceMapping::default());
            let transactor = Transactor::new(process.clone(), Duration::from_millis(10));
            Self {
                process,
                stream,
                transactor,
                bases: BaseSnapshot::new(),
            }
        }

        fn ctx(&self) -> AccessContext<'_> {
            AccessContext::new(&self.stream, &self.transactor, Region::Us, &self.bases)
        }
    }

    #[test]
    fn test_rejects_invalid_definitions() {
        let cases = [
            r#"{"name": "a", "offsets": {"default": 0}, "type": "u8", "special": "angle_degrees", "base": "object"}"#,
            r#"{"name": "b", "offsets": {"default": 0}}"#,
            r#"{"name": "c", "offsets": {"default": 0}, "type": "u24"}"#,
            r#"{"name": "d", "offsets": {"default": 0}, "special": "warp_speed", "base": "object"}"#,
            r#"{"name": "e", "offsets": {"default": 0}, "type": "u8", "mask": 0}"#,
            r#"{"name": "f", "offsets": {"default": 0}, "type": "u8", "mask": "0x05"}"#,
            r#"{"name": "g", "offsets": {"default": 0}, "type": "u8", "mask": "0x1F0"}"#,
            r#"{"name": "h", "offsets": {"default": 0}, "type": "f32", "mask": "0xFF"}"#,
            r#"{"name": "i", "offsets": {"default": 0}, "special": "angle_degrees"}"#,
            r#"{"name": "j", "type": "u8"}"#,
        ];
        for json in cases {
            let err = build(json).unwrap_err();
            assert!(
                matches!(err, Error::InvalidVariable { .. }),
                "{json} -> {err}"
            );
        }
    }

    #[test]
    fn test_unknown_base_tag_rejected_when_tags_known() {
        let known: HashSet<String> = ["ram".to_string()].into();
        let def = definition(r#"{"name": "x", "offsets": {"default": 0}, "type": "f32", "base": "player"}"#);
        let registry = SpecialRegistry::new();
        assert!(LiveVariable::from_definition(&def, &registry, Some(&known)).is_err());
        assert!(LiveVariable::from_definition(&def, &registry, None).is_ok());
    }

    #[test]
    fn test_type_descriptions() {
        let plain = build(r#"{"name": "a", "offsets": {"default": 0}, "type": "ushort"}"#).unwrap();
        assert_eq!(plain.type_description(), "u16");

        let masked = build(r#"{"name": "b", "offsets": {"default": 0}, "type": "u8", "mask": "0xF"}"#).unwrap();
        assert_eq!(masked.type_description(), "u8 with mask 0x0F");

        let special = build(
            r#"{"name": "c", "offsets": {"default": 0}, "special": "pendulum_amplitude", "base": "object"}"#,
        )
        .unwrap();
        assert_eq!(special.type_description(), "special (pendulum_amplitude)");
        assert!(special.is_special());
    }

    #[test]
    fn test_absolute_u16_wraps_end_to_end() {
        let fixture = Fixture::new(MockProcess::new(0, 0x100));
        let ctx = fixture.ctx();
        let variable = build(r#"{"name": "timer", "offsets": {"default": "0x10"}, "type": "u16"}"#).unwrap();

        assert_eq!(variable.addresses(Region::Jp, &fixture.bases), vec![0x10]);
        assert!(variable.set_value(&ctx, "70000", None).unwrap());
        assert_eq!(variable.get_values(&ctx, None), vec!["4464".to_string()]);
        assert_eq!(fixture.process.suspends.load(Ordering::SeqCst), 1);
        assert_eq!(fixture.process.resumes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_resolution_touches_nothing() {
        let fixture = Fixture::new(MockProcess::new(0, 0x100));
        let ctx = fixture.ctx();
        let variable =
            build(r#"{"name": "obj x", "offsets": {"default": "0xA0"}, "type": "f32", "base": "object"}"#).unwrap();

        assert!(variable.get_values(&ctx, None).is_empty());
        assert!(!variable.set_value(&ctx, "1.0", None).unwrap());
        assert_eq!(fixture.process.accesses(), 0);
        assert_eq!(fixture.process.suspends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_partial_failure_keeps_applied_writes() {
        let process = MockProcessBuilder::new(0, 0x100).faulting(0x24).build();
        let fixture = Fixture::new(process);
        let ctx = fixture.ctx();
        let variable = build(r#"{"name": "w", "offsets": {"default": 0}, "type": "u32", "base": "ram"}"#).unwrap();

        let addresses = [0x8000_0020, 0x8000_0024, 0x8000_0028];
        assert!(!variable.set_value(&ctx, "7", Some(&addresses)).unwrap());

        let values = variable.get_values(&ctx, Some(&addresses));
        assert_eq!(values, vec!["7".to_string(), READ_ERROR.to_string(), "7".to_string()]);
        assert_eq!(fixture.process.writes.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_parse_failure_touches_nothing() {
        let fixture = Fixture::new(MockProcess::new(0, 0x100));
        let ctx = fixture.ctx();
        let variable = build(r#"{"name": "t", "offsets": {"default": "0x10"}, "type": "s32"}"#).unwrap();

        assert!(!variable.set_value(&ctx, "ten", None).unwrap());
        assert_eq!(fixture.process.accesses(), 0);
        assert_eq!(fixture.process.suspends.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pause_failure_is_an_error() {
        let fixture = Fixture::new(MockProcess::new(0, 0x100));
        fixture.process.set_fail_suspend(true);
        let ctx = fixture.ctx();
        let variable = build(r#"{"name": "t", "offsets": {"default": "0x10"}, "type": "u8"}"#).unwrap();

        assert!(variable.set_value(&ctx, "1", None).unwrap_err().is_transaction());
        assert_eq!(fixture.process.writes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_addresses_strings() {
        let fixture = Fixture::new(MockProcess::new(0, 0x100));
        let ctx = fixture.ctx();
        let variable = build(r#"{"name": "r", "offsets": {"us": "0x8033B171"}, "type": "u8", "base": "ram"}"#).unwrap();

        let mut bases = BaseSnapshot::new();
        bases.insert("ram", 0);
        let ctx = ctx.with_bases(&bases);
        assert_eq!(variable.ram_address_string(&ctx, true), "0x8033B171");
        assert_eq!(variable.ram_address_string(&ctx, false), "0x0033B171");
        assert_eq!(variable.process_address_string(&ctx), "0x0033B172");

        let ctx = AccessContext::new(&fixture.stream, &fixture.transactor, Region::Jp, &bases);
        assert_eq!(variable.ram_address_string(&ctx, true), NO_ADDRESS);
    }

    #[test]
    fn test_special_has_no_address() {
        let fixture = Fixture::new(MockProcess::new(0, 0x100));
        let variable = build(
            r#"{"name": "yaw", "offsets": {"default": "0xD6"}, "special": "angle_degrees", "base": "object"}"#,
        )
        .unwrap();

        let mut bases = BaseSnapshot::new();
        bases.insert("object", 0x8000_0010);
        let ctx = fixture.ctx().with_bases(&bases);
        assert_eq!(variable.addresses(ctx.region, ctx.bases), vec![0x8000_00E6]);
        assert_eq!(variable.ram_address_string(&ctx, true), NO_ADDRESS);
        assert_eq!(variable.process_address_string(&ctx), NO_ADDRESS);
    }

    const TABLE: &str = r#"{
        "bases": [
            {"kind": "fixed", "tag": "player", "address": "0x80000100"}
        ],
        "variables": [
            {"name": "Player X", "offsets": {"default": "0x3C"}, "type": "f32", "base": "player"},
            {"name": "Frame", "offsets": {"us": "0x8032D5D4", "jp": "0x8032C694"}, "type": "u32", "base": "ram"}
        ]
    }"#;

    #[test]
    fn test_table_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();

        let table = VariableTable::from_file(file.path(), &SpecialRegistry::with_builtins()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("Frame").unwrap().type_description(), "u32");
        assert!(table.require("Mario X").unwrap_err().to_string().contains("Mario X"));
        let names: Vec<&str> = table.iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["Player X", "Frame"]);
    }

    #[test]
    fn test_table_rejects_duplicates_and_unknown_bases() {
        let registry = SpecialRegistry::with_builtins();
        let duplicate = r#"{"variables": [
            {"name": "a", "offsets": {"default": 0}, "type": "u8"},
            {"name": "a", "offsets": {"default": 1}, "type": "u8"}
        ]}"#;
        assert!(VariableTable::from_json(duplicate, &registry).is_err());

        let unknown_base = r#"{"variables": [
            {"name": "a", "offsets": {"default": 0}, "type": "u8", "base": "camera"}
        ]}"#;
        assert!(VariableTable::from_json(unknown_base, &registry).is_err());
    }

    #[test]
    fn test_bundled_table_loads() {
        let json = include_str!("../../../config/variables.json");
        let table = VariableTable::from_json(json, &SpecialRegistry::with_builtins()).unwrap();
        assert_eq!(table.enumerator().definitions().len(), 3);
        assert_eq!(table.get("HP Wedges").unwrap().type_description(), "u16 with mask 0x0F00");
        assert!(table.get("Pendulum Amplitude").unwrap().is_special());
        assert_eq!(table.get("Coins").unwrap().offsets().offset_for(Region::Pal), None);
    }
}
