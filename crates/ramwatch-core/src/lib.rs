//! # ramwatch-core
//!
//! Core library for inspecting and editing the RAM of a running console
//! emulator.
//!
//! This crate provides:
//! - Per-release variable offsets and base-address resolution
//! - Typed, masked and computed access to emulated RAM
//! - Reentrant pausing so multi-field writes land atomically
//! - Windows process access and offline RAM images
//!
//! ## Feature Flags
//!
//! - `debug-tools`: Enables table dumps and hexdump formatting.
//!   This feature is intended for CLI tools and development, not production use.

pub mod config;
pub mod context;
#[cfg(feature = "debug-tools")]
pub mod debug;
pub mod error;
pub mod hex;
pub mod lock;
pub mod marshal;
pub mod mask;
pub mod memory;
pub mod prelude;
pub mod region;
pub mod resolve;
pub mod session;
pub mod special;
pub mod transaction;
pub mod variable;

pub use config::{SessionConfig, SessionConfigBuilder};
pub use context::AccessContext;
pub use error::{Error, Result};
pub use lock::{LockSet, VariableLock};
pub use marshal::{MarshalError, Value, ValueKind, decode, encode_numeric, encode_text};
pub use mask::{FieldMask, get_field, set_field};
pub use memory::{
    AddressSpaceMapping, Endianness, ForeignProcess, MemoryStream, ProcessControl, ProcessHandle,
    ProcessInfo, RamImage, ReadMemory, WriteMemory, list_processes,
};
pub use region::{
    FixedRegion, Region, RegionDetector, RegionOffsetSet, RegionSignature,
    SignatureRegionDetector, detect_region,
};
pub use resolve::{
    ActiveField, BaseAddressStrategy, BaseDefinition, BaseEnumerator, BaseSnapshot, resolve,
};
pub use session::{Batch, ResolvePolicy, Rotation, Session};
pub use special::{READ_ERROR, SpecialRegistry, SpecialVariable};
pub use transaction::{Transaction, Transactor};
pub use variable::{
    Codec, LiveVariable, NO_ADDRESS, VariableDefinition, VariableTable, VariableTableFile,
};

// Debug utilities (requires debug-tools feature)
#[cfg(feature = "debug-tools")]
pub use debug::{TableDump, VariableDump, format_hexdump};
