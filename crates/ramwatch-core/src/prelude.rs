//! Prelude module for convenient imports
//!
//! ```ignore
//! use ramwatch_core::prelude::*;
//! ```
//!
//! This brings the following into scope:
//!
//! - Sessions: `Session`, `SessionConfig`, `ResolvePolicy`, `Rotation`
//! - Variables: `LiveVariable`, `VariableTable`, `LockSet`
//! - Specials: `SpecialRegistry`, `SpecialVariable`
//! - Memory: `MemoryStream`, `RamImage`, `ProcessHandle`, `AddressSpaceMapping`
//! - Error handling: `Error`, `Result`

// Session types
pub use crate::config::{SessionConfig, SessionConfigBuilder};
pub use crate::session::{Batch, ResolvePolicy, Rotation, Session};

// Error handling
pub use crate::error::{Error, Result};

// Variables
pub use crate::context::AccessContext;
pub use crate::lock::{LockSet, VariableLock};
pub use crate::variable::{LiveVariable, VariableDefinition, VariableTable};

// Special variables
pub use crate::special::{SpecialRegistry, SpecialVariable};

// Memory access
pub use crate::memory::{
    AddressSpaceMapping, Endianness, ForeignProcess, MemoryStream, ProcessHandle, RamImage,
};
pub use crate::region::Region;
