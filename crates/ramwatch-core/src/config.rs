//! Session configuration.
//!
//! ## Example
//!
//! ```ignore
//! use ramwatch_core::config::SessionConfig;
//! use ramwatch_core::region::Region;
//!
//! let config = SessionConfig::builder()
//!     .region(Region::Jp)
//!     .process_offset(0x1_2345_0000)
//!     .build();
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::memory::layout::timing;
use crate::memory::{AddressSpaceMapping, Endianness};
use crate::region::Region;

/// Configuration for attaching a [`crate::session::Session`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Release assumed when detection is unavailable or inconclusive
    pub region: Region,
    /// Where emulated RAM lives in the emulator and how it is stored
    pub mapping: AddressSpaceMapping,
    /// Longest wait for the emulator to acknowledge a pause
    pub pause_timeout_ms: u64,
    /// Interval between polls when watching
    pub poll_interval_ms: u64,
    /// Executable name to look for when no pid is given
    pub process_name: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            region: Region::default(),
            mapping: AddressSpaceMapping::default(),
            pause_timeout_ms: timing::PAUSE_TIMEOUT_MS,
            poll_interval_ms: timing::POLL_INTERVAL_MS,
            process_name: None,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration builder
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }

    pub fn pause_timeout(&self) -> Duration {
        Duration::from_millis(self.pause_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Builder for SessionConfig
#[derive(Debug, Clone, Default)]
pub struct SessionConfigBuilder {
    region: Option<Region>,
    process_offset: Option<u64>,
    target: Option<Endianness>,
    host: Option<Endianness>,
    pause_timeout_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    process_name: Option<String>,
}

impl SessionConfigBuilder {
    /// Start from an existing configuration, e.g. one read from a file
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            region: Some(config.region),
            process_offset: Some(config.mapping.process_offset),
            target: Some(config.mapping.target),
            host: Some(config.mapping.host),
            pause_timeout_ms: Some(config.pause_timeout_ms),
            poll_interval_ms: Some(config.poll_interval_ms),
            process_name: config.process_name.clone(),
        }
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    /// Host address of emulated RAM offset 0
    pub fn process_offset(mut self, offset: u64) -> Self {
        self.process_offset = Some(offset);
        self
    }

    /// Byte order of the emulated CPU
    pub fn target_endianness(mut self, order: Endianness) -> Self {
        self.target = Some(order);
        self
    }

    /// Byte order the emulator stores RAM words in
    pub fn host_endianness(mut self, order: Endianness) -> Self {
        self.host = Some(order);
        self
    }

    pub fn pause_timeout_ms(mut self, ms: u64) -> Self {
        self.pause_timeout_ms = Some(ms);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = Some(ms);
        self
    }

    pub fn process_name<S: Into<String>>(mut self, name: S) -> Self {
        self.process_name = Some(name.into());
        self
    }

    /// Build the configuration
    pub fn build(self) -> SessionConfig {
        let default = SessionConfig::default();
        SessionConfig {
            region: self.region.unwrap_or(default.region),
            mapping: AddressSpaceMapping::new(
                self.process_offset
                    .unwrap_or(default.mapping.process_offset),
                self.target.unwrap_or(default.mapping.target),
                self.host.unwrap_or(default.mapping.host),
            ),
            pause_timeout_ms: self.pause_timeout_ms.unwrap_or(default.pause_timeout_ms),
            poll_interval_ms: self.poll_interval_ms.unwrap_or(default.poll_interval_ms),
            process_name: self.process_name.or(default.process_name),
        }
    }
}
