//! Per-release offsets and release detection.
//!
//! The same variable sits at different addresses in the US, JP and PAL
//! releases of a title. Each variable carries one optional offset per region
//! plus a fallback used when its region has none.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::memory::MemoryStream;

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
    EnumIter,
    IntoStaticStr,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Region {
    #[default]
    Us,
    Jp,
    Pal,
}

/// Offsets of one variable across releases
///
/// An absent entry is different from an entry of 0: it means the variable
/// does not exist in that release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionOffsetSet {
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::hex::option")]
    pub us: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::hex::option")]
    pub jp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::hex::option")]
    pub pal: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "crate::hex::option")]
    pub default: Option<u64>,
}

impl RegionOffsetSet {
    /// Same offset in every release
    pub fn uniform(offset: u64) -> Self {
        Self {
            default: Some(offset),
            ..Self::default()
        }
    }

    /// Offset for `region`, falling back to the default entry
    pub fn offset_for(&self, region: Region) -> Option<u64> {
        let explicit = match region {
            Region::Us => self.us,
            Region::Jp => self.jp,
            Region::Pal => self.pal,
        };
        explicit.or(self.default)
    }

    pub fn is_empty(&self) -> bool {
        self.us.is_none() && self.jp.is_none() && self.pal.is_none() && self.default.is_none()
    }
}

/// Decides which release the attached process is running
pub trait RegionDetector: Send + Sync {
    fn detect(&self, stream: &MemoryStream) -> Option<Region>;
}

/// Always reports the configured region
#[derive(Debug, Clone, Copy)]
pub struct FixedRegion(pub Region);

impl RegionDetector for FixedRegion {
    fn detect(&self, _stream: &MemoryStream) -> Option<Region> {
        Some(self.0)
    }
}

/// Byte pattern expected at a RAM address for one release
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionSignature {
    pub region: Region,
    /// Space-separated hex bytes, `??` matches anything
    pub pattern: String,
}

impl RegionSignature {
    pub fn pattern_bytes(&self) -> Result<Vec<Option<u8>>> {
        parse_pattern(&self.pattern)
    }
}

/// Identifies the release by comparing bytes at a fixed RAM address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureRegionDetector {
    #[serde(with = "crate::hex")]
    pub address: u64,
    pub signatures: Vec<RegionSignature>,
}

impl SignatureRegionDetector {
    /// Reject signatures that would never match
    pub fn validate(&self) -> Result<()> {
        for signature in &self.signatures {
            signature.pattern_bytes()?;
        }
        Ok(())
    }
}

impl RegionDetector for SignatureRegionDetector {
    fn detect(&self, stream: &MemoryStream) -> Option<Region> {
        for signature in &self.signatures {
            let Ok(pattern) = signature.pattern_bytes() else {
                continue;
            };
            let bytes = match stream.read(self.address, pattern.len(), false) {
                Ok(bytes) => bytes,
                Err(e) => {
                    debug!("Region signature read failed: {}", e);
                    return None;
                }
            };
            if matches_pattern(&bytes, &pattern) {
                debug!("Region signature matched: {}", signature.region);
                return Some(signature.region);
            }
        }
        None
    }
}

/// Run `detector`, falling back to `fallback` when nothing matches
pub fn detect_region(
    detector: &dyn RegionDetector,
    stream: &MemoryStream,
    fallback: Region,
) -> Region {
    match detector.detect(stream) {
        Some(region) => region,
        None => {
            warn!(
                "Could not detect region, using configured region {}",
                fallback
            );
            fallback
        }
    }
}

pub fn parse_pattern(pattern: &str) -> Result<Vec<Option<u8>>> {
    let mut bytes = Vec::new();
    for token in pattern.split_whitespace() {
        if token == "??" || token == "?" {
            bytes.push(None);
            continue;
        }
        let value = u8::from_str_radix(token, 16).map_err(|e| Error::InvalidBase {
            tag: "region".to_string(),
            reason: format!("invalid signature token '{}': {}", token, e),
        })?;
        bytes.push(Some(value));
    }

    if bytes.iter().all(Option::is_none) {
        return Err(Error::InvalidBase {
            tag: "region".to_string(),
            reason: "signature pattern has no fixed bytes".to_string(),
        });
    }

    Ok(bytes)
}

fn matches_pattern(bytes: &[u8], pattern: &[Option<u8>]) -> bool {
    bytes.len() == pattern.len()
        && bytes
            .iter()
            .zip(pattern)
            .all(|(b, p)| p.is_none_or(|expected| expected == *b))
}
