//! Typed access to emulated RAM through an address-space mapping.
//!
//! Relative addresses are logical RAM addresses and go through the mapping;
//! bytes come back in the emulated CPU's order. Absolute addresses are host
//! process addresses and are accessed verbatim in the host's order.

use std::sync::Arc;

use tracing::{debug, warn};

use super::{AddressSpaceMapping, Endianness, ForeignProcess};
use crate::error::Result;
use crate::marshal::{self, Value, ValueKind};
use crate::mask::FieldMask;

#[derive(Clone)]
pub struct MemoryStream {
    process: Arc<dyn ForeignProcess>,
    mapping: AddressSpaceMapping,
}

impl MemoryStream {
    pub fn new(process: Arc<dyn ForeignProcess>, mapping: AddressSpaceMapping) -> Self {
        Self { process, mapping }
    }

    pub fn process(&self) -> &Arc<dyn ForeignProcess> {
        &self.process
    }

    pub fn mapping(&self) -> &AddressSpaceMapping {
        &self.mapping
    }

    /// Byte order of values returned by [`Self::read`]
    pub fn order(&self, absolute: bool) -> Endianness {
        if absolute {
            self.mapping.host
        } else {
            self.mapping.target
        }
    }

    /// Host address a `width`-byte access at `address` touches first
    pub fn process_address(&self, address: u64, width: usize, absolute: bool) -> u64 {
        if absolute {
            address
        } else {
            self.mapping.to_process(address, width)
        }
    }

    pub fn read(&self, address: u64, width: usize, absolute: bool) -> Result<Vec<u8>> {
        if absolute {
            return self.process.read_bytes(address, width);
        }

        if self.mapping.is_contiguous(address, width) {
            let mut bytes = self
                .process
                .read_bytes(self.mapping.to_process(address, width), width)?;
            self.mapping.host_to_target(&mut bytes);
            return Ok(bytes);
        }

        (0..width as u64)
            .map(|i| {
                let host = self.mapping.to_process(address + i, 1);
                self.process.read_bytes(host, 1).map(|b| b[0])
            })
            .collect()
    }

    /// Write bytes given in the order [`Self::order`] reports
    pub fn write(&self, address: u64, bytes: &[u8], absolute: bool) -> Result<()> {
        if absolute {
            return self.process.write_bytes(address, bytes);
        }

        let width = bytes.len();
        if self.mapping.is_contiguous(address, width) {
            let mut stored = bytes.to_vec();
            self.mapping.target_to_host(&mut stored);
            return self
                .process
                .write_bytes(self.mapping.to_process(address, width), &stored);
        }

        for (i, byte) in bytes.iter().enumerate() {
            let host = self.mapping.to_process(address + i as u64, 1);
            self.process.write_bytes(host, std::slice::from_ref(byte))?;
        }
        Ok(())
    }

    /// Raw bit pattern of a cell
    pub fn read_bits(&self, kind: ValueKind, address: u64, absolute: bool) -> Result<u64> {
        let bytes = self.read(address, kind.width(), absolute)?;
        // The read returned exactly `width` bytes, so this cannot fail
        Ok(marshal::to_bits(kind, &bytes, self.order(absolute)).unwrap_or_default())
    }

    /// Read a value, or just the masked field of it
    ///
    /// Masked fields are returned as unsigned, without sign extension.
    pub fn read_value(
        &self,
        kind: ValueKind,
        address: u64,
        absolute: bool,
        mask: Option<FieldMask>,
    ) -> Result<Value> {
        let bits = self.read_bits(kind, address, absolute)?;
        Ok(match mask {
            Some(mask) => Value::Unsigned(mask.get(bits)),
            None => marshal::value_from_bits(kind, bits),
        })
    }

    /// Store an already-encoded bit pattern, merging it into the field when masked
    pub fn write_bits(
        &self,
        kind: ValueKind,
        bits: u64,
        address: u64,
        absolute: bool,
        mask: Option<FieldMask>,
    ) -> bool {
        let bits = match mask {
            Some(mask) => match self.read_bits(kind, address, absolute) {
                Ok(current) => mask.set(current, bits),
                Err(e) => {
                    warn!("Masked write aborted, read failed: {}", e);
                    return false;
                }
            },
            None => bits,
        };

        let bytes = marshal::from_bits(kind, bits, self.order(absolute));
        match self.write(address, &bytes, absolute) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}", e);
                false
            }
        }
    }

    /// Parse `text` for `kind` and store it, applying the range policy
    pub fn write_value_text(
        &self,
        kind: ValueKind,
        text: &str,
        address: u64,
        absolute: bool,
        mask: Option<FieldMask>,
    ) -> bool {
        match marshal::parse_bits(kind, text) {
            Ok(bits) => self.write_bits(kind, bits, address, absolute, mask),
            Err(e) => {
                debug!("{}", e);
                false
            }
        }
    }

    /// Store a computed value, applying the range policy
    pub fn write_value_numeric(
        &self,
        kind: ValueKind,
        value: f64,
        address: u64,
        absolute: bool,
        mask: Option<FieldMask>,
    ) -> bool {
        let bits = marshal::numeric_bits(kind, value);
        self.write_bits(kind, bits, address, absolute, mask)
    }

    pub fn read_u16(&self, address: u64) -> Result<u16> {
        Ok(self.read_bits(ValueKind::U16, address, false)? as u16)
    }

    pub fn read_u32(&self, address: u64) -> Result<u32> {
        Ok(self.read_bits(ValueKind::U32, address, false)? as u32)
    }

    pub fn read_f32(&self, address: u64) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32(address)?))
    }

    pub fn write_u16(&self, address: u64, value: u16) -> Result<()> {
        let bytes = marshal::from_bits(ValueKind::U16, value as u64, self.mapping.target);
        self.write(address, &bytes, false)
    }

    pub fn write_f32(&self, address: u64, value: f32) -> Result<()> {
        let bytes = marshal::from_bits(ValueKind::F32, value.to_bits() as u64, self.mapping.target);
        self.write(address, &bytes, false)
    }
}
