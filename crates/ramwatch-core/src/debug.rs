//! Debug utilities for inspecting emulated RAM
//!
//! This module provides tools for:
//! - Dumping every variable of a table with its addresses (`TableDump`)
//! - Formatting raw bytes as a traditional hexdump (`format_hexdump`)

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;
use crate::session::Session;

/// One variable as seen at dump time
#[derive(Debug, Clone, Serialize)]
pub struct VariableDump {
    pub name: String,
    pub type_description: String,
    pub base: String,
    pub ram_address: String,
    pub process_address: String,
    pub values: Vec<String>,
}

/// Every variable of a session, for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct TableDump {
    pub process: String,
    pub region: String,
    pub process_offset: String,
    pub variables: Vec<VariableDump>,
}

impl TableDump {
    pub fn capture(session: &Session) -> Self {
        let bases = session.snapshot();
        let ctx = session.context(&bases);
        let variables = session
            .table()
            .iter()
            .map(|variable| VariableDump {
                name: variable.name().to_string(),
                type_description: variable.type_description(),
                base: variable.base().to_string(),
                ram_address: variable.ram_address_string(&ctx, true),
                process_address: variable.process_address_string(&ctx),
                values: variable.get_values(&ctx, None),
            })
            .collect();

        Self {
            process: session.stream().process().describe(),
            region: session.region().to_string(),
            process_offset: format!("0x{:X}", session.stream().mapping().process_offset),
            variables,
        }
    }

    /// Save dump to JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Render bytes 16 per line, labelled with their address
///
/// ```text
/// 0x8033B170: 48 65 6C 6C 6F 20 57 6F  72 6C 64 00 00 00 00 00  |Hello World.....|
/// ```
pub fn format_hexdump(address: u64, bytes: &[u8], ascii: bool) -> Vec<String> {
    bytes
        .chunks(16)
        .enumerate()
        .map(|(i, chunk)| {
            let mut line = format!("0x{:08X}: ", address + (i * 16) as u64);

            for j in 0..16 {
                if j == 8 {
                    line.push(' ');
                }
                match chunk.get(j) {
                    Some(byte) => line.push_str(&format!("{:02X} ", byte)),
                    None => line.push_str("   "),
                }
            }

            if ascii {
                line.push_str(" |");
                for byte in chunk {
                    line.push(if (0x20..0x7F).contains(byte) {
                        *byte as char
                    } else {
                        '.'
                    });
                }
                for _ in chunk.len()..16 {
                    line.push(' ');
                }
                line.push('|');
            }

            line
        })
        .collect()
}
