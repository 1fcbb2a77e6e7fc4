//! Address and assignment argument parsing.

use anyhow::{Result, anyhow, bail};

/// Parse a hex address, with or without a `0x` prefix.
///
/// Underscores may group digits.
///
/// ```
/// # use ramwatch::commands::hex_utils::parse_hex_address;
/// assert_eq!(parse_hex_address("0x8033B170").unwrap(), 0x8033B170);
/// assert_eq!(parse_hex_address("8033_B170").unwrap(), 0x8033B170);
/// ```
pub fn parse_hex_address(s: &str) -> Result<u64> {
    let digits = s
        .trim()
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .replace('_', "");
    u64::from_str_radix(&digits, 16).map_err(|e| anyhow!("Invalid hex address '{}': {}", s, e))
}

/// Split `name=value` at the last `=`
///
/// Variable names may contain `=`; values never do.
pub fn parse_assignment(s: &str) -> Result<(String, String)> {
    match s.rsplit_once('=') {
        Some((name, value)) if !name.trim().is_empty() && !value.trim().is_empty() => {
            Ok((name.trim().to_string(), value.trim().to_string()))
        }
        _ => bail!("Expected name=value, got '{}'", s),
    }
}
