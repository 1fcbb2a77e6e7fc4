//! Get command implementation.

use anyhow::Result;
use owo_colors::OwoColorize;
use ramwatch_core::{READ_ERROR, Session};

/// Render one line per value, or all values on one line
pub fn format_values(name: &str, addresses: &[u64], values: &[String], show_addresses: bool) -> Vec<String> {
    if values.is_empty() {
        return vec![format!("{} = (no instances)", name)];
    }
    if !show_addresses {
        return vec![format!("{} = {}", name, values.join(", "))];
    }
    addresses
        .iter()
        .zip(values)
        .map(|(address, value)| format!("{} @ 0x{:08X} = {}", name, address, value))
        .collect()
}

/// Run the get command
pub fn run(session: &Session, names: &[String], show_addresses: bool) -> Result<()> {
    let bases = session.snapshot();
    let ctx = session.context(&bases);

    for name in names {
        let variable = session.variable(name)?;
        let addresses = variable.addresses(session.region(), &bases);
        let values = variable.get_values(&ctx, Some(&addresses));
        for line in format_values(name, &addresses, &values, show_addresses) {
            if line.ends_with(READ_ERROR) {
                println!("{}", line.red());
            } else {
                println!("{}", line);
            }
        }
    }
    Ok(())
}
