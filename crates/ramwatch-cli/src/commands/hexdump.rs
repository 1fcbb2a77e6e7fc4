//! Hexdump command implementation.
//!
//! Addresses are RAM addresses as the game sees them unless `--absolute` is
//! given. Bytes come out in the console's byte order either way.

use anyhow::Result;
use ramwatch_core::{Session, format_hexdump};

/// Run the hexdump command
pub fn run(session: &Session, address: u64, size: usize, absolute: bool, ascii: bool) -> Result<()> {
    let tx = session.transactor().begin()?;
    let bytes = session.stream().read(address, size, absolute);
    tx.finish()?;
    let bytes = bytes?;

    println!(
        "Hexdump at 0x{:X} ({} bytes, {}):",
        address,
        size,
        if absolute { "process" } else { "RAM" }
    );
    println!();
    for line in format_hexdump(address, &bytes, ascii) {
        println!("{}", line);
    }
    Ok(())
}
