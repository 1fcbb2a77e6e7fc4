//! Dump command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use ramwatch_core::{Session, TableDump};

/// Run the dump command
pub fn run(session: &Session, output: &Path) -> Result<()> {
    let dump = TableDump::capture(session);
    dump.save(output)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!(
        "Dumped {} variables ({} region) to {}",
        dump.variables.len(),
        dump.region,
        output.display()
    );
    Ok(())
}
