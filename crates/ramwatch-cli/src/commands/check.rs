//! Check command implementation.
//!
//! Loads the variable table exactly as an attached session would, so every
//! definition error surfaces without an emulator running.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use ramwatch_core::{Region, SpecialRegistry, VariableTable};

const REGIONS: [Region; 3] = [Region::Us, Region::Jp, Region::Pal];

/// What a valid table contains
#[derive(Debug, Default, PartialEq, Eq)]
pub struct TableSummary {
    pub variables: usize,
    pub special: usize,
    pub bases: usize,
    pub region_detection: bool,
    /// Variables that do not exist in a release, per release
    pub missing: Vec<(Region, Vec<String>)>,
}

pub fn summarize(table: &VariableTable) -> TableSummary {
    let missing = REGIONS
        .iter()
        .map(|&region| {
            let names = table
                .iter()
                .filter(|v| v.offsets().offset_for(region).is_none())
                .map(|v| v.name().to_string())
                .collect();
            (region, names)
        })
        .collect();

    TableSummary {
        variables: table.len(),
        special: table.iter().filter(|v| v.is_special()).count(),
        bases: table.enumerator().definitions().len(),
        region_detection: table.detector().is_some(),
        missing,
    }
}

/// Run the check command
pub fn run(path: &Path, registry: &SpecialRegistry) -> Result<()> {
    let table = VariableTable::from_file(path, registry)
        .with_context(|| format!("Invalid variable table {}", path.display()))?;
    let summary = summarize(&table);

    println!("{} {}", "OK".green().bold(), path.display());
    println!(
        "  {} variables ({} special), {} base definitions",
        summary.variables, summary.special, summary.bases
    );
    println!(
        "  region detection: {}",
        if summary.region_detection { "yes" } else { "no" }
    );
    for (region, names) in &summary.missing {
        if !names.is_empty() {
            println!("  {} {}: {}", "absent in".yellow(), region, names.join(", "));
        }
    }
    Ok(())
}
