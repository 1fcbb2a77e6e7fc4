//! Processes command implementation.

use anyhow::Result;
use owo_colors::OwoColorize;
use ramwatch_core::list_processes;

/// Run the processes command
pub fn run(filter: Option<&str>) -> Result<()> {
    let needle = filter.map(str::to_ascii_lowercase);
    let mut processes: Vec<_> = list_processes()?
        .into_iter()
        .filter(|p| match &needle {
            Some(needle) => p.name.to_ascii_lowercase().contains(needle),
            None => true,
        })
        .collect();
    processes.sort_by(|a, b| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()));

    if processes.is_empty() {
        println!("No matching processes");
        return Ok(());
    }

    for process in processes {
        println!("{:>8}  {}", process.pid.dimmed(), process.name);
    }
    Ok(())
}
