//! List command implementation.

use anyhow::Result;
use owo_colors::OwoColorize;
use ramwatch_core::{NO_ADDRESS, Session};

/// Run the list command
pub fn run(session: &Session, filter: Option<&str>) -> Result<()> {
    let bases = session.snapshot();
    let ctx = session.context(&bases);
    let needle = filter.map(str::to_ascii_lowercase);

    println!(
        "{} region, {} variables",
        session.region().to_string().bold(),
        session.table().len()
    );

    for variable in session.table().iter() {
        if let Some(needle) = &needle
            && !variable.name().to_ascii_lowercase().contains(needle)
        {
            continue;
        }

        let address = variable.ram_address_string(&ctx, true);
        let values = variable.get_values(&ctx, None);
        let kind = variable.type_description();

        print!("{:<32} ", variable.name().bold());
        if variable.is_special() {
            print!("{:<24} ", kind.cyan());
        } else {
            print!("{:<24} ", kind);
        }
        print!("{:<12} ", variable.base().to_string().dimmed());
        if address == NO_ADDRESS {
            print!("{:<12} ", address.dimmed());
        } else {
            print!("{:<12} ", address);
        }
        println!("{}", values.join(", "));
    }
    Ok(())
}
