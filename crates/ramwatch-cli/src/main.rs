mod attach;
mod cli;
mod commands;
mod config;
mod input;
mod shutdown;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use ramwatch_core::{Rotation, Session, SpecialRegistry, VariableTable};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::shutdown::ShutdownSignal;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("ramwatch=info".parse()?))
        .init();

    let cli = Cli::parse();
    let registry = SpecialRegistry::with_builtins();

    // Commands that never attach
    match &cli.command {
        Command::Processes { filter } => return commands::processes::run(filter.as_deref()),
        Command::Check => return commands::check::run(&cli.variables, &registry),
        _ => {}
    }

    let config = config::apply_overrides(&config::load(&cli.config)?, &cli.target);
    let table = VariableTable::from_file(&cli.variables, &registry)
        .with_context(|| format!("Failed to load variables from {}", cli.variables.display()))?;

    let shutdown = ShutdownSignal::with_ctrlc()?;
    let Some(target) = attach::attach_with_retry(&cli.target, &config, &shutdown)? else {
        info!("Shutdown before attaching");
        return Ok(());
    };

    let mut session = Session::new(target.process(), &config, Arc::new(table));
    if cli.target.region.is_none() {
        session.detect_region();
    }

    match &cli.command {
        Command::Processes { .. } | Command::Check => {}
        Command::List { filter } => commands::list::run(&session, filter.as_deref())?,
        Command::Get { names, addresses } => commands::get::run(&session, names, *addresses)?,
        Command::Set { name, value } => commands::edit::set(&session, name, value)?,
        Command::Move { moves, policy } => commands::edit::translate(&session, moves, *policy)?,
        Command::Rotate {
            tag,
            yaw,
            pitch,
            roll,
            policy,
        } => {
            let rotation = Rotation {
                yaw: *yaw,
                pitch: *pitch,
                roll: *roll,
            };
            commands::edit::rotate(&session, tag, rotation, *policy)?
        }
        Command::Watch {
            names,
            locks,
            interval,
        } => {
            let interval = interval
                .map(std::time::Duration::from_millis)
                .unwrap_or_else(|| config.poll_interval());
            commands::watch::run(&session, names, locks, interval, Arc::clone(&shutdown))?
        }
        Command::Hexdump {
            address,
            size,
            absolute,
            no_ascii,
        } => commands::hexdump::run(&session, *address, *size, *absolute, !*no_ascii)?,
        Command::Dump { output } => commands::dump::run(&session, output)?,
    }

    if cli.target.save && cli.command.edits() {
        target.persist()?;
    }
    Ok(())
}
