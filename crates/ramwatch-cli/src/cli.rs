//! Command line definitions

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ramwatch_core::{Region, ResolvePolicy};

use crate::commands::hex_utils::parse_hex_address;

#[derive(Parser)]
#[command(name = "ramwatch")]
#[command(about = "Inspect and edit the RAM of a running console emulator")]
pub struct Cli {
    /// Session settings (TOML); missing file means defaults
    #[arg(short, long, default_value = "ramwatch.toml", global = true)]
    pub config: PathBuf,

    /// Variable table (JSON)
    #[arg(short = 'V', long, default_value = "variables.json", global = true)]
    pub variables: PathBuf,

    #[command(flatten)]
    pub target: TargetArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Which emulator, or which RAM image, to attach to
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Attach to this process id
    #[arg(long, global = true, conflicts_with = "image")]
    pub pid: Option<u32>,

    /// Attach to the first process whose name contains this text
    #[arg(short = 'p', long, global = true, env = "RAMWATCH_PROCESS")]
    pub process_name: Option<String>,

    /// Work on a RAM image file instead of a live process
    #[arg(long, global = true)]
    pub image: Option<PathBuf>,

    /// Write the RAM image back after editing
    #[arg(long, global = true, requires = "image")]
    pub save: bool,

    /// Release to use, skipping detection
    #[arg(short, long, global = true)]
    pub region: Option<Region>,

    /// Host address of emulated RAM (hex)
    #[arg(long, global = true, value_parser = parse_hex_address)]
    pub offset: Option<u64>,

    /// Fail instead of waiting when the emulator is not running
    #[arg(long, global = true)]
    pub no_wait: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// List running processes
    Processes {
        /// Only show processes whose name contains this text
        filter: Option<String>,
    },

    /// Validate the variable table without attaching
    Check,

    /// Show every variable with its type, addresses and current values
    List {
        /// Only show variables whose name contains this text
        filter: Option<String>,
    },

    /// Read variables
    Get {
        #[arg(required = true)]
        names: Vec<String>,

        /// Show the RAM address of every value
        #[arg(short, long)]
        addresses: bool,
    },

    /// Write a value to every instance of a variable
    Set {
        name: String,

        #[arg(allow_hyphen_values = true)]
        value: String,
    },

    /// Add deltas to several variables in one pause (`name=delta` ...)
    Move {
        #[arg(required = true, allow_hyphen_values = true)]
        moves: Vec<String>,

        /// Re-read bases between steps
        #[arg(long, default_value_t = ResolvePolicy::Snapshot)]
        policy: ResolvePolicy,
    },

    /// Turn every object under a base tag about the group's centroid
    Rotate {
        tag: String,

        /// Angle in 65536ths of a turn
        #[arg(allow_hyphen_values = true)]
        yaw: i32,

        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        pitch: i32,

        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        roll: i32,

        #[arg(long, default_value_t = ResolvePolicy::Snapshot)]
        policy: ResolvePolicy,
    },

    /// Poll variables and print changes until Esc/q/Ctrl+C
    Watch {
        /// Variables to watch (default: all)
        names: Vec<String>,

        /// Hold a variable at a value while watching (`name=value`)
        #[arg(short, long = "lock", allow_hyphen_values = true)]
        locks: Vec<String>,

        /// Poll interval in milliseconds
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Hexdump emulated RAM
    Hexdump {
        /// RAM address (hex), or host address with --absolute
        #[arg(value_parser = parse_hex_address)]
        address: u64,

        /// Number of bytes
        #[arg(short, long, default_value = "256")]
        size: usize,

        /// Treat the address as a host process address
        #[arg(long)]
        absolute: bool,

        /// Omit the ASCII column
        #[arg(long)]
        no_ascii: bool,
    },

    /// Dump every variable with addresses and values to JSON
    Dump {
        #[arg(short, long, default_value = "ramwatch_dump.json")]
        output: PathBuf,
    },
}

impl Command {
    /// Whether the command writes emulated RAM
    pub fn edits(&self) -> bool {
        matches!(
            self,
            Command::Set { .. } | Command::Move { .. } | Command::Rotate { .. } | Command::Watch { .. }
        )
    }
}
