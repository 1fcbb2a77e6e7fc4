//! CLI command implementations.
//!
//! Each command takes an attached [`ramwatch_core::Session`], except `check`
//! and `processes`, which never touch the emulator.

pub mod check;
pub mod dump;
pub mod edit;
pub mod get;
pub mod hex_utils;
pub mod hexdump;
pub mod list;
pub mod processes;
pub mod watch;
