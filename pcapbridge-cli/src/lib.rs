//! CLI interface for pcapbridge
//!
//! Argument parsing and the subcommand handlers behind the `pcapbridge`
//! binary.

pub mod args;
pub mod commands;

pub use args::{CaptureArgs, Cli, Commands};
