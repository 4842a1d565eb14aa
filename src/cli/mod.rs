//! Command-line interface for forgeloop
//!
//! ## Module Structure
//!
//! - `args`: CLI argument definitions and parsing structures (clap)
//! - `run`: Main entry point and command dispatch
//! - `commands`: Command implementations and helpers

pub mod args;
mod commands;
mod run;

pub use args::{Cli, Commands, RunArgs};
pub use commands::{OperatorCommand, operator_console, parse_operator_line, render_log};
pub use run::run;
