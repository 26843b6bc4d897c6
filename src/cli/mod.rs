//! CLI module for the Terrace apply engine.
//!
//! This module provides the command-line interface for applying saved
//! plans and inspecting their apply graphs.

mod commands;
mod output;

pub use commands::{Cli, Commands, GraphFormat, OutputFormat};
pub use output::OutputFormatter;
