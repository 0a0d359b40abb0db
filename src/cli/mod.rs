//! CLI layer for assist-router.
//!
//! Provides the command-line interface using clap, with commands for
//! routing a turn, classifying a message, inspecting a tool fixture, and
//! scaffolding prompt templates.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
