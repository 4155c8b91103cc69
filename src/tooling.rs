//! Tooling & Integration Layer
//!
//! The `duet` command line: running the agents and inspecting their state.

pub mod cli;
pub mod format;

pub use cli::{Cli, CliContext, Commands};
