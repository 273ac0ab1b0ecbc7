//! Tooling & Integration Layer
//!
//! Command-line front end over the node store.

pub mod cli;

pub use cli::{Cli, CliContext, Commands};
