//! Performance metrics agent CLI library.
//!
//! This crate provides the CLI interface for the performance metrics agent.

mod cli;
pub mod commands;
mod config;
pub mod host;
pub mod trace;

pub use cli::{Cli, Commands};
pub use config::Config;
