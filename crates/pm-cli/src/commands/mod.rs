//! CLI subcommand implementations.

pub mod replay;
pub mod status;
pub mod toggle;
