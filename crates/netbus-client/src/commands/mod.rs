//! Subcommand implementations.

pub mod config;
pub mod emit;
pub mod listen;
pub mod serve;
