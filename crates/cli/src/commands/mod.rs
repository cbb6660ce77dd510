//! Top level subcommands

pub mod check;
pub mod command;
pub mod eval;
pub mod plan;
