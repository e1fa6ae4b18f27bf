//! Front end of the `cmdq` binary: argument parsing, configuration, logging
//! and the `run`, `list` and `add` subcommands.

pub mod cli;
pub mod commands;
pub mod config;
pub mod logging;
pub mod shutdown;
