//! Command-line interface definitions for the bot.
//!
//! This module contains the CLI argument parsing structures and enums
//! used by the `vpswatch` binary.

use std::env;

use clap::{Parser, Subcommand, ValueEnum};
use vpswatch_common::DEFAULT_PROBE_PORT;

/// Top-level command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = "vpswatch")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the chat bot and the periodic monitor.
    Run(ServiceArgs),

    /// Probe a single address once and report UP or DOWN.
    ///
    /// Exits with an error when the address is unreachable.
    Probe(ProbeArgs),

    /// Load and validate a configuration file, then exit.
    CheckConfig {
        /// Path to the configuration file
        #[arg(short, long, env = "VPSWATCH_CONFIG", default_value = "vpswatch.toml")]
        config: String,
    },
}

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
    Pretty,
}

/// Arguments for the run command.
#[derive(Debug, Parser)]
pub struct ServiceArgs {
    /// Path to the configuration file
    #[arg(short, long, env = "VPSWATCH_CONFIG", default_value = "vpswatch.toml")]
    pub config: String,

    /// Format of the log output
    #[arg(long, value_enum, default_value_t)]
    pub log_format: LogFormat,
}

/// Arguments for the probe command.
#[derive(Debug, Parser)]
pub struct ProbeArgs {
    /// `host` or `host:port`
    pub address: String,

    /// Connect timeout in seconds
    #[arg(long, default_value_t = 3)]
    pub timeout: u64,

    /// Port used when the address has none
    #[arg(long, default_value_t = DEFAULT_PROBE_PORT)]
    pub default_port: u16,
}
