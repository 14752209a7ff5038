//! Command-line interface definitions for the bridge.

use std::{env, path::PathBuf};

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Top-level command-line interface definition.
#[derive(Debug, Parser)]
#[command(name = "kumo")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = env!("CARGO_PKG_DESCRIPTION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the bridge until SIGTERM or Ctrl-C, following config file edits.
    Service(ConfigArgs),

    /// Connect, synchronize and print the router state as JSON.
    Status(ConfigArgs),

    /// Route a source to a destination.
    Route {
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long)]
        destination: u32,
        #[arg(long)]
        source: u32,
    },

    /// Fire a stored salvo.
    Salvo {
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long)]
        salvo: u32,
    },

    /// Exchange the sources of two destinations.
    Swap {
        #[command(flatten)]
        config: ConfigArgs,
        #[arg(long)]
        destination_a: u32,
        #[arg(long)]
        destination_b: u32,
    },
}

/// Arguments shared by all subcommands.
#[derive(Debug, Clone, Args)]
pub struct ConfigArgs {
    /// Path to the configuration file
    #[arg(short, long, env = "KUMO_CONFIG", default_value = "kumo.toml")]
    pub config: PathBuf,

    #[arg(long, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Compact,
    Json,
    Pretty,
}
