//! Command-line interface definition.

use std::num::NonZeroUsize;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use netbus_server::Endpoint;

/// netbus - a distributed event bus over a socket
#[derive(Debug, Parser)]
#[command(name = "netbus")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "NETBUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    /// Server endpoint (host:port or unix:PATH)
    #[arg(long, short, env = "NETBUS_ENDPOINT")]
    pub endpoint: Option<Endpoint>,

    /// Frame delimiter
    #[arg(long, env = "NETBUS_DELIMITER")]
    pub delimiter: Option<String>,

    /// Connection timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Subscribe to events and print each broadcast as a JSON line
    Listen {
        /// Events to listen for
        #[arg(required = true)]
        events: Vec<String>,

        /// Exit after receiving this many broadcasts
        #[arg(long, short = 'n')]
        count: Option<NonZeroUsize>,
    },

    /// Broadcast one event and exit
    Emit {
        /// Event name
        event: String,

        /// Positional arguments, each parsed as JSON (plain text becomes a string)
        args: Vec<String>,
    },

    /// Run a relay server
    Serve {
        /// Endpoint to listen on (defaults to the connection endpoint)
        #[arg(long, short)]
        listen: Option<Endpoint>,

        /// Log as JSON lines
        #[arg(long)]
        json_logs: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Dump,

    /// Show the configuration file path
    Path,
}
