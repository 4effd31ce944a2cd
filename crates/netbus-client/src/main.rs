//! netbus CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use netbus_client::cli::{Cli, Command, ConfigAction};
use netbus_client::commands;
use netbus_client::config::ClientConfig;
use netbus_client::error::ClientResult;
use netbus_core::{TracingConfig, TracingOutputFormat, init_tracing};
use netbus_protocol::Delimiter;
use tracing::Level;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config = load_config(&cli)?;
    init_logging(&cli, config.debug);

    match cli.command {
        Command::Listen { events, count } => commands::listen::run(&config, &events, count).await,
        Command::Emit { event, args } => commands::emit::run(&config, &event, &args).await,
        Command::Serve { listen, .. } => commands::serve::run(&config, listen).await,
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config),
            ConfigAction::Path => commands::config::path(),
        },
    }
}

/// Loads the config file and applies command-line overrides.
fn load_config(cli: &Cli) -> ClientResult<ClientConfig> {
    let mut config = match cli.config {
        Some(ref path) => ClientConfig::load_from(path)?,
        None => ClientConfig::load()?,
    };

    config.debug |= cli.debug;
    if let Some(ref endpoint) = cli.endpoint {
        config.connection.endpoint = Some(endpoint.clone());
    }
    if let Some(ref delimiter) = cli.delimiter {
        config.connection.delimiter = Delimiter::new(delimiter.as_str())?;
    }
    if let Some(timeout) = cli.timeout {
        config.connection.timeout = timeout;
    }
    Ok(config)
}

fn init_logging(cli: &Cli, debug: bool) {
    let tracing_config = match cli.command {
        Command::Serve { json_logs: true, .. } => TracingConfig::relay(),
        Command::Serve { .. } if !debug => TracingConfig::cli(false).with_level(Level::INFO),
        _ => TracingConfig::cli(debug),
    };
    let tracing_config = if debug && tracing_config.output_format == TracingOutputFormat::Json {
        tracing_config.with_level(Level::DEBUG)
    } else {
        tracing_config
    };

    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {e}");
    }
}
