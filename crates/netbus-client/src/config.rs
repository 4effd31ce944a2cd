//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/netbus/config.toml` by default. Every field is optional; a
//! missing file means defaults.
//!
//! ```toml
//! debug = false
//!
//! [connection]
//! endpoint = "unix:/run/user/1000/netbus.sock"
//! delimiter = "@@@"
//! timeout = 5
//!
//! [server]
//! listen = "127.0.0.1:7100"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use netbus_core::DEFAULT_MAX_LISTENERS;
use netbus_protocol::{Delimiter, MAX_FRAME_SIZE};
use netbus_server::{Endpoint, ServerConfig, default_socket_path};

use crate::client::{Client, ClientOptions};
use crate::error::{ClientError, ClientResult};

/// Configuration for the netbus CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Debug mode.
    pub debug: bool,

    /// How clients reach the relay server.
    pub connection: ConnectionSettings,

    /// Settings for `netbus serve`.
    pub server: ServeSettings,
}

/// Connection settings shared by every client command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Server endpoint; the per-user Unix socket when unset.
    pub endpoint: Option<Endpoint>,

    /// Frame delimiter.
    pub delimiter: Delimiter,

    /// Connection timeout in seconds.
    pub timeout: u64,

    /// Maximum size of one inbound frame in bytes.
    pub max_frame_size: usize,

    /// Per-event listener count above which a leak warning is logged.
    pub max_listeners: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            delimiter: Delimiter::default(),
            timeout: 5,
            max_frame_size: MAX_FRAME_SIZE,
            max_listeners: DEFAULT_MAX_LISTENERS,
        }
    }
}

/// Relay server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeSettings {
    /// Endpoint to listen on; the connection endpoint when unset.
    pub listen: Option<Endpoint>,

    /// Maximum number of concurrent client connections.
    pub max_connections: usize,
}

impl Default for ServeSettings {
    fn default() -> Self {
        Self {
            listen: None,
            max_connections: 256,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("failed to parse {}: {e}", path.display()))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("netbus")
    }

    /// The endpoint clients connect to.
    pub fn endpoint(&self) -> Endpoint {
        self.connection
            .endpoint
            .clone()
            .unwrap_or_else(|| Endpoint::Unix(default_socket_path()))
    }

    /// The endpoint `serve` listens on.
    pub fn listen_endpoint(&self) -> Endpoint {
        self.server.listen.clone().unwrap_or_else(|| self.endpoint())
    }

    /// Client options derived from the connection settings.
    pub fn options(&self) -> ClientOptions {
        ClientOptions::default()
            .with_delimiter(self.connection.delimiter.clone())
            .with_max_frame_size(self.connection.max_frame_size)
            .with_connect_timeout(Duration::from_secs(self.connection.timeout))
            .with_max_listeners(self.connection.max_listeners)
    }

    /// Builds a disconnected client.
    pub fn client(&self) -> Client {
        Client::with_options(self.options())
    }

    /// Relay server configuration for `serve`.
    pub fn server_config(&self) -> ServerConfig {
        ServerConfig::new(self.listen_endpoint())
            .with_delimiter(self.connection.delimiter.clone())
            .with_max_frame_size(self.connection.max_frame_size)
            .with_max_connections(self.server.max_connections)
    }
}
