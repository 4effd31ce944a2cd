//! Server configuration.

use std::path::PathBuf;
use std::time::Duration;

use netbus_protocol::{Delimiter, MAX_FRAME_SIZE};

use crate::endpoint::Endpoint;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub endpoint: Endpoint,

    /// Frame delimiter; must match the clients'.
    pub delimiter: Delimiter,

    /// Maximum bytes a connection may send without a delimiter.
    pub max_frame_size: usize,

    /// Maximum concurrent connections.
    pub max_connections: usize,

    /// How long a write to a slow subscriber may block before it is dropped.
    pub write_timeout: Duration,

    /// Whether to remove stale socket on startup.
    pub cleanup_stale_socket: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::Unix(default_socket_path()),
            delimiter: Delimiter::default(),
            max_frame_size: MAX_FRAME_SIZE,
            max_connections: 256,
            write_timeout: Duration::from_secs(10),
            cleanup_stale_socket: true,
        }
    }
}

impl ServerConfig {
    /// Creates a new server configuration listening on `endpoint`.
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Default::default()
        }
    }

    /// Builder: set the frame delimiter.
    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Builder: set the partial frame limit.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Builder: set max connections.
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Builder: set the per-write timeout.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Builder: set cleanup stale socket.
    pub fn with_cleanup_stale_socket(mut self, cleanup: bool) -> Self {
        self.cleanup_stale_socket = cleanup;
        self
    }
}

/// Returns the default socket path.
///
/// Uses `$XDG_RUNTIME_DIR/netbus.sock` if available,
/// otherwise falls back to `/tmp/netbus-$UID.sock`.
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("netbus.sock")
    } else {
        #[cfg(unix)]
        let uid = unsafe { libc::getuid() };
        #[cfg(not(unix))]
        let uid = 0;
        PathBuf::from(format!("/tmp/netbus-{}.sock", uid))
    }
}
