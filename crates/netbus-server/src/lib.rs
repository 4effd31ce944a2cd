//! Relay server: subscriptions, broadcast fan-out.
//!
//! This crate provides a single-node netbus server that:
//! - Accepts client connections over TCP or a Unix socket
//! - Tracks which events each connection is subscribed to
//! - Relays every broadcast to the other connections subscribed to its event
//!
//! Subscriptions live only as long as the connection that made them.
//!
//! # Example
//!
//! ```rust,no_run
//! use netbus_server::{RelayServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::new("127.0.0.1:7100".parse()?);
//!     let server = RelayServer::bind(config).await?;
//!     server.run_until_shutdown(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     }).await?;
//!     Ok(())
//! }
//! ```

mod broker;
mod config;
mod endpoint;
mod error;
mod socket;

pub use broker::{Broker, ConnectionId};
pub use config::{ServerConfig, default_socket_path};
pub use endpoint::Endpoint;
pub use error::{ServerError, ServerResult};
pub use socket::RelayServer;
