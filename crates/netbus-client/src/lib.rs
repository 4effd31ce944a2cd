//! Distributed event bus client, stream driver and CLI
//!
//! A [`Client`] is a local event emitter whose subscriptions are mirrored to
//! a relay server: the first listener for an event subscribes to it, the
//! last removal unsubscribes, and every emit is also broadcast to the other
//! clients subscribed to that event.
//!
//! ```rust,no_run
//! use netbus_client::{Client, Endpoint};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::new();
//!     client.on("chat", |args| println!("chat: {args:?}"));
//!
//!     let connection = client.connect(&"127.0.0.1:7100".parse()?).await?;
//!     client.emit("chat", &[json!("hello")]);
//!
//!     connection.closed().await;
//!     Ok(())
//! }
//! ```

pub mod cli;
mod client;
pub mod commands;
pub mod config;
pub mod error;
mod hook;
mod inbound;
mod lifecycle;
mod outbound;
pub mod socket;
mod transport;

pub use client::{Client, ClientOptions};
pub use error::{ClientError, ClientResult};
pub use lifecycle::{ConnectionId, ConnectionState};
pub use netbus_core::{Listener, ListenerId, listener};
pub use netbus_server::Endpoint;
pub use socket::ConnectionHandle;
pub use transport::Transport;
