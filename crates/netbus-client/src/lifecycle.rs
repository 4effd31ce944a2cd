//! Connection lifecycle.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

use crate::transport::Transport;

/// Connection state of a client.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport, or the last one closed.
    #[default]
    Disconnected,
    /// A transport is attached but has not reported a connection yet.
    Connecting,
    /// Frames are being exchanged.
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        })
    }
}

/// Identifies one attached transport.
///
/// Notifications tagged with an id that is no longer current are ignored, so
/// a late close from a previous connection cannot tear down its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Tracks the connection state and owns the handle to the current transport.
#[derive(Default)]
pub(crate) struct Lifecycle {
    state: ConnectionState,
    transport: Option<Arc<dyn Transport>>,
    current: u64,
}

impl Lifecycle {
    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    pub(crate) fn is_current(&self, id: ConnectionId) -> bool {
        self.transport.is_some() && self.current == id.0
    }

    /// Attaches a new transport and moves to `Connecting`.
    ///
    /// A previously attached transport is closed.
    pub(crate) fn begin(&mut self, transport: Arc<dyn Transport>) -> ConnectionId {
        if let Some(previous) = self.transport.replace(transport) {
            debug!(connection = self.current, "replacing attached transport");
            previous.close();
        }
        self.current += 1;
        self.state = ConnectionState::Connecting;
        ConnectionId(self.current)
    }

    /// Moves from `Connecting` to `Connected`.
    ///
    /// Returns true exactly once per attached transport; the caller replays
    /// subscriptions when it does.
    pub(crate) fn establish(&mut self) -> bool {
        if self.state != ConnectionState::Connecting {
            debug!(state = %self.state, "ignoring connect notification");
            return false;
        }
        self.state = ConnectionState::Connected;
        info!(connection = self.current, "connected");
        true
    }

    /// Moves to `Disconnected`, closing and dropping the transport.
    pub(crate) fn reset(&mut self) {
        if let Some(transport) = self.transport.take() {
            transport.close();
            info!(connection = self.current, "disconnected");
        }
        self.state = ConnectionState::Disconnected;
    }

    /// The transport to write to, only while connected.
    pub(crate) fn writer(&self) -> Option<&dyn Transport> {
        match self.state {
            ConnectionState::Connected => self.transport.as_deref(),
            _ => None,
        }
    }
}
