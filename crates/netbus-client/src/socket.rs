//! Tokio stream driver connecting a [`Client`] to a relay server.
//!
//! The client itself never touches sockets. This module wires a TCP or Unix
//! stream to it: a writer task drains the frames the client queues, and a
//! reader task feeds received bytes back into it.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[cfg(unix)]
use tokio::net::UnixStream;

use netbus_server::Endpoint;

use crate::client::Client;
use crate::error::{ClientError, ClientResult};
use crate::lifecycle::ConnectionId;
use crate::transport::Transport;

const READ_BUFFER_SIZE: usize = 8 * 1024;

enum Outgoing {
    Frame(String),
    Close,
}

/// [`Transport`] backed by the writer task's queue.
struct ChannelTransport {
    queue: mpsc::UnboundedSender<Outgoing>,
    closed: Arc<Notify>,
}

impl ChannelTransport {
    fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Outgoing>, Arc<Notify>) {
        let (queue, queued) = mpsc::unbounded_channel();
        let closed = Arc::new(Notify::new());
        let transport = Arc::new(Self {
            queue,
            closed: Arc::clone(&closed),
        });
        (transport, queued, closed)
    }
}

impl Transport for ChannelTransport {
    fn write(&self, payload: String) {
        // A closed queue means the writer already gave up on the stream.
        let _ = self.queue.send(Outgoing::Frame(payload));
    }

    fn close(&self) {
        let _ = self.queue.send(Outgoing::Close);
        self.closed.notify_one();
    }
}

/// Handle to the tasks driving one connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    client: Client,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl ConnectionHandle {
    /// Identity of this connection within its client.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Whether this is still the client's live connection.
    pub fn is_open(&self) -> bool {
        self.client.is_current(self.id) && !self.reader.is_finished()
    }

    /// Closes the connection. Frames already queued are still flushed.
    pub fn close(&self) {
        self.client.release(self.id);
    }

    /// Waits until both the reader and writer tasks have stopped.
    pub async fn closed(self) {
        let _ = self.reader.await;
        let _ = self.writer.await;
    }
}

impl Client {
    /// Connects to a relay server and starts driving the connection.
    ///
    /// On success the client is `Connected` and has already queued its
    /// subscription replay. Replaces any connection the client already had.
    pub async fn connect(&self, endpoint: &Endpoint) -> ClientResult<ConnectionHandle> {
        let (transport, queued, closed) = ChannelTransport::new();
        let id = self.attach(transport);
        let timeout = self.options().connect_timeout;

        debug!(%endpoint, connection = %id, "connecting to server");

        let handle = match endpoint {
            Endpoint::Tcp(addr) => {
                let stream = dial(endpoint, timeout, TcpStream::connect(addr.as_str())).await;
                stream.and_then(|stream| self.start(id, stream, queued, closed))
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = dial(endpoint, timeout, UnixStream::connect(path)).await;
                stream.and_then(|stream| self.start(id, stream, queued, closed))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(path) => Err(ClientError::Connection(format!(
                "unix sockets are not available: {}",
                path.display()
            ))),
        };

        if handle.is_err() {
            self.release(id);
        } else {
            info!(%endpoint, connection = %id, "connected to server");
        }
        handle
    }

    /// Drives `stream` as connection `id`.
    ///
    /// Fails if another connection replaced `id` while it was being dialed.
    fn start<S>(
        &self,
        id: ConnectionId,
        stream: S,
        queued: mpsc::UnboundedReceiver<Outgoing>,
        closed: Arc<Notify>,
    ) -> ClientResult<ConnectionHandle>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        // Queues the subscription replay ahead of anything else.
        if !self.connected(id) {
            debug!(connection = %id, "connection superseded while dialing");
            return Err(ClientError::Connection("connection superseded".into()));
        }

        let (reader, writer) = tokio::io::split(stream);
        let writer = tokio::spawn(write_loop(self.clone(), id, writer, queued));
        let reader = tokio::spawn(read_loop(self.clone(), id, reader, closed));

        Ok(ConnectionHandle {
            id,
            client: self.clone(),
            reader,
            writer,
        })
    }
}

async fn dial<F, S>(endpoint: &Endpoint, timeout: Duration, connect: F) -> ClientResult<S>
where
    F: Future<Output = std::io::Result<S>>,
{
    tokio::time::timeout(timeout, connect)
        .await
        .map_err(|_| {
            ClientError::Timeout(format!(
                "connecting to {endpoint} timed out after {}s",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| ClientError::Connection(format!("failed to connect to {endpoint}: {e}")))
}

async fn write_loop<W>(
    client: Client,
    id: ConnectionId,
    mut writer: W,
    mut queued: mpsc::UnboundedReceiver<Outgoing>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = queued.recv().await {
        let Outgoing::Frame(frame) = message else {
            break;
        };
        if let Err(e) = writer.write_all(frame.as_bytes()).await {
            debug!(connection = %id, error = %e, "write failed");
            client.release(id);
            break;
        }
    }
    let _ = writer.shutdown().await;
    debug!(connection = %id, "writer stopped");
}

async fn read_loop<R>(client: Client, id: ConnectionId, mut reader: R, closed: Arc<Notify>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = tokio::select! {
            _ = closed.notified() => break,
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    debug!(connection = %id, "server closed the connection");
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    debug!(connection = %id, error = %e, "read failed");
                    break;
                }
            },
        };

        if let Err(e) = client.receive(id, &buf[..n]) {
            debug!(connection = %id, error = %e, "stopping reader");
            break;
        }
    }

    client.release(id);
    debug!(connection = %id, "reader stopped");
}
