//! Socket listener and per-connection relay loop.
//!
//! Each accepted connection gets a reader loop that decodes client frames and
//! a writer task that drains the connection's outbox, so a slow subscriber
//! never blocks the peer that is broadcasting.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{debug, error, info, warn};

#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

use netbus_protocol::{ClientFrame, Delimiter, FrameDecoder, InboundBroadcast, encode_message};

use crate::broker::{Broker, ConnectionId};
use crate::config::ServerConfig;
use crate::endpoint::Endpoint;
use crate::error::{ServerError, ServerResult};

const READ_BUFFER_SIZE: usize = 8 * 1024;

enum Listener {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

/// Settings every connection task needs a copy of.
#[derive(Debug, Clone)]
struct ConnectionSettings {
    delimiter: Delimiter,
    max_frame_size: usize,
    write_timeout: Duration,
}

/// Relay server accepting netbus clients.
pub struct RelayServer {
    /// Server configuration.
    config: ServerConfig,
    /// Bound listener.
    listener: Listener,
    /// Address actually bound (resolves port 0).
    local_endpoint: Endpoint,
    /// Subscription table shared by all connections.
    broker: Arc<Broker>,
    /// Semaphore for limiting concurrent connections.
    connection_semaphore: Arc<Semaphore>,
    next_connection_id: AtomicU64,
}

impl RelayServer {
    /// Binds to the endpoint in `config`.
    ///
    /// For Unix sockets, a stale socket file is removed first when
    /// `cleanup_stale_socket` is set and no server answers on it.
    pub async fn bind(config: ServerConfig) -> ServerResult<Self> {
        let (listener, local_endpoint) = match &config.endpoint {
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr.as_str()).await?;
                let local = Endpoint::Tcp(listener.local_addr()?.to_string());
                (Listener::Tcp(listener), local)
            }
            Endpoint::Unix(path) => bind_unix(path, config.cleanup_stale_socket).await?,
        };

        info!(endpoint = %local_endpoint, "Relay server listening");

        let connection_semaphore = Arc::new(Semaphore::new(config.max_connections));

        Ok(Self {
            config,
            listener,
            local_endpoint,
            broker: Arc::new(Broker::new()),
            connection_semaphore,
            next_connection_id: AtomicU64::new(1),
        })
    }

    /// Returns the endpoint the server is bound to.
    pub fn local_endpoint(&self) -> &Endpoint {
        &self.local_endpoint
    }

    /// Returns the subscription table.
    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Runs the accept loop, serving each connection on its own task.
    pub async fn run(&self) -> ServerResult<()> {
        loop {
            let Ok(permit) = self.connection_semaphore.clone().acquire_owned().await else {
                return Ok(());
            };

            let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
            let settings = ConnectionSettings {
                delimiter: self.config.delimiter.clone(),
                max_frame_size: self.config.max_frame_size,
                write_timeout: self.config.write_timeout,
            };
            let broker = Arc::clone(&self.broker);

            match &self.listener {
                Listener::Tcp(listener) => match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!(connection = id, peer = %addr, "Accepted TCP connection");
                        tokio::spawn(serve_connection(id, stream, broker, settings, permit));
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                #[cfg(unix)]
                Listener::Unix(listener) => match listener.accept().await {
                    Ok((stream, _addr)) => {
                        debug!(connection = id, "Accepted Unix connection");
                        tokio::spawn(serve_connection(id, stream, broker, settings, permit));
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
            }
        }
    }

    /// Runs the accept loop until `shutdown` completes.
    pub async fn run_until_shutdown<S>(&self, shutdown: S) -> ServerResult<()>
    where
        S: std::future::Future<Output = ()> + Send,
    {
        tokio::select! {
            result = self.run() => result,
            _ = shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        }
    }
}

impl Drop for RelayServer {
    fn drop(&mut self) {
        let Endpoint::Unix(path) = &self.local_endpoint else {
            return;
        };
        if path.exists() {
            if let Err(e) = std::fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "Failed to remove socket file");
            } else {
                debug!(path = %path.display(), "Removed socket file");
            }
        }
    }
}

#[cfg(unix)]
async fn bind_unix(path: &Path, cleanup_stale_socket: bool) -> ServerResult<(Listener, Endpoint)> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        return Err(ServerError::socket_path_invalid(
            parent.to_string_lossy().to_string(),
        ));
    }

    if path.exists() {
        if !cleanup_stale_socket || UnixStream::connect(path).await.is_ok() {
            return Err(ServerError::socket_in_use(path.to_string_lossy().to_string()));
        }
        info!(path = %path.display(), "Removing stale socket");
        std::fs::remove_file(path)?;
    }

    let listener = UnixListener::bind(path)?;
    Ok((Listener::Unix(listener), Endpoint::Unix(path.to_path_buf())))
}

#[cfg(not(unix))]
async fn bind_unix(path: &Path, _cleanup_stale_socket: bool) -> ServerResult<(Listener, Endpoint)> {
    Err(ServerError::Unsupported(format!(
        "unix sockets are not available: {}",
        path.display()
    )))
}

async fn serve_connection<S>(
    id: ConnectionId,
    stream: S,
    broker: Arc<Broker>,
    settings: ConnectionSettings,
    _permit: OwnedSemaphorePermit,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, mut writer) = tokio::io::split(stream);
    let (outbox, mut queued) = mpsc::unbounded_channel::<Arc<str>>();
    broker.register(id, outbox);

    let write_timeout = settings.write_timeout;
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = queued.recv().await {
            match tokio::time::timeout(write_timeout, writer.write_all(frame.as_bytes())).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    debug!(connection = id, error = %e, "Write failed");
                    break;
                }
                Err(_) => {
                    warn!(connection = id, "Write timed out, dropping subscriber output");
                    break;
                }
            }
        }
        let _ = writer.shutdown().await;
    });

    let mut decoder =
        FrameDecoder::with_max_frame_size(settings.delimiter.clone(), settings.max_frame_size);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    'read: loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(connection = id, error = %e, "Read failed");
                break;
            }
        };

        for frame in decoder.decode(&buf[..n]) {
            match frame {
                Ok(payload) => handle_frame(id, &payload, &broker, &settings.delimiter),
                Err(e) => {
                    warn!(connection = id, error = %e, "Closing connection");
                    break 'read;
                }
            }
        }
    }

    // Dropping the outbox ends the writer task.
    broker.unregister(id);
    let _ = writer_task.await;
    debug!(connection = id, "Connection closed");
}

fn handle_frame(id: ConnectionId, payload: &[u8], broker: &Broker, delimiter: &Delimiter) {
    let frame: ClientFrame = match serde_json::from_slice(payload) {
        Ok(frame) => frame,
        Err(e) => {
            debug!(connection = id, error = %e, "Dropping malformed frame");
            return;
        }
    };

    match frame {
        ClientFrame::Subscribe { event } => {
            broker.subscribe(id, &event);
        }
        ClientFrame::Unsubscribe { event } => {
            broker.unsubscribe(id, &event);
        }
        ClientFrame::Broadcast { event, args } => {
            let relay = InboundBroadcast::new(event, args);
            match encode_message(&relay, delimiter) {
                Ok(wire) => {
                    broker.publish(id, &relay.event, Arc::from(wire));
                }
                Err(e) => warn!(connection = id, error = %e, "Failed to encode relay frame"),
            }
        }
    }
}
