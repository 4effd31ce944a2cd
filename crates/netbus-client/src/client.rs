//! The netbus client: a local event bus mirrored onto one server connection.
//!
//! Registering the first listener for an event subscribes to it remotely,
//! removing the last one unsubscribes, and emitting broadcasts to the other
//! subscribers. Without a connection every operation behaves like a plain
//! local [`Emitter`].
//!
//! The registry, the frame decoder and the connection state live behind a
//! single mutex, and frames are written while it is held, so the order of
//! frames on the wire always matches the order of state changes. Listeners
//! are invoked after the lock is released and may call back into the client.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace, warn};

use netbus_core::{DEFAULT_MAX_LISTENERS, Emitter, Listener, ListenerId, listener};
use netbus_protocol::{Delimiter, FrameDecoder, MAX_FRAME_SIZE, SubscriptionKind};

use crate::error::{ClientError, ClientResult};
use crate::hook;
use crate::inbound;
use crate::lifecycle::{ConnectionId, ConnectionState, Lifecycle};
use crate::outbound::Outbound;
use crate::transport::Transport;

/// Tunables fixed at client construction.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Frame delimiter; must match the server's.
    pub delimiter: Delimiter,
    /// Maximum bytes buffered for one unterminated inbound frame.
    pub max_frame_size: usize,
    /// Timeout for establishing a socket connection.
    pub connect_timeout: Duration,
    /// Per-event listener count above which a leak warning is logged.
    pub max_listeners: usize,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            delimiter: Delimiter::default(),
            max_frame_size: MAX_FRAME_SIZE,
            connect_timeout: Duration::from_secs(5),
            max_listeners: DEFAULT_MAX_LISTENERS,
        }
    }
}

impl ClientOptions {
    /// Builder: set the frame delimiter.
    pub fn with_delimiter(mut self, delimiter: Delimiter) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Builder: set the inbound partial frame limit.
    pub fn with_max_frame_size(mut self, max: usize) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Builder: set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder: set the listener leak warning threshold.
    pub fn with_max_listeners(mut self, max: usize) -> Self {
        self.max_listeners = max;
        self
    }
}

struct State {
    emitter: Emitter,
    lifecycle: Lifecycle,
    decoder: FrameDecoder,
}

struct Inner {
    options: ClientOptions,
    state: Mutex<State>,
}

/// Distributed event bus client.
///
/// Cloning is cheap and yields a handle to the same client.
///
/// # Example
///
/// ```rust
/// use netbus_client::Client;
/// use serde_json::json;
///
/// let client = Client::new();
/// client.on("greet", |args| println!("hello {}", args[0]));
///
/// // Not connected: a purely local emit.
/// assert!(client.emit("greet", &[json!("world")]));
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<Inner>,
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Client")
            .field("state", &state.lifecycle.state())
            .field("delimiter", &self.inner.options.delimiter)
            .field("emitter", &state.emitter)
            .finish()
    }
}

impl Client {
    /// Creates a disconnected client with default options.
    pub fn new() -> Self {
        Self::with_options(ClientOptions::default())
    }

    /// Creates a client using `delimiter` to separate frames.
    ///
    /// Fails if the delimiter could occur inside an encoded frame.
    pub fn with_delimiter(delimiter: &str) -> ClientResult<Self> {
        let delimiter = Delimiter::new(delimiter)?;
        Ok(Self::with_options(
            ClientOptions::default().with_delimiter(delimiter),
        ))
    }

    /// Creates a client from explicit options.
    pub fn with_options(options: ClientOptions) -> Self {
        let mut emitter = Emitter::new();
        emitter.set_max_listeners(options.max_listeners);
        let decoder =
            FrameDecoder::with_max_frame_size(options.delimiter.clone(), options.max_frame_size);

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    emitter,
                    lifecycle: Lifecycle::default(),
                    decoder,
                }),
                options,
            }),
        }
    }

    /// Returns the options the client was built with.
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Returns the frame delimiter.
    pub fn delimiter(&self) -> &Delimiter {
        &self.inner.options.delimiter
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // -----------------------------------------------------------------------
    // Listener registration
    // -----------------------------------------------------------------------

    /// Registers a closure for `event`.
    pub fn on<F>(&self, event: &str, f: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.add_listener(event, listener(f))
    }

    /// Registers a closure for `event` that runs at most once.
    pub fn once<F>(&self, event: &str, f: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.add_once_listener(event, listener(f))
    }

    /// Appends `listener` to `event`.
    pub fn add_listener(&self, event: &str, listener: Listener) -> ListenerId {
        self.register(event, |emitter| emitter.add_listener(event, listener))
    }

    /// Inserts `listener` ahead of the other listeners of `event`.
    pub fn prepend_listener(&self, event: &str, listener: Listener) -> ListenerId {
        self.register(event, |emitter| emitter.prepend_listener(event, listener))
    }

    /// Appends a listener that is removed after its first invocation.
    pub fn add_once_listener(&self, event: &str, listener: Listener) -> ListenerId {
        self.register(event, |emitter| emitter.once(event, listener))
    }

    /// Prepends a listener that is removed after its first invocation.
    pub fn prepend_once_listener(&self, event: &str, listener: Listener) -> ListenerId {
        self.register(event, |emitter| {
            emitter.prepend_once_listener(event, listener)
        })
    }

    /// Removes listener `id` from `event`. Alias of [`remove_listener`](Self::remove_listener).
    pub fn off(&self, event: &str, id: ListenerId) -> bool {
        self.remove_listener(event, id)
    }

    /// Removes listener `id` from `event`, unsubscribing if it was the last one.
    ///
    /// Returns false if the listener was not registered for `event`.
    pub fn remove_listener(&self, event: &str, id: ListenerId) -> bool {
        let mut guard = self.lock();
        let State {
            emitter, lifecycle, ..
        } = &mut *guard;

        if !emitter.remove_listener(event, id) {
            return false;
        }
        Outbound::new(lifecycle, self.delimiter()).send_intent(hook::after_remove(emitter, event));
        true
    }

    /// Removes every listener of `event`, or of every event when `None`.
    ///
    /// The resulting unsubscriptions are written as one payload.
    pub fn remove_all_listeners(&self, event: Option<&str>) {
        let mut guard = self.lock();
        let State {
            emitter, lifecycle, ..
        } = &mut *guard;

        let emptied = emitter.remove_all_listeners(event);
        Outbound::new(lifecycle, self.delimiter())
            .send_intents(SubscriptionKind::Unsubscribe, &emptied);
    }

    fn register<F>(&self, event: &str, add: F) -> ListenerId
    where
        F: FnOnce(&mut Emitter) -> ListenerId,
    {
        let mut guard = self.lock();
        let State {
            emitter, lifecycle, ..
        } = &mut *guard;

        let id = add(emitter);
        Outbound::new(lifecycle, self.delimiter()).send_intent(hook::after_add(emitter, event));
        id
    }

    // -----------------------------------------------------------------------
    // Emission and queries
    // -----------------------------------------------------------------------

    /// Broadcasts `event` to the server (when connected) and invokes the local
    /// listeners synchronously.
    ///
    /// Returns true if the event had local listeners.
    pub fn emit(&self, event: &str, args: &[Value]) -> bool {
        let listeners = {
            let mut guard = self.lock();
            let State {
                emitter, lifecycle, ..
            } = &mut *guard;

            let outbound = Outbound::new(lifecycle, self.delimiter());
            outbound.send_broadcast(event, args);

            let listeners = emitter.take_for_emit(event);
            if !listeners.is_empty() {
                // Once-listeners may have just emptied the event.
                outbound.send_intent(hook::after_remove(emitter, event));
            }
            listeners
        };

        for listener in &listeners {
            listener(args);
        }
        !listeners.is_empty()
    }

    /// Serializes `args` and emits them.
    ///
    /// A value serializing to a JSON array is spread into positional
    /// arguments; anything else becomes the single argument.
    pub fn emit_serialized<T>(&self, event: &str, args: &T) -> ClientResult<bool>
    where
        T: Serialize + ?Sized,
    {
        let args = match serde_json::to_value(args)? {
            Value::Array(args) => args,
            other => vec![other],
        };
        Ok(self.emit(event, &args))
    }

    /// Listeners of `event` in invocation order.
    pub fn listeners(&self, event: &str) -> Vec<Listener> {
        self.lock().emitter.listeners(event)
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.lock().emitter.listener_count(event)
    }

    /// Events with at least one listener, in registration order.
    pub fn event_names(&self) -> Vec<String> {
        self.lock().emitter.event_names()
    }

    /// Whether `event` is (or will be, once connected) subscribed on the server.
    pub fn is_subscribed(&self, event: &str) -> bool {
        hook::is_subscribed(&self.lock().emitter, event)
    }

    /// Changes the listener leak warning threshold.
    pub fn set_max_listeners(&self, max: usize) {
        self.lock().emitter.set_max_listeners(max);
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.lock().lifecycle.state()
    }

    // -----------------------------------------------------------------------
    // Transport notifications
    // -----------------------------------------------------------------------

    /// Attaches a transport that is about to connect.
    ///
    /// Any previously attached transport is closed and its partial input
    /// discarded.
    pub fn attach(&self, transport: Arc<dyn Transport>) -> ConnectionId {
        let mut guard = self.lock();
        guard.decoder.reset();
        guard.lifecycle.begin(transport)
    }

    /// The attached transport has connected: replays every current
    /// subscription in one write.
    ///
    /// Returns false if there was nothing to connect, or the transport had
    /// already been acknowledged.
    pub fn handle_connect(&self) -> bool {
        self.connect_inner(None)
    }

    /// Feeds bytes read from the transport.
    ///
    /// Complete broadcast frames are dispatched to local listeners; malformed
    /// ones are dropped. If the peer exceeds the frame size limit the
    /// connection is closed and the error returned.
    pub fn handle_data(&self, chunk: &[u8]) -> ClientResult<()> {
        self.data_inner(None, chunk)
    }

    /// The transport closed or failed.
    pub fn handle_close(&self) {
        self.close_inner(None);
    }

    pub(crate) fn connected(&self, id: ConnectionId) -> bool {
        self.connect_inner(Some(id))
    }

    pub(crate) fn receive(&self, id: ConnectionId, chunk: &[u8]) -> ClientResult<()> {
        self.data_inner(Some(id), chunk)
    }

    pub(crate) fn release(&self, id: ConnectionId) {
        self.close_inner(Some(id));
    }

    pub(crate) fn is_current(&self, id: ConnectionId) -> bool {
        self.lock().lifecycle.is_current(id)
    }

    fn connect_inner(&self, id: Option<ConnectionId>) -> bool {
        let mut guard = self.lock();
        let State {
            emitter,
            lifecycle,
            decoder,
        } = &mut *guard;

        if id.is_some_and(|id| !lifecycle.is_current(id)) || !lifecycle.establish() {
            return false;
        }

        decoder.reset();
        let events = hook::replay_set(emitter);
        debug!(count = events.len(), "replaying subscriptions");
        Outbound::new(lifecycle, self.delimiter()).send_intents(SubscriptionKind::Subscribe, &events);
        true
    }

    fn data_inner(&self, id: Option<ConnectionId>, chunk: &[u8]) -> ClientResult<()> {
        let (payloads, failure) = {
            let mut guard = self.lock();
            let State {
                lifecycle, decoder, ..
            } = &mut *guard;

            if id.is_some_and(|id| !lifecycle.is_current(id)) {
                return Err(ClientError::Connection("connection superseded".into()));
            }
            if lifecycle.state() != ConnectionState::Connected {
                debug!(state = %lifecycle.state(), bytes = chunk.len(), "dropping data while not connected");
                return Ok(());
            }

            let mut payloads = Vec::new();
            let mut failure = None;
            for frame in decoder.decode(chunk) {
                match frame {
                    Ok(payload) => payloads.push(payload),
                    Err(e) => failure = Some(e),
                }
            }
            (payloads, failure)
        };

        // Each frame sees the listeners registered once the previous frame's
        // listeners have returned.
        for payload in payloads {
            let Some(broadcast) = inbound::resolve(&payload) else {
                continue;
            };
            let Some(listeners) = self.take_inbound(id, &broadcast.event) else {
                debug!("connection closed during dispatch, dropping remaining frames");
                break;
            };
            trace!(event = %broadcast.event, listeners = listeners.len(), "dispatching broadcast");
            inbound::deliver(&listeners, &broadcast.args);
        }

        match failure {
            Some(e) if e.is_fatal() => {
                warn!(error = %e, "protocol violation, closing connection");
                self.close_inner(id);
                Err(e.into())
            }
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// Snapshots the listeners for one inbound broadcast and writes the
    /// unsubscribe if once-listeners emptied the event.
    ///
    /// Returns `None` once the connection that delivered the frame is gone.
    fn take_inbound(&self, id: Option<ConnectionId>, event: &str) -> Option<Vec<Listener>> {
        let mut guard = self.lock();
        let State {
            emitter, lifecycle, ..
        } = &mut *guard;

        if id.is_some_and(|id| !lifecycle.is_current(id))
            || lifecycle.state() != ConnectionState::Connected
        {
            return None;
        }

        let listeners = emitter.take_for_emit(event);
        if !listeners.is_empty() {
            Outbound::new(lifecycle, self.delimiter()).send_intent(hook::after_remove(emitter, event));
        }
        Some(listeners)
    }

    fn close_inner(&self, id: Option<ConnectionId>) {
        let mut guard = self.lock();
        if id.is_some_and(|id| !guard.lifecycle.is_current(id)) {
            return;
        }
        guard.lifecycle.reset();
        guard.decoder.reset();
    }
}
