//! The seam between the client and whatever moves its bytes.

/// A connected byte stream, as seen by the client.
///
/// Writes are fire-and-forget: implementations queue the payload and return
/// without waiting for delivery. Back-pressure and write failures are the
/// transport's business; a failed transport reports back through
/// [`Client::handle_close`](crate::Client::handle_close).
pub trait Transport: Send + Sync {
    /// Queues `payload` for writing.
    fn write(&self, payload: String);

    /// Closes the connection. Queued writes may still be flushed first.
    fn close(&self);
}
