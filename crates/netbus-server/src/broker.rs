//! Subscription table and broadcast fan-out.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Identifier the server assigns to each accepted connection.
pub type ConnectionId = u64;

/// Outgoing queue of a connection. Payloads are complete encoded frames.
pub(crate) type Outbox = mpsc::UnboundedSender<Arc<str>>;

#[derive(Debug)]
struct Peer {
    outbox: Outbox,
    subscriptions: HashSet<String>,
}

/// Tracks connected peers and the events each one listens to.
#[derive(Debug, Default)]
pub struct Broker {
    peers: Mutex<HashMap<ConnectionId, Peer>>,
}

impl Broker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    fn peers(&self) -> MutexGuard<'_, HashMap<ConnectionId, Peer>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a connection and the queue its frames are delivered to.
    pub(crate) fn register(&self, id: ConnectionId, outbox: Outbox) {
        self.peers().insert(
            id,
            Peer {
                outbox,
                subscriptions: HashSet::new(),
            },
        );
        debug!(connection = id, "peer registered");
    }

    /// Drops a connection together with all of its subscriptions.
    pub fn unregister(&self, id: ConnectionId) {
        if let Some(peer) = self.peers().remove(&id) {
            debug!(
                connection = id,
                subscriptions = peer.subscriptions.len(),
                "peer unregistered"
            );
        }
    }

    /// Subscribes `id` to `event`. Returns false if it already was.
    pub fn subscribe(&self, id: ConnectionId, event: &str) -> bool {
        let mut peers = self.peers();
        let Some(peer) = peers.get_mut(&id) else {
            return false;
        };
        let added = peer.subscriptions.insert(event.to_string());
        trace!(connection = id, event, added, "subscribe");
        added
    }

    /// Unsubscribes `id` from `event`. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: ConnectionId, event: &str) -> bool {
        let mut peers = self.peers();
        let Some(peer) = peers.get_mut(&id) else {
            return false;
        };
        let removed = peer.subscriptions.remove(event);
        trace!(connection = id, event, removed, "unsubscribe");
        removed
    }

    /// Queues `frame` for every peer other than `from` subscribed to `event`.
    ///
    /// Returns the number of peers the frame was queued for.
    pub fn publish(&self, from: ConnectionId, event: &str, frame: Arc<str>) -> usize {
        let peers = self.peers();
        let mut delivered = 0;
        for (id, peer) in peers.iter() {
            if *id == from || !peer.subscriptions.contains(event) {
                continue;
            }
            if peer.outbox.send(Arc::clone(&frame)).is_ok() {
                delivered += 1;
            }
        }
        trace!(from, event, delivered, "broadcast relayed");
        delivered
    }

    /// Number of peers subscribed to `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.peers()
            .values()
            .filter(|peer| peer.subscriptions.contains(event))
            .count()
    }

    /// Number of connected peers.
    pub fn peer_count(&self) -> usize {
        self.peers().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(broker: &Broker, id: ConnectionId) -> mpsc::UnboundedReceiver<Arc<str>> {
        let (tx, rx) = mpsc::unbounded_channel();
        broker.register(id, tx);
        rx
    }

    #[test]
    fn publish_reaches_other_subscribers_only() {
        let broker = Broker::new();
        let mut a = peer(&broker, 1);
        let mut b = peer(&broker, 2);
        let mut c = peer(&broker, 3);

        assert!(broker.subscribe(1, "x"));
        assert!(broker.subscribe(2, "x"));
        assert!(broker.subscribe(3, "y"));

        let delivered = broker.publish(2, "x", Arc::from("frame"));
        assert_eq!(delivered, 1);
        assert_eq!(a.try_recv().unwrap().as_ref(), "frame");
        assert!(b.try_recv().is_err());
        assert!(c.try_recv().is_err());
    }

    #[test]
    fn subscribe_is_idempotent() {
        let broker = Broker::new();
        let _rx = peer(&broker, 1);
        assert!(broker.subscribe(1, "x"));
        assert!(!broker.subscribe(1, "x"));
        assert_eq!(broker.subscriber_count("x"), 1);

        assert!(broker.unsubscribe(1, "x"));
        assert!(!broker.unsubscribe(1, "x"));
        assert_eq!(broker.subscriber_count("x"), 0);
    }

    #[test]
    fn unknown_peer_is_ignored() {
        let broker = Broker::new();
        assert!(!broker.subscribe(9, "x"));
        assert!(!broker.unsubscribe(9, "x"));
    }

    #[test]
    fn unregister_drops_subscriptions() {
        let broker = Broker::new();
        let _rx = peer(&broker, 1);
        broker.subscribe(1, "x");
        assert_eq!(broker.peer_count(), 1);

        broker.unregister(1);
        assert_eq!(broker.peer_count(), 0);
        assert_eq!(broker.subscriber_count("x"), 0);
        assert_eq!(broker.publish(2, "x", Arc::from("frame")), 0);
    }

    #[test]
    fn closed_outbox_is_not_counted() {
        let broker = Broker::new();
        let rx = peer(&broker, 1);
        broker.subscribe(1, "x");
        drop(rx);
        assert_eq!(broker.publish(2, "x", Arc::from("frame")), 0);
    }
}
