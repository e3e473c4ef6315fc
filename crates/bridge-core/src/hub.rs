//! Event fan-out to live subscribers.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::{BridgeEvent, SessionState};

/// Subscriber identifier.
pub type SubscriberId = Uuid;

/// Serialized event frame shared by all recipients.
pub type Frame = Arc<str>;

/// Hub configuration.
#[derive(Debug, Clone, Copy)]
pub struct HubConfig {
    /// Per-subscriber queue length before events are dropped.
    pub subscriber_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
        }
    }
}

enum Delivery {
    Delivered,
    Dropped,
    Closed,
}

struct Subscriber {
    tx: mpsc::Sender<Frame>,
    dropped: AtomicU64,
}

impl Subscriber {
    fn deliver(&self, frame: &Frame) -> Delivery {
        match self.tx.try_send(Arc::clone(frame)) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                Delivery::Dropped
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}

/// Broadcasts bridge events to every live subscriber.
///
/// Each subscriber owns a bounded queue. Delivery is a single `try_send`,
/// so a slow or dead subscriber never stalls a publisher. Events for one
/// subscriber stay in publish order.
pub struct BroadcastHub {
    config: HubConfig,
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

impl BroadcastHub {
    /// Create a new hub.
    #[must_use]
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Register a subscriber and queue the session snapshot as its first event.
    ///
    /// The snapshot is queued under the same lock that inserts the
    /// subscriber, so no published event can overtake it.
    pub fn subscribe(&self, snapshot: &SessionState) -> (SubscriberId, mpsc::Receiver<Frame>) {
        let (tx, rx) = mpsc::channel(self.config.subscriber_buffer.max(1));
        let id = Uuid::new_v4();
        let subscriber = Subscriber {
            tx,
            dropped: AtomicU64::new(0),
        };

        let mut subscribers = self.subscribers.write();
        if let Some(frame) = encode(&snapshot.status_event()) {
            subscriber.deliver(&frame);
        }
        subscribers.insert(id, subscriber);
        let count = subscribers.len();
        drop(subscribers);

        tracing::debug!(subscriber_id = %id, subscribers = count, "subscriber added");
        (id, rx)
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriberId) {
        if let Some(subscriber) = self.subscribers.write().remove(&id) {
            let dropped = subscriber.dropped.load(Ordering::Relaxed);
            tracing::debug!(subscriber_id = %id, dropped, "subscriber removed");
        }
    }

    /// Send an event to every subscriber whose channel is open.
    ///
    /// Subscribers found closed are removed.
    pub fn publish(&self, event: &BridgeEvent) {
        let Some(frame) = encode(event) else {
            return;
        };

        let mut closed = Vec::new();
        {
            let subscribers = self.subscribers.read();
            tracing::debug!(
                event_type = event.event_type(),
                recipients = subscribers.len(),
                "publish event"
            );
            for (id, subscriber) in subscribers.iter() {
                match subscriber.deliver(&frame) {
                    Delivery::Delivered => {}
                    Delivery::Dropped => {
                        tracing::warn!(
                            subscriber_id = %id,
                            event_type = event.event_type(),
                            "subscriber queue full, event dropped"
                        );
                    }
                    Delivery::Closed => closed.push(*id),
                }
            }
        }

        if !closed.is_empty() {
            let mut subscribers = self.subscribers.write();
            for id in closed {
                subscribers.remove(&id);
                tracing::debug!(subscriber_id = %id, "pruned closed subscriber");
            }
        }
    }

    /// Send an event to one subscriber only.
    ///
    /// Returns `false` if the subscriber is unknown, closed or full.
    pub fn send_to(&self, id: SubscriberId, event: &BridgeEvent) -> bool {
        let Some(frame) = encode(event) else {
            return false;
        };
        let delivery = self
            .subscribers
            .read()
            .get(&id)
            .map(|subscriber| subscriber.deliver(&frame));

        match delivery {
            Some(Delivery::Delivered) => true,
            Some(Delivery::Closed) => {
                self.unsubscribe(id);
                false
            }
            Some(Delivery::Dropped) | None => false,
        }
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

fn encode(event: &BridgeEvent) -> Option<Frame> {
    match serde_json::to_string(event) {
        Ok(json) => Some(json.into()),
        Err(e) => {
            tracing::error!(event_type = event.event_type(), "Failed to serialize event: {e}");
            None
        }
    }
}
