//! Broadcast bus: fans the live byte stream out to every connected listener
//!
//! Each listener is a [`ListenerSink`]. `publish` writes the same chunk to
//! every sink while holding the subscriber lock, so a join or leave can never
//! interleave with a half-finished fan-out. A sink that fails is removed on
//! the spot; the others still get the chunk.
//!
//! There is no history: a new listener hears only chunks published after it
//! subscribed.

use bytes::Bytes;
use futures::stream::Stream;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Unique key of one subscriber
pub type SubscriberId = Uuid;

/// Why a write to a listener failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// The listener went away
    Closed,
    /// The listener is not keeping up and its queue is full
    Overrun,
}

/// Output side of one listener connection
///
/// `write` must not block: it is called with the subscriber lock held.
pub trait ListenerSink: Send + Sync + 'static {
    fn write(&self, chunk: Bytes) -> Result<(), SinkError>;
}

/// Bounded channel sink feeding an HTTP response body
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
}

impl ListenerSink for ChannelSink {
    fn write(&self, chunk: Bytes) -> Result<(), SinkError> {
        self.tx.try_send(chunk).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Overrun,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }
}

struct Subscriber {
    sink: Box<dyn ListenerSink>,
    joined_at: Instant,
}

/// Fan-out of one logical byte stream to N listeners
pub struct BroadcastBus {
    subscribers: Mutex<HashMap<SubscriberId, Subscriber>>,
    /// Queue depth of channel-backed subscriptions
    buffer_chunks: usize,
}

impl BroadcastBus {
    pub fn new(buffer_chunks: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            buffer_chunks: buffer_chunks.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Subscriber>> {
        // A panic while holding the lock cannot leave the map half-updated
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register an arbitrary sink
    pub fn subscribe_sink(&self, sink: Box<dyn ListenerSink>) -> SubscriberId {
        let id = Uuid::new_v4();
        let count = {
            let mut subscribers = self.lock();
            subscribers.insert(
                id,
                Subscriber {
                    sink,
                    joined_at: Instant::now(),
                },
            );
            subscribers.len()
        };
        info!("Listener {} joined, total listeners: {}", id, count);
        id
    }

    /// Register a channel-backed listener and return its chunk stream
    ///
    /// Dropping the returned [`Subscription`] unsubscribes it.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.buffer_chunks);
        let id = self.subscribe_sink(Box::new(ChannelSink { tx }));
        Subscription {
            id,
            bus: Arc::clone(self),
            rx,
        }
    }

    /// Remove a listener; returns false if it was already gone
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = {
            let mut subscribers = self.lock();
            subscribers.remove(&id).map(|s| (s, subscribers.len()))
        };
        match removed {
            Some((subscriber, remaining)) => {
                info!(
                    "Listener {} left after {:?}, total listeners: {}",
                    id,
                    subscriber.joined_at.elapsed(),
                    remaining
                );
                true
            }
            None => false,
        }
    }

    /// Deliver a chunk to every listener
    ///
    /// Returns the number of listeners that accepted it. Failing listeners
    /// are dropped; nothing is reported back to the publisher.
    pub fn publish(&self, chunk: Bytes) -> usize {
        let mut subscribers = self.lock();
        let mut failed = Vec::new();

        for (id, subscriber) in subscribers.iter() {
            if let Err(e) = subscriber.sink.write(chunk.clone()) {
                failed.push((*id, e));
            }
        }

        for (id, e) in &failed {
            subscribers.remove(id);
            match e {
                SinkError::Closed => debug!("Listener {} closed, removing", id),
                SinkError::Overrun => warn!("Listener {} fell behind, dropping it", id),
            }
        }

        subscribers.len()
    }

    /// Drop every listener; their streams end once drained
    pub fn close_all(&self) -> usize {
        let closed = self.lock().drain().count();
        if closed > 0 {
            info!("Closed {} listener streams", closed);
        }
        closed
    }

    /// Current number of listeners
    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }
}

/// A channel-backed listener registration
///
/// Yields every chunk published after it was created. Unsubscribes on drop,
/// which is what frees a listener when its HTTP connection closes.
pub struct Subscription {
    id: SubscriberId,
    bus: Arc<BroadcastBus>,
    rx: mpsc::Receiver<Bytes>,
}

impl Subscription {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Receive the next chunk; `None` once the bus dropped this listener
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Take a chunk if one is already queued
    pub fn try_recv(&mut self) -> Option<Bytes> {
        self.rx.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.id);
    }
}
