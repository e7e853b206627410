//! SSE broadcaster for relay status updates

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info, warn};

use super::events::RelayEvent;

/// Distributes [`RelayEvent`]s to every connected SSE client
#[derive(Clone)]
pub struct SseBroadcaster {
    tx: broadcast::Sender<RelayEvent>,
}

impl SseBroadcaster {
    /// `capacity` is the number of events a slow client may lag behind
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        debug!("SSE broadcaster initialized with capacity {}", capacity);
        Self { tx }
    }

    /// Broadcast an event, ignoring if no clients are connected
    pub fn broadcast_lossy(&self, event: RelayEvent) {
        if let Ok(count) = self.tx.send(event) {
            debug!("Broadcast event to {} clients", count);
        }
    }

    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Raw receiver, mostly for tests
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.tx.subscribe()
    }

    /// Event stream for a new client connection
    pub fn subscribe_stream(&self) -> impl Stream<Item = Result<Event, Infallible>> {
        BroadcastStream::new(self.tx.subscribe()).filter_map(|result| async move {
            match result {
                Ok(relay_event) => Event::default()
                    .event(relay_event.event_type())
                    .json_data(&relay_event)
                    .ok()
                    .map(Ok),
                Err(e) => {
                    // Lagged clients just miss events
                    warn!("SSE client error: {:?}", e);
                    None
                }
            }
        })
    }

    /// Response for `GET /api/events`
    pub fn handle_sse_connection(&self) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
        info!(
            "New SSE client connected, total clients: {}",
            self.client_count() + 1
        );

        Sse::new(self.subscribe_stream()).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        )
    }
}

impl Default for SseBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
