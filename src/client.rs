//! # Firehose Client
//!
//! Façade composing the connection, the replay buffer and the subscription
//! registry into the four operations the rest of the server consumes:
//! `start`, `stop`, `status` and `query`.
//!
//! One explicitly constructed client owns one physical connection. Every
//! decoded event is appended to the buffer and then fanned out to the
//! registry, exactly once per event.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::buffer::EventBuffer;
use crate::config::FirehoseConfig;
use crate::connection::{
    Connection, ConnectionNotice, ConnectionState, EventSink, Transport, WsTransport,
};
use crate::errors::FirehoseResult;
use crate::event::Event;
use crate::subscription::{Subscription, SubscriptionRegistry};

/// Returned by [`FirehoseClient::start`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartReceipt {
    pub subscription_id: String,
    pub collections: Vec<String>,
    pub status: &'static str,
    pub connection: ConnectionState,
}

/// Outcome of [`FirehoseClient::stop`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopStatus {
    Stopped,
    NotFound,
}

/// Returned by [`FirehoseClient::stop`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopReceipt {
    pub subscription_id: String,
    pub status: StopStatus,
}

/// Returned by [`FirehoseClient::status`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatus {
    pub connected: bool,
    pub last_seq: Option<u64>,
    pub subscription_count: usize,
}

/// Returned by [`FirehoseClient::query`]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuerySnapshot {
    pub events: Vec<Event>,
    pub total_buffered: usize,
    pub filtered: bool,
}

/// Streaming client: one connection, many logical subscriptions, bounded
/// replay window
pub struct FirehoseClient {
    config: FirehoseConfig,
    buffer: Arc<EventBuffer>,
    registry: Arc<SubscriptionRegistry>,
    connection: Connection,
}

impl std::fmt::Debug for FirehoseClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirehoseClient")
            .field("connection", &self.connection)
            .field("subscriptions", &self.registry.len())
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

impl FirehoseClient {
    /// Create a client using the production WebSocket transport
    pub fn new(config: FirehoseConfig) -> Self {
        Self::with_transport(config, Arc::new(WsTransport))
    }

    /// Create a client over an injected transport (used by tests)
    pub fn with_transport(config: FirehoseConfig, transport: Arc<dyn Transport>) -> Self {
        let buffer = Arc::new(EventBuffer::new(config.buffer_capacity));
        let registry = Arc::new(SubscriptionRegistry::new());

        let sink: EventSink = {
            let buffer = Arc::clone(&buffer);
            let registry = Arc::clone(&registry);
            Arc::new(move |event: Event| {
                let seq = event.seq;
                buffer.append(event.clone());
                let outcome = registry.dispatch(&event);
                tracing::debug!(
                    seq,
                    matched = outcome.matched,
                    delivered = outcome.delivered,
                    failed = outcome.failed,
                    "event ingested"
                );
            })
        };

        let connection = Connection::new(config.clone(), transport, sink);

        Self {
            config,
            buffer,
            registry,
            connection,
        }
    }

    /// Register a subscription, connecting first if the connection is not
    /// already alive. The connection is shared; the new subscription does
    /// not own it.
    ///
    /// # Errors
    ///
    /// Duplicate id or invalid filter. The existing subscription set is
    /// left untouched on failure.
    pub fn start(&self, subscription: Subscription) -> FirehoseResult<StartReceipt> {
        let subscription_id = subscription.id.clone();
        let mut collections: Vec<String> = subscription.collections.iter().cloned().collect();
        collections.sort();

        // Register before opening the transport so the subscriber sees the
        // session's first events, and a rejected subscription opens nothing.
        self.registry.subscribe(subscription)?;
        self.connection.connect();

        Ok(StartReceipt {
            subscription_id,
            collections,
            status: "subscribed",
            connection: self.connection.state(),
        })
    }

    /// Remove a subscription. Unknown ids report `NotFound` rather than
    /// failing. The connection stays open unless `close_when_idle` is set
    /// and this was the last subscription.
    pub fn stop(&self, subscription_id: &str) -> StopReceipt {
        let removed = self.registry.unsubscribe(subscription_id);

        if removed && self.config.close_when_idle && self.registry.is_empty() {
            self.connection.disconnect("idle: no subscriptions remain");
        }

        StopReceipt {
            subscription_id: subscription_id.to_string(),
            status: if removed {
                StopStatus::Stopped
            } else {
                StopStatus::NotFound
            },
        }
    }

    /// Connection and subscription snapshot
    pub fn status(&self) -> ClientStatus {
        ClientStatus {
            connected: self.connection.is_connected(),
            last_seq: self.connection.last_seq(),
            subscription_count: self.registry.len(),
        }
    }

    /// Replay up to `limit` recent events from the buffer, independent of
    /// any push subscription. Keeps serving the retained window during
    /// outages.
    pub fn query(&self, limit: usize, collection: Option<&str>) -> QuerySnapshot {
        QuerySnapshot {
            events: self.buffer.query(limit, collection),
            total_buffered: self.buffer.len(),
            filtered: collection.is_some(),
        }
    }

    /// Subscribe to connection lifecycle notifications
    pub fn notices(&self) -> broadcast::Receiver<ConnectionNotice> {
        self.connection.notices()
    }

    /// Tear down: disconnect and drop every subscription. The buffer keeps
    /// its retained window for late `query` calls.
    pub fn shutdown(&self) {
        self.connection.disconnect("client shutdown");
        self.registry.clear();
    }
}
