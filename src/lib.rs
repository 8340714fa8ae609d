//! # skystream
//!
//! Real-time firehose streaming client: a single long-lived connection to
//! an upstream append-only event feed, multiplexed across many independent
//! logical subscriptions, backed by a bounded in-memory replay buffer for
//! pull-based consumers.
//!
//! ## Architecture
//!
//! - **Decoder**: raw frame → structured [`Event`]
//! - **Buffer**: bounded, FIFO-evicting, replay-queryable event window
//! - **Subscriptions**: filtered fan-out with per-consumer failure isolation
//! - **Connection**: transport lifecycle, cursor tracking, reconnect with
//!   capped exponential backoff
//! - **Client**: the `start` / `stop` / `status` / `query` façade

pub mod buffer;
pub mod client;
pub mod config;
pub mod connection;
pub mod decoder;
pub mod errors;
pub mod event;
pub mod subscription;

pub use buffer::EventBuffer;
pub use client::{ClientStatus, FirehoseClient, QuerySnapshot, StartReceipt, StopReceipt, StopStatus};
pub use config::FirehoseConfig;
pub use connection::{
    BackoffPolicy, Connection, ConnectionNotice, ConnectionState, EventSink, FrameStream,
    Transport, WsTransport,
};
pub use decoder::{decode_frame, extract_seq};
pub use errors::{FirehoseError, FirehoseResult};
pub use event::{CommitOperation, Event, EventKind};
pub use subscription::{
    DispatchOutcome, ErrorCallback, EventCallback, SubscriberError, Subscription,
    SubscriptionRegistry,
};
