//! # Firehose Configuration
//!
//! Configuration for the streaming client: upstream host, replay buffer
//! capacity, and reconnect backoff. Owned by the embedding server, consumed
//! here.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::BackoffPolicy;

/// Fixed subscription path on the upstream host
const SUBSCRIBE_PATH: &str = "/subscribe";

/// Streaming client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirehoseConfig {
    /// Upstream firehose host (default: "localhost:6008")
    #[serde(default = "default_host")]
    pub host: String,

    /// Maximum events retained for replay queries (default: 100)
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,

    /// Base reconnect delay in milliseconds (default: 1000)
    #[serde(default = "default_reconnect_base_ms")]
    pub reconnect_base_ms: u64,

    /// Maximum reconnect delay in milliseconds (default: 60000)
    #[serde(default = "default_reconnect_max_ms")]
    pub reconnect_max_ms: u64,

    /// Consecutive failed attempts before giving up (default: 20)
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    /// Close the connection when the last subscription is removed
    /// (default: false — the connection stays open for pull consumers)
    #[serde(default)]
    pub close_when_idle: bool,
}

fn default_host() -> String {
    "localhost:6008".to_string()
}

fn default_buffer_capacity() -> usize {
    100
}

fn default_reconnect_base_ms() -> u64 {
    1_000
}

fn default_reconnect_max_ms() -> u64 {
    60_000
}

fn default_max_reconnect_attempts() -> u32 {
    20
}

impl Default for FirehoseConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            buffer_capacity: default_buffer_capacity(),
            reconnect_base_ms: default_reconnect_base_ms(),
            reconnect_max_ms: default_reconnect_max_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            close_when_idle: false,
        }
    }
}

impl FirehoseConfig {
    /// Create a config pointed at a specific host
    pub fn with_host(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Default::default()
        }
    }

    /// Build the subscription URL, appending the resumption cursor when one
    /// has been observed. Resumption is best effort; gaps and duplicates
    /// across reconnects are possible.
    pub fn endpoint_url(&self, cursor: Option<u64>) -> String {
        match cursor {
            Some(seq) => format!("wss://{}{}?cursor={}", self.host, SUBSCRIBE_PATH, seq),
            None => format!("wss://{}{}", self.host, SUBSCRIBE_PATH),
        }
    }

    /// The reconnect backoff policy derived from this config
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(
            Duration::from_millis(self.reconnect_base_ms),
            Duration::from_millis(self.reconnect_max_ms),
            self.max_reconnect_attempts,
        )
    }
}
