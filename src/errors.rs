//! # Firehose Errors
//!
//! Error types for the streaming client.
//!
//! Only configuration errors surface synchronously to callers; transport
//! and decode failures are recovered internally and observable through
//! connection notices and `status()`.

use thiserror::Error;

/// Result type for firehose operations
pub type FirehoseResult<T> = Result<T, FirehoseError>;

/// Firehose errors
#[derive(Debug, Clone, Error)]
pub enum FirehoseError {
    // ==================
    // Transport Errors
    // ==================
    /// Connection-level failure (handshake, socket, unclean close)
    #[error("Transport error: {0}")]
    Transport(String),

    // ==================
    // Decode Errors
    // ==================
    /// Malformed or unparseable inbound frame
    #[error("Failed to decode frame: {0}")]
    Decode(String),

    // ==================
    // Configuration Errors
    // ==================
    /// A subscription with this id is already active
    #[error("Subscription already registered: {0}")]
    DuplicateSubscription(String),

    /// Subscription id or collection filter is invalid
    #[error("Invalid subscription filter: {0}")]
    InvalidFilter(String),

    // ==================
    // Internal Errors
    // ==================
    /// Broken internal invariant (poisoned lock)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FirehoseError {
    /// Returns true for errors rejected synchronously at the call site.
    ///
    /// Everything else is recovered internally (reconnect, skip-frame,
    /// per-subscriber isolation).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FirehoseError::DuplicateSubscription(_) | FirehoseError::InvalidFilter(_)
        )
    }
}
