//! # Firehose Events
//!
//! Event types for upstream repository changes. Events are immutable after
//! construction; consumers only ever observe clones or shared references.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Kind of upstream event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A record created, updated or deleted in one collection
    Commit,
    /// Handle or signing-key change for an account
    Identity,
    /// Account status change (active, deactivated, taken down)
    Account,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Commit => write!(f, "commit"),
            EventKind::Identity => write!(f, "identity"),
            EventKind::Account => write!(f, "account"),
        }
    }
}

/// Operation carried by a commit event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitOperation {
    Create,
    Update,
    Delete,
}

impl std::fmt::Display for CommitOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitOperation::Create => write!(f, "create"),
            CommitOperation::Update => write!(f, "update"),
            CommitOperation::Delete => write!(f, "delete"),
        }
    }
}

/// One upstream change, decoded from a firehose frame
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Event kind
    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Upstream-assigned sequence number. Non-decreasing within a
    /// connection session; not unique or contiguous across reconnects.
    pub seq: u64,

    /// Upstream-reported timestamp
    pub time: DateTime<Utc>,

    /// Identifier of the account/repository the change belongs to
    pub repo: String,

    /// Collection of the changed record (commit events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,

    /// Operation performed (commit events only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<CommitOperation>,

    /// Decoded record payload, when the frame carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,

    /// Local wall-clock time of receipt
    pub received_at: DateTime<Utc>,
}

impl Event {
    /// Create a commit event
    pub fn commit(
        seq: u64,
        time: DateTime<Utc>,
        repo: String,
        collection: String,
        operation: CommitOperation,
        record: Option<Value>,
    ) -> Self {
        Self {
            kind: EventKind::Commit,
            seq,
            time,
            repo,
            collection: Some(collection),
            operation: Some(operation),
            record,
            received_at: Utc::now(),
        }
    }

    /// Create an identity event
    pub fn identity(seq: u64, time: DateTime<Utc>, repo: String) -> Self {
        Self {
            kind: EventKind::Identity,
            seq,
            time,
            repo,
            collection: None,
            operation: None,
            record: None,
            received_at: Utc::now(),
        }
    }

    /// Create an account event
    pub fn account(seq: u64, time: DateTime<Utc>, repo: String) -> Self {
        Self {
            kind: EventKind::Account,
            seq,
            time,
            repo,
            collection: None,
            operation: None,
            record: None,
            received_at: Utc::now(),
        }
    }
}
