//! # Frame Decoder
//!
//! Turns one raw inbound frame into an [`Event`], or fails without side
//! effects beyond reporting. A decode failure never terminates the
//! connection; the frame is dropped and reading continues.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::errors::{FirehoseError, FirehoseResult};
use crate::event::{CommitOperation, Event, EventKind};

/// Raw inbound frame shape
#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: EventKind,
    seq: u64,
    time: DateTime<Utc>,
    repo: String,
    #[serde(default)]
    commit: Option<RawCommit>,
}

/// Commit body carried by commit frames
#[derive(Debug, Deserialize)]
struct RawCommit {
    collection: String,
    operation: CommitOperation,
    #[serde(default)]
    record: Option<Value>,
}

/// Minimal probe used to salvage the sequence number from frames that fail
/// the full decode
#[derive(Debug, Deserialize)]
struct SeqProbe {
    #[serde(default)]
    seq: Option<u64>,
}

/// Decode one frame into an [`Event`].
///
/// # Errors
///
/// Returns [`FirehoseError::Decode`] for unparseable JSON and for commit
/// frames that carry no commit body.
pub fn decode_frame(frame: &str) -> FirehoseResult<Event> {
    let raw: RawFrame =
        serde_json::from_str(frame).map_err(|e| FirehoseError::Decode(e.to_string()))?;

    match raw.kind {
        EventKind::Commit => {
            let commit = raw.commit.ok_or_else(|| {
                FirehoseError::Decode("commit frame missing commit body".to_string())
            })?;
            Ok(Event::commit(
                raw.seq,
                raw.time,
                raw.repo,
                commit.collection,
                commit.operation,
                commit.record,
            ))
        }
        EventKind::Identity => Ok(Event::identity(raw.seq, raw.time, raw.repo)),
        EventKind::Account => Ok(Event::account(raw.seq, raw.time, raw.repo)),
    }
}

/// Best-effort extraction of the sequence number from a frame.
///
/// Used when the full decode fails so the resumption cursor still advances.
/// Returns `None` for frames that are not JSON objects or carry no numeric
/// `seq`.
pub fn extract_seq(frame: &str) -> Option<u64> {
    serde_json::from_str::<SeqProbe>(frame).ok().and_then(|p| p.seq)
}
