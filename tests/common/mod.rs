//! Shared test harness: a scripted transport and frame builders.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use futures_util::stream;
use futures_util::StreamExt;
use serde_json::json;

use skystream::{FirehoseError, FirehoseResult, FrameStream, Transport};

static TRACING: Once = Once::new();

/// Route tracing output through the test capture, once per test binary
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// One scripted transport session, consumed per `open` call
pub enum Session {
    /// Refuse the connection attempt
    Refuse(&'static str),
    /// Yield these frames, then close uncleanly
    Frames(Vec<String>),
    /// Yield these frames, then stay open without yielding
    FramesThenHold(Vec<String>),
}

/// Transport that replays scripted sessions and records every URL opened
pub struct ScriptedTransport {
    sessions: Mutex<VecDeque<Session>>,
    urls: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(sessions: Vec<Session>) -> Self {
        init_tracing();
        Self {
            sessions: Mutex::new(sessions.into()),
            urls: Mutex::new(Vec::new()),
        }
    }

    /// URLs passed to `open`, in order
    pub fn opened_urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.urls.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn open(&self, url: &str) -> FirehoseResult<FrameStream> {
        self.urls.lock().unwrap().push(url.to_string());

        let session = self.sessions.lock().unwrap().pop_front();
        match session {
            None => Err(FirehoseError::Transport("script exhausted".to_string())),
            Some(Session::Refuse(message)) => {
                Err(FirehoseError::Transport(message.to_string()))
            }
            Some(Session::Frames(frames)) => Ok(Box::pin(stream::iter(
                frames.into_iter().map(Ok::<String, FirehoseError>),
            ))),
            Some(Session::FramesThenHold(frames)) => Ok(Box::pin(
                stream::iter(frames.into_iter().map(Ok::<String, FirehoseError>))
                    .chain(stream::pending::<FirehoseResult<String>>()),
            )),
        }
    }
}

/// A commit frame for `collection`, authored by a fixed repo
pub fn commit_frame(seq: u64, collection: &str) -> String {
    json!({
        "type": "commit",
        "seq": seq,
        "time": "2024-06-01T12:00:00Z",
        "repo": "did:example:alice",
        "commit": {
            "collection": collection,
            "operation": "create",
            "record": {"seq": seq}
        }
    })
    .to_string()
}

/// An identity frame (no collection)
pub fn identity_frame(seq: u64) -> String {
    json!({
        "type": "identity",
        "seq": seq,
        "time": "2024-06-01T12:00:00Z",
        "repo": "did:example:bob"
    })
    .to_string()
}

/// Poll `probe` until it holds or a ~2s budget elapses
pub async fn wait_until(mut probe: impl FnMut() -> bool) {
    for _ in 0..400 {
        if probe() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("condition not reached within timeout");
}
