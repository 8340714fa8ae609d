//! End-to-end streaming through the client façade: scripted frames flow
//! into the replay buffer and out to filtered subscribers.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use common::{commit_frame, identity_frame, wait_until, ScriptedTransport, Session};
use skystream::{FirehoseClient, FirehoseConfig, Subscription};

fn test_config() -> FirehoseConfig {
    FirehoseConfig {
        host: "feed.test".to_string(),
        reconnect_base_ms: 1,
        reconnect_max_ms: 10,
        max_reconnect_attempts: 2,
        ..Default::default()
    }
}

#[tokio::test]
async fn events_reach_buffer_and_matching_subscriber() {
    let transport = Arc::new(ScriptedTransport::new(vec![Session::FramesThenHold(vec![
        commit_frame(1, "app.feed.post"),
        commit_frame(2, "app.feed.like"),
        commit_frame(3, "app.feed.post"),
    ])]));
    let client = FirehoseClient::with_transport(test_config(), transport);

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .start(
            Subscription::new("posts", vec!["app.feed.post".to_string()], move |event| {
                tx.send(event.seq).map_err(|e| e.to_string())?;
                Ok(())
            }),
        )
        .unwrap();

    // Only the two post commits arrive, in upstream order
    let first = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    let second = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    assert_eq!(first, Some(1));
    assert_eq!(second, Some(3));

    // The buffer retains everything regardless of subscriptions
    wait_until(|| client.query(10, None).events.len() == 3).await;

    let status = client.status();
    assert!(status.connected);
    assert_eq!(status.last_seq, Some(3));
    assert_eq!(status.subscription_count, 1);

    let posts = client.query(10, Some("app.feed.post"));
    let seqs: Vec<u64> = posts.events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![1, 3]);
    assert_eq!(posts.total_buffered, 3);
    assert!(posts.filtered);

    client.shutdown();
}

#[tokio::test]
async fn failing_subscriber_does_not_block_the_other() {
    let transport = Arc::new(ScriptedTransport::new(vec![Session::FramesThenHold(vec![
        commit_frame(1, "app.feed.post"),
    ])]));
    let client = FirehoseClient::with_transport(test_config(), transport);

    let errors = Arc::new(AtomicUsize::new(0));
    let failing = Subscription::new("exploder", Vec::new(), |_| Err("no thanks".into()))
        .with_error_handler({
            let errors = errors.clone();
            move |_event, _err| {
                errors.fetch_add(1, Ordering::SeqCst);
            }
        });
    client.start(failing).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    client
        .start(Subscription::new("collector", Vec::new(), move |event| {
            tx.send(event.seq).map_err(|e| e.to_string())?;
            Ok(())
        }))
        .unwrap();

    let delivered = timeout(Duration::from_secs(2), rx.recv()).await.unwrap();
    assert_eq!(delivered, Some(1));
    assert_eq!(errors.load(Ordering::SeqCst), 1);

    client.shutdown();
}

#[tokio::test]
async fn window_keeps_only_most_recent_events() {
    // capacity 3, seq 1..=4 appended: the window is {2, 3, 4}
    let transport = Arc::new(ScriptedTransport::new(vec![Session::FramesThenHold(vec![
        commit_frame(1, "app.feed.post"),
        commit_frame(2, "app.feed.post"),
        commit_frame(3, "app.feed.post"),
        commit_frame(4, "app.feed.post"),
    ])]));
    let config = FirehoseConfig {
        buffer_capacity: 3,
        ..test_config()
    };
    let client = FirehoseClient::with_transport(config, transport);

    client
        .start(Subscription::new("any", Vec::new(), |_| Ok(())))
        .unwrap();

    wait_until(|| client.status().last_seq == Some(4)).await;

    let snapshot = client.query(10, None);
    let seqs: Vec<u64> = snapshot.events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![2, 3, 4]);
    assert_eq!(snapshot.total_buffered, 3);

    client.shutdown();
}

#[tokio::test]
async fn undecodable_frame_is_skipped_but_advances_cursor() {
    let transport = Arc::new(ScriptedTransport::new(vec![Session::FramesThenHold(vec![
        commit_frame(5, "app.feed.post"),
        r#"{"type": "mystery", "seq": 9}"#.to_string(),
        identity_frame(11),
    ])]));
    let client = FirehoseClient::with_transport(test_config(), transport);

    client
        .start(Subscription::new("any", Vec::new(), |_| Ok(())))
        .unwrap();

    // The bad frame never lands in the buffer, but its seq moved the cursor
    wait_until(|| client.status().last_seq == Some(11)).await;

    let seqs: Vec<u64> = client.query(10, None).events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![5, 11]);

    client.shutdown();
}

#[tokio::test]
async fn query_keeps_serving_after_connection_is_lost() {
    // One session delivers two events then closes; every retry is refused
    // until the budget runs out.
    let transport = Arc::new(ScriptedTransport::new(vec![Session::Frames(vec![
        commit_frame(1, "app.feed.post"),
        commit_frame(2, "app.feed.post"),
    ])]));
    let client = FirehoseClient::with_transport(test_config(), transport);

    client
        .start(Subscription::new("any", Vec::new(), |_| Ok(())))
        .unwrap();

    wait_until(|| client.query(10, None).events.len() == 2).await;
    wait_until(|| !client.status().connected).await;

    // The window no longer grows, but it still answers
    let snapshot = client.query(10, None);
    assert_eq!(snapshot.events.len(), 2);
    assert_eq!(client.status().last_seq, Some(2));

    // start/stop remain available during the outage
    client
        .start(Subscription::new("late", Vec::new(), |_| Ok(())))
        .unwrap();
    client.stop("late");
}
