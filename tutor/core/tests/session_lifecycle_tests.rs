//! Session Lifecycle Integration Tests
//!
//! End-to-end checks through the public API: validation, producer, session,
//! framing and registry together, decoded the way a client would see them.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use pretty_assertions::assert_eq;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use tutor_core::producer::TextSender;
use tutor_core::{
    CancelReason, ChannelProducer, ChannelSink, ChatStreamBody, EchoProducer, ErrorCode, Fragment,
    FrameDecoder, Producer, SessionConfig, SessionRegistry, SessionState, StreamRequest,
    StreamSession, ValidationError,
};

// =============================================================================
// Helpers
// =============================================================================

async fn collect_frames(mut rx: mpsc::Receiver<Bytes>) -> (Vec<Bytes>, Vec<Fragment>) {
    let mut chunks = Vec::new();
    let mut decoder = FrameDecoder::new();
    while let Some(chunk) = rx.recv().await {
        decoder.push(&chunk);
        chunks.push(chunk);
    }
    (chunks, decoder.decode_all().unwrap())
}

fn echo() -> Arc<dyn Producer> {
    Arc::new(EchoProducer::new())
}

// =============================================================================
// Scenario Tests
// =============================================================================

#[tokio::test]
async fn test_happy_path_echo() {
    let registry = SessionRegistry::new();
    let request = ChatStreamBody::parse(br#"{"message":"hello world"}"#)
        .validate(32_768)
        .unwrap();
    let (sink, rx) = ChannelSink::new(8);

    let outcome = StreamSession::new(&registry, echo(), request, sink, SessionConfig::default())
        .run()
        .await;

    let (chunks, fragments) = collect_frames(rx).await;
    assert_eq!(outcome.state, SessionState::Completed);
    assert_eq!(
        chunks,
        vec![
            Bytes::from_static(b"data: {\"type\":\"text\",\"data\":\"hello \"}\n\n"),
            Bytes::from_static(b"data: {\"type\":\"text\",\"data\":\"world \"}\n\n"),
            Bytes::from_static(b"data: {\"type\":\"done\"}\n\n"),
        ]
    );
    assert_eq!(fragments.last(), Some(&Fragment::Done));
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn test_validation_failure_creates_no_session() {
    let registry = SessionRegistry::new();

    let result = ChatStreamBody::parse(b"{}").validate(32_768);

    assert_eq!(result, Err(ValidationError::MessageRequired));
    assert_eq!(registry.count(), 0);
    assert!(registry.list_active().is_empty());
}

#[tokio::test]
async fn test_generator_failure_mid_stream() {
    let registry = SessionRegistry::new();
    let producer = ChannelProducer::new("rag", |_request: StreamRequest, tx: TextSender| async move {
        tx.send("partial ").await?;
        Err::<(), _>(anyhow::anyhow!("vector store unreachable"))
    });
    let (sink, rx) = ChannelSink::new(8);

    let outcome = StreamSession::new(
        &registry,
        Arc::new(producer),
        StreamRequest::new("explain photosynthesis").unwrap(),
        sink,
        SessionConfig::default(),
    )
    .run()
    .await;

    let (_, fragments) = collect_frames(rx).await;
    assert_eq!(outcome.state, SessionState::Failed);
    assert_eq!(
        fragments,
        vec![
            Fragment::text("partial "),
            Fragment::error("vector store unreachable", ErrorCode::PRODUCER_FAILED),
        ]
    );
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn test_client_abort_stops_generator() {
    let registry = SessionRegistry::new();
    let emitted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&emitted);

    let producer = ChannelProducer::new("slow", move |_request: StreamRequest, tx: TextSender| {
        let counter = Arc::clone(&counter);
        async move {
            while tx.send("tick ").await.is_ok() {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            anyhow::Ok(())
        }
    })
    .with_capacity(1);

    let (sink, mut rx) = ChannelSink::new(1);
    let session = StreamSession::new(
        &registry,
        Arc::new(producer),
        StreamRequest::new("q").unwrap(),
        sink,
        SessionConfig::default(),
    );
    let id = session.id();
    let handle = tokio::spawn(session.run());

    assert!(rx.recv().await.is_some());
    drop(rx);

    let outcome = handle.await.unwrap();
    assert_eq!(outcome.state, SessionState::Cancelled);
    assert_eq!(outcome.cancel_reason, Some(CancelReason::ClientDisconnected));
    assert!(!registry.contains(&id));

    // The generator task is aborted, so the count stops moving
    tokio::time::sleep(Duration::from_millis(20)).await;
    let settled = emitted.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(emitted.load(Ordering::SeqCst), settled);
}

// =============================================================================
// Registry Consistency
// =============================================================================

#[tokio::test]
async fn test_concurrent_sessions_are_independent() {
    let registry = SessionRegistry::new();
    let mut tasks = JoinSet::new();

    for i in 0..32 {
        let registry = registry.clone();
        tasks.spawn(async move {
            let prompt = format!("question {i} about cells");
            let (sink, rx) = ChannelSink::new(2);
            let session = StreamSession::new(
                &registry,
                echo(),
                StreamRequest::new(prompt.clone()).unwrap(),
                sink,
                SessionConfig::default(),
            );
            let outcome = tokio::spawn(session.run());
            let (_, fragments) = collect_frames(rx).await;
            (prompt, fragments, outcome.await.unwrap())
        });
    }

    while let Some(joined) = tasks.join_next().await {
        let (prompt, fragments, outcome) = joined.unwrap();
        assert_eq!(outcome.state, SessionState::Completed);

        let text: String = fragments
            .iter()
            .filter_map(|f| match f {
                Fragment::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text.trim_end(), prompt);
    }

    assert_eq!(registry.count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_list_active_never_shows_finished_sessions() {
    let registry = SessionRegistry::new();
    let running = Arc::new(AtomicBool::new(true));

    let watcher = {
        let registry = registry.clone();
        let running = Arc::clone(&running);
        std::thread::spawn(move || {
            let mut terminal_seen = 0usize;
            while running.load(Ordering::Acquire) {
                terminal_seen += registry
                    .list_active()
                    .iter()
                    .filter(|info| info.state.is_terminal())
                    .count();
                terminal_seen += registry
                    .summary()
                    .by_state
                    .iter()
                    .filter(|(state, _)| !matches!(state.as_str(), "created" | "streaming"))
                    .map(|(_, n)| n)
                    .sum::<usize>();
            }
            terminal_seen
        })
    };

    let mut tasks = JoinSet::new();
    for _ in 0..2_000 {
        let registry = registry.clone();
        tasks.spawn(async move {
            let (sink, rx) = ChannelSink::new(4);
            let session = StreamSession::new(
                &registry,
                echo(),
                StreamRequest::new("one two").unwrap(),
                sink,
                SessionConfig::default(),
            );
            let drain = tokio::spawn(collect_frames(rx));
            let outcome = session.run().await;
            drain.await.unwrap();
            outcome.state
        });
    }
    while let Some(joined) = tasks.join_next().await {
        assert_eq!(joined.unwrap(), SessionState::Completed);
    }

    running.store(false, Ordering::Release);
    assert_eq!(watcher.join().unwrap(), 0);
    assert_eq!(registry.count(), 0);
}

#[tokio::test]
async fn test_shutdown_drains_registry() {
    let registry = SessionRegistry::new();
    let mut receivers = Vec::new();
    let mut handles = Vec::new();

    for _ in 0..4 {
        let producer = ChannelProducer::new("hang", |_request: StreamRequest, tx: TextSender| async move {
            tx.send("thinking ").await?;
            std::future::pending::<()>().await;
            anyhow::Ok(())
        });
        let (sink, mut rx) = ChannelSink::new(4);
        let session = StreamSession::new(
            &registry,
            Arc::new(producer),
            StreamRequest::new("q").unwrap(),
            sink,
            SessionConfig::default(),
        );
        handles.push(tokio::spawn(session.run()));
        assert!(rx.recv().await.is_some());
        receivers.push(rx);
    }

    assert_eq!(registry.count(), 4);
    assert_eq!(registry.summary().by_state.get("streaming"), Some(&4));

    assert_eq!(registry.cancel_all(), 4);
    assert!(registry.wait_idle(Duration::from_secs(5)).await);

    for handle in handles {
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.state, SessionState::Cancelled);
        assert_eq!(outcome.cancel_reason, Some(CancelReason::StopRequested));
    }

    // Cancelled streams close without a terminal fragment
    for rx in receivers {
        let (_, fragments) = collect_frames(rx).await;
        assert!(fragments.is_empty());
    }
}

#[tokio::test]
async fn test_session_panic_still_deregisters() {
    let registry = SessionRegistry::new();
    let (sink, _rx) = ChannelSink::new(1);
    let session = StreamSession::new(
        &registry,
        echo(),
        StreamRequest::new("q").unwrap(),
        sink,
        SessionConfig::default(),
    );
    let id = session.id();
    assert!(registry.contains(&id));

    let result = tokio::spawn(async move {
        let _session = session;
        panic!("handler bug");
    })
    .await;

    assert!(result.is_err());
    assert!(!registry.contains(&id));
}
