//! Caller cancellation, garbage collection of abandoned requests, and
//! temp image cleanup on every exit path.

use ocrqueue::{ImageId, NoopProgress, OcrParams, OcrPriority, QueueConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

mod helpers;
use helpers::{MockEngine, join, queue_with_config, queue_with_workers, spawn_enqueue, wait_until, write_image};

#[tokio::test(flavor = "multi_thread")]
async fn test_cancelling_one_caller_does_not_affect_another() {
    let dir = tempfile::tempdir().unwrap();
    let queue = queue_with_workers(2);
    let engine = MockEngine::new();
    engine.close_gate();

    let token_a = CancellationToken::new();
    let token_b = CancellationToken::new();
    let a = spawn_enqueue(
        &queue,
        &engine,
        "shared",
        write_image(dir.path(), "a", "still wanted"),
        OcrPriority::Foreground,
        &token_a,
    );
    wait_until("the engine starts", || engine.invocations() == 1).await;
    let b = spawn_enqueue(
        &queue,
        &engine,
        "shared",
        write_image(dir.path(), "b", "still wanted"),
        OcrPriority::Foreground,
        &token_b,
    );
    wait_until("both callers are counted", || {
        queue
            .current_operation()
            .is_some_and(|op| op.status().max_progress == 2)
    })
    .await;

    token_a.cancel();
    let a = tokio::time::timeout(Duration::from_secs(1), a)
        .await
        .expect("cancelled caller returns without waiting for the engine")
        .unwrap();
    assert!(a.is_none());
    assert_eq!(engine.cancelled(), 0, "request must keep running for the other caller");
    assert_eq!(queue.pending_count(), 1);

    engine.open_gate();
    let b = join(b).await.expect("remaining caller gets the result");
    assert_eq!(b.text(), "still wanted");
    assert_eq!(engine.invocations(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_abandoned_request_is_collected_and_rerun() {
    let dir = tempfile::tempdir().unwrap();
    let queue = queue_with_workers(2);
    let engine = MockEngine::new();
    engine.close_gate();

    let token = CancellationToken::new();
    let first_path = write_image(dir.path(), "first", "words");
    let second_path = write_image(dir.path(), "second", "words");
    let a = spawn_enqueue(&queue, &engine, "page", first_path.clone(), OcrPriority::Foreground, &token);
    let b = spawn_enqueue(&queue, &engine, "page", second_path.clone(), OcrPriority::Background, &token);
    wait_until("the engine starts", || engine.invocations() == 1).await;
    wait_until("both callers are counted", || {
        queue
            .current_operation()
            .is_some_and(|op| op.status().max_progress == 2)
    })
    .await;

    token.cancel();
    assert!(join(a).await.is_none());
    assert!(join(b).await.is_none());

    wait_until("the engine observes the cancellation", || engine.cancelled() == 1).await;
    wait_until("both temp images are deleted", || !first_path.exists() && !second_path.exists()).await;
    assert_eq!(queue.pending_count(), 0);
    assert!(!queue.has_cached_result(engine.as_ref(), &ImageId::new("page"), &OcrParams::default()));

    engine.open_gate();
    let result = queue
        .enqueue(
            engine.as_dyn(),
            &ImageId::new("page"),
            write_image(dir.path(), "third", "fresh words"),
            &OcrParams::default(),
            OcrPriority::Foreground,
            &CancellationToken::new(),
        )
        .await
        .expect("fresh invocation");
    assert_eq!(result.text(), "fresh words");
    assert_eq!(engine.invocations(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_before_dispatch_deletes_temp_image() {
    let dir = tempfile::tempdir().unwrap();
    let queue = queue_with_workers(1);
    let engine = MockEngine::new();
    engine.close_gate();

    let busy = spawn_enqueue(
        &queue,
        &engine,
        "busy",
        write_image(dir.path(), "busy", "busy"),
        OcrPriority::Foreground,
        &CancellationToken::new(),
    );
    wait_until("the only worker is busy", || engine.invocations() == 1).await;

    let token = CancellationToken::new();
    let waiting_path = write_image(dir.path(), "waiting", "never read");
    let waiting = spawn_enqueue(
        &queue,
        &engine,
        "waiting",
        waiting_path.clone(),
        OcrPriority::Foreground,
        &token,
    );
    wait_until("the second request is queued", || queue.pending_count() == 2).await;

    token.cancel();
    assert!(join(waiting).await.is_none());
    assert!(!waiting_path.exists(), "undispatched image is deleted by the last caller");
    assert_eq!(queue.pending_count(), 1);

    engine.open_gate();
    assert!(join(busy).await.is_some());
    assert_eq!(engine.started(), vec!["busy"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dropped_enqueue_future_withdraws_vote() {
    let dir = tempfile::tempdir().unwrap();
    let queue = queue_with_workers(2);
    let engine = MockEngine::new();
    engine.close_gate();

    let path = write_image(dir.path(), "page", "words");
    let task = spawn_enqueue(
        &queue,
        &engine,
        "page",
        path.clone(),
        OcrPriority::Foreground,
        &CancellationToken::new(),
    );
    wait_until("the engine starts", || engine.invocations() == 1).await;
    assert!(queue.is_running());

    task.abort();
    wait_until("the engine observes the cancellation", || engine.cancelled() == 1).await;
    wait_until("the pool stops", || !queue.is_running()).await;
    wait_until("the worker deletes the temp image", || !path.exists()).await;
    assert_eq!(queue.pending_count(), 0);
    assert!(queue.current_operation().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_already_cancelled_token_returns_none() {
    let dir = tempfile::tempdir().unwrap();
    let queue = queue_with_workers(1);
    let engine = MockEngine::new();
    engine.close_gate();
    let token = CancellationToken::new();
    token.cancel();

    let path = write_image(dir.path(), "page", "words");
    let result = queue
        .enqueue(
            engine.as_dyn(),
            &ImageId::new("page"),
            path.clone(),
            &OcrParams::default(),
            OcrPriority::Background,
            &token,
        )
        .await;

    assert!(result.is_none());
    assert_eq!(queue.pending_count(), 0);
    wait_until("the temp image is deleted", || !path.exists()).await;
    wait_until("workers exit", || queue.running_workers() == 0).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dropped_cache_hit_still_retries_delete() {
    let dir = tempfile::tempdir().unwrap();
    let queue = queue_with_config(
        QueueConfig {
            worker_count: Some(1),
            cleanup_retry_delay_ms: 300,
        },
        Arc::new(NoopProgress),
    );
    let engine = MockEngine::new();

    let first = spawn_enqueue(
        &queue,
        &engine,
        "page",
        write_image(dir.path(), "first", "words"),
        OcrPriority::Foreground,
        &CancellationToken::new(),
    );
    assert!(join(first).await.is_some());

    // A directory makes the first delete attempt fail, so the cache-hit
    // caller is parked waiting to retry when it is aborted.
    let path = dir.path().join("second.png");
    std::fs::create_dir(&path).unwrap();
    let second = spawn_enqueue(
        &queue,
        &engine,
        "page",
        path.clone(),
        OcrPriority::Foreground,
        &CancellationToken::new(),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!second.is_finished());
    second.abort();
    assert!(second.await.unwrap_err().is_cancelled());

    let staged = dir.path().join("staged.png");
    std::fs::write(&staged, "words").unwrap();
    std::fs::remove_dir(&path).unwrap();
    std::fs::rename(&staged, &path).unwrap();

    wait_until("the abandoned temp image is deleted", || !path.exists()).await;
    assert_eq!(engine.invocations(), 1);
}
