//! Integration tests for the single request operation
//!
//! Covers reply classification, cancellation races and the retry handle
//! discipline against the scripted mock transport.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use volley_core::{
    Bytes, NetworkError, RawReply, RequestDescriptor, ResponseMetadata, RetryDecision,
    TransportError, TransportErrorKind, Upstream,
};
use volley_runtime::{ExponentialBackoff, OperationPhase, RequestOperation};
use volley_testing::{MockEvent, MockTransport, replies};

const URL: &str = "https://api.example.com/items/1";

fn get() -> Upstream<RequestDescriptor> {
    Upstream::Ready(RequestDescriptor::get(URL))
}

/// Observer that counts how often it fired.
fn counting_observer(operation: &RequestOperation) -> Arc<AtomicUsize> {
    let fired = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&fired);
    operation.on_complete(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    fired
}

fn retry_up_to(attempts: u32) -> Arc<dyn volley_core::RetryPolicy> {
    Arc::new(move |attempt: u32, _: &NetworkError| {
        if attempt < attempts {
            RetryDecision::RETRY_NOW
        } else {
            RetryDecision::GiveUp
        }
    })
}

// ============================================================================
// Classification
// ============================================================================

#[tokio::test]
async fn test_success_carries_exact_payload_and_metadata() {
    let metadata = ResponseMetadata::new(200)
        .with_header("content-type", "application/json")
        .with_url(URL);
    let mock = MockTransport::new().with_reply(
        URL,
        RawReply::response(metadata.clone(), Some(Bytes::from_static(b"{\"id\":1}"))),
    );

    let operation = RequestOperation::new(get(), Arc::new(mock.clone()));
    let response = operation.execute().await.unwrap();

    assert_eq!(response.payload, Some(Bytes::from_static(b"{\"id\":1}")));
    assert_eq!(response.metadata, metadata);
    assert_eq!(operation.phase(), OperationPhase::Finished);
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_not_found_is_a_server_error() {
    let mock = MockTransport::new().with_reply(URL, replies::ok(404, "missing"));

    let operation = RequestOperation::new(get(), Arc::new(mock));
    match operation.execute().await {
        Err(NetworkError::Server { status, body, .. }) => {
            assert_eq!(status, 404);
            assert_eq!(body, Some(Bytes::from_static(b"missing")));
        }
        other => panic!("expected server error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_transport_error_wins_over_metadata() {
    let reply = RawReply {
        payload: Some(Bytes::from_static(b"partial")),
        metadata: Some(ResponseMetadata::new(200)),
        error: Some(TransportError::new(TransportErrorKind::Reset, "connection reset")),
    };
    let mock = MockTransport::new().with_reply(URL, reply);

    let operation = RequestOperation::new(get(), Arc::new(mock));
    let error = operation.execute().await.unwrap_err();

    assert!(matches!(
        error,
        NetworkError::Transport(ref e) if e.kind() == TransportErrorKind::Reset
    ));
}

#[tokio::test]
async fn test_missing_metadata_is_unknown_response() {
    let mock = MockTransport::new().with_reply(URL, replies::empty());

    let operation = RequestOperation::new(get(), Arc::new(mock));
    assert_eq!(operation.execute().await, Err(NetworkError::UnknownResponse));
}

#[tokio::test]
async fn test_failed_upstream_never_reaches_transport() {
    let mock = MockTransport::new();
    let operation = RequestOperation::from_requestable(
        &RequestDescriptor::get("not a url"),
        Arc::new(mock.clone()),
    );

    let error = operation.execute().await.unwrap_err();
    assert!(matches!(error, NetworkError::InvalidRequest(_)));
    assert_eq!(mock.call_count(), 0);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_before_execute_never_calls_transport() {
    let mock = MockTransport::new().with_default_reply(replies::status(200));
    let operation = RequestOperation::new(get(), Arc::new(mock.clone()));
    let fired = counting_observer(&operation);

    operation.cancel();

    assert_eq!(operation.execute().await, Err(NetworkError::Cancelled));
    assert_eq!(mock.call_count(), 0);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
    assert!(operation.is_cancelled());
}

#[tokio::test]
async fn test_stale_callback_after_cancel_is_ignored() {
    let mock = MockTransport::held().with_reply(URL, replies::ok(200, "late"));
    let operation = RequestOperation::new(get(), Arc::new(mock.clone()));
    let fired = counting_observer(&operation);

    let running = operation.spawn();
    mock.wait_for_calls(1).await;

    operation.cancel();
    assert_eq!(running.await.unwrap(), Err(NetworkError::Cancelled));
    assert_eq!(mock.cancel_count(0), 1);

    // The transport completes anyway
    assert!(mock.release(0));

    assert_eq!(operation.result(), Some(Err(NetworkError::Cancelled)));
    assert_eq!(operation.phase(), OperationPhase::Cancelled);
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_cancel_and_completion_finish_once() {
    for _ in 0..50 {
        let mock = MockTransport::held().with_default_reply(replies::status(200));
        let operation = RequestOperation::new(get(), Arc::new(mock.clone()));
        let fired = counting_observer(&operation);

        let running = operation.spawn();
        mock.wait_for_calls(1).await;

        let releaser = {
            let mock = mock.clone();
            tokio::spawn(async move { mock.release(0) })
        };
        let canceller = {
            let operation = operation.clone();
            tokio::spawn(async move { operation.cancel() })
        };

        releaser.await.unwrap();
        canceller.await.unwrap();
        let result = running.await.unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(operation.result(), Some(result.clone()));
        match result {
            Ok(_) => assert_eq!(operation.phase(), OperationPhase::Finished),
            Err(NetworkError::Cancelled) => assert!(operation.is_cancelled()),
            other => panic!("unexpected result {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_cancel_interrupts_retry_delay() {
    let mock = MockTransport::new().with_default_reply(replies::status(503));
    let policy = Arc::new(|_: u32, _: &NetworkError| RetryDecision::Retry {
        delay: Duration::from_secs(3600),
    });
    let operation = RequestOperation::with_retry_policy(get(), Arc::new(mock.clone()), policy);

    let running = operation.spawn();
    mock.wait_for_calls(1).await;
    operation.cancel();

    let result = tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("cancel should wake the retry delay")
        .unwrap();
    assert_eq!(result, Err(NetworkError::Cancelled));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_wait_observes_result_from_another_handle() {
    let mock = MockTransport::held().with_default_reply(replies::status(201));
    let operation = RequestOperation::new(get(), Arc::new(mock.clone()));

    let waiter = {
        let operation = operation.clone();
        tokio::spawn(async move { operation.wait().await })
    };
    let running = operation.spawn();

    mock.wait_for_calls(1).await;
    mock.release_next();

    assert_eq!(running.await.unwrap().unwrap().status(), 201);
    assert_eq!(waiter.await.unwrap().unwrap().status(), 201);
}

// ============================================================================
// Retry
// ============================================================================

#[tokio::test]
async fn test_retry_cancels_previous_handle_exactly_once() {
    let mock = MockTransport::new()
        .with_reply(URL, replies::status(500))
        .with_reply(URL, replies::connect_error("refused"))
        .with_reply(URL, replies::ok(200, "done"));

    let operation = RequestOperation::with_retry_policy(get(), Arc::new(mock.clone()), retry_up_to(5));
    let response = operation.execute().await.unwrap();

    assert_eq!(response.payload, Some(Bytes::from_static(b"done")));
    assert_eq!(operation.attempts(), 3);
    assert_eq!(mock.cancel_count(0), 1);
    assert_eq!(mock.cancel_count(1), 1);
    assert_eq!(mock.cancel_count(2), 0);
    assert_eq!(mock.max_live(), 1);

    let events = mock.events();
    let position = |event| events.iter().position(|e| *e == event).unwrap();
    assert!(position(MockEvent::Cancelled(0)) < position(MockEvent::Called(1)));
    assert!(position(MockEvent::Cancelled(1)) < position(MockEvent::Called(2)));
}

#[tokio::test]
async fn test_retry_gives_up_with_last_error() {
    let mock = MockTransport::new().with_default_reply(replies::status(502));
    let operation = RequestOperation::with_retry_policy(get(), Arc::new(mock.clone()), retry_up_to(2));

    let error = operation.execute().await.unwrap_err();
    assert_eq!(error.status(), Some(502));
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_uncapped_backoff_keeps_operation_waiting() {
    let mock = MockTransport::new().with_default_reply(replies::connect_error("refused"));
    let policy = ExponentialBackoff::builder()
        .max_retries(5)
        .initial_delay(Duration::from_millis(1))
        .max_delay(Duration::MAX)
        .multiplier(1e300)
        .jitter(false)
        .build();
    let operation = RequestOperation::with_retry_policy(get(), Arc::new(mock.clone()), Arc::new(policy));

    let running = operation.spawn();
    mock.wait_for_calls(2).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Second backoff overflows a Duration and is clamped to the cap
    assert!(!running.is_finished());
    assert_eq!(operation.phase(), OperationPhase::Executing);

    operation.cancel();
    assert_eq!(running.await.unwrap(), Err(NetworkError::Cancelled));
    assert_eq!(mock.call_count(), 2);
}

#[tokio::test]
async fn test_concurrent_executes_share_one_call() {
    let mock = MockTransport::held().with_default_reply(replies::ok(200, "shared"));
    let operation = RequestOperation::new(get(), Arc::new(mock.clone()));

    let callers = (0..8).map(|_| {
        let operation = operation.clone();
        async move { operation.execute().await }
    });
    let all = tokio::spawn(futures::future::join_all(callers));

    mock.wait_for_calls(1).await;
    mock.release_next();

    let results = all.await.unwrap();
    assert_eq!(results.len(), 8);
    assert!(results.iter().all(|result| result == &results[0]));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_second_execute_does_not_reissue() {
    let mock = MockTransport::held().with_default_reply(replies::status(200));
    let operation = RequestOperation::new(get(), Arc::new(mock.clone()));

    let first = operation.spawn();
    mock.wait_for_calls(1).await;
    let second = operation.spawn();

    mock.release_all();
    assert_eq!(first.await.unwrap(), second.await.unwrap());
    assert_eq!(mock.call_count(), 1);
}
