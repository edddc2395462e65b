//! Integration tests for batch fan-out/fan-in
//!
//! Every test drives real child operations through the scripted mock
//! transport and checks the assembled outcome.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use volley_core::{
    BodyRequest, Bytes, NetworkError, RequestDescriptor, RetryDecision, TransportErrorKind,
    Upstream,
};
use volley_runtime::{
    BatchConfig, BatchRequestOperation, CorrelatedBatchOperation, OperationPhase,
};
use volley_testing::{MockTransport, init_tracing, replies};

fn url(i: usize) -> String {
    format!("https://api.example.com/items/{i}")
}

fn requests(n: usize) -> Vec<RequestDescriptor> {
    (0..n).map(|i| RequestDescriptor::get(url(i))).collect()
}

// ============================================================================
// Outcome assembly
// ============================================================================

#[tokio::test]
async fn test_success_server_error_and_connection_failure() {
    init_tracing();

    let mock = MockTransport::new()
        .with_reply(url(0), replies::ok(200, "alpha"))
        .with_reply(url(1), replies::ok(500, "boom"))
        .with_reply(url(2), replies::connect_error("connection refused"));

    let batch = BatchRequestOperation::new(Upstream::Ready(requests(3)), Arc::new(mock.clone()));
    let outcome = batch.execute().await.unwrap();

    assert_eq!(outcome.len(), 3);
    assert_eq!(outcome.successes().len(), 1);
    assert_eq!(outcome.successes()[0].payload, Some(Bytes::from_static(b"alpha")));

    assert_eq!(outcome.failures().len(), 2);
    assert!(outcome.failures().iter().any(|e| e.status() == Some(500)));
    assert!(outcome.failures().iter().any(|e| matches!(
        e,
        NetworkError::Transport(t) if t.kind() == TransportErrorKind::Connect
    )));
    assert_eq!(mock.call_count(), 3);
    assert_eq!(batch.phase(), OperationPhase::Finished);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_correlated_payloads_keep_identity_in_reverse_order() {
    let mock = MockTransport::held();
    let payloads: Vec<Arc<String>> = (0..5).map(|i| Arc::new(format!("item-{i}"))).collect();

    for (i, payload) in payloads.iter().enumerate() {
        mock.push_reply(url(i), replies::ok(200, payload.as_str().to_owned()));
    }

    let items = payloads
        .iter()
        .enumerate()
        .map(|(i, payload)| BodyRequest::new(&RequestDescriptor::get(url(i)), Arc::clone(payload)))
        .collect();
    let batch = CorrelatedBatchOperation::new(Upstream::Ready(items), Arc::new(mock.clone()));

    let running = {
        let batch = batch.clone();
        tokio::spawn(async move { batch.execute().await })
    };
    mock.wait_for_calls(5).await;
    assert_eq!(mock.release_all_reversed(), 5);

    let outcome = running.await.unwrap().unwrap();
    assert_eq!(outcome.successes().len(), 5);

    for (payload, response) in outcome.successes() {
        assert!(payloads.iter().any(|original| Arc::ptr_eq(original, payload)));
        assert_eq!(response.payload.as_deref(), Some(payload.as_bytes()));
    }
}

#[tokio::test]
async fn test_invalid_request_is_reported_as_failure() {
    let mock = MockTransport::new().with_default_reply(replies::status(200));
    let batch = BatchRequestOperation::new(
        Upstream::Ready(vec![
            RequestDescriptor::get(url(0)),
            RequestDescriptor::get("https://api.example.com/x").header("x-bad", "a\r\nb"),
        ]),
        Arc::new(mock.clone()),
    );

    let outcome = batch.execute().await.unwrap();
    assert_eq!(outcome.successes().len(), 1);
    assert!(matches!(outcome.failures()[0], NetworkError::InvalidRequest(_)));
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test]
async fn test_children_retry_with_configured_policy() {
    let mock = MockTransport::new();
    for i in 0..3 {
        mock.push_reply(url(i), replies::status(503));
        mock.push_reply(url(i), replies::status(200));
    }
    let config = BatchConfig::new().with_retry_policy(|attempt: u32, error: &NetworkError| {
        if attempt < 3 && error.is_retryable() {
            RetryDecision::RETRY_NOW
        } else {
            RetryDecision::GiveUp
        }
    });

    let batch = BatchRequestOperation::with_config(Upstream::Ready(requests(3)), Arc::new(mock.clone()), config);
    let outcome = batch.execute().await.unwrap();

    assert!(outcome.all_succeeded());
    assert_eq!(mock.call_count(), 6);
}

#[tokio::test]
async fn test_observer_fires_with_outcome() {
    let mock = MockTransport::new().with_default_reply(replies::status(200));
    let batch = BatchRequestOperation::new(Upstream::Ready(requests(4)), Arc::new(mock));

    let (tx, rx) = tokio::sync::oneshot::channel();
    batch.on_complete(move |result| {
        let _ = tx.send(result.clone());
    });

    let returned = batch.execute().await;
    assert_eq!(rx.await.unwrap(), returned);
}

// ============================================================================
// Input edge cases
// ============================================================================

#[tokio::test]
async fn test_empty_batch_never_waits() {
    let mock = MockTransport::held();
    let batch = BatchRequestOperation::new(Upstream::Ready(requests(0)), Arc::new(mock.clone()));

    let outcome = tokio::time::timeout(Duration::from_secs(1), batch.execute())
        .await
        .expect("empty batch should not wait")
        .unwrap();
    assert!(outcome.is_empty());
    assert_eq!(mock.call_count(), 0);
}

#[tokio::test]
async fn test_missing_and_failed_input_fail_whole_batch() {
    let mock = MockTransport::new();

    let missing = BatchRequestOperation::new(Upstream::<Vec<RequestDescriptor>>::NoInput, Arc::new(mock.clone()));
    assert_eq!(missing.execute().await, Err(NetworkError::NoInput));

    let failed = CorrelatedBatchOperation::<u32>::new(
        Upstream::Failed(NetworkError::InvalidRequest("upstream parse failed".to_string())),
        Arc::new(mock.clone()),
    );
    assert!(matches!(failed.execute().await, Err(NetworkError::InvalidRequest(_))));

    assert_eq!(mock.call_count(), 0);
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_cancel_before_execute_dispatches_nothing() {
    let mock = MockTransport::new().with_default_reply(replies::status(200));
    let batch = BatchRequestOperation::new(Upstream::Ready(requests(3)), Arc::new(mock.clone()));

    batch.cancel();

    assert_eq!(batch.execute().await, Err(NetworkError::Cancelled));
    assert_eq!(mock.call_count(), 0);
    assert_eq!(batch.phase(), OperationPhase::Cancelled);
}

#[tokio::test]
async fn test_cancel_cascades_to_in_flight_children() {
    let mock = MockTransport::held().with_default_reply(replies::status(200));
    let batch = BatchRequestOperation::new(Upstream::Ready(requests(3)), Arc::new(mock.clone()));

    let running = {
        let batch = batch.clone();
        tokio::spawn(async move { batch.execute().await })
    };
    mock.wait_for_calls(3).await;

    batch.cancel();
    let outcome = running.await.unwrap().unwrap();

    assert_eq!(outcome.len(), 3);
    assert!(outcome.successes().is_empty());
    assert!(outcome.failures().iter().all(NetworkError::is_cancelled));
    for id in 0..3 {
        assert_eq!(mock.cancel_count(id), 1);
    }
    assert_eq!(mock.live(), 0);
    assert_eq!(batch.phase(), OperationPhase::Cancelled);

    // Late replies change nothing
    assert_eq!(mock.release_all(), 3);
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_max_concurrency_bounds_live_calls() {
    let mock = MockTransport::held().with_default_reply(replies::status(200));
    let batch = BatchRequestOperation::with_config(
        Upstream::Ready(requests(6)),
        Arc::new(mock.clone()),
        BatchConfig::new().with_max_concurrency(2),
    );

    let running = {
        let batch = batch.clone();
        tokio::spawn(async move { batch.execute().await })
    };

    mock.wait_for_calls(2).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(mock.call_count(), 2);

    let mut released = 0;
    while released < 6 {
        mock.wait_for_calls(released + 1).await;
        if mock.release_next() {
            released += 1;
        }
    }

    let outcome = running.await.unwrap().unwrap();
    assert!(outcome.all_succeeded());
    assert_eq!(outcome.len(), 6);
    assert_eq!(mock.max_live(), 2);
}

#[test]
fn test_execute_blocking_from_sync_code() {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();

    let mock = MockTransport::new().with_default_reply(replies::status(200));
    let batch = BatchRequestOperation::new(Upstream::Ready(requests(8)), Arc::new(mock));

    let outcome = batch.execute_blocking(runtime.handle()).unwrap();
    assert_eq!(outcome.successes().len(), 8);
}

// ============================================================================
// Property tests
// ============================================================================

fn batch_case() -> impl Strategy<Value = (Vec<bool>, Vec<usize>)> {
    (0usize..24).prop_flat_map(|n| {
        (
            prop::collection::vec(any::<bool>(), n),
            Just((0..n).collect::<Vec<_>>()).prop_shuffle(),
        )
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Every request is reported exactly once, whatever order replies arrive in.
    #[test]
    fn prop_outcome_accounts_for_every_request((succeed, release_order) in batch_case()) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let n = succeed.len();
        let mock = MockTransport::held();
        for (i, ok) in succeed.iter().enumerate() {
            let reply = if *ok { replies::status(200) } else { replies::status(500) };
            mock.push_reply(url(i), reply);
        }

        let items = (0..n)
            .map(|i| BodyRequest::new(&RequestDescriptor::get(url(i)), i))
            .collect();
        let batch = CorrelatedBatchOperation::new(Upstream::Ready(items), Arc::new(mock.clone()));

        let outcome = runtime.block_on(async {
            let running = {
                let batch = batch.clone();
                tokio::spawn(async move { batch.execute().await })
            };
            mock.wait_for_calls(n).await;

            // Calls may be issued in any order; map request index to call id
            let calls = mock.calls();
            for index in &release_order {
                let call = calls
                    .iter()
                    .find(|call| call.request.url() == url(*index))
                    .unwrap();
                assert!(mock.release(call.id));
            }
            running.await.unwrap().unwrap()
        });

        prop_assert_eq!(outcome.len(), n);

        let mut seen: Vec<usize> = outcome
            .successes()
            .iter()
            .map(|(i, _)| *i)
            .chain(outcome.failures().iter().map(|(i, _)| *i))
            .collect();
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..n).collect::<Vec<_>>());

        for (i, _) in outcome.successes() {
            prop_assert!(succeed[*i]);
        }
        for (i, error) in outcome.failures() {
            prop_assert!(!succeed[*i]);
            prop_assert_eq!(error.status(), Some(500));
        }
    }
}
