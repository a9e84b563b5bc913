//! Integration tests for the at-most-once execution guard.
//!
//! Exercises replay, concurrent deduplication, conflict signaling, and the
//! store-outage policies against the in-memory store.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use duka_idempotency::{
    memory::UnavailableStore, ExecutionOutcome, FailurePolicy, GuardConfig, GuardError,
    IdempotencyGuard, MemoryStore, OperationFailure,
};

fn guard_over(store: Arc<MemoryStore>) -> IdempotencyGuard {
    IdempotencyGuard::new(store, GuardConfig::default())
}

#[tokio::test]
async fn second_call_replays_without_reexecuting() {
    let guard = guard_over(Arc::new(MemoryStore::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    for round in 0..2 {
        let calls = calls.clone();
        let outcome = guard
            .execute_once("order-42-pay", FailurePolicy::FailClosed, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!({"payment_reference": "pay-1", "status": "payment_pending"}))
            })
            .await
            .unwrap();

        assert_eq!(outcome.is_replay(), round == 1);
        assert_eq!(
            outcome.body(),
            &serde_json::json!({"payment_reference": "pay-1", "status": "payment_pending"})
        );
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn replay_is_identical_even_when_payload_differs() {
    // Same Idempotency-Key, different request bodies: the second payload
    // must never be processed.
    let guard = guard_over(Arc::new(MemoryStore::new()));

    let first = guard
        .execute_once("order-42-pay", FailurePolicy::FailClosed, || async {
            Ok(serde_json::json!({"amount": 1500}))
        })
        .await
        .unwrap();

    let second = guard
        .execute_once("order-42-pay", FailurePolicy::FailClosed, || async {
            Ok(serde_json::json!({"amount": 9999}))
        })
        .await
        .unwrap();

    assert_eq!(second.body(), first.body());
    assert!(second.is_replay());
}

#[tokio::test]
async fn failed_operation_replays_original_error() {
    let guard = guard_over(Arc::new(MemoryStore::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    for round in 0..2 {
        let calls = calls.clone();
        let err = guard
            .execute_once("charge-declined", FailurePolicy::FailClosed, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<serde_json::Value, _>(OperationFailure::new(402, "card declined"))
            })
            .await
            .unwrap_err();

        match err {
            GuardError::Failed { status, detail, replayed } => {
                assert_eq!(status, 402);
                assert_eq!(detail, "card declined");
                assert_eq!(replayed, round == 1);
            },
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_duplicates_execute_exactly_once() {
    let guard = guard_over(Arc::new(MemoryStore::new()));
    let executions = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let guard = guard.clone();
        let executions = executions.clone();
        handles.push(tokio::spawn(async move {
            guard
                .execute_once("wh:mpesa:ABC123", FailurePolicy::FailClosed, move || async move {
                    executions.fetch_add(1, Ordering::SeqCst);
                    // Stay in flight long enough for the others to arrive.
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok(serde_json::json!({"success": true}))
                })
                .await
        }));
    }

    let mut executed = 0;
    let mut replayed = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(ExecutionOutcome::Executed { .. }) => executed += 1,
            Ok(ExecutionOutcome::Replayed { .. }) => replayed += 1,
            Err(GuardError::Conflict) => conflicts += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }

    assert_eq!(executions.load(Ordering::SeqCst), 1, "operation must run exactly once");
    assert_eq!(executed, 1);
    assert_eq!(replayed + conflicts, 15);
}

#[tokio::test]
async fn in_flight_duplicate_gets_conflict_not_a_second_execution() {
    let store = Arc::new(MemoryStore::new());
    let guard = guard_over(store.clone());

    let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

    let winner = {
        let guard = guard.clone();
        tokio::spawn(async move {
            guard
                .execute_once("wh:stripe:evt_1", FailurePolicy::FailClosed, move || async move {
                    release_rx.await.ok();
                    Ok(serde_json::json!({"success": true}))
                })
                .await
        })
    };

    // Give the winner time to take the lock, then collide with it.
    tokio::time::sleep(Duration::from_millis(20)).await;

    let loser_calls = Arc::new(AtomicUsize::new(0));
    let counted = loser_calls.clone();
    let err = guard
        .execute_once("wh:stripe:evt_1", FailurePolicy::FailClosed, move || async move {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({"success": true}))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GuardError::Conflict));

    release_tx.send(()).unwrap();
    assert!(winner.await.unwrap().is_ok());

    // Once the winner finished, the same key replays instead of conflicting.
    let counted = loser_calls.clone();
    let outcome = guard
        .execute_once("wh:stripe:evt_1", FailurePolicy::FailClosed, move || async move {
            counted.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({"success": true}))
        })
        .await
        .unwrap();
    assert!(outcome.is_replay());
    assert_eq!(loser_calls.load(Ordering::SeqCst), 0, "duplicates must never execute");
}

#[tokio::test]
async fn store_outage_fails_closed_for_payment_mutations() {
    let guard = IdempotencyGuard::new(Arc::new(UnavailableStore), GuardConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let calls_clone = calls.clone();
    let err = guard
        .execute_once("order-42-pay", FailurePolicy::FailClosed, move || async move {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({"success": true}))
        })
        .await
        .unwrap_err();

    assert!(matches!(err, GuardError::StoreUnavailable(_)));
    assert_eq!(calls.load(Ordering::SeqCst), 0, "fail-closed must not execute");
}

#[tokio::test]
async fn store_outage_fails_open_when_policy_allows() {
    let guard = IdempotencyGuard::new(Arc::new(UnavailableStore), GuardConfig::default());
    let calls = Arc::new(AtomicUsize::new(0));

    let calls_clone = calls.clone();
    let outcome = guard
        .execute_once("read-model-refresh", FailurePolicy::FailOpen, move || async move {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Ok(serde_json::json!({"refreshed": true}))
        })
        .await
        .unwrap();

    assert!(!outcome.is_replay());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn lock_is_released_after_completion() {
    let store = Arc::new(MemoryStore::new());
    let guard = guard_over(store.clone());

    guard
        .execute_once("k", FailurePolicy::FailClosed, || async {
            Ok(serde_json::json!({"done": true}))
        })
        .await
        .unwrap();

    // The lock must not linger after the outcome is recorded.
    use duka_idempotency::IdempotencyStore;
    assert!(store.try_lock("k", Duration::from_secs(30)).await.unwrap());
}

#[tokio::test]
async fn distinct_keys_do_not_interfere() {
    let guard = guard_over(Arc::new(MemoryStore::new()));
    let calls = Arc::new(AtomicUsize::new(0));

    for key in ["wh:paystack:a", "wh:paystack:b", "wh:flutterwave:a"] {
        let calls = calls.clone();
        let outcome = guard
            .execute_once(key, FailurePolicy::FailClosed, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(serde_json::json!({"success": true}))
            })
            .await
            .unwrap();
        assert!(!outcome.is_replay());
    }

    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
