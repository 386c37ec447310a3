//! Full lifecycle integration tests over the in-process engine.
//!
//! These tests run real tasks through `Client::local()`, verifying
//! end-to-end correctness of dispatch -> execute -> record -> retrieve
//! flows: success and failure paths, retries and their budget, delayed
//! eligibility, `STARTED` tracking, errbacks, expiry, and `forget`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use baton::{
    s, Client, Config, GetOptions, TaskError, TaskFailure, TaskRegistry, TaskSpec, TaskState,
};
use parking_lot::Mutex;
use serde_json::{json, Value};

/// Registry with the small arithmetic task set the tests share.
fn demo_registry() -> Arc<TaskRegistry> {
    let registry = TaskRegistry::new();
    registry.register_fn(TaskSpec::new("t.add", ["x", "y"]), |args, _| async move {
        match (args[0].as_i64(), args[1].as_i64()) {
            (Some(x), Some(y)) => Ok(json!(x + y)),
            _ => Err(TaskFailure::error("TypeError", "add expects integers")),
        }
    });
    registry.register_fn(TaskSpec::new("t.fail", ["reason"]), |args, _| async move {
        let reason = args[0].as_str().unwrap_or("unspecified").to_string();
        Err(TaskFailure::error("ValueError", reason))
    });
    registry.register_fn(TaskSpec::new("t.slow", ["millis"]), |args, _| async move {
        let millis = args[0].as_u64().unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(millis)).await;
        Ok(json!("woke"))
    });
    Arc::new(registry)
}

/// Tight polling so tests finish quickly.
fn fast_config() -> Config {
    Config::default().with_poll_interval(Duration::from_millis(5))
}

/// Registers a task that records every received first argument.
fn register_capture(registry: &TaskRegistry, name: &str) -> Arc<Mutex<Vec<Value>>> {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    registry.register_fn(TaskSpec::new(name, ["payload"]), move |args, _| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().push(args[0].clone());
            Ok(Value::Null)
        }
    });
    captured
}

/// Polls until `captured` holds at least `count` entries.
async fn wait_for_captures(captured: &Mutex<Vec<Value>>, count: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if captured.lock().len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "expected {count} captured value(s), saw {}",
        captured.lock().len()
    );
}

// --------------------------------------------------------------------------
// Success path: dispatch, retrieve, peek
// --------------------------------------------------------------------------

#[tokio::test]
async fn single_task_runs_to_success() {
    let (client, worker) = Client::local(demo_registry(), fast_config());

    let result = client.apply_async(&s("t.add", [2, 2])).await.unwrap();
    assert_eq!(result.get().await.unwrap(), json!(4));

    assert_eq!(result.state().await.unwrap(), TaskState::Success);
    assert!(result.successful().await.unwrap());
    assert!(!result.failed().await.unwrap());
    // The non-blocking peek now sees the stored value too.
    assert_eq!(result.result().await.unwrap(), Some(json!(4)));
    worker.shutdown();
}

#[tokio::test]
async fn delay_shorthand_builds_and_submits() {
    let (client, worker) = Client::local(demo_registry(), fast_config());

    let result = client.delay("t.add", [40, 2]).await.unwrap();
    assert_eq!(result.get().await.unwrap(), json!(42));
    worker.shutdown();
}

#[tokio::test]
async fn partial_signature_completes_through_binding() {
    let (client, worker) = Client::local(demo_registry(), fast_config());

    // s("t.add", [8]) alone is incomplete; binding the missing argument
    // at dispatch completes it.
    let partial = s("t.add", [8]);
    let err = client.apply_async(&partial).await.unwrap_err();
    assert!(matches!(err, TaskError::Arity { .. }));

    let result = client
        .apply_async(&partial.bind([json!(2)], []))
        .await
        .unwrap();
    assert_eq!(result.get().await.unwrap(), json!(10));
    worker.shutdown();
}

#[tokio::test]
async fn local_apply_matches_dispatched_outcome() {
    let (client, worker) = Client::local(demo_registry(), fast_config());

    let sig = s("t.add", [7, 5]);
    let local = client.apply(&sig).await.unwrap();
    let dispatched = client.apply_async(&sig).await.unwrap().get().await.unwrap();
    assert_eq!(local, dispatched);
    worker.shutdown();
}

#[tokio::test]
async fn get_returns_promptly_before_its_deadline() {
    let (client, worker) = Client::local(demo_registry(), fast_config());

    let started = Instant::now();
    let result = client.apply_async(&s("t.add", [1, 1])).await.unwrap();
    let value = result
        .get_with(GetOptions::default().with_timeout(Duration::from_secs(10)))
        .await
        .unwrap();
    assert_eq!(value, json!(2));
    // The deadline bounds the wait; it is not a fixed sleep.
    assert!(started.elapsed() < Duration::from_secs(5));
    worker.shutdown();
}

// --------------------------------------------------------------------------
// Failure path: propagation, descriptors, errbacks
// --------------------------------------------------------------------------

#[tokio::test]
async fn failure_propagates_as_remote_error() {
    let (client, worker) = Client::local(demo_registry(), fast_config());

    let result = client.apply_async(&s("t.fail", ["boom"])).await.unwrap();
    let err = result.get().await.unwrap_err();
    match err {
        TaskError::Remote { task_id, info } => {
            assert_eq!(task_id, result.id());
            assert_eq!(info.kind, "ValueError");
            assert_eq!(info.message, "boom");
        },
        other => panic!("expected Remote, got {other:?}"),
    }
    assert!(result.failed().await.unwrap());
    worker.shutdown();
}

#[tokio::test]
async fn failure_returns_descriptor_when_propagate_is_off() {
    let (client, worker) = Client::local(demo_registry(), fast_config());

    let result = client.apply_async(&s("t.fail", ["boom"])).await.unwrap();
    let value = result
        .get_with(GetOptions::default().with_propagate(false))
        .await
        .unwrap();
    assert_eq!(value["kind"], "ValueError");
    assert_eq!(value["message"], "boom");
    assert!(value["trace"].is_string());
    worker.shutdown();
}

#[tokio::test]
async fn errback_receives_the_error_descriptor() {
    let registry = demo_registry();
    let captured = register_capture(&registry, "t.capture");
    let (client, worker) = Client::local(registry, fast_config());

    let sig = s("t.fail", ["kaput"]).with_errback(baton::signature("t.capture"));
    let result = client.apply_async(&sig).await.unwrap();
    assert!(result.get().await.is_err());

    wait_for_captures(&captured, 1).await;
    let descriptor = captured.lock()[0].clone();
    assert_eq!(descriptor["kind"], "ValueError");
    assert_eq!(descriptor["message"], "kaput");
    worker.shutdown();
}

#[tokio::test]
async fn errback_does_not_fire_on_success() {
    let registry = demo_registry();
    let captured = register_capture(&registry, "t.capture");
    let (client, worker) = Client::local(registry, fast_config());

    let sig = s("t.add", [1, 2]).with_errback(baton::signature("t.capture"));
    let result = client.apply_async(&sig).await.unwrap();
    assert_eq!(result.get().await.unwrap(), json!(3));

    // Give a wrongly submitted errback time to land before asserting.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(captured.lock().is_empty());
    worker.shutdown();
}

// --------------------------------------------------------------------------
// Retries: fresh attempts, budget exhaustion, retry countdown
// --------------------------------------------------------------------------

#[tokio::test]
async fn retry_reexecutes_until_success() {
    let registry = demo_registry();
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    registry.register_fn(TaskSpec::new("t.flaky", ["x"]), move |args, _| {
        let counter = Arc::clone(&counter);
        async move {
            // Succeed on the third attempt.
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TaskFailure::retry())
            } else {
                Ok(args[0].clone())
            }
        }
    });
    let (client, worker) = Client::local(registry, fast_config());

    let result = client.apply_async(&s("t.flaky", [9])).await.unwrap();
    assert_eq!(result.get().await.unwrap(), json!(9));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert_eq!(result.state().await.unwrap(), TaskState::Success);
    worker.shutdown();
}

#[tokio::test]
async fn exhausted_retry_budget_fails_with_max_retries_exceeded() {
    let registry = demo_registry();
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    registry.register_fn(
        TaskSpec::new("t.hopeless", ["x"]).with_max_retries(2),
        move |_, _| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(TaskFailure::retry())
            }
        },
    );
    let (client, worker) = Client::local(registry, fast_config());

    let result = client.apply_async(&s("t.hopeless", [0])).await.unwrap();
    let err = result.get().await.unwrap_err();
    match err {
        TaskError::Remote { info, .. } => {
            assert_eq!(info.kind, "MaxRetriesExceededError");
            assert!(info.message.contains("t.hopeless"));
        },
        other => panic!("expected Remote, got {other:?}"),
    }
    // Budget 2 means the initial attempt plus two retries ran.
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    worker.shutdown();
}

#[tokio::test]
async fn retry_countdown_defers_the_next_attempt() {
    let registry = demo_registry();
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&attempts);
    registry.register_fn(TaskSpec::new("t.backoff", ["x"]), move |args, _| {
        let counter = Arc::clone(&counter);
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(TaskFailure::retry_in(0.3))
            } else {
                Ok(args[0].clone())
            }
        }
    });
    let (client, worker) = Client::local(registry, fast_config());

    let started = Instant::now();
    let result = client.apply_async(&s("t.backoff", [5])).await.unwrap();
    assert_eq!(result.get().await.unwrap(), json!(5));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(
        started.elapsed() >= Duration::from_millis(250),
        "second attempt ran before its backoff elapsed"
    );
    worker.shutdown();
}

// --------------------------------------------------------------------------
// Delayed eligibility: countdown and eta
// --------------------------------------------------------------------------

#[tokio::test]
async fn countdown_defers_execution() {
    let (client, worker) = Client::local(demo_registry(), fast_config());

    let started = Instant::now();
    let result = client
        .apply_async(&s("t.add", [1, 1]).with_countdown(0.4))
        .await
        .unwrap();
    // Still pending while the delay runs.
    assert_eq!(result.state().await.unwrap(), TaskState::Pending);

    assert_eq!(result.get().await.unwrap(), json!(2));
    assert!(
        started.elapsed() >= Duration::from_millis(300),
        "task ran before its countdown elapsed"
    );
    worker.shutdown();
}

#[tokio::test]
async fn past_eta_runs_immediately() {
    let (client, worker) = Client::local(demo_registry(), fast_config());

    let started = Instant::now();
    let eta = chrono::Utc::now() - chrono::Duration::seconds(30);
    let result = client
        .apply_async(&s("t.add", [2, 3]).with_eta(eta))
        .await
        .unwrap();
    assert_eq!(result.get().await.unwrap(), json!(5));
    assert!(started.elapsed() < Duration::from_secs(5));
    worker.shutdown();
}

// --------------------------------------------------------------------------
// Timeouts
// --------------------------------------------------------------------------

#[tokio::test]
async fn get_times_out_while_the_task_still_runs() {
    let (client, worker) = Client::local(demo_registry(), fast_config());

    let result = client.apply_async(&s("t.slow", [60_000])).await.unwrap();
    let err = result
        .get_with(GetOptions::default().with_timeout(Duration::from_millis(100)))
        .await
        .unwrap_err();
    match err {
        TaskError::Timeout { task_id, waited } => {
            assert_eq!(task_id, result.id());
            assert!(waited >= Duration::from_millis(100));
        },
        other => panic!("expected Timeout, got {other:?}"),
    }
    worker.shutdown();
}

// --------------------------------------------------------------------------
// STARTED tracking
// --------------------------------------------------------------------------

#[tokio::test]
async fn track_started_exposes_the_running_state() {
    let registry = demo_registry();
    registry.register_fn(
        TaskSpec::new("t.slow_tracked", ["millis"]).with_track_started(true),
        |args, _| async move {
            tokio::time::sleep(Duration::from_millis(args[0].as_u64().unwrap_or(0))).await;
            Ok(json!("woke"))
        },
    );
    let (client, worker) = Client::local(registry, fast_config());

    let result = client
        .apply_async(&s("t.slow_tracked", [400]))
        .await
        .unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut saw_started = false;
    while Instant::now() < deadline {
        match result.state().await.unwrap() {
            TaskState::Started => {
                saw_started = true;
                break;
            },
            TaskState::Success => break,
            _ => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    }
    assert!(saw_started, "STARTED was never observed while the task ran");
    assert_eq!(result.get().await.unwrap(), json!("woke"));
    worker.shutdown();
}

#[tokio::test]
async fn started_is_not_recorded_by_default() {
    let (client, worker) = Client::local(demo_registry(), fast_config());

    let result = client.apply_async(&s("t.slow", [300])).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    // Mid-execution the id still reads PENDING, not STARTED.
    assert_ne!(result.state().await.unwrap(), TaskState::Started);
    assert_eq!(result.get().await.unwrap(), json!("woke"));
    worker.shutdown();
}

// --------------------------------------------------------------------------
// Worker-side recheck: registration changed between planning and pickup
// --------------------------------------------------------------------------

#[tokio::test]
async fn worker_rechecks_arity_against_current_registration() {
    let registry = demo_registry();
    registry.register_fn(TaskSpec::new("t.skew", ["x"]), |args, _| async move {
        Ok(args[0].clone())
    });
    let (client, worker) = Client::local(Arc::clone(&registry), fast_config());

    // Valid against the contract at planning time; the delay leaves room
    // to re-register before pickup.
    let result = client
        .apply_async(&s("t.skew", [1]).with_countdown(0.3))
        .await
        .unwrap();
    registry.register_fn(TaskSpec::new("t.skew", ["x", "y"]), |args, _| async move {
        Ok(args[0].clone())
    });

    let err = result.get().await.unwrap_err();
    match err {
        TaskError::Remote { info, .. } => {
            assert_eq!(info.kind, "ArityError");
            assert!(info.message.contains("missing required argument 'y'"));
        },
        other => panic!("expected Remote, got {other:?}"),
    }
    worker.shutdown();
}

// --------------------------------------------------------------------------
// Unknown ids, forget, expiry
// --------------------------------------------------------------------------

#[tokio::test]
async fn unknown_id_reads_pending_not_error() {
    let (client, worker) = Client::local(demo_registry(), fast_config());

    let handle = client.result("0000-never-submitted");
    assert_eq!(handle.state().await.unwrap(), TaskState::Pending);
    assert!(!handle.successful().await.unwrap());
    assert_eq!(handle.result().await.unwrap(), None);
    worker.shutdown();
}

#[tokio::test]
async fn forget_erases_the_stored_outcome() {
    let (client, worker) = Client::local(demo_registry(), fast_config());

    let result = client.apply_async(&s("t.add", [3, 3])).await.unwrap();
    assert_eq!(result.get().await.unwrap(), json!(6));

    assert!(result.forget().await.unwrap());
    assert_eq!(result.state().await.unwrap(), TaskState::Pending);
    // Second forget finds nothing.
    assert!(!result.forget().await.unwrap());
    worker.shutdown();
}

#[tokio::test]
async fn expired_results_read_pending_again() {
    let config = fast_config().with_result_expires(Some(Duration::from_millis(150)));
    let (client, worker) = Client::local(demo_registry(), config);

    let result = client.apply_async(&s("t.add", [4, 4])).await.unwrap();
    assert_eq!(result.get().await.unwrap(), json!(8));

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(result.state().await.unwrap(), TaskState::Pending);
    assert_eq!(result.result().await.unwrap(), None);
    worker.shutdown();
}
