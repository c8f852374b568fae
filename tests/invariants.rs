//! Universal invariants 1-5 from the design notes, exercised end-to-end
//! against the in-memory test transport.

use std::sync::Arc;

use zk_client::engine::ConnectionEngine;
use zk_client::error::ErrorKind;
use zk_client::request::OpResult;
use zk_client::transport::TestEnsemble;
use zk_client::value::{well_known, CreateMode, DataVersion};

fn new_engine() -> (Arc<TestEnsemble>, Arc<ConnectionEngine>) {
    let ensemble = TestEnsemble::new();
    let transport = ensemble.connect();
    (ensemble, ConnectionEngine::new(Arc::new(transport)))
}

/// 1. Every submitted request's completion is resolved exactly once.
#[test]
fn every_completion_resolves_exactly_once() {
    let (_ensemble, engine) = new_engine();
    let waiters: Vec<_> = (0..20).map(|i| engine.get(&format!("/missing-{i}")).unwrap()).collect();
    for waiter in waiters {
        let result = waiter.wait();
        assert!(matches!(result, Err(e) if e.kind() == ErrorKind::NoEntry));
    }
}

/// 2. Every installed watch delivers exactly one event over its lifetime.
#[test]
fn every_watch_delivers_exactly_one_event() {
    let (_ensemble, engine) = new_engine();
    engine
        .create("/w", *b"v1", well_known::open_unsafe(), CreateMode::NORMAL)
        .unwrap()
        .wait()
        .unwrap();

    let OpResult::WatchGet { watch, .. } = engine.watch_data("/w").unwrap().wait().unwrap() else {
        panic!("expected WatchGet");
    };
    engine.set("/w", *b"v2", DataVersion::ANY).unwrap().wait().unwrap();
    // A second set must not cause a second delivery — the watch already
    // fired and removed itself from the registry.
    engine.set("/w", *b"v3", DataVersion::ANY).unwrap().wait().unwrap();

    let event = watch.wait();
    assert_eq!(event.kind, zk_client::value::EventKind::Changed);
}

/// 3. Two successive `get`s observing the same `data_version` return
/// bytewise-equal payloads.
#[test]
fn successive_gets_at_same_version_agree() {
    let (_ensemble, engine) = new_engine();
    engine
        .create("/a", *b"stable", well_known::open_unsafe(), CreateMode::NORMAL)
        .unwrap()
        .wait()
        .unwrap();

    let first = engine.get("/a").unwrap().wait().unwrap();
    let second = engine.get("/a").unwrap().wait().unwrap();
    let (OpResult::Get { data: d1, stat: s1 }, OpResult::Get { data: d2, stat: s2 }) = (first, second) else {
        panic!("expected Get");
    };
    assert_eq!(s1.data_version, s2.data_version);
    assert_eq!(d1, d2);
}

/// 4. A `set(p, d, ANY)` that succeeds is immediately visible to a `get`.
#[test]
fn set_then_get_observes_the_write() {
    let (_ensemble, engine) = new_engine();
    engine
        .create("/a", *b"old", well_known::open_unsafe(), CreateMode::NORMAL)
        .unwrap()
        .wait()
        .unwrap();
    engine.set("/a", *b"new", DataVersion::ANY).unwrap().wait().unwrap();

    let OpResult::Get { data, .. } = engine.get("/a").unwrap().wait().unwrap() else {
        panic!("expected Get");
    };
    assert_eq!(data, b"new");
}

/// 5. After `close()`, every subsequent submission fails with `closed`, and
/// every then-pending completion is resolved with `closed`.
#[test]
fn close_fails_subsequent_submissions_and_drains_pending() {
    let (_ensemble, engine) = new_engine();
    engine.close();

    let err = engine.get("/anything").unwrap().wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Closed);

    let err = engine
        .create("/x", Vec::new(), well_known::open_unsafe(), CreateMode::NORMAL)
        .unwrap()
        .wait()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Closed);
}

/// Closing twice is a no-op, not a panic or a double-drain.
#[test]
fn close_is_idempotent() {
    let (_ensemble, engine) = new_engine();
    engine.close();
    engine.close();
    assert_eq!(engine.session_state(), zk_client::value::SessionState::Closed);
}

/// A session subscriber is notified exactly once per call, and close()
/// drives it to the terminal `Closed` state.
#[test]
fn session_subscriber_observes_close() {
    let (_ensemble, engine) = new_engine();
    let sub = engine.subscribe_session();
    engine.close();
    assert_eq!(sub.wait(), zk_client::value::SessionState::Closed);
}
