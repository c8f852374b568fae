//! The six literal seed scenarios, each driven end-to-end against the
//! in-memory test transport.

use std::sync::Arc;

use zk_client::engine::ConnectionEngine;
use zk_client::error::ErrorKind;
use zk_client::multi::MultiBuilder;
use zk_client::request::OpResult;
use zk_client::transport::TestEnsemble;
use zk_client::value::{well_known, CreateMode, DataVersion, EventKind, SessionState};

/// 1. create-set-get cycle.
#[test]
fn seed_1_create_set_get_cycle() {
    let ensemble = TestEnsemble::new();
    let engine = ConnectionEngine::new(Arc::new(ensemble.connect()));

    let created = engine.create("/t", Vec::new(), well_known::open_unsafe(), CreateMode::NORMAL).unwrap().wait().unwrap();
    let OpResult::Create { name } = created else { panic!("expected Create") };
    assert_eq!(name, "/t");

    let set = engine.set("/t", *b"hello", DataVersion::ANY).unwrap().wait().unwrap();
    let OpResult::Set { stat } = set else { panic!("expected Set") };
    assert_eq!(stat.data_version, DataVersion::from_raw(1));

    let got = engine.get("/t").unwrap().wait().unwrap();
    let OpResult::Get { data, stat } = got else { panic!("expected Get") };
    assert_eq!(data, b"hello");
    assert_eq!(stat.data_version, DataVersion::from_raw(1));
}

/// 2. version mismatch after scenario 1: the stale set fails and the entry
/// keeps its prior value.
#[test]
fn seed_2_version_mismatch_leaves_entry_unchanged() {
    let ensemble = TestEnsemble::new();
    let engine = ConnectionEngine::new(Arc::new(ensemble.connect()));
    engine.create("/t", Vec::new(), well_known::open_unsafe(), CreateMode::NORMAL).unwrap().wait().unwrap();
    engine.set("/t", *b"hello", DataVersion::ANY).unwrap().wait().unwrap();

    let err = engine.set("/t", *b"x", DataVersion::from_raw(0)).unwrap().wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::VersionMismatch);

    let OpResult::Get { data, .. } = engine.get("/t").unwrap().wait().unwrap() else {
        panic!("expected Get")
    };
    assert_eq!(data, b"hello");
}

/// 3. a data watch fires on a change made from a second session.
#[test]
fn seed_3_data_watch_fires_on_change_from_another_session() {
    let ensemble = TestEnsemble::new();
    let engine_a = ConnectionEngine::new(Arc::new(ensemble.connect()));
    let engine_b = ConnectionEngine::new(Arc::new(ensemble.connect()));

    engine_a.create("/t", *b"hello", well_known::open_unsafe(), CreateMode::NORMAL).unwrap().wait().unwrap();

    let watched = engine_a.watch_data("/t").unwrap().wait().unwrap();
    let OpResult::WatchGet { data, stat, watch } = watched else { panic!("expected WatchGet") };
    assert_eq!(data, b"hello");
    assert_eq!(stat.data_version, DataVersion::from_raw(0));

    engine_b.set("/t", *b"world", DataVersion::ANY).unwrap().wait().unwrap();

    let event = watch.wait();
    assert_eq!(event.kind, EventKind::Changed);
    assert_eq!(event.session_state, SessionState::Connected);
}

/// 4. a children watch fires when a child is created, and a subsequent
/// `children` call observes it.
#[test]
fn seed_4_children_watch_fires_on_creation() {
    let ensemble = TestEnsemble::new();
    let engine = ConnectionEngine::new(Arc::new(ensemble.connect()));
    engine.create("/p", Vec::new(), well_known::open_unsafe(), CreateMode::NORMAL).unwrap().wait().unwrap();

    let watched = engine.watch_children("/p").unwrap().wait().unwrap();
    let OpResult::WatchChildren { names, watch, .. } = watched else { panic!("expected WatchChildren") };
    assert!(names.is_empty());

    engine.create("/p/a", Vec::new(), well_known::open_unsafe(), CreateMode::NORMAL).unwrap().wait().unwrap();

    let event = watch.wait();
    assert_eq!(event.kind, EventKind::Child);

    let OpResult::Children { names, .. } = engine.children("/p").unwrap().wait().unwrap() else {
        panic!("expected Children")
    };
    assert!(names.contains(&"a".to_string()));
}

/// 5. multi-op atomicity: a batch with a failing `check` at index 2 leaves
/// the whole batch unapplied.
#[test]
fn seed_5_multi_op_atomicity() {
    let ensemble = TestEnsemble::new();
    let engine = ConnectionEngine::new(Arc::new(ensemble.connect()));
    engine.create("/b", *b"old", well_known::open_unsafe(), CreateMode::NORMAL).unwrap().wait().unwrap();

    let ops = MultiBuilder::new()
        .create("/a", *b"A", well_known::open_unsafe(), CreateMode::NORMAL)
        .set("/b", *b"new", DataVersion::ANY)
        .check("/c", DataVersion::ANY)
        .build();

    let err = engine.commit(ops).unwrap().wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::TransactionFailed);
    assert_eq!(err.transaction_failed_index(), Some(2));
    assert_eq!(err.transaction_cause().unwrap().kind(), ErrorKind::NoEntry);

    assert!(matches!(engine.exists("/a").unwrap().wait().unwrap(), OpResult::Exists(None)));
    let OpResult::Get { data, .. } = engine.get("/b").unwrap().wait().unwrap() else {
        panic!("expected Get")
    };
    assert_eq!(data, b"old");
}

/// 6. session expiry drains watches with a `(session, expired_session)`
/// event, and subsequent submissions fail with `session_expired`.
#[test]
fn seed_6_session_expiry_drains_watches_and_fails_submissions() {
    let ensemble = TestEnsemble::new();
    let transport = Arc::new(ensemble.connect());
    let engine = ConnectionEngine::new(transport.clone());
    engine.create("/t", Vec::new(), well_known::open_unsafe(), CreateMode::NORMAL).unwrap().wait().unwrap();

    let OpResult::WatchGet { watch, .. } = engine.watch_data("/t").unwrap().wait().unwrap() else {
        panic!("expected WatchGet")
    };

    transport.force_expire();

    let event = watch.wait();
    assert_eq!(event.kind, EventKind::Session);
    assert_eq!(event.session_state, SessionState::ExpiredSession);

    let err = engine.get("/t").unwrap().wait().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionExpired);
}

/// Sanity check for the round-trip sequential-create property referenced
/// alongside the seed scenarios: repeated sequential creates under the same
/// prefix yield strictly increasing numeric suffixes.
#[test]
fn sequential_create_suffixes_strictly_increase() {
    let ensemble = TestEnsemble::new();
    let engine = ConnectionEngine::new(Arc::new(ensemble.connect()));
    let mode = CreateMode::SEQUENTIAL;

    let mut names = Vec::new();
    for _ in 0..3 {
        let OpResult::Create { name } = engine
            .create("/seq-", Vec::new(), well_known::open_unsafe(), mode)
            .unwrap()
            .wait()
            .unwrap()
        else {
            panic!("expected Create")
        };
        names.push(name);
    }
    assert!(names.windows(2).all(|w| w[0] < w[1]));
}
