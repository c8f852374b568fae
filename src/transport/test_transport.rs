//! In-memory test transport.
//!
//! Multiple [`TestTransport`] handles can share one [`TestEnsemble`], which
//! lets tests simulate two sessions observing each other's writes — exactly
//! what spec §8's seed scenarios 3, 4, and 6 need. Each transport runs one
//! worker thread that drains its submission queue and applies operations
//! against the shared tree, mirroring the "one I/O worker performs all
//! dispatch" rule from spec §5.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};

use crate::completion::CorrelationId;
use crate::error::ErrorKind;
use crate::multi::{MultiOp, MultiOpOutcome, RawMultiOpStatus};
use crate::request::Request;
use crate::session::Transition;
use crate::value::{Acl, CreateMode, DataVersion, EventKind, Stat, WatchKind};

use super::{NativeHandle, RawReply, SessionTransport, TransportEvent, WatchNotice};

#[derive(Debug, Clone)]
struct ServerEntry {
    data: Vec<u8>,
    acl: Acl,
    stat: Stat,
    ephemeral_owner: u64,
}

struct SessionRecord {
    sender: mpsc::Sender<TransportEvent>,
    watches: std::collections::HashSet<(String, WatchKind)>,
    alive: bool,
}

struct EnsembleState {
    tree: HashMap<String, ServerEntry>,
    seq_counters: HashMap<String, i64>,
    next_txn: i64,
    sessions: HashMap<u64, SessionRecord>,
}

impl EnsembleState {
    fn new() -> Self {
        let mut tree = HashMap::new();
        tree.insert(
            "/".to_string(),
            ServerEntry {
                data: Vec::new(),
                acl: crate::value::well_known::open_unsafe(),
                stat: Stat::default(),
                ephemeral_owner: 0,
            },
        );
        Self {
            tree,
            seq_counters: HashMap::new(),
            next_txn: 1,
            sessions: HashMap::new(),
        }
    }

    fn parent_of(path: &str) -> &str {
        if path == "/" {
            return "/";
        }
        let idx = path.rfind('/').unwrap_or(0);
        if idx == 0 {
            "/"
        } else {
            &path[..idx]
        }
    }

    fn direct_children(&self, path: &str) -> Vec<String> {
        let prefix = if path == "/" { String::new() } else { path.to_string() };
        self.tree
            .keys()
            .filter_map(|k| {
                if k == path || !k.starts_with(&prefix) {
                    return None;
                }
                let rest = &k[prefix.len()..];
                if rest.is_empty() || !rest.starts_with('/') {
                    return None;
                }
                let rest = &rest[1..];
                if rest.contains('/') {
                    None
                } else {
                    Some(rest.to_string())
                }
            })
            .collect()
    }

    /// Applies one primitive op (used standalone and as a multi-op step).
    /// Returns the outcome plus `(path, kind, event)` notices to fire.
    fn apply(
        &mut self,
        session_id: u64,
        op_path: &str,
        kind: &MultiOpKind,
    ) -> Result<(MultiOpOutcome, Vec<(String, WatchKind, EventKind)>), ErrorKind> {
        let mut notices = Vec::new();
        match kind {
            MultiOpKind::Check { version } => {
                let entry = self.tree.get(op_path).ok_or(ErrorKind::NoEntry)?;
                if !version.is_any() && *version != entry.stat.data_version {
                    return Err(ErrorKind::VersionMismatch);
                }
                Ok((MultiOpOutcome::Check, notices))
            }
            MultiOpKind::Create { data, acl, mode } => {
                if data.len() > crate::value::MAX_PAYLOAD_BYTES {
                    return Err(ErrorKind::InvalidArguments);
                }
                if acl.is_empty() {
                    return Err(ErrorKind::InvalidArguments);
                }
                let parent = Self::parent_of(op_path).to_string();
                if parent != op_path {
                    let parent_entry = self.tree.get(&parent).ok_or(ErrorKind::NoEntry)?;
                    if parent_entry.ephemeral_owner != 0 {
                        return Err(ErrorKind::NoChildrenForEphemerals);
                    }
                }
                let final_path = if mode.has(CreateMode::SEQUENTIAL) {
                    let counter = self.seq_counters.entry(op_path.to_string()).or_insert(0);
                    let suffix = *counter;
                    *counter += 1;
                    format!("{op_path}{suffix:010}")
                } else {
                    op_path.to_string()
                };
                if self.tree.contains_key(&final_path) {
                    return Err(ErrorKind::EntryExists);
                }
                let txn = self.next_txn;
                self.next_txn += 1;
                let entry = ServerEntry {
                    data: data.clone(),
                    acl: acl.clone(),
                    stat: Stat {
                        create_txn: txn,
                        modified_txn: txn,
                        child_modified_txn: txn,
                        data_version: DataVersion::from_raw(0),
                        ephemeral_owner: if mode.has(CreateMode::EPHEMERAL) { session_id as i64 } else { 0 },
                        data_size: data.len() as i32,
                        ..Stat::default()
                    },
                    ephemeral_owner: if mode.has(CreateMode::EPHEMERAL) { session_id } else { 0 },
                };
                self.tree.insert(final_path.clone(), entry);
                if parent != final_path {
                    if let Some(parent_entry) = self.tree.get_mut(&parent) {
                        parent_entry.stat.child_version = parent_entry.stat.child_version.next();
                        parent_entry.stat.children_count += 1;
                        parent_entry.stat.child_modified_txn = txn;
                    }
                    notices.push((parent, WatchKind::Children, EventKind::Child));
                }
                notices.push((final_path.clone(), WatchKind::Exists, EventKind::Created));
                Ok((MultiOpOutcome::Create { name: final_path }, notices))
            }
            MultiOpKind::Set { data, version } => {
                if data.len() > crate::value::MAX_PAYLOAD_BYTES {
                    return Err(ErrorKind::InvalidArguments);
                }
                let txn = self.next_txn;
                let entry = self.tree.get_mut(op_path).ok_or(ErrorKind::NoEntry)?;
                if !version.is_any() && *version != entry.stat.data_version {
                    return Err(ErrorKind::VersionMismatch);
                }
                self.next_txn += 1;
                entry.data = data.clone();
                entry.stat.data_version = entry.stat.data_version.next();
                entry.stat.modified_txn = txn;
                entry.stat.data_size = data.len() as i32;
                let stat = entry.stat;
                notices.push((op_path.to_string(), WatchKind::Data, EventKind::Changed));
                Ok((MultiOpOutcome::Set { stat }, notices))
            }
            MultiOpKind::Erase { version } => {
                let entry = self.tree.get(op_path).ok_or(ErrorKind::NoEntry)?;
                if !version.is_any() && *version != entry.stat.data_version {
                    return Err(ErrorKind::VersionMismatch);
                }
                if !self.direct_children(op_path).is_empty() {
                    return Err(ErrorKind::NotEmpty);
                }
                self.tree.remove(op_path);
                let parent = Self::parent_of(op_path).to_string();
                let txn = self.next_txn;
                self.next_txn += 1;
                if parent != op_path {
                    if let Some(parent_entry) = self.tree.get_mut(&parent) {
                        parent_entry.stat.child_version = parent_entry.stat.child_version.next();
                        parent_entry.stat.children_count -= 1;
                        parent_entry.stat.child_modified_txn = txn;
                    }
                    notices.push((parent, WatchKind::Children, EventKind::Child));
                }
                notices.push((op_path.to_string(), WatchKind::Data, EventKind::Erased));
                notices.push((op_path.to_string(), WatchKind::Exists, EventKind::Erased));
                notices.push((op_path.to_string(), WatchKind::Children, EventKind::Erased));
                Ok((MultiOpOutcome::Erase, notices))
            }
        }
    }

    fn close_session_ephemerals(&mut self, session_id: u64) -> Vec<(String, WatchKind, EventKind)> {
        let mut notices = Vec::new();
        let dead: Vec<String> = self
            .tree
            .iter()
            .filter(|(_, e)| e.ephemeral_owner == session_id)
            .map(|(k, _)| k.clone())
            .collect();
        for path in dead {
            let (_, n) = self
                .apply(session_id, &path, &MultiOpKind::Erase { version: DataVersion::ANY })
                .expect("ephemeral owned by this session must still exist and be childless");
            notices.extend(n);
        }
        notices
    }
}

/// The subset of `MultiOp` fields needed by [`EnsembleState::apply`],
/// shared between standalone ops and batched `multi` ops.
enum MultiOpKind {
    Check { version: DataVersion },
    Create { data: Vec<u8>, acl: Acl, mode: CreateMode },
    Set { data: Vec<u8>, version: DataVersion },
    Erase { version: DataVersion },
}

/// A shared in-memory coordination-service stand-in. Construct one and hand
/// out [`TestTransport`]s built from it to simulate multiple sessions
/// observing each other's writes.
pub struct TestEnsemble {
    state: Mutex<EnsembleState>,
    next_session_id: AtomicU64,
}

impl TestEnsemble {
    /// Creates an empty ensemble (just the root entry).
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EnsembleState::new()),
            next_session_id: AtomicU64::new(1),
        })
    }

    /// Creates a new session (transport) against this ensemble.
    #[must_use]
    pub fn connect(self: &Arc<Self>) -> TestTransport {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel();
        self.state.lock().sessions.insert(
            session_id,
            SessionRecord {
                sender: tx.clone(),
                watches: std::collections::HashSet::new(),
                alive: true,
            },
        );
        let _ = tx.send(TransportEvent::SessionTransition(Transition::ConnectSuccess));
        TestTransport::new(self.clone(), session_id, rx)
    }
}

/// An in-memory [`SessionTransport`], backed by a shared [`TestEnsemble`].
pub struct TestTransport {
    ensemble: Arc<TestEnsemble>,
    session_id: u64,
    queue: Arc<SegQueue<(CorrelationId, Request)>>,
    wake: Arc<(Mutex<bool>, Condvar)>,
    events: Mutex<mpsc::Receiver<TransportEvent>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<thread::JoinHandle<()>>,
}

impl TestTransport {
    fn new(ensemble: Arc<TestEnsemble>, session_id: u64, events: mpsc::Receiver<TransportEvent>) -> Self {
        let queue: Arc<SegQueue<(CorrelationId, Request)>> = Arc::new(SegQueue::new());
        let wake = Arc::new((Mutex::new(false), Condvar::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = {
            let ensemble = ensemble.clone();
            let queue = queue.clone();
            let wake = wake.clone();
            let shutdown = shutdown.clone();
            thread::Builder::new()
                .name(format!("test-transport-{session_id}"))
                .spawn(move || Self::worker_loop(ensemble, session_id, queue, wake, shutdown))
                .expect("spawning test transport worker thread")
        };

        Self {
            ensemble,
            session_id,
            queue,
            wake,
            events: Mutex::new(events),
            shutdown,
            worker: Some(worker),
        }
    }

    fn worker_loop(
        ensemble: Arc<TestEnsemble>,
        session_id: u64,
        queue: Arc<SegQueue<(CorrelationId, Request)>>,
        wake: Arc<(Mutex<bool>, Condvar)>,
        shutdown: Arc<AtomicBool>,
    ) {
        loop {
            if let Some((correlation, request)) = queue.pop() {
                Self::process(&ensemble, session_id, correlation, request);
                continue;
            }
            if shutdown.load(Ordering::Acquire) {
                return;
            }
            let (lock, cv) = &*wake;
            let mut signalled = lock.lock();
            if !*signalled && !shutdown.load(Ordering::Acquire) {
                cv.wait_for(&mut signalled, Duration::from_millis(50));
            }
            *signalled = false;
        }
    }

    fn process(ensemble: &Arc<TestEnsemble>, session_id: u64, correlation: CorrelationId, request: Request) {
        let mut state = ensemble.state.lock();
        let sender = state.sessions.get(&session_id).map(|s| s.sender.clone());
        let Some(sender) = sender else { return };

        let result = Self::execute(&mut state, session_id, &request);

        if let Some(kind) = Self::watch_kind_for(&request) {
            let path = Self::path_of(&request).to_string();
            if let Some(session) = state.sessions.get_mut(&session_id) {
                session.watches.insert((path, kind));
            }
        }

        drop(state);
        let _ = sender.send(TransportEvent::Reply { correlation, result });
    }

    fn watch_kind_for(request: &Request) -> Option<WatchKind> {
        match request {
            Request::WatchData { .. } => Some(WatchKind::Data),
            Request::WatchChildren { .. } => Some(WatchKind::Children),
            Request::WatchExists { .. } => Some(WatchKind::Exists),
            _ => None,
        }
    }

    fn path_of(request: &Request) -> &str {
        match request {
            Request::Get { path }
            | Request::WatchData { path }
            | Request::Children { path }
            | Request::WatchChildren { path }
            | Request::Exists { path }
            | Request::WatchExists { path }
            | Request::Create { path, .. }
            | Request::Set { path, .. }
            | Request::Erase { path, .. }
            | Request::GetAcl { path }
            | Request::SetAcl { path, .. } => path,
            Request::Fence | Request::Multi { .. } => "",
        }
    }

    fn execute(state: &mut EnsembleState, session_id: u64, request: &Request) -> Result<RawReply, crate::error::Error> {
        use crate::error::Error;

        match request {
            Request::Get { path } | Request::WatchData { path } => {
                let entry = state.tree.get(path).ok_or_else(|| Error::new(ErrorKind::NoEntry))?;
                Ok(RawReply::Get { data: entry.data.clone(), stat: entry.stat })
            }
            Request::Children { path } | Request::WatchChildren { path } => {
                let entry = state.tree.get(path).ok_or_else(|| Error::new(ErrorKind::NoEntry))?;
                let stat = entry.stat;
                let names = state.direct_children(path);
                Ok(RawReply::Children { names, stat })
            }
            Request::Exists { path } | Request::WatchExists { path } => {
                Ok(RawReply::Exists(state.tree.get(path).map(|e| e.stat)))
            }
            Request::Create { path, data, acl, mode } => {
                mode.validate().map_err(|_| Error::new(ErrorKind::InvalidArguments))?;
                let kind = MultiOpKind::Create { data: data.clone(), acl: acl.clone(), mode: *mode };
                let (outcome, notices) = state
                    .apply(session_id, path, &kind)
                    .map_err(Error::new)?;
                TestTransport::fire(state, &notices);
                match outcome {
                    MultiOpOutcome::Create { name } => Ok(RawReply::Create { name }),
                    _ => unreachable!(),
                }
            }
            Request::Set { path, data, version } => {
                let kind = MultiOpKind::Set { data: data.clone(), version: *version };
                let (outcome, notices) = state.apply(session_id, path, &kind).map_err(Error::new)?;
                TestTransport::fire(state, &notices);
                match outcome {
                    MultiOpOutcome::Set { stat } => Ok(RawReply::Set { stat }),
                    _ => unreachable!(),
                }
            }
            Request::Erase { path, version } => {
                let kind = MultiOpKind::Erase { version: *version };
                let (outcome, notices) = state.apply(session_id, path, &kind).map_err(Error::new)?;
                TestTransport::fire(state, &notices);
                match outcome {
                    MultiOpOutcome::Erase => Ok(RawReply::Erase),
                    _ => unreachable!(),
                }
            }
            Request::GetAcl { path } => {
                let entry = state.tree.get(path).ok_or_else(|| Error::new(ErrorKind::NoEntry))?;
                Ok(RawReply::GetAcl { acl: entry.acl.clone(), stat: entry.stat })
            }
            Request::SetAcl { path, acl, version } => {
                let entry = state.tree.get_mut(path).ok_or_else(|| Error::new(ErrorKind::NoEntry))?;
                if !version.is_any() && *version != entry.stat.acl_version {
                    return Err(Error::new(ErrorKind::VersionMismatch));
                }
                entry.acl = acl.clone();
                entry.stat.acl_version = entry.stat.acl_version.next();
                Ok(RawReply::SetAcl { stat: entry.stat })
            }
            Request::Fence => Ok(RawReply::Fence),
            Request::Multi { ops } => {
                let trial_ok = {
                    let mut trial_tree = state.tree.clone();
                    let mut trial = EnsembleState {
                        tree: std::mem::take(&mut trial_tree),
                        seq_counters: state.seq_counters.clone(),
                        next_txn: state.next_txn,
                        sessions: HashMap::new(),
                    };
                    let mut failed_at = None;
                    for (idx, op) in ops.iter().enumerate() {
                        let kind = to_multi_op_kind(op);
                        if let Err(e) = trial.apply(session_id, op.path(), &kind) {
                            failed_at = Some((idx, e));
                            break;
                        }
                    }
                    failed_at
                };

                let mut statuses = Vec::with_capacity(ops.len());
                if let Some((failed_idx, failed_kind)) = trial_ok {
                    for idx in 0..ops.len() {
                        statuses.push(match idx.cmp(&failed_idx) {
                            std::cmp::Ordering::Less => RawMultiOpStatus::Ok(MultiOpOutcome::Check),
                            std::cmp::Ordering::Equal => RawMultiOpStatus::Failed(failed_kind),
                            std::cmp::Ordering::Greater => RawMultiOpStatus::Skipped,
                        });
                    }
                } else {
                    let mut all_notices = Vec::new();
                    for op in ops {
                        let kind = to_multi_op_kind(op);
                        let (outcome, notices) = state
                            .apply(session_id, op.path(), &kind)
                            .expect("trial run already proved this op succeeds");
                        all_notices.extend(notices);
                        statuses.push(RawMultiOpStatus::Ok(outcome));
                    }
                    TestTransport::fire(state, &all_notices);
                }
                Ok(RawReply::Multi(statuses))
            }
        }
    }

    fn fire(state: &EnsembleState, notices: &[(String, WatchKind, EventKind)]) {
        for session in state.sessions.values() {
            for (path, kind, event) in notices {
                if session.alive && session.watches.contains(&(path.clone(), *kind)) {
                    let _ = session.sender.send(TransportEvent::Watch(WatchNotice {
                        path: path.clone(),
                        kind: *kind,
                        event_kind: *event,
                    }));
                }
            }
        }
    }
}

fn to_multi_op_kind(op: &MultiOp) -> MultiOpKind {
    match op {
        MultiOp::Check { version, .. } => MultiOpKind::Check { version: *version },
        MultiOp::Create { data, acl, mode, .. } => MultiOpKind::Create {
            data: data.clone(),
            acl: acl.clone(),
            mode: *mode,
        },
        MultiOp::Set { data, version, .. } => MultiOpKind::Set {
            data: data.clone(),
            version: *version,
        },
        MultiOp::Erase { version, .. } => MultiOpKind::Erase { version: *version },
    }
}

impl TestTransport {
    /// Delivers `Transition::Disconnect` through the session's own event
    /// channel, as if the underlying socket had dropped. The session
    /// normally reconnects from here; this crate's test transport never
    /// re-establishes the connection on its own, so callers only use this
    /// to observe the engine's disconnect handling.
    pub fn force_disconnect(&self) {
        let sender = self.ensemble.state.lock().sessions.get(&self.session_id).map(|s| s.sender.clone());
        if let Some(sender) = sender {
            let _ = sender.send(TransportEvent::SessionTransition(Transition::Disconnect));
        }
    }

    /// Forces the ensemble to declare this session expired, as if its
    /// lease had timed out server-side. Tears down its ephemeral entries
    /// the same way a real expiry would, then delivers
    /// `Transition::Expire` through the session's own event channel so the
    /// engine observes it exactly like a transport-initiated expiry.
    pub fn force_expire(&self) {
        let sender = {
            let mut state = self.ensemble.state.lock();
            let notices = state.close_session_ephemerals(self.session_id);
            if let Some(session) = state.sessions.get_mut(&self.session_id) {
                session.alive = false;
            }
            TestTransport::fire(&state, &notices);
            state.sessions.get(&self.session_id).map(|s| s.sender.clone())
        };
        if let Some(sender) = sender {
            let _ = sender.send(TransportEvent::SessionTransition(Transition::Expire));
        }
    }
}

impl SessionTransport for TestTransport {
    fn submit(&self, correlation: CorrelationId, request: Request) {
        self.queue.push((correlation, request));
        let (lock, cv) = &*self.wake;
        *lock.lock() = true;
        cv.notify_one();
    }

    fn recv_event(&self, timeout: Duration) -> Option<TransportEvent> {
        self.events.lock().recv_timeout(timeout).ok()
    }

    fn native_handle(&self) -> NativeHandle {
        NativeHandle::None
    }

    fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        let (lock, cv) = &*self.wake;
        *lock.lock() = true;
        cv.notify_one();
        let mut state = self.ensemble.state.lock();
        let notices = state.close_session_ephemerals(self.session_id);
        if let Some(session) = state.sessions.get_mut(&self.session_id) {
            session.alive = false;
        }
        TestTransport::fire(&state, &notices);
    }
}

impl Drop for TestTransport {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::well_known;

    #[test]
    fn create_then_get_roundtrips() {
        let ensemble = TestEnsemble::new();
        let t = ensemble.connect();
        let mut state = ensemble.state.lock();
        let result = TestTransport::execute(
            &mut state,
            1,
            &Request::Create {
                path: "/t".into(),
                data: b"hello".to_vec(),
                acl: well_known::open_unsafe(),
                mode: CreateMode::NORMAL,
            },
        );
        assert!(matches!(result, Ok(RawReply::Create { .. })));
        drop(state);
        drop(t);
    }
}
