//! The connection engine: the crate's ~30% component.
//!
//! Owns the completion registry, the watch registry, the session state
//! machine, and a transport. One dispatch thread reads `TransportEvent`s off
//! the transport and fans them out to the registries; every public method
//! here is otherwise non-blocking — it builds a [`Request`], registers a
//! completion, submits, and returns the waiter. See spec §4.5, grounded on
//! the teacher's `service::service::AsupersyncService` trait-object pattern
//! for the `Arc<dyn SessionTransport>` shape.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::completion::{CompletionRegistry, CompletionWaiter, CorrelationId};
use crate::error::{Error, ErrorKind};
use crate::multi::{MultiOp, MultiOpOutcome};
use crate::path::Path;
use crate::request::{OpResult, Request};
use crate::session::{SessionStateMachine, Transition};
use crate::transport::{RawReply, SessionTransport, TransportEvent};
use crate::value::{self, Acl, AclVersion, CreateMode, DataVersion, Event, SessionState, WatchKind};
use crate::watch::WatchRegistry;

/// What a correlation id was submitted for, needed to decode the matching
/// [`RawReply`] into the right [`OpResult`] variant and to know whether a
/// watch should be armed on the reply.
enum Pending {
    Get,
    WatchData(Path),
    Children,
    WatchChildren(Path),
    Exists,
    WatchExists(Path),
    Create,
    Set,
    Erase,
    GetAcl,
    SetAcl,
    Fence,
    Multi,
}

type ResultWaiter = CompletionWaiter<Result<OpResult, Error>>;

/// The client's live connection: a session, its watches, and the dispatch
/// loop driving both against a [`SessionTransport`].
pub struct ConnectionEngine {
    transport: Arc<dyn SessionTransport>,
    completions: Arc<CompletionRegistry<Result<OpResult, Error>>>,
    pending: Arc<Mutex<HashMap<usize, Pending>>>,
    watches: Arc<WatchRegistry>,
    session: Arc<SessionStateMachine>,
    /// Guards [`Self::close`]/[`Drop`] idempotency — set only by an
    /// explicit `close()`, never by a transport-observed terminal
    /// transition (expiry, auth failure), so that a later explicit
    /// `close()` after an expiry still runs its transport-shutdown path
    /// exactly once.
    closed: AtomicBool,
    /// The kind subsequent submissions are rejected with once the session
    /// has reached *any* terminal state, set by whichever terminal
    /// transition happens first (expiry, auth failure, or explicit
    /// close) and never overwritten afterward — the session state
    /// machine itself never leaves a terminal state, and this mirrors
    /// that at the submission boundary.
    terminal: Mutex<Option<ErrorKind>>,
    dispatch: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionEngine {
    /// Starts an engine over `transport`, spawning its dispatch thread.
    #[must_use]
    pub fn new(transport: Arc<dyn SessionTransport>) -> Arc<Self> {
        let engine = Arc::new(Self {
            transport,
            completions: Arc::new(CompletionRegistry::new()),
            pending: Arc::new(Mutex::new(HashMap::new())),
            watches: Arc::new(WatchRegistry::new()),
            session: Arc::new(SessionStateMachine::new()),
            closed: AtomicBool::new(false),
            terminal: Mutex::new(None),
            dispatch: Mutex::new(None),
        });
        let handle = {
            let engine = engine.clone();
            thread::Builder::new()
                .name("zk-client-dispatch".into())
                .spawn(move || engine.dispatch_loop())
                .expect("spawning connection engine dispatch thread")
        };
        *engine.dispatch.lock() = Some(handle);
        engine
    }

    /// The session's current connectivity state.
    #[must_use]
    pub fn session_state(&self) -> SessionState {
        self.session.current()
    }

    /// A one-shot waiter for the session's next state transition.
    pub fn subscribe_session(&self) -> CompletionWaiter<SessionState> {
        self.session.subscribe()
    }

    fn submit(&self, request: Request, pending: Pending) -> ResultWaiter {
        if let Some(kind) = *self.terminal.lock() {
            let (sender, waiter) = crate::completion::oneshot();
            sender.send(Err(Error::new(kind)));
            return waiter;
        }
        let (id, waiter) = self.completions.register();
        self.pending.lock().insert(id.raw(), pending);
        trace!(?id, "submitting request");
        self.transport.submit(id, request);
        waiter
    }

    fn dispatch_loop(self: Arc<Self>) {
        loop {
            match self.transport.recv_event(Duration::from_millis(200)) {
                Some(TransportEvent::Reply { correlation, result }) => {
                    self.handle_reply(correlation, result);
                }
                Some(TransportEvent::Watch(notice)) => {
                    self.handle_watch_notice(&notice);
                }
                Some(TransportEvent::SessionTransition(transition)) => {
                    self.handle_transition(transition);
                }
                None => {
                    if self.closed.load(Ordering::Acquire) {
                        return;
                    }
                }
            }
        }
    }

    fn handle_reply(&self, correlation: CorrelationId, result: Result<RawReply, Error>) {
        let Some(pending) = self.pending.lock().remove(&correlation.raw()) else {
            warn!(?correlation, "reply for unknown correlation id");
            return;
        };
        let decoded = self.decode(pending, result);
        self.completions.resolve(correlation, decoded);
    }

    fn decode(&self, pending: Pending, result: Result<RawReply, Error>) -> Result<OpResult, Error> {
        match pending {
            Pending::Get => result.map(|r| match r {
                RawReply::Get { data, stat } => OpResult::Get { data, stat },
                _ => unreachable!("transport replied to Get with a mismatched reply shape"),
            }),
            Pending::WatchData(path) => result.map(|r| match r {
                RawReply::Get { data, stat } => {
                    let watch = self.watches.install(&path, WatchKind::Data);
                    OpResult::WatchGet { data, stat, watch }
                }
                _ => unreachable!("transport replied to WatchData with a mismatched reply shape"),
            }),
            Pending::Children => result.map(|r| match r {
                RawReply::Children { names, stat } => OpResult::Children { names, stat },
                _ => unreachable!("transport replied to Children with a mismatched reply shape"),
            }),
            Pending::WatchChildren(path) => result.map(|r| match r {
                RawReply::Children { names, stat } => {
                    let watch = self.watches.install(&path, WatchKind::Children);
                    OpResult::WatchChildren { names, stat, watch }
                }
                _ => unreachable!("transport replied to WatchChildren with a mismatched reply shape"),
            }),
            Pending::Exists => result.map(|r| match r {
                RawReply::Exists(stat) => OpResult::Exists(stat),
                _ => unreachable!("transport replied to Exists with a mismatched reply shape"),
            }),
            Pending::WatchExists(path) => {
                // Armed regardless of whether the entry currently exists —
                // that is the point of an exists-watch.
                match result {
                    Ok(RawReply::Exists(stat)) => {
                        let watch = self.watches.install(&path, WatchKind::Exists);
                        Ok(OpResult::WatchExists(stat, watch))
                    }
                    Ok(_) => unreachable!("transport replied to WatchExists with a mismatched reply shape"),
                    Err(e) => Err(e),
                }
            }
            Pending::Create => result.map(|r| match r {
                RawReply::Create { name } => OpResult::Create { name },
                _ => unreachable!("transport replied to Create with a mismatched reply shape"),
            }),
            Pending::Set => result.map(|r| match r {
                RawReply::Set { stat } => OpResult::Set { stat },
                _ => unreachable!("transport replied to Set with a mismatched reply shape"),
            }),
            Pending::Erase => result.map(|r| match r {
                RawReply::Erase => OpResult::Erase,
                _ => unreachable!("transport replied to Erase with a mismatched reply shape"),
            }),
            Pending::GetAcl => result.map(|r| match r {
                RawReply::GetAcl { acl, stat } => OpResult::GetAcl { acl, stat },
                _ => unreachable!("transport replied to GetAcl with a mismatched reply shape"),
            }),
            Pending::SetAcl => result.map(|r| match r {
                RawReply::SetAcl { stat } => OpResult::SetAcl { stat },
                _ => unreachable!("transport replied to SetAcl with a mismatched reply shape"),
            }),
            Pending::Fence => result.map(|r| match r {
                RawReply::Fence => OpResult::Fence,
                _ => unreachable!("transport replied to Fence with a mismatched reply shape"),
            }),
            Pending::Multi => result.and_then(|r| match r {
                RawReply::Multi(statuses) => crate::multi::decode_multi_reply(statuses)
                    .map(|outcomes| OpResult::Multi { outcomes }),
                _ => unreachable!("transport replied to Multi with a mismatched reply shape"),
            }),
        }
    }

    fn handle_watch_notice(&self, notice: &crate::transport::WatchNotice) {
        let Ok(path) = Path::new(notice.path.clone()) else {
            warn!(path = %notice.path, "watch notice for a malformed path, dropping");
            return;
        };
        let event = Event::new(notice.event_kind, self.session.current());
        self.watches.dispatch(&path, notice.kind, event);
    }

    fn handle_transition(&self, transition: Transition) {
        let Ok(new_state) = self.session.transition(transition) else {
            warn!(?transition, "illegal session transition observed from transport");
            return;
        };
        debug!(?new_state, "connection engine observed session transition");
        if matches!(transition, Transition::Disconnect) {
            tracing::info!(?new_state, "attempting to reconnect after disconnect");
        }
        if new_state.is_terminal() {
            let kind = match new_state {
                SessionState::Closed => ErrorKind::Closed,
                SessionState::ExpiredSession => ErrorKind::SessionExpired,
                SessionState::AuthenticationFailed => ErrorKind::AuthenticationFailed,
                SessionState::Connecting | SessionState::Connected | SessionState::ReadOnly => unreachable!(),
            };
            // The first terminal transition wins; never overwrite it, per
            // the invariant that the state machine never leaves a terminal
            // state once reached.
            self.terminal.lock().get_or_insert(kind);
            self.completions.drain_with_kind(kind);
            self.watches.drain(new_state);
            self.pending.lock().clear();
        }
    }

    fn check_path(raw: &str) -> Result<Path, Error> {
        Path::new(raw)
    }

    /// `get(path)`.
    ///
    /// # Errors
    ///
    /// Returns `Err` synchronously if `path` is malformed; the returned
    /// waiter resolves to `Err` for a server-side failure (e.g. no entry).
    pub fn get(&self, path: &str) -> Result<ResultWaiter, Error> {
        Self::check_path(path)?;
        Ok(self.submit(Request::Get { path: path.to_string() }, Pending::Get))
    }

    /// `get(path)` with a one-shot data-watch armed on success.
    ///
    /// # Errors
    ///
    /// See [`Self::get`].
    pub fn watch_data(&self, path: &str) -> Result<ResultWaiter, Error> {
        let validated = Self::check_path(path)?;
        Ok(self.submit(
            Request::WatchData { path: path.to_string() },
            Pending::WatchData(validated),
        ))
    }

    /// `children(path)`.
    ///
    /// # Errors
    ///
    /// See [`Self::get`].
    pub fn children(&self, path: &str) -> Result<ResultWaiter, Error> {
        Self::check_path(path)?;
        Ok(self.submit(Request::Children { path: path.to_string() }, Pending::Children))
    }

    /// `children(path)` with a one-shot children-watch armed on success.
    ///
    /// # Errors
    ///
    /// See [`Self::get`].
    pub fn watch_children(&self, path: &str) -> Result<ResultWaiter, Error> {
        let validated = Self::check_path(path)?;
        Ok(self.submit(
            Request::WatchChildren { path: path.to_string() },
            Pending::WatchChildren(validated),
        ))
    }

    /// `exists(path)`. Never fails with `NoEntry` — absence is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// See [`Self::get`].
    pub fn exists(&self, path: &str) -> Result<ResultWaiter, Error> {
        Self::check_path(path)?;
        Ok(self.submit(Request::Exists { path: path.to_string() }, Pending::Exists))
    }

    /// `exists(path)` with an exists-watch armed regardless of outcome.
    ///
    /// # Errors
    ///
    /// See [`Self::get`].
    pub fn watch_exists(&self, path: &str) -> Result<ResultWaiter, Error> {
        let validated = Self::check_path(path)?;
        Ok(self.submit(
            Request::WatchExists { path: path.to_string() },
            Pending::WatchExists(validated),
        ))
    }

    /// `create(path, data, acl, mode)`.
    ///
    /// # Errors
    ///
    /// Returns `Err` synchronously for a malformed path, an oversized
    /// payload, an invalid `mode` combination, or an empty `acl`.
    pub fn create(&self, path: &str, data: impl Into<Vec<u8>>, acl: Acl, mode: CreateMode) -> Result<ResultWaiter, Error> {
        Self::check_path(path)?;
        mode.validate()?;
        value::validate_acl_for_persistence(&acl)?;
        let data = data.into();
        value::validate_payload(&data)?;
        Ok(self.submit(
            Request::Create { path: path.to_string(), data, acl, mode },
            Pending::Create,
        ))
    }

    /// `set(path, data, version)`.
    ///
    /// # Errors
    ///
    /// See [`Self::create`] (mode validation does not apply here).
    pub fn set(&self, path: &str, data: impl Into<Vec<u8>>, version: DataVersion) -> Result<ResultWaiter, Error> {
        Self::check_path(path)?;
        let data = data.into();
        value::validate_payload(&data)?;
        Ok(self.submit(
            Request::Set { path: path.to_string(), data, version },
            Pending::Set,
        ))
    }

    /// `erase(path, version)`.
    ///
    /// # Errors
    ///
    /// See [`Self::get`].
    pub fn erase(&self, path: &str, version: DataVersion) -> Result<ResultWaiter, Error> {
        Self::check_path(path)?;
        Ok(self.submit(Request::Erase { path: path.to_string(), version }, Pending::Erase))
    }

    /// `get_acl(path)`.
    ///
    /// # Errors
    ///
    /// See [`Self::get`].
    pub fn get_acl(&self, path: &str) -> Result<ResultWaiter, Error> {
        Self::check_path(path)?;
        Ok(self.submit(Request::GetAcl { path: path.to_string() }, Pending::GetAcl))
    }

    /// `set_acl(path, acl, version)`.
    ///
    /// # Errors
    ///
    /// See [`Self::get`].
    pub fn set_acl(&self, path: &str, acl: Acl, version: AclVersion) -> Result<ResultWaiter, Error> {
        Self::check_path(path)?;
        Ok(self.submit(
            Request::SetAcl { path: path.to_string(), acl, version },
            Pending::SetAcl,
        ))
    }

    /// `fence()`: a barrier with no payload, ordered after every op
    /// submitted before it on this session.
    pub fn fence(&self) -> ResultWaiter {
        self.submit(Request::Fence, Pending::Fence)
    }

    /// `commit(ops)`: submits a batch of primitive ops as one atomic
    /// transaction. See [`crate::multi::MultiBuilder`].
    ///
    /// # Errors
    ///
    /// Returns `Err` synchronously if any `Create` op in `ops` carries an
    /// empty ACL — the same local check [`Self::create`] applies to a
    /// standalone create.
    pub fn commit(&self, ops: Vec<MultiOp>) -> Result<ResultWaiter, Error> {
        for op in &ops {
            if let MultiOp::Create { acl, .. } = op {
                value::validate_acl_for_persistence(acl)?;
            }
        }
        Ok(self.submit(Request::Multi { ops }, Pending::Multi))
    }

    /// Closes the session: drains every outstanding completion and watch
    /// with [`ErrorKind::Closed`], then releases the transport. Idempotent —
    /// a second call is a no-op.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if self.session.transition(Transition::Close) == Ok(SessionState::Closed) {
            self.terminal.lock().get_or_insert(ErrorKind::Closed);
            self.completions.drain_with_kind(ErrorKind::Closed);
            self.watches.drain(SessionState::Closed);
            self.pending.lock().clear();
        }
        self.transport.shutdown();
    }
}

impl Drop for ConnectionEngine {
    fn drop(&mut self) {
        self.close();
        let handle = self.dispatch.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

/// Returns `outcomes` still wrapped in their result for call sites that want
/// to assert on a successful commit's per-op outcomes directly.
#[must_use]
pub fn commit_outcomes(result: &Result<OpResult, Error>) -> Option<&[MultiOpOutcome]> {
    match result {
        Ok(OpResult::Multi { outcomes }) => Some(outcomes),
        _ => None,
    }
}
