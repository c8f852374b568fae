//! One-shot completions for in-flight requests.
//!
//! Mirrors a future/promise pair, but hand-rolled on `parking_lot::Mutex` +
//! `Condvar` rather than pulled in from a channel crate — this crate is not
//! itself an async runtime, so a blocking-wait oneshot is the right shape,
//! the same way the teacher hand-rolls `sync::semaphore` instead of
//! depending on `tokio::sync::Semaphore`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use slab::Slab;
use tracing::warn;

use crate::error::{Error, ErrorKind};

enum OneshotState<T> {
    Pending,
    Ready(T),
    Taken,
}

struct OneshotInner<T> {
    state: Mutex<OneshotState<T>>,
    condvar: Condvar,
}

/// The sending half of a one-shot completion. Held by the connection
/// engine's dispatch loop.
pub struct CompletionSender<T> {
    inner: Arc<OneshotInner<T>>,
}

/// The receiving half of a one-shot completion. Returned to the application
/// when a request is submitted.
#[must_use = "a pending completion does nothing until you wait on it"]
pub struct CompletionWaiter<T> {
    inner: Arc<OneshotInner<T>>,
}

impl<T> fmt::Debug for CompletionWaiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionWaiter").finish_non_exhaustive()
    }
}

/// Builds a fresh one-shot sender/waiter pair. Used both by
/// [`CompletionRegistry`] and by [`crate::watch::WatchRegistry`], which
/// needs the same one-shot-delivery shape keyed by `(path, kind)` rather
/// than by a dense correlation id.
pub(crate) fn oneshot<T>() -> (CompletionSender<T>, CompletionWaiter<T>) {
    let inner = Arc::new(OneshotInner {
        state: Mutex::new(OneshotState::Pending),
        condvar: Condvar::new(),
    });
    (
        CompletionSender { inner: inner.clone() },
        CompletionWaiter { inner },
    )
}

impl<T> CompletionSender<T> {
    /// Resolves the completion. Returns `true` if this call delivered the
    /// value; `false` if the completion had already been resolved (by a
    /// prior `send` or by [`CompletionRegistry::drain`]) — in which case
    /// `value` is dropped and this call is a no-op, per the registry's
    /// exactly-once contract.
    pub(crate) fn send(self, value: T) -> bool {
        let mut state = self.inner.state.lock();
        if matches!(*state, OneshotState::Pending) {
            *state = OneshotState::Ready(value);
            drop(state);
            self.inner.condvar.notify_all();
            true
        } else {
            false
        }
    }
}

impl<T> CompletionWaiter<T> {
    /// Blocks the calling thread until the completion is resolved.
    pub fn wait(self) -> T {
        let mut state = self.inner.state.lock();
        loop {
            match &mut *state {
                OneshotState::Ready(_) => {
                    let OneshotState::Ready(value) =
                        std::mem::replace(&mut *state, OneshotState::Taken)
                    else {
                        unreachable!()
                    };
                    return value;
                }
                OneshotState::Taken => unreachable!("completion waited on twice"),
                OneshotState::Pending => self.inner.condvar.wait(&mut state),
            }
        }
    }

    /// Blocks up to `timeout`, returning `None` if the completion had not
    /// resolved by then (the waiter remains valid and may be waited on
    /// again).
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T>
    where
        T: Clone,
    {
        let mut state = self.inner.state.lock();
        if matches!(*state, OneshotState::Pending) {
            let result = self.inner.condvar.wait_for(&mut state, timeout);
            if result.timed_out() && matches!(*state, OneshotState::Pending) {
                return None;
            }
        }
        match &*state {
            OneshotState::Ready(value) => Some(value.clone()),
            _ => None,
        }
    }
}

/// A fresh, session-unique id for an in-flight request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(usize);

impl CorrelationId {
    /// The id's dense internal key, for code that needs to key its own
    /// side-table by correlation id (e.g. [`crate::engine::ConnectionEngine`]'s
    /// pending-request table).
    #[must_use]
    pub(crate) const fn raw(self) -> usize {
        self.0
    }

    /// Widens to the `u64` a wire transport carries a correlation id as.
    #[must_use]
    pub(crate) const fn as_u64(self) -> u64 {
        self.0 as u64
    }

    /// Narrows a wire-carried `u64` back into a `CorrelationId`. Used only
    /// by transports that round-trip the id through an external peer; the
    /// in-memory test transport never leaves process so it never needs
    /// this conversion.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) const fn from_u64(raw: u64) -> Self {
        Self(raw as usize)
    }
}

/// Owns one-shot completions for submitted requests, keyed by
/// [`CorrelationId`]. See spec §4.2: every registered completion is
/// resolved exactly once, either naturally or via [`Self::drain`].
pub struct CompletionRegistry<T> {
    slots: Mutex<Slab<CompletionSender<T>>>,
}

impl<T> Default for CompletionRegistry<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(Slab::new()),
        }
    }
}

impl<T> CompletionRegistry<T> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh correlation id and returns the waiter half of its
    /// completion. The sender half is retained internally until resolved.
    pub fn register(&self) -> (CorrelationId, CompletionWaiter<T>) {
        let (tx, rx) = oneshot();
        let mut slots = self.slots.lock();
        let key = slots.insert(tx);
        (CorrelationId(key), rx)
    }

    /// Resolves `id` with `value`. A second resolution of the same id (a
    /// race with [`Self::drain`], or a protocol bug sending a duplicate
    /// reply) is a logged no-op.
    pub fn resolve(&self, id: CorrelationId, value: T) {
        let sender = {
            let mut slots = self.slots.lock();
            if slots.contains(id.0) {
                Some(slots.remove(id.0))
            } else {
                None
            }
        };
        if let Some(sender) = sender {
            sender.send(value);
        } else {
            warn!(correlation_id = id.0, "resolve for unknown or already-resolved completion");
        }
    }

    /// Resolves every outstanding completion with `make_error()`, called
    /// once per drained entry so each completion can carry an independent
    /// `Error` value. Used on session expiry and close.
    pub fn drain(&self, make_error: impl Fn() -> T) {
        let drained: Vec<CompletionSender<T>> = {
            let mut slots = self.slots.lock();
            slots.drain().collect()
        };
        for sender in drained {
            sender.send(make_error());
        }
    }

    /// Number of completions currently outstanding. Exposed for tests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.slots.lock().len()
    }
}

impl<T> CompletionRegistry<Result<T, Error>> {
    /// Convenience over [`Self::drain`] for the common case where the
    /// terminal value is `Err(Error::new(kind))`.
    pub fn drain_with_kind(&self, kind: ErrorKind) {
        self.drain(|| Err(Error::new(kind)));
    }
}
