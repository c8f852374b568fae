//! One-shot watch subscriptions.
//!
//! Each watch is installed by a read, attached to `(path, kind)`, and fires
//! exactly one event before removing itself — see spec §4.3. A dropped
//! [`WatchHandle`] does not cancel delivery: any event already in flight
//! (or queued behind a lock) is still delivered to the dangling oneshot,
//! which is simply dropped by the dispatch thread. Because the waiter half
//! only holds a reference to its own one-shot cell — never to the engine —
//! a held [`WatchHandle`] can never keep a [`crate::engine::ConnectionEngine`]
//! alive (spec §9's cyclic-ownership note).

use std::collections::HashMap;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::completion::{CompletionSender, CompletionWaiter};
use crate::path::Path;
use crate::value::{Event, EventKind, SessionState, WatchKind};

/// A handle to a single installed watch. Waits for exactly one [`Event`].
#[must_use = "a watch handle does nothing until you wait on it"]
pub struct WatchHandle {
    id: u64,
    waiter: CompletionWaiter<Event>,
}

impl std::fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchHandle").field("id", &self.id).finish_non_exhaustive()
    }
}

impl WatchHandle {
    /// An opaque id, stable for the handle's lifetime, usable for equality
    /// comparisons between handles obtained from the same registry.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Blocks until this watch's single event is delivered.
    pub fn wait(self) -> Event {
        self.waiter.wait()
    }
}

impl PartialEq for WatchHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for WatchHandle {}

struct WatchSlot {
    sender: CompletionSender<Event>,
}

/// Tracks one-shot watches keyed by `(path, kind)`.
pub struct WatchRegistry {
    slots: Mutex<HashMap<(Path, WatchKind), SmallVec<[WatchSlot; 2]>>>,
    next_id: Mutex<u64>,
}

impl Default for WatchRegistry {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }
}

impl WatchRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a watch for `(path, kind)`. Per spec §4.3, this must only
    /// be called after the read it accompanies has already succeeded.
    pub fn install(&self, path: &Path, kind: WatchKind) -> WatchHandle {
        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next += 1;
            id
        };
        let (sender, rx) = crate::completion::oneshot();
        let slot = WatchSlot { sender };
        self.slots
            .lock()
            .entry((path.clone(), kind))
            .or_default()
            .push(slot);
        WatchHandle { id, waiter: rx }
    }

    /// Delivers `event` to every watch installed for `(path, kind)`,
    /// removing them (one-shot: each fires at most once).
    pub fn dispatch(&self, path: &Path, kind: WatchKind, event: Event) {
        let slots = self.slots.lock().remove(&(path.clone(), kind));
        if let Some(slots) = slots {
            for slot in slots {
                slot.sender.send(event);
            }
        }
    }

    /// An `erased` event on `path` also fires any children-watch installed
    /// on `path` itself (spec §4.3: "erased of the parent").
    pub fn dispatch_erase(&self, path: &Path, session_state: SessionState) {
        let event = Event::new(EventKind::Erased, session_state);
        self.dispatch(path, WatchKind::Data, event);
        self.dispatch(path, WatchKind::Exists, event);
        self.dispatch(path, WatchKind::Children, event);
    }

    /// Delivers a synthetic `(Session, state)` event to every remaining
    /// watch and clears the registry. Called on session teardown.
    pub fn drain(&self, state: SessionState) {
        let event = Event::new(EventKind::Session, state);
        let all: Vec<WatchSlot> = {
            let mut slots = self.slots.lock();
            slots.drain().flat_map(|(_, v)| v.into_iter()).collect()
        };
        for slot in all {
            slot.sender.send(event);
        }
    }

    /// Number of distinct `(path, kind)` keys with at least one pending
    /// watch. Exposed for tests.
    #[must_use]
    pub fn pending_keys(&self) -> usize {
        self.slots.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(p: &str) -> Path {
        Path::new(p).unwrap()
    }

    #[test]
    fn dispatch_delivers_and_removes() {
        let reg = WatchRegistry::new();
        let h = reg.install(&path("/a"), WatchKind::Data);
        reg.dispatch(
            &path("/a"),
            WatchKind::Data,
            Event::new(EventKind::Changed, SessionState::Connected),
        );
        let event = h.wait();
        assert_eq!(event.kind, EventKind::Changed);
        assert_eq!(reg.pending_keys(), 0);
    }

    #[test]
    fn multiple_watches_on_same_key_all_fire() {
        let reg = WatchRegistry::new();
        let h1 = reg.install(&path("/a"), WatchKind::Children);
        let h2 = reg.install(&path("/a"), WatchKind::Children);
        reg.dispatch(
            &path("/a"),
            WatchKind::Children,
            Event::new(EventKind::Child, SessionState::Connected),
        );
        assert_eq!(h1.wait().kind, EventKind::Child);
        assert_eq!(h2.wait().kind, EventKind::Child);
    }

    #[test]
    fn drain_delivers_session_event_to_all_kinds() {
        let reg = WatchRegistry::new();
        let h1 = reg.install(&path("/a"), WatchKind::Data);
        let h2 = reg.install(&path("/b"), WatchKind::Children);
        reg.drain(SessionState::ExpiredSession);
        assert_eq!(h1.wait().session_state, SessionState::ExpiredSession);
        assert_eq!(h2.wait().session_state, SessionState::ExpiredSession);
    }

    #[test]
    fn handles_are_equatable_by_id() {
        let reg = WatchRegistry::new();
        let h1 = reg.install(&path("/a"), WatchKind::Data);
        let h2 = reg.install(&path("/a"), WatchKind::Data);
        assert_ne!(h1, h2);
    }

    #[test]
    fn erase_fires_children_watch_on_the_erased_entry_itself() {
        let reg = WatchRegistry::new();
        let h = reg.install(&path("/p"), WatchKind::Children);
        reg.dispatch_erase(&path("/p"), SessionState::Connected);
        assert_eq!(h.wait().kind, EventKind::Erased);
    }
}
