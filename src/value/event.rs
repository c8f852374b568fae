//! Watch event records.

use super::session_state::SessionState;

/// The kind of change (or pseudo-change) a watch fired for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// An entry was created (fires exists-watches only).
    Created,
    /// An entry was erased.
    Erased,
    /// An entry's data changed.
    Changed,
    /// A direct child of the watched entry was added or removed.
    Child,
    /// A session-lifecycle pseudo-event (teardown, reconnect).
    Session,
    /// The server could not service the watch (protocol-level notice).
    NotWatching,
    /// A local error prevented the watch from being armed or delivered.
    Error,
}

/// A single watch notification. Carries no path by design — the subscriber
/// already knows which path it watched, and threading a path through would
/// require an allocation on the dispatch thread for every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event {
    /// What kind of change occurred.
    pub kind: EventKind,
    /// The session's state at the moment this event was delivered.
    pub session_state: SessionState,
}

impl Event {
    /// Builds a new event.
    #[must_use]
    pub const fn new(kind: EventKind, session_state: SessionState) -> Self {
        Self { kind, session_state }
    }
}

/// Which entry changes a watch is armed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WatchKind {
    /// Fires on `Changed`/`Erased`/`Session` for an existing entry.
    Data,
    /// Fires on `Created`/`Changed`/`Erased`/`Session`; installed by
    /// `exists` regardless of whether the entry currently exists.
    Exists,
    /// Fires on direct-child add/remove, erasure of the watched entry
    /// itself, or `Session`.
    Children,
}
