//! Session transport contract (spec §6).
//!
//! The connection engine is written against this trait so it can be paired
//! with either the bundled minimal native-protocol transport or an
//! in-memory test transport. Neither transport knows anything about
//! sessions, watches, or the state machine — that logic all lives in
//! [`crate::engine`]; a transport only moves bytes (or, for the test
//! transport, pre-decoded values standing in for bytes) and reports
//! connectivity changes.

use std::time::Duration;

pub mod native;
pub mod test_transport;

pub use native::NativeTransport;
pub use test_transport::{TestEnsemble, TestTransport};

use crate::completion::CorrelationId;
use crate::error::Error;
use crate::multi::RawMultiOpStatus;
use crate::request::Request;
use crate::session::Transition;
use crate::value::{Acl, Stat};

/// A raw, not-yet-dispatched reply body, decoded from the wire (or, for the
/// test transport, produced directly) but before the engine has attached
/// any watch handle.
#[derive(Debug)]
pub enum RawReply {
    /// Reply to `Get`/`WatchData`.
    Get { data: Vec<u8>, stat: Stat },
    /// Reply to `Children`/`WatchChildren`.
    Children { names: Vec<String>, stat: Stat },
    /// Reply to `Exists`/`WatchExists`.
    Exists(Option<Stat>),
    /// Reply to `Create`.
    Create { name: String },
    /// Reply to `Set`.
    Set { stat: Stat },
    /// Reply to `Erase`.
    Erase,
    /// Reply to `GetAcl`.
    GetAcl { acl: Acl, stat: Stat },
    /// Reply to `SetAcl`.
    SetAcl { stat: Stat },
    /// Reply to `Fence`.
    Fence,
    /// Reply to `Multi`.
    Multi(Vec<RawMultiOpStatus>),
}

/// An unsolicited notification for a previously-armed watch, tagged by the
/// `(path, kind)` the engine's watch registry matches against.
#[derive(Debug, Clone)]
pub struct WatchNotice {
    pub path: String,
    pub kind: crate::value::WatchKind,
    pub event_kind: crate::value::EventKind,
}

/// Something the dispatch loop reads off the transport.
#[derive(Debug)]
pub enum TransportEvent {
    /// A reply to a previously-submitted request.
    Reply {
        correlation: CorrelationId,
        result: Result<RawReply, Error>,
    },
    /// An unsolicited watch notification.
    Watch(WatchNotice),
    /// The session's connectivity changed.
    SessionTransition(Transition),
}

/// An OS-level waitable identifying the transport's I/O source, for
/// integration with an external event loop. Native-protocol transports
/// expose a real file descriptor; the in-memory test transport has none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeHandle {
    /// A raw file descriptor (unix) or socket handle.
    #[cfg(unix)]
    Fd(std::os::unix::io::RawFd),
    /// No OS-level waitable (e.g. the in-memory test transport).
    None,
}

/// The capability set the connection engine depends on. See spec §6.
pub trait SessionTransport: Send + Sync {
    /// Enqueues `request` for submission, tagged with `correlation` so its
    /// reply can be routed back. Must not block on network I/O.
    fn submit(&self, correlation: CorrelationId, request: Request);

    /// Blocks up to `timeout` for the next transport event. Returns `None`
    /// on timeout with no event available.
    fn recv_event(&self, timeout: Duration) -> Option<TransportEvent>;

    /// An OS-level waitable for integration with an external reactor.
    fn native_handle(&self) -> NativeHandle;

    /// Releases the transport's resources. Idempotent.
    fn shutdown(&self);
}
