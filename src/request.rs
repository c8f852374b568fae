//! Request and result models.
//!
//! Tagged request variants accepted by the connection engine, and the
//! matching result variants a [`crate::transport::SessionTransport`] decodes
//! replies into. See spec §4.1/§4.5.

use crate::multi::{MultiOp, MultiOpOutcome};
use crate::value::{Acl, AclVersion, CreateMode, DataVersion, Stat};
use crate::watch::WatchHandle;

/// A single primitive request submitted to the engine.
#[derive(Debug, Clone)]
pub enum Request {
    /// `get(path)`.
    Get { path: String },
    /// `get(path)` with a data-watch armed on success.
    WatchData { path: String },
    /// `children(path)`.
    Children { path: String },
    /// `children(path)` with a children-watch armed on success.
    WatchChildren { path: String },
    /// `exists(path)`.
    Exists { path: String },
    /// `exists(path)` with an exists-watch armed regardless of outcome.
    WatchExists { path: String },
    /// `create(path, data, acl, mode)`.
    Create {
        path: String,
        data: Vec<u8>,
        acl: Acl,
        mode: CreateMode,
    },
    /// `set(path, data, version)`.
    Set {
        path: String,
        data: Vec<u8>,
        version: DataVersion,
    },
    /// `erase(path, version)`.
    Erase {
        path: String,
        version: DataVersion,
    },
    /// `get_acl(path)`.
    GetAcl { path: String },
    /// `set_acl(path, acl, version)`.
    SetAcl {
        path: String,
        acl: Acl,
        version: AclVersion,
    },
    /// `fence()`: a barrier with no payload.
    Fence,
    /// `commit(multi_op)`.
    Multi { ops: Vec<MultiOp> },
}

/// The successful outcome of a single primitive operation, as decoded from
/// a transport reply.
#[derive(Debug)]
pub enum OpResult {
    /// Result of `get`.
    Get { data: Vec<u8>, stat: Stat },
    /// Result of `watch_data`.
    WatchGet { data: Vec<u8>, stat: Stat, watch: WatchHandle },
    /// Result of `children`.
    Children { names: Vec<String>, stat: Stat },
    /// Result of `watch_children`.
    WatchChildren { names: Vec<String>, stat: Stat, watch: WatchHandle },
    /// Result of `exists`: `None` if the entry does not exist (never an
    /// error — `exists` is the one read that tolerates absence).
    Exists(Option<Stat>),
    /// Result of `watch_exists`.
    WatchExists(Option<Stat>, WatchHandle),
    /// Result of `create`: the created name, which may carry a sequential
    /// numeric suffix the server appended.
    Create { name: String },
    /// Result of `set`.
    Set { stat: Stat },
    /// Result of `erase`.
    Erase,
    /// Result of `get_acl`.
    GetAcl { acl: Acl, stat: Stat },
    /// Result of `set_acl`.
    SetAcl { stat: Stat },
    /// Result of `fence`.
    Fence,
    /// Result of `commit`: the per-op outcomes of a successful transaction.
    Multi { outcomes: Vec<MultiOpOutcome> },
}
