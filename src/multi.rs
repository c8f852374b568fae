//! Transaction composer: packs primitive ops into one atomic commit.
//!
//! See spec §4.6. Per-op status decoding is grounded on
//! `examples/original_source/src/zk/multi.cpp`/`multi.hpp` (an ok-prefix
//! followed by runtime-inconsistency placeholders once the first real
//! failure is hit), reimplemented idiomatically rather than translated.

use crate::error::{Error, ErrorKind};
use crate::value::{Acl, CreateMode, DataVersion, Stat};

/// One primitive operation inside a [`crate::request::Request::Multi`]
/// batch.
#[derive(Debug, Clone)]
pub enum MultiOp {
    /// Asserts the entry's version without modifying it.
    Check { path: String, version: DataVersion },
    /// Creates an entry.
    Create {
        path: String,
        data: Vec<u8>,
        acl: Acl,
        mode: CreateMode,
    },
    /// Sets an entry's data.
    Set {
        path: String,
        data: Vec<u8>,
        version: DataVersion,
    },
    /// Erases an entry.
    Erase { path: String, version: DataVersion },
}

impl MultiOp {
    /// The path this operation targets, for error reporting.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Check { path, .. }
            | Self::Create { path, .. }
            | Self::Set { path, .. }
            | Self::Erase { path, .. } => path,
        }
    }
}

/// The successful outcome of one op inside a committed transaction.
/// `Check` and `Erase` carry no payload, per spec §4.6.
#[derive(Debug, Clone)]
pub enum MultiOpOutcome {
    /// `check` succeeded.
    Check,
    /// `create` succeeded, producing the final (possibly sequential) name.
    Create { name: String },
    /// `set` succeeded, producing the entry's new stat.
    Set { stat: Stat },
    /// `erase` succeeded.
    Erase,
}

/// Accumulates a sequence of [`MultiOp`]s for an atomic commit.
#[derive(Debug, Clone, Default)]
pub struct MultiBuilder {
    ops: Vec<MultiOp>,
}

impl MultiBuilder {
    /// Starts an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a version check.
    #[must_use]
    pub fn check(mut self, path: impl Into<String>, version: DataVersion) -> Self {
        self.ops.push(MultiOp::Check { path: path.into(), version });
        self
    }

    /// Appends a create.
    #[must_use]
    pub fn create(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>, acl: Acl, mode: CreateMode) -> Self {
        self.ops.push(MultiOp::Create {
            path: path.into(),
            data: data.into(),
            acl,
            mode,
        });
        self
    }

    /// Appends a set.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, data: impl Into<Vec<u8>>, version: DataVersion) -> Self {
        self.ops.push(MultiOp::Set {
            path: path.into(),
            data: data.into(),
            version,
        });
        self
    }

    /// Appends an erase.
    #[must_use]
    pub fn erase(mut self, path: impl Into<String>, version: DataVersion) -> Self {
        self.ops.push(MultiOp::Erase { path: path.into(), version });
        self
    }

    /// Consumes the builder, yielding the accumulated ops.
    #[must_use]
    pub fn build(self) -> Vec<MultiOp> {
        self.ops
    }
}

/// A single op's raw per-op status, as decoded from the transport. The
/// ensemble reports either the op's own successful outcome or the
/// [`ErrorKind`] that made the whole transaction fail starting at this op.
#[derive(Debug, Clone)]
pub enum RawMultiOpStatus {
    /// The op applied.
    Ok(MultiOpOutcome),
    /// The op (or an earlier one) failed with this kind; this is the first
    /// failing op in the batch.
    Failed(ErrorKind),
    /// The op was never evaluated because an earlier op in the batch
    /// failed first — a runtime-inconsistency placeholder, per spec §4.6.
    Skipped,
}

/// Decodes a transport's raw per-op reply into either the transaction's
/// successful outcomes or a [`ErrorKind::TransactionFailed`] error
/// identifying the first failing op and its underlying cause.
///
/// # Errors
///
/// Returns `Err(Error)` with kind [`ErrorKind::TransactionFailed`] if any
/// op in `statuses` is [`RawMultiOpStatus::Failed`].
pub fn decode_multi_reply(statuses: Vec<RawMultiOpStatus>) -> Result<Vec<MultiOpOutcome>, Error> {
    let mut outcomes = Vec::with_capacity(statuses.len());
    for (index, status) in statuses.into_iter().enumerate() {
        match status {
            RawMultiOpStatus::Ok(outcome) => outcomes.push(outcome),
            RawMultiOpStatus::Failed(kind) => {
                return Err(Error::transaction_failed(Error::new(kind), index));
            }
            RawMultiOpStatus::Skipped => {
                // Placeholder for an op after the first failure; the batch
                // already failed at an earlier index so this is unreachable
                // in a well-formed reply, but tolerated rather than panicking.
            }
        }
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::well_known;

    #[test]
    fn builder_accumulates_in_order() {
        let ops = MultiBuilder::new()
            .create("/a", *b"A", well_known::open_unsafe(), CreateMode::NORMAL)
            .set("/b", *b"new", DataVersion::ANY)
            .check("/c", DataVersion::ANY)
            .build();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].path(), "/a");
        assert_eq!(ops[2].path(), "/c");
    }

    #[test]
    fn all_ok_decodes_to_outcomes_in_order() {
        let statuses = vec![
            RawMultiOpStatus::Ok(MultiOpOutcome::Create { name: "/a".into() }),
            RawMultiOpStatus::Ok(MultiOpOutcome::Set {
                stat: Stat::default(),
            }),
        ];
        let outcomes = decode_multi_reply(statuses).unwrap();
        assert_eq!(outcomes.len(), 2);
    }

    #[test]
    fn seed_scenario_5_no_entry_at_index_2() {
        // create(/a) ok, set(/b) ok, check(/c) fails no_entry.
        let statuses = vec![
            RawMultiOpStatus::Ok(MultiOpOutcome::Create { name: "/a".into() }),
            RawMultiOpStatus::Ok(MultiOpOutcome::Set {
                stat: Stat::default(),
            }),
            RawMultiOpStatus::Failed(ErrorKind::NoEntry),
        ];
        let err = decode_multi_reply(statuses).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransactionFailed);
        assert_eq!(err.transaction_failed_index(), Some(2));
        assert_eq!(err.transaction_cause().unwrap().kind(), ErrorKind::NoEntry);
    }
}
