//! Metadata bundle returned alongside most reads and writes.

use super::version::{AclVersion, ChildVersion, DataVersion};

/// Metadata about an entry, as returned by most read/write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Transaction id that created the entry.
    pub create_txn: i64,
    /// Transaction id of the last data change.
    pub modified_txn: i64,
    /// Transaction id of the last child-set change.
    pub child_modified_txn: i64,
    /// Wall-clock creation timestamp (informational only; never used for
    /// ordering decisions — it is not monotonic).
    pub create_time: i64,
    /// Wall-clock last-modification timestamp (informational only).
    pub modified_time: i64,
    /// Monotone counter for payload writes.
    pub data_version: DataVersion,
    /// Monotone counter for direct child add/remove.
    pub child_version: ChildVersion,
    /// Monotone counter for ACL writes.
    pub acl_version: AclVersion,
    /// Nonzero iff the entry is ephemeral; identifies the owning session.
    pub ephemeral_owner: i64,
    /// Size in bytes of the entry's payload.
    pub data_size: i32,
    /// Number of direct children.
    pub children_count: i32,
}

impl Stat {
    /// `true` if this entry is ephemeral (tied to a session's lifetime).
    #[must_use]
    pub const fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_stat_is_not_ephemeral() {
        assert!(!Stat::default().is_ephemeral());
    }

    #[test]
    fn ephemeral_owner_nonzero_marks_ephemeral() {
        let s = Stat {
            ephemeral_owner: 42,
            ..Stat::default()
        };
        assert!(s.is_ephemeral());
    }
}
