//! Access-control lists.
//!
//! An ACL is an ordered sequence of `(scheme, id, permissions)` triples. An
//! empty ACL is illegal for persistence (enforced by [`Acl::validate`], not
//! by the type itself, since a builder needs to be able to hold an empty
//! list transiently while it is assembled).

use std::fmt;

/// A set of permissions granted to an ACL entry.
///
/// Hand-rolled rather than built on the `bitflags` crate, matching the
/// teacher's own small-bitflag modules. `ALL` is the literal `0b11111`, and
/// [`Permissions::complement`] masks against `ALL` explicitly rather than
/// relying on the native bitwise complement, so that `!NONE == ALL` holds
/// even though the backing integer has unused high bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Permissions(u8);

impl Permissions {
    /// No permissions.
    pub const NONE: Self = Self(0);
    /// Permission to read an entry's data and child list.
    pub const READ: Self = Self(0b00001);
    /// Permission to set an entry's data.
    pub const WRITE: Self = Self(0b00010);
    /// Permission to create children.
    pub const CREATE: Self = Self(0b00100);
    /// Permission to erase the entry or its children.
    pub const ERASE: Self = Self(0b01000);
    /// Permission to read and set the entry's ACL.
    pub const ADMIN: Self = Self(0b10000);
    /// Union of all permissions.
    pub const ALL: Self = Self(0b11111);

    /// Builds a permission set from raw bits, masking out any bits not in
    /// [`Self::ALL`].
    #[must_use]
    pub const fn from_bits_truncate(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Raw bit representation.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// `true` if `self` grants every permission in `other`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of `self` and `other`.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// The complement of `self` within [`Self::ALL`] — *not* the native
    /// bitwise complement, which would also flip unused high bits.
    #[must_use]
    pub const fn complement(self) -> Self {
        Self(Self::ALL.0 & !self.0)
    }
}

impl std::ops::BitOr for Permissions {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl fmt::Display for Permissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut wrote = false;
        for (bit, ch) in [
            (Self::READ, 'r'),
            (Self::WRITE, 'w'),
            (Self::CREATE, 'c'),
            (Self::ERASE, 'd'),
            (Self::ADMIN, 'a'),
        ] {
            if self.contains(bit) {
                write!(f, "{ch}")?;
                wrote = true;
            }
        }
        if !wrote {
            write!(f, "-")?;
        }
        Ok(())
    }
}

/// One `(scheme, id, permissions)` triple in an ACL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    /// The authentication scheme this entry applies to (e.g. `"world"`,
    /// `"digest"`, `"ip"`).
    pub scheme: String,
    /// The identity within `scheme` this entry applies to.
    pub id: String,
    /// The permissions granted to this identity.
    pub permissions: Permissions,
}

impl AclEntry {
    /// Builds a new ACL entry.
    #[must_use]
    pub fn new(scheme: impl Into<String>, id: impl Into<String>, permissions: Permissions) -> Self {
        Self {
            scheme: scheme.into(),
            id: id.into(),
            permissions,
        }
    }
}

impl fmt::Display for AclEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}={}", self.scheme, self.id, self.permissions)
    }
}

/// An ordered list of ACL entries.
pub type Acl = Vec<AclEntry>;

/// Returns `true` if `acl` is non-empty, the form required for persistence.
#[must_use]
pub fn is_valid_for_persistence(acl: &[AclEntry]) -> bool {
    !acl.is_empty()
}

/// Renders an ACL the way the original `zk::acl` stream operator did, for
/// logging: comma-separated `scheme:id=perm` entries in brackets.
#[must_use]
pub fn to_display_string(acl: &[AclEntry]) -> String {
    let mut out = String::from("[");
    for (i, entry) in acl.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(&entry.to_string());
    }
    out.push(']');
    out
}

/// Well-known ACL constants (spec §9). Each is a fresh `Vec` on every call —
/// a process-wide *value*, not a shared static — matching the no-ambient-
/// authority preference applied elsewhere in this crate.
pub mod well_known {
    use super::{AclEntry, Acl, Permissions};

    /// Grants every permission to the session that created the entry.
    #[must_use]
    pub fn creator_all() -> Acl {
        vec![AclEntry::new("auth", "", Permissions::ALL)]
    }

    /// Grants every permission to anyone (the `world:anyone` identity).
    #[must_use]
    pub fn open_unsafe() -> Acl {
        vec![AclEntry::new("world", "anyone", Permissions::ALL)]
    }

    /// Grants read-only access to anyone.
    #[must_use]
    pub fn read_unsafe() -> Acl {
        vec![AclEntry::new("world", "anyone", Permissions::READ)]
    }
}
