//! Strongly-typed optimistic-concurrency version tokens.
//!
//! Each domain (data, child-set, ACL) gets its own type so a `DataVersion`
//! cannot accidentally be passed where an `AclVersion` is expected; there is
//! deliberately no shared generic `Version<T>` constructor.

use std::fmt;

macro_rules! version_token {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(i32);

        impl $name {
            /// Sentinel meaning "skip the version check".
            pub const ANY: Self = Self(-1);
            /// Sentinel that never matches a real version (a placeholder).
            pub const INVALID: Self = Self(-2);

            /// Wraps a raw version number from the wire.
            #[must_use]
            pub const fn from_raw(raw: i32) -> Self {
                Self(raw)
            }

            /// The raw version number, as sent on the wire.
            #[must_use]
            pub const fn raw(self) -> i32 {
                self.0
            }

            /// `true` if this is the [`Self::ANY`] sentinel.
            #[must_use]
            pub const fn is_any(self) -> bool {
                self.0 == Self::ANY.0
            }

            /// Returns the next version after this one (for locally
            /// predicting post-write state in tests; the ensemble is the
            /// authority in production).
            #[must_use]
            pub const fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i32> for $name {
            fn from(raw: i32) -> Self {
                Self(raw)
            }
        }

        impl Default for $name {
            /// A freshly-created entry's version: `0`, not [`Self::ANY`].
            fn default() -> Self {
                Self(0)
            }
        }
    };
}

version_token!(DataVersion, "Optimistic-concurrency token for entry payload writes.");
version_token!(ChildVersion, "Monotone counter bumped on every direct child add/remove.");
version_token!(AclVersion, "Optimistic-concurrency token for ACL writes.");
