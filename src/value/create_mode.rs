//! Entry creation flags.

use crate::error::{Error, ErrorKind};

/// Flags controlling how `create` behaves. No flags means "normal": a
/// persistent entry with a fixed name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CreateMode(u8);

impl CreateMode {
    /// A normal, persistent entry with a fixed name.
    pub const NORMAL: Self = Self(0);
    /// The entry is removed when the owning session ends.
    pub const EPHEMERAL: Self = Self(0b001);
    /// The server appends a monotonic numeric suffix to the supplied path.
    pub const SEQUENTIAL: Self = Self(0b010);
    /// The entry is a container, auto-erased once its last child is removed.
    pub const CONTAINER: Self = Self(0b100);

    /// `true` if `self` includes `flag`.
    #[must_use]
    pub const fn has(self, flag: Self) -> bool {
        self.0 & flag.0 == flag.0
    }

    /// Unions `self` with `flag`.
    #[must_use]
    pub const fn with(self, flag: Self) -> Self {
        Self(self.0 | flag.0)
    }

    /// Validates the flag combination.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArguments`] for `EPHEMERAL | CONTAINER`,
    /// an invalid combination (ephemeral entries can have no children, and
    /// containers are defined by their children disappearing).
    pub fn validate(self) -> Result<(), Error> {
        if self.has(Self::EPHEMERAL) && self.has(Self::CONTAINER) {
            return Err(Error::new(ErrorKind::InvalidArguments)
                .with_context("create mode cannot combine ephemeral and container"));
        }
        Ok(())
    }
}

impl std::ops::BitOr for CreateMode {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_has_no_flags() {
        assert!(!CreateMode::NORMAL.has(CreateMode::EPHEMERAL));
        assert!(CreateMode::NORMAL.validate().is_ok());
    }

    #[test]
    fn ephemeral_container_is_invalid() {
        let mode = CreateMode::EPHEMERAL | CreateMode::CONTAINER;
        assert!(mode.validate().is_err());
    }

    #[test]
    fn ephemeral_sequential_is_valid() {
        let mode = CreateMode::EPHEMERAL | CreateMode::SEQUENTIAL;
        assert!(mode.validate().is_ok());
        assert!(mode.has(CreateMode::EPHEMERAL));
        assert!(mode.has(CreateMode::SEQUENTIAL));
    }
}
