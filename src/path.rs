//! Hierarchical entry paths.
//!
//! A path is a slash-delimited string rooted at `/`. Validation happens once,
//! at construction, so every other component in this crate can assume a
//! `Path` is well-formed.

use std::fmt;

use crate::error::{Error, ErrorKind};

/// A validated entry path, e.g. `/services/leader`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(String);

impl Path {
    /// Parses and validates `raw` as an entry path.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::InvalidArguments`] if `raw` is empty, does not
    /// start with `/`, has a trailing slash (other than the root path
    /// itself), contains `//`, or contains non-ASCII bytes.
    pub fn new(raw: impl Into<String>) -> Result<Self, Error> {
        let raw = raw.into();
        Self::validate(&raw)?;
        Ok(Self(raw))
    }

    fn validate(raw: &str) -> Result<(), Error> {
        if raw.is_empty() {
            return Err(Error::new(ErrorKind::InvalidArguments).with_context("empty path"));
        }
        if !raw.is_ascii() {
            return Err(Error::new(ErrorKind::InvalidArguments).with_context("path is not ASCII"));
        }
        if !raw.starts_with('/') {
            return Err(
                Error::new(ErrorKind::InvalidArguments).with_context("path must start with '/'")
            );
        }
        if raw.len() > 1 && raw.ends_with('/') {
            return Err(
                Error::new(ErrorKind::InvalidArguments).with_context("path has trailing slash")
            );
        }
        if raw.contains("//") {
            return Err(
                Error::new(ErrorKind::InvalidArguments).with_context("path contains '//'")
            );
        }
        Ok(())
    }

    /// Returns the path as a plain string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if this is the root path `/`.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    /// Returns the parent path, or `None` if this is the root.
    #[must_use]
    pub fn parent(&self) -> Option<Path> {
        if self.is_root() {
            return None;
        }
        let idx = self.0.rfind('/').unwrap_or(0);
        let parent = if idx == 0 { "/" } else { &self.0[..idx] };
        Some(Path(parent.to_string()))
    }

    /// Returns the final path segment (the entry's own name).
    #[must_use]
    pub fn name(&self) -> &str {
        if self.is_root() {
            return "/";
        }
        let idx = self.0.rfind('/').unwrap_or(0);
        &self.0[idx + 1..]
    }

    /// Builds a child path by appending `segment` under this path.
    ///
    /// # Errors
    ///
    /// Propagates [`Path::new`]'s validation errors (e.g. if `segment`
    /// itself contains a `/`).
    pub fn child(&self, segment: &str) -> Result<Path, Error> {
        if segment.contains('/') {
            return Err(Error::new(ErrorKind::InvalidArguments)
                .with_context("child segment must not contain '/'"));
        }
        let joined = if self.is_root() {
            format!("/{segment}")
        } else {
            format!("{}/{segment}", self.0)
        };
        Path::new(joined)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Path {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::new(s)
    }
}
