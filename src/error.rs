//! Error taxonomy for the coordination-service client.
//!
//! Every error carries a [`ErrorKind`] so callers dispatch on the kind
//! category (spec: "Application code is expected to dispatch on the kind
//! category, not the specific string") rather than matching on messages.

use std::fmt;

/// The category of an error returned by the client engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The connection to the ensemble was lost. A write that failed this
    /// way may still have been applied; it is the caller's job to check.
    ConnectionLoss,
    /// A reply frame could not be decoded.
    MarshallingError,
    /// An argument was invalid (bad path, payload too large, empty ACL, ...).
    InvalidArguments,
    /// The ensemble rejected the session's credentials.
    AuthenticationFailed,
    /// Dynamic reconfiguration left no quorum reachable.
    NewConfigurationNoQuorum,
    /// A reconfiguration is already in progress.
    ReconfigurationInProgress,
    /// Reconfiguration is disabled on the ensemble.
    ReconfigurationDisabled,
    /// The session expired; the caller must create a fresh session.
    SessionExpired,
    /// The session (or the request submitted to it) is closed.
    Closed,
    /// The caller lacks permission for the operation.
    NotAuthorized,
    /// The connection is read-only and the operation requires a write.
    ReadOnlyConnection,
    /// An ephemeral create was attempted on a connection with no real session.
    EphemeralOnLocalSession,
    /// No entry exists at the given path.
    NoEntry,
    /// An entry already exists at the given path.
    EntryExists,
    /// The entry has children and cannot be erased.
    NotEmpty,
    /// A supplied version token did not match the entry's current version.
    VersionMismatch,
    /// An ephemeral entry cannot have children.
    NoChildrenForEphemerals,
    /// A multi-op transaction failed; see [`Error::transaction_cause`] and
    /// [`Error::transaction_failed_index`].
    TransactionFailed,
}

impl ErrorKind {
    /// A stable short code suitable for logging and metrics.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConnectionLoss => "connection_loss",
            Self::MarshallingError => "marshalling_error",
            Self::InvalidArguments => "invalid_arguments",
            Self::AuthenticationFailed => "authentication_failed",
            Self::NewConfigurationNoQuorum => "new_configuration_no_quorum",
            Self::ReconfigurationInProgress => "reconfiguration_in_progress",
            Self::ReconfigurationDisabled => "reconfiguration_disabled",
            Self::SessionExpired => "session_expired",
            Self::Closed => "closed",
            Self::NotAuthorized => "not_authorized",
            Self::ReadOnlyConnection => "read_only_connection",
            Self::EphemeralOnLocalSession => "ephemeral_on_local_session",
            Self::NoEntry => "no_entry",
            Self::EntryExists => "entry_exists",
            Self::NotEmpty => "not_empty",
            Self::VersionMismatch => "version_mismatch",
            Self::NoChildrenForEphemerals => "no_children_for_ephemerals",
            Self::TransactionFailed => "transaction_failed",
        }
    }

    /// `true` for errors that are terminal at the session level: the caller
    /// must establish a fresh session, not retry on the same one.
    #[must_use]
    pub const fn is_session_error(self) -> bool {
        matches!(
            self,
            Self::SessionExpired
                | Self::Closed
                | Self::NotAuthorized
                | Self::ReadOnlyConnection
                | Self::EphemeralOnLocalSession
        )
    }

    /// `true` for the "check" category: errors describing a precondition
    /// that failed against the entry tree, as opposed to transport,
    /// argument, or ensemble-state failures.
    #[must_use]
    pub const fn is_check_error(self) -> bool {
        matches!(
            self,
            Self::NoEntry
                | Self::EntryExists
                | Self::NotEmpty
                | Self::VersionMismatch
                | Self::NoChildrenForEphemerals
                | Self::TransactionFailed
        )
    }

    /// `true` for transport-level errors that may be safely retried by the
    /// application (note: a write that got a `ConnectionLoss` may already
    /// have applied; retrying a non-idempotent write is still the caller's
    /// decision to make, not automatic).
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::ConnectionLoss
                | Self::MarshallingError
                | Self::NewConfigurationNoQuorum
                | Self::ReconfigurationInProgress
                | Self::ReconfigurationDisabled
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// An error returned by the client engine.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    /// Set only for [`ErrorKind::TransactionFailed`]: the underlying cause
    /// of the first failing operation.
    transaction_cause: Option<Box<Error>>,
    /// Set only for [`ErrorKind::TransactionFailed`]: the 0-based index of
    /// the first failing operation in the batch.
    transaction_index: Option<usize>,
}

impl Error {
    /// Creates a new error of the given kind, with no context.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            transaction_cause: None,
            transaction_index: None,
        }
    }

    /// Attaches a human-readable context message.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Builds a [`ErrorKind::TransactionFailed`] error with its cause and
    /// the index of the first failing operation.
    #[must_use]
    pub fn transaction_failed(cause: Error, index: usize) -> Self {
        Self {
            kind: ErrorKind::TransactionFailed,
            context: None,
            transaction_cause: Some(Box::new(cause)),
            transaction_index: Some(index),
        }
    }

    /// The error's kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Stable short code, delegating to [`ErrorKind::code`].
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.kind.code()
    }

    /// The underlying cause of a [`ErrorKind::TransactionFailed`] error.
    #[must_use]
    pub fn transaction_cause(&self) -> Option<&Error> {
        self.transaction_cause.as_deref()
    }

    /// The 0-based index of the first failing operation in a
    /// [`ErrorKind::TransactionFailed`] error.
    #[must_use]
    pub const fn transaction_failed_index(&self) -> Option<usize> {
        self.transaction_index
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        if let (Some(cause), Some(index)) = (&self.transaction_cause, self.transaction_index) {
            write!(f, " (op {index} failed: {cause})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.transaction_cause
            .as_deref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_context() {
        let e = Error::new(ErrorKind::NoEntry).with_context("/missing");
        assert_eq!(e.to_string(), "no_entry: /missing");
    }

    #[test]
    fn transaction_failed_carries_cause_and_index() {
        let cause = Error::new(ErrorKind::NoEntry).with_context("/c");
        let e = Error::transaction_failed(cause, 2);
        assert_eq!(e.kind(), ErrorKind::TransactionFailed);
        assert_eq!(e.transaction_failed_index(), Some(2));
        assert_eq!(e.transaction_cause().unwrap().kind(), ErrorKind::NoEntry);
        assert!(e.to_string().contains("op 2 failed"));
        assert!(std::error::Error::source(&e).is_some());
    }

    #[test]
    fn category_predicates() {
        assert!(ErrorKind::SessionExpired.is_session_error());
        assert!(!ErrorKind::NoEntry.is_session_error());
        assert!(ErrorKind::VersionMismatch.is_check_error());
        assert!(ErrorKind::ConnectionLoss.is_retryable());
        assert!(!ErrorKind::InvalidArguments.is_retryable());
    }
}
