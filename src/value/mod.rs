//! The immutable value model: entries, stats, versions, ACLs, events.

mod acl;
mod create_mode;
mod event;
mod session_state;
mod stat;
mod version;

pub use acl::{is_valid_for_persistence, to_display_string, well_known, Acl, AclEntry, Permissions};
pub use create_mode::CreateMode;
pub use event::{Event, EventKind, WatchKind};
pub use session_state::SessionState;
pub use stat::Stat;
pub use version::{AclVersion, ChildVersion, DataVersion};

/// The maximum payload size accepted locally, mirroring the wire format's
/// cap. Payloads larger than this are rejected before ever reaching the
/// transport.
pub const MAX_PAYLOAD_BYTES: usize = 1024 * 1024;

/// Validates a payload against [`MAX_PAYLOAD_BYTES`].
///
/// # Errors
///
/// Returns [`crate::error::ErrorKind::InvalidArguments`] if `data` exceeds
/// the cap.
pub fn validate_payload(data: &[u8]) -> Result<(), crate::error::Error> {
    if data.len() > MAX_PAYLOAD_BYTES {
        return Err(crate::error::Error::new(crate::error::ErrorKind::InvalidArguments)
            .with_context(format!(
                "payload of {} bytes exceeds cap of {MAX_PAYLOAD_BYTES}",
                data.len()
            )));
    }
    Ok(())
}

/// Validates an ACL for persistence, per spec §3: "An empty ACL is illegal
/// for persistence."
///
/// # Errors
///
/// Returns [`crate::error::ErrorKind::InvalidArguments`] if `acl` is empty.
pub fn validate_acl_for_persistence(acl: &[AclEntry]) -> Result<(), crate::error::Error> {
    if !is_valid_for_persistence(acl) {
        return Err(crate::error::Error::new(crate::error::ErrorKind::InvalidArguments)
            .with_context("an empty ACL is not valid for persistence"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_at_cap_is_valid_one_byte_over_is_not() {
        let at_cap = vec![0u8; MAX_PAYLOAD_BYTES];
        assert!(validate_payload(&at_cap).is_ok());
        let over_cap = vec![0u8; MAX_PAYLOAD_BYTES + 1];
        assert!(validate_payload(&over_cap).is_err());
    }
}
