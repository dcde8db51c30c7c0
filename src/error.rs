use std::error::Error;
use std::fmt;

use crate::remote::StoreError;

/// Error type returned at the sync engine boundary.
///
/// Remote failures are converted into values of this type and handed back to
/// the caller; they are never allowed to unwind into UI code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// The remote resource has never been initialized.
    NotFound { resource: String },
    /// Network or storage failure. Retried by the next refresh, never in a loop.
    TransientIo { resource: String, source: StoreError },
    /// A mutation was rejected before it touched the cache.
    Validation(String),
    /// A collection mutation referenced a row that is not in the cache.
    RecordNotFound { id: String },
    /// The remote write behind an optimistic update failed. The local value
    /// was kept; the next refresh decides what survives.
    StaleWriteDiscarded {
        resource: String,
        version: u64,
        reason: String,
    },
    /// A stored blob or row could not be decoded.
    Decode(String),
    /// The engine was shut down.
    Closed,
}

impl SyncError {
    pub(crate) fn io(resource: &str, source: StoreError) -> Self {
        SyncError::TransientIo {
            resource: resource.to_string(),
            source,
        }
    }

    /// True for failures that the next scheduled refresh may clear.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::TransientIo { .. } | SyncError::StaleWriteDiscarded { .. }
        )
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::NotFound { resource } => {
                write!(f, "remote resource {} does not exist", resource)
            }
            SyncError::TransientIo { resource, source } => {
                write!(f, "remote i/o failed for {}: {}", resource, source)
            }
            SyncError::Validation(msg) => write!(f, "validation failed: {}", msg),
            SyncError::RecordNotFound { id } => write!(f, "no record with id {}", id),
            SyncError::StaleWriteDiscarded {
                resource,
                version,
                reason,
            } => write!(
                f,
                "write v{} to {} failed after optimistic apply: {}",
                version, resource, reason
            ),
            SyncError::Decode(msg) => write!(f, "decode failed: {}", msg),
            SyncError::Closed => write!(f, "sync engine is shut down"),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SyncError::TransientIo { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(SyncError::io("app_settings", StoreError::Timeout).is_transient());
        assert!(SyncError::StaleWriteDiscarded {
            resource: "app_settings".into(),
            version: 3,
            reason: "timeout".into(),
        }
        .is_transient());
        assert!(!SyncError::Validation("bad".into()).is_transient());
        assert!(!SyncError::Closed.is_transient());
    }

    #[test]
    fn io_error_exposes_source() {
        let err = SyncError::io("ad_units", StoreError::Unavailable("offline".into()));
        assert_eq!(
            err.to_string(),
            "remote i/o failed for ad_units: store unavailable: offline"
        );
        assert!(err.source().is_some());
    }
}
