//! sync
//!
//! Downstream synchronization: uploading signed/active interventions to
//! the planning/reporting system.
//!
//! # Design
//!
//! The [`Downstream`] trait is async because uploads are network I/O.
//! Adapters are invoked only after the local transition has committed;
//! their failures never compromise local correctness. Delivery state
//! lives in the [`outbox`], drained by the [`worker`] with bounded
//! retries and exponential backoff.

use async_trait::async_trait;
use thiserror::Error;

pub mod document;
pub mod http;
pub mod mock;
pub mod outbox;
pub mod worker;

pub use document::{build_document, InterventionDocument};
pub use http::HttpDownstream;
pub use mock::MockDownstream;
pub use outbox::{OutboxRecord, OutboxState};
pub use worker::{DrainReport, SyncWorker};

/// Errors from downstream operations.
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The endpoint could not be reached or returned a server error.
    #[error("downstream unavailable: {0}")]
    Unavailable(String),

    /// The endpoint rejected the document.
    #[error("downstream rejected the document: {status} - {message}")]
    Rejected { status: u16, message: String },

    /// The document could not be serialized.
    #[error("serialization failed: {0}")]
    Serialize(String),
}

impl SyncError {
    /// Rejections are permanent; retrying the same content cannot help.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Unavailable(_))
    }
}

/// An adapter for the downstream planning/reporting system.
#[async_trait]
pub trait Downstream: Send + Sync {
    /// Upload one document.
    async fn upload(&self, document: &InterventionDocument) -> Result<(), SyncError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_retryable() {
        assert!(SyncError::Unavailable("timeout".into()).is_retryable());
    }

    #[test]
    fn rejection_is_not_retryable() {
        let err = SyncError::Rejected {
            status: 400,
            message: "bad".into(),
        };
        assert!(!err.is_retryable());
    }
}
