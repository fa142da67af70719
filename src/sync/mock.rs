//! sync::mock
//!
//! In-memory downstream for tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::document::InterventionDocument;
use super::{Downstream, SyncError};

/// A downstream that records uploads and can fail on demand.
#[derive(Debug, Default)]
pub struct MockDownstream {
    sent: Mutex<Vec<InterventionDocument>>,
    /// Remaining attempts that will fail with `Unavailable`.
    fail_remaining: AtomicU32,
}

impl MockDownstream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` upload attempts.
    pub fn fail_next(&self, count: u32) {
        self.fail_remaining.store(count, Ordering::SeqCst);
    }

    /// Documents successfully uploaded, in order.
    pub fn sent(&self) -> Vec<InterventionDocument> {
        self.sent.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl Downstream for MockDownstream {
    async fn upload(&self, document: &InterventionDocument) -> Result<(), SyncError> {
        let remaining = self.fail_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(SyncError::Unavailable("simulated outage".into()));
        }
        self.sent
            .lock()
            .expect("mock lock poisoned")
            .push(document.clone());
        Ok(())
    }
}
