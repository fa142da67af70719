//! sync::worker
//!
//! Drains the outbox with bounded retries.
//!
//! Each pending record gets up to three upload attempts with exponential
//! backoff. Permanent rejections and exhausted retries mark the record
//! failed and log; the originating transition is never rolled back. The
//! worker is cancellable between attempts, not within one.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::document::build_document;
use super::outbox::{self, OutboxState};
use super::{Downstream, SyncError};
use crate::core::agreement::Agreement;
use crate::core::intervention::Intervention;
use crate::core::partner::Partner;
use crate::store::{Store, StoreError};

/// Maximum upload attempts per record.
const MAX_ATTEMPTS: u32 = 3;

/// What one drain pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// The outbox drain worker.
pub struct SyncWorker {
    store: Store,
    downstream: Arc<dyn Downstream>,
    business_area_code: String,
    /// Base backoff between attempts; tests set this to zero.
    backoff: Duration,
}

impl SyncWorker {
    pub fn new(
        store: Store,
        downstream: Arc<dyn Downstream>,
        business_area_code: impl Into<String>,
    ) -> Self {
        Self {
            store,
            downstream,
            business_area_code: business_area_code.into(),
            backoff: Duration::from_secs(1),
        }
    }

    /// Override the backoff base (tests).
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Drain all pending records once.
    pub async fn drain(&self) -> Result<DrainReport, StoreError> {
        let mut report = DrainReport::default();

        for mut record in outbox::pending(&self.store)? {
            let intervention: Option<Intervention> =
                self.store.get(&record.intervention_id.to_string())?;
            let Some(intervention) = intervention else {
                // The document disappeared (e.g. a merged shadow); drop
                // the record.
                record.state = OutboxState::Failed;
                record.last_error = Some("intervention no longer exists".into());
                self.save(&record)?;
                report.skipped += 1;
                continue;
            };
            let agreement: Agreement = self
                .store
                .get_required(&intervention.agreement_id.to_string())?;
            let partner: Partner = self
                .store
                .get_required(&agreement.partner_id.to_string())?;

            let document = build_document(
                &intervention,
                &agreement,
                &partner,
                &self.business_area_code,
            );
            record.fingerprint = document.fingerprint().ok();

            let mut outcome: Result<(), SyncError> = Ok(());
            for attempt in 1..=MAX_ATTEMPTS {
                record.attempts += 1;
                outcome = self.downstream.upload(&document).await;
                match &outcome {
                    Ok(()) => break,
                    Err(e) if !e.is_retryable() => break,
                    Err(e) => {
                        warn!(
                            number = %intervention.number,
                            attempt,
                            error = %e,
                            "downstream upload failed"
                        );
                        if attempt < MAX_ATTEMPTS {
                            tokio::time::sleep(self.backoff * 2u32.pow(attempt - 1)).await;
                        }
                    }
                }
            }

            match outcome {
                Ok(()) => {
                    record.state = OutboxState::Delivered;
                    record.last_error = None;
                    report.delivered += 1;
                }
                Err(e) => {
                    record.state = OutboxState::Failed;
                    record.last_error = Some(e.to_string());
                    report.failed += 1;
                    warn!(number = %intervention.number, error = %e, "giving up on upload");
                }
            }
            self.save(&record)?;
        }

        info!(?report, "outbox drain finished");
        Ok(report)
    }

    fn save(&self, record: &outbox::OutboxRecord) -> Result<(), StoreError> {
        let mut tx = self.store.begin("outbox.update");
        tx.put(record)?;
        tx.commit()
    }
}
