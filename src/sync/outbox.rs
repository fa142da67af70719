//! sync::outbox
//!
//! Durable queue of pending downstream uploads.
//!
//! The intervention FSM enqueues a record whenever a document enters
//! signed or active. The worker drains pending records with bounded
//! retries; delivery state lives here so a crash between commit and
//! upload loses nothing.

use serde::{Deserialize, Serialize};

use crate::core::types::{InterventionId, OutboxId, UtcTimestamp};
use crate::store::{Entity, Store, StoreError, Transaction};

/// Delivery state of one outbox record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxState {
    Pending,
    Delivered,
    Failed,
}

/// One queued upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxRecord {
    pub id: OutboxId,
    pub intervention_id: InterventionId,
    pub state: OutboxState,
    /// Content fingerprint of the last document sent (or attempted).
    pub fingerprint: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created: UtcTimestamp,
}

impl OutboxRecord {
    pub fn new(intervention_id: InterventionId) -> Self {
        Self {
            id: OutboxId::new(),
            intervention_id,
            state: OutboxState::Pending,
            fingerprint: None,
            attempts: 0,
            last_error: None,
            created: UtcTimestamp::now(),
        }
    }
}

impl Entity for OutboxRecord {
    const KIND: &'static str = "outbox";

    fn id_string(&self) -> String {
        self.id.to_string()
    }
}

/// Stage an upload for an intervention inside an open transaction.
///
/// Skips the enqueue when a pending record for the same intervention
/// already exists; the worker always sends the latest document state.
pub fn enqueue(
    store: &Store,
    tx: &mut Transaction<'_>,
    intervention_id: InterventionId,
) -> Result<(), StoreError> {
    let already_pending = store
        .list::<OutboxRecord>()?
        .into_iter()
        .any(|r| r.intervention_id == intervention_id && r.state == OutboxState::Pending);
    if already_pending {
        return Ok(());
    }
    tx.put(&OutboxRecord::new(intervention_id))
}

/// All pending records, oldest first.
pub fn pending(store: &Store) -> Result<Vec<OutboxRecord>, StoreError> {
    let mut records: Vec<OutboxRecord> = store
        .list::<OutboxRecord>()?
        .into_iter()
        .filter(|r| r.state == OutboxState::Pending)
        .collect();
    records.sort_by(|a, b| a.created.cmp(&b.created));
    Ok(records)
}
