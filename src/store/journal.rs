//! store::journal
//!
//! Operation journaling for crash-safe multi-document transactions.
//!
//! # Crash Safety Contract
//!
//! 1. **Per-step persistence:** every appended step is written to disk
//!    with fsync before the corresponding document write happens. A crash
//!    at any point leaves the journal describing exactly the writes that
//!    may have landed.
//!
//! 2. **Recoverability:** after a crash, reading the journal yields the
//!    before-image of every touched document, so an in-progress operation
//!    can be rolled back to its pre-transaction state.
//!
//! 3. **Atomicity:** an operation is visible as a whole iff its journal
//!    reached the `committed` phase.
//!
//! # Storage
//!
//! - `<root>/ops/<op_id>.json` - one journal file per operation
//!
//! # Invariants
//!
//! - Journals are written with fsync at each phase boundary
//! - Every document write records before and after images
//! - Sequence advances record before and after counter values

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::types::UtcTimestamp;

/// Errors from journal operations.
#[derive(Debug, Error)]
pub enum JournalError {
    /// I/O error reading or writing journal files.
    #[error("journal i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("journal json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Journal file not found.
    #[error("journal not found: {0}")]
    NotFound(String),
}

/// Unique identifier for an operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpId(String);

impl OpId {
    /// Generate a new unique operation id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create an OpId from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for OpId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for OpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The current phase of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpPhase {
    /// Operation is in progress; a crash here means roll back.
    InProgress,
    /// Operation completed successfully.
    Committed,
    /// Operation was rolled back.
    RolledBack,
}

impl OpPhase {
    /// Check if the operation is finished (committed or rolled back).
    pub fn is_finished(&self) -> bool {
        matches!(self, OpPhase::Committed | OpPhase::RolledBack)
    }
}

/// A single step in an operation journal.
///
/// Each step records enough information to reverse the write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalStep {
    /// A document write with before/after images.
    DocumentWrite {
        kind: String,
        id: String,
        /// Document content before the write; None if created.
        before: Option<serde_json::Value>,
        after: serde_json::Value,
    },

    /// A document delete with the removed content.
    DocumentDelete {
        kind: String,
        id: String,
        before: serde_json::Value,
    },

    /// A sequence counter advance.
    SequenceAdvance {
        name: String,
        before: u64,
        after: u64,
    },
}

/// An operation journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Journal {
    pub op_id: OpId,
    /// Human-readable operation label (e.g. "intervention.transition").
    pub label: String,
    pub phase: OpPhase,
    pub steps: Vec<JournalStep>,
    pub started_at: UtcTimestamp,
}

impl Journal {
    /// Create a new in-progress journal.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            op_id: OpId::new(),
            label: label.into(),
            phase: OpPhase::InProgress,
            steps: Vec::new(),
            started_at: UtcTimestamp::now(),
        }
    }

    /// Path of this journal under the ops directory.
    pub fn path(&self, ops_dir: &Path) -> PathBuf {
        ops_dir.join(format!("{}.json", self.op_id))
    }

    /// Append a step and persist with fsync.
    pub fn append(&mut self, ops_dir: &Path, step: JournalStep) -> Result<(), JournalError> {
        self.steps.push(step);
        self.write(ops_dir)
    }

    /// Mark committed and persist.
    pub fn commit(&mut self, ops_dir: &Path) -> Result<(), JournalError> {
        self.phase = OpPhase::Committed;
        self.write(ops_dir)
    }

    /// Mark rolled back and persist.
    pub fn mark_rolled_back(&mut self, ops_dir: &Path) -> Result<(), JournalError> {
        self.phase = OpPhase::RolledBack;
        self.write(ops_dir)
    }

    /// Persist the whole journal with fsync.
    ///
    /// The journal is small; rewriting it whole at each boundary keeps the
    /// on-disk format a single valid JSON document at all times.
    pub fn write(&self, ops_dir: &Path) -> Result<(), JournalError> {
        fs::create_dir_all(ops_dir)?;
        let path = self.path(ops_dir);
        let json = serde_json::to_string_pretty(self)?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Read a journal by id.
    pub fn read(ops_dir: &Path, op_id: &OpId) -> Result<Journal, JournalError> {
        let path = ops_dir.join(format!("{}.json", op_id));
        if !path.exists() {
            return Err(JournalError::NotFound(op_id.to_string()));
        }
        let json = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// List all journals in the ops directory.
    pub fn list(ops_dir: &Path) -> Result<Vec<Journal>, JournalError> {
        let mut journals = Vec::new();
        if !ops_dir.exists() {
            return Ok(journals);
        }
        for entry in fs::read_dir(ops_dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                let json = fs::read_to_string(&path)?;
                journals.push(serde_json::from_str(&json)?);
            }
        }
        Ok(journals)
    }

    /// Delete the journal file (after successful commit cleanup).
    pub fn remove(&self, ops_dir: &Path) -> Result<(), JournalError> {
        let path = self.path(ops_dir);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}
