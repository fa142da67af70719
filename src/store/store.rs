//! store::store
//!
//! The embedded document store.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   <kind>/<id>.json      one envelope-wrapped document per entity
//!   sequences/<name>.json reference-number counters
//!   ops/<op_id>.json      operation journals
//!   locks/                row and sequence lock files
//! ```
//!
//! # Transactions
//!
//! All mutations go through [`Transaction`]: writes and deletes are
//! staged in memory, journaled with before-images and fsync at commit,
//! then applied via atomic temp-file renames. A crash between journal
//! and apply is repaired by [`Store::recover`], which rolls the
//! operation back from the before-images. Sequence allocations hold
//! their sequence lock until the transaction ends, so allocation is
//! strictly serialized per sequence name.

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use super::journal::{Journal, JournalError, JournalStep, OpPhase};
use super::lock::{EntityLock, LockError};
use super::schema::{parse_document, to_document, Entity, SchemaError};

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Document not found.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Another operation holds the row lock.
    #[error("conflicting operation in progress: {0}")]
    Locked(#[from] LockError),

    /// Sequence counter overflow.
    #[error("sequence exhausted: {0}")]
    SequenceExhausted(String),

    /// Envelope or body parse failure.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// Journal failure.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),

    /// I/O failure.
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON failure outside the envelope layer.
    #[error("store json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The document store rooted at a data directory.
#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Open (and initialize) a store, running crash recovery first.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { root: root.into() };
        fs::create_dir_all(store.ops_dir())?;
        fs::create_dir_all(store.sequences_dir())?;
        fs::create_dir_all(store.locks_dir())?;
        let rolled_back = store.recover()?;
        if rolled_back > 0 {
            warn!(rolled_back, "rolled back interrupted operations on open");
        }
        Ok(store)
    }

    /// The store's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn ops_dir(&self) -> PathBuf {
        self.root.join("ops")
    }

    fn sequences_dir(&self) -> PathBuf {
        self.root.join("sequences")
    }

    fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    fn doc_path(&self, kind: &str, id: &str) -> PathBuf {
        self.root.join(kind).join(format!("{}.json", id))
    }

    /// Read a document, returning `None` when absent.
    pub fn get<T: Entity>(&self, id: &str) -> Result<Option<T>, StoreError> {
        let path = self.doc_path(T::KIND, id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        Ok(Some(parse_document(&json)?))
    }

    /// Read a document that must exist.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the document is absent.
    pub fn get_required<T: Entity>(&self, id: &str) -> Result<T, StoreError> {
        self.get(id)?.ok_or(StoreError::NotFound {
            kind: T::KIND,
            id: id.to_string(),
        })
    }

    /// List all documents of a kind.
    pub fn list<T: Entity>(&self) -> Result<Vec<T>, StoreError> {
        let dir = self.root.join(T::KIND);
        let mut out = Vec::new();
        if !dir.exists() {
            return Ok(out);
        }
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                let json = fs::read_to_string(&path)?;
                out.push(parse_document(&json)?);
            }
        }
        Ok(out)
    }

    /// Acquire a row lock for an entity.
    ///
    /// # Errors
    ///
    /// [`StoreError::Locked`] if another operation holds the lock; the
    /// caller should retry.
    pub fn lock_row<T: Entity>(&self, id: &str) -> Result<EntityLock, StoreError> {
        Ok(EntityLock::acquire_row(&self.locks_dir(), T::KIND, id)?)
    }

    /// Read the current value of a sequence counter (last allocated).
    pub fn sequence_value(&self, name: &str) -> Result<u64, StoreError> {
        let path = self.sequences_dir().join(format!("{}.json", name));
        if !path.exists() {
            return Ok(0);
        }
        let json: Value = serde_json::from_str(&fs::read_to_string(&path)?)?;
        Ok(json["value"].as_u64().unwrap_or(0))
    }

    fn write_sequence_value(&self, name: &str, value: u64) -> Result<(), StoreError> {
        let path = self.sequences_dir().join(format!("{}.json", name));
        write_json_atomic(&path, &serde_json::json!({ "value": value }))
    }

    /// Begin a transaction.
    pub fn begin(&self, label: impl Into<String>) -> Transaction<'_> {
        Transaction {
            store: self,
            journal: Journal::new(label),
            staged: Vec::new(),
            sequences: HashMap::new(),
            _sequence_locks: Vec::new(),
        }
    }

    /// Roll back any in-progress journals left by a crash.
    ///
    /// Returns the number of operations rolled back.
    pub fn recover(&self) -> Result<u32, StoreError> {
        let mut count = 0;
        for mut journal in Journal::list(&self.ops_dir())? {
            if journal.phase != OpPhase::InProgress {
                continue;
            }
            info!(op = %journal.op_id, label = %journal.label, "rolling back interrupted operation");
            for step in journal.steps.iter().rev() {
                match step {
                    JournalStep::DocumentWrite { kind, id, before, .. } => match before {
                        Some(before) => {
                            write_json_atomic(&self.doc_path(kind, id), before)?;
                        }
                        None => {
                            let path = self.doc_path(kind, id);
                            if path.exists() {
                                fs::remove_file(path)?;
                            }
                        }
                    },
                    JournalStep::DocumentDelete { kind, id, before } => {
                        write_json_atomic(&self.doc_path(kind, id), before)?;
                    }
                    JournalStep::SequenceAdvance { name, before, .. } => {
                        self.write_sequence_value(name, *before)?;
                    }
                }
            }
            journal.mark_rolled_back(&self.ops_dir())?;
            count += 1;
        }
        Ok(count)
    }
}

/// A staged mutation.
#[derive(Debug)]
enum StagedOp {
    Write {
        kind: &'static str,
        id: String,
        before: Option<Value>,
        after: Value,
    },
    Delete {
        kind: &'static str,
        id: String,
        before: Value,
    },
}

/// An in-flight transaction.
///
/// Dropping an uncommitted transaction discards the staged mutations;
/// nothing has touched disk yet, and sequence locks release with it
/// (uncommitted allocations leave no trace because counters are only
/// written at commit).
pub struct Transaction<'a> {
    store: &'a Store,
    journal: Journal,
    staged: Vec<StagedOp>,
    /// Pending counters: name -> (value at begin, current value).
    sequences: HashMap<String, (u64, u64)>,
    /// Locks held until the transaction ends.
    _sequence_locks: Vec<EntityLock>,
}

impl<'a> Transaction<'a> {
    /// Stage a document write.
    pub fn put<T: Entity>(&mut self, entity: &T) -> Result<(), StoreError> {
        let id = entity.id_string();
        let after = to_document(entity)?;
        let before = self.current_image(T::KIND, &id)?;
        self.staged.push(StagedOp::Write {
            kind: T::KIND,
            id,
            before,
            after,
        });
        Ok(())
    }

    /// Stage a document delete.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] if the document does not exist (and was
    /// not written earlier in this transaction).
    pub fn delete<T: Entity>(&mut self, id: &str) -> Result<(), StoreError> {
        let before = self
            .current_image(T::KIND, id)?
            .ok_or(StoreError::NotFound {
                kind: T::KIND,
                id: id.to_string(),
            })?;
        self.staged.push(StagedOp::Delete {
            kind: T::KIND,
            id: id.to_string(),
            before,
        });
        Ok(())
    }

    /// Allocate the next value of a named sequence.
    ///
    /// The sequence lock is taken on first use of each name and held
    /// until the transaction ends, serializing allocation across
    /// processes. Counters hit disk at commit.
    ///
    /// # Errors
    ///
    /// [`StoreError::SequenceExhausted`] on counter overflow.
    pub fn next_sequence(&mut self, name: &str) -> Result<u64, StoreError> {
        let (initial, current) = match self.sequences.get(name) {
            Some(&pair) => pair,
            None => {
                let lock = EntityLock::acquire_sequence(&self.store.locks_dir(), name)?;
                self._sequence_locks.push(lock);
                let value = self.store.sequence_value(name)?;
                (value, value)
            }
        };
        let next = current
            .checked_add(1)
            .ok_or_else(|| StoreError::SequenceExhausted(name.to_string()))?;
        self.sequences.insert(name.to_string(), (initial, next));
        Ok(next)
    }

    /// The effective current image of a document, accounting for writes
    /// staged earlier in this transaction.
    fn current_image(&self, kind: &'static str, id: &str) -> Result<Option<Value>, StoreError> {
        for op in self.staged.iter().rev() {
            match op {
                StagedOp::Write {
                    kind: k,
                    id: i,
                    after,
                    ..
                } if *k == kind && i == id => return Ok(Some(after.clone())),
                StagedOp::Delete { kind: k, id: i, .. } if *k == kind && i == id => {
                    return Ok(None)
                }
                _ => {}
            }
        }
        let path = self.store.doc_path(kind, id);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&fs::read_to_string(path)?)?))
    }

    /// Commit: journal everything with fsync, then apply.
    pub fn commit(mut self) -> Result<(), StoreError> {
        if self.staged.is_empty() && self.sequences.is_empty() {
            return Ok(());
        }

        for op in &self.staged {
            let step = match op {
                StagedOp::Write {
                    kind,
                    id,
                    before,
                    after,
                } => JournalStep::DocumentWrite {
                    kind: kind.to_string(),
                    id: id.clone(),
                    before: before.clone(),
                    after: after.clone(),
                },
                StagedOp::Delete { kind, id, before } => JournalStep::DocumentDelete {
                    kind: kind.to_string(),
                    id: id.clone(),
                    before: before.clone(),
                },
            };
            self.journal.steps.push(step);
        }
        for (name, (before, after)) in &self.sequences {
            if before != after {
                self.journal.steps.push(JournalStep::SequenceAdvance {
                    name: name.clone(),
                    before: *before,
                    after: *after,
                });
            }
        }

        let ops_dir = self.store.ops_dir();
        self.journal.write(&ops_dir)?;

        for op in &self.staged {
            match op {
                StagedOp::Write { kind, id, after, .. } => {
                    let path = self.store.doc_path(kind, id);
                    write_json_atomic(&path, after)?;
                }
                StagedOp::Delete { kind, id, .. } => {
                    let path = self.store.doc_path(kind, id);
                    if path.exists() {
                        fs::remove_file(path)?;
                    }
                }
            }
        }
        for (name, (before, after)) in &self.sequences {
            if before != after {
                self.store.write_sequence_value(name, *after)?;
            }
        }

        self.journal.commit(&ops_dir)?;
        Ok(())
    }
}

/// Write JSON to a path atomically: temp file, fsync, rename.
fn write_json_atomic(path: &Path, value: &Value) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)?;
        file.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}
