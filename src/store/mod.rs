//! store
//!
//! Embedded persistence for the lifecycle engine.
//!
//! Documents are schema-versioned JSON files; multi-document mutations
//! run through journaled transactions with before-images, and row /
//! sequence locks serialize concurrent writers. See the submodules:
//!
//! - [`schema`] - document envelopes and the [`schema::Entity`] trait
//! - [`store`] - the [`store::Store`] and its [`store::Transaction`]
//! - [`journal`] - fsync'd operation journals for crash safety
//! - [`lock`] - RAII row and sequence locks

pub mod journal;
pub mod lock;
pub mod schema;
#[allow(clippy::module_inception)]
pub mod store;

pub use journal::{Journal, JournalError, JournalStep, OpId, OpPhase};
pub use lock::{EntityLock, LockError};
pub use schema::{parse_document, to_document, Entity, SchemaError, SCHEMA_VERSION};
pub use store::{Store, StoreError, Transaction};
