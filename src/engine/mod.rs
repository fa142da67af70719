//! engine
//!
//! The document-lifecycle engine.
//!
//! # Architecture
//!
//! Every state transition is a guarded command: the dispatcher checks the
//! transition table for `(current status, event)`, runs the caller's role
//! predicate, evaluates the guard against live data, applies the effect
//! inside one store transaction, updates the status last, and commits.
//! Guard refusals abort the transaction with per-field detail; nothing
//! partial ever persists.
//!
//! # Modules
//!
//! - [`agreement`] - agreement FSM with suspend/terminate cascade
//! - [`intervention`] - eleven-state intervention FSM, acceptance flow,
//!   reporting planner, planned visits
//! - [`amendment`] - shadow-copy amendment engine (clone, merge, diff)
//! - [`hact`] - per-partner assurance aggregate recompute
//! - [`partner`] - vendor-sync upsert and monitoring-group edits
//! - [`guards`] - shared guard predicates
//! - [`sweep`] - periodic auto-transitions and the nightly HACT sweep
//!
//! # Invariants
//!
//! - Transitions execute only when their guard passes in the same
//!   transaction that applies the effect
//! - The HACT aggregator and downstream sync never raise into the
//!   request path
//! - Amendment merges hold locks on both the original and the shadow

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::permissions::Role;
use crate::core::types::{TenantCode, UserId};
use crate::store::StoreError;

pub mod agreement;
pub mod amendment;
pub mod guards;
pub mod hact;
pub mod intervention;
pub mod partner;
pub mod sweep;

pub use agreement::AgreementEvent;
pub use amendment::{amendment_difference, merge_amendment, start_amendment};
pub use hact::recompute_partner_hact;
pub use intervention::InterventionEvent;
pub use partner::{set_monitoring_groups, upsert_partner_from_vendor};

/// Per-field validation detail, surfaced to callers on refusals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationErrors {
    pub field_errors: BTreeMap<String, Vec<String>>,
    pub non_field_errors: Vec<String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single non-field error.
    pub fn message(message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(message);
        errors
    }

    /// A single field error.
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add_field(field, message);
        errors
    }

    pub fn add(&mut self, message: impl Into<String>) {
        self.non_field_errors.push(message.into());
    }

    pub fn add_field(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.field_errors
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    /// Convert into a result: `Ok(())` when empty.
    pub fn into_result(self) -> Result<(), EngineError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(EngineError::Validation(self))
        }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts: Vec<String> = self.non_field_errors.clone();
        for (field, messages) in &self.field_errors {
            for message in messages {
                parts.push(format!("{}: {}", field, message));
            }
        }
        write!(f, "{}", parts.join("; "))
    }
}

/// Errors from engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invariant violation or guard failure; lists every failed guard.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Role or ownership check failed.
    #[error("permission denied: {0}")]
    Permission(String),

    /// Entity id does not resolve.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Concurrent mutation; the caller should retry once.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Downstream sync failed after its retry budget.
    #[error("downstream unavailable: {0}")]
    DownstreamUnavailable(String),

    /// Unanticipated storage-level failure.
    #[error("integrity error: {0}")]
    Integrity(String),
}

impl From<StoreError> for EngineError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound { kind, id } => EngineError::NotFound { kind, id },
            StoreError::Locked(e) => EngineError::Conflict(e.to_string()),
            StoreError::SequenceExhausted(name) => {
                EngineError::Conflict(format!("sequence exhausted: {}", name))
            }
            other => EngineError::Integrity(other.to_string()),
        }
    }
}

/// The caller on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub email: String,
    pub roles: Vec<Role>,
}

impl Actor {
    pub fn new(email: impl Into<String>, roles: Vec<Role>) -> Self {
        Self {
            user_id: UserId::new(),
            email: email.into(),
            roles,
        }
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    pub fn is_partnership_manager(&self) -> bool {
        self.has_role(Role::PartnershipManager)
    }
}

/// Execution context for engine operations.
///
/// Carries the caller, the tenant, and the operation date. Tests pin
/// `today` to make guard evaluation deterministic.
#[derive(Debug, Clone)]
pub struct Context {
    pub actor: Actor,
    pub tenant: TenantCode,
    /// Tenant local currency, the default document currency.
    pub currency: String,
    pub today: NaiveDate,
}

impl Context {
    pub fn new(actor: Actor, tenant: TenantCode, currency: impl Into<String>) -> Self {
        Self {
            actor,
            tenant,
            currency: currency.into(),
            today: chrono::Utc::now().date_naive(),
        }
    }

    /// Pin the operation date (tests, replays).
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod validation_errors {
        use super::*;

        #[test]
        fn empty_converts_to_ok() {
            assert!(ValidationErrors::new().into_result().is_ok());
        }

        #[test]
        fn non_empty_converts_to_err() {
            let errors = ValidationErrors::message("nope");
            assert!(matches!(
                errors.into_result(),
                Err(EngineError::Validation(_))
            ));
        }

        #[test]
        fn display_joins_field_and_non_field() {
            let mut errors = ValidationErrors::message("overall problem");
            errors.add_field("start", "too early");
            let text = errors.to_string();
            assert!(text.contains("overall problem"));
            assert!(text.contains("start: too early"));
        }

        #[test]
        fn field_errors_accumulate() {
            let mut errors = ValidationErrors::new();
            errors.add_field("start", "a");
            errors.add_field("start", "b");
            assert_eq!(errors.field_errors["start"].len(), 2);
        }
    }

    mod error_mapping {
        use super::*;

        #[test]
        fn store_not_found_maps() {
            let err: EngineError = StoreError::NotFound {
                kind: "partner",
                id: "x".into(),
            }
            .into();
            assert!(matches!(err, EngineError::NotFound { .. }));
        }

        #[test]
        fn store_locked_maps_to_conflict() {
            let err: EngineError =
                StoreError::Locked(crate::store::LockError::AlreadyLocked).into();
            assert!(matches!(err, EngineError::Conflict(_)));
        }
    }

    mod actor {
        use super::*;

        #[test]
        fn role_checks() {
            let actor = Actor::new("pm@example.org", vec![Role::PartnershipManager]);
            assert!(actor.is_partnership_manager());
            assert!(!actor.has_role(Role::PartnerFocalPoint));
        }
    }
}
