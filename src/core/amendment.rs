//! core::amendment
//!
//! Intervention amendments and the identity map that makes shadow merges
//! safe.
//!
//! An active amendment owns a full shadow copy of its intervention. The
//! [`RelatedObjectsMap`] records, per entity kind, which shadow row
//! corresponds to which original row; the merge uses it to partition
//! shadow rows into survivors, additions, and deletions without guessing
//! by position or name.
//!
//! # Invariants
//!
//! - A shadow intervention exists iff `is_active`
//! - Once merged, `is_active = false` and `amended_intervention = None`
//! - `(kind, amendment_number)` is unique per parent; `amd/N` and `camd/N`
//!   sequences advance independently

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::core::attachment::AttachmentRef;
use crate::core::types::{AmendmentId, InterventionId, UtcTimestamp};

/// Whether this is a regular or contingency amendment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmendmentKind {
    Normal,
    Contingency,
}

/// What the amendment changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionAmendmentType {
    AdminError,
    BudgetLte20,
    BudgetGt20,
    Change,
    NoCostExtension,
    Other,
}

/// Entity kinds participating in the clone/merge graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Intervention,
    Budget,
    ResultLink,
    LowerResult,
    Activity,
    ActivityItem,
    Indicator,
    TimeFrame,
    SupplyItem,
    PlannedVisit,
    ReportingRequirement,
    Review,
}

/// An (original, shadow) identity pair. Ids are stored in canonical string
/// form because kinds use different id types.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdPair {
    pub original: String,
    pub shadow: String,
}

/// Identity correspondence between an intervention and its shadow,
/// keyed by entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelatedObjectsMap(BTreeMap<EntityKind, Vec<IdPair>>);

impl RelatedObjectsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a cloned pair.
    pub fn record(
        &mut self,
        kind: EntityKind,
        original: impl ToString,
        shadow: impl ToString,
    ) {
        self.0.entry(kind).or_default().push(IdPair {
            original: original.to_string(),
            shadow: shadow.to_string(),
        });
    }

    /// The shadow id cloned from an original id.
    pub fn shadow_of(&self, kind: EntityKind, original: &str) -> Option<&str> {
        self.0.get(&kind).and_then(|pairs| {
            pairs
                .iter()
                .find(|p| p.original == original)
                .map(|p| p.shadow.as_str())
        })
    }

    /// The original id a shadow id was cloned from.
    pub fn original_of(&self, kind: EntityKind, shadow: &str) -> Option<&str> {
        self.0.get(&kind).and_then(|pairs| {
            pairs
                .iter()
                .find(|p| p.shadow == shadow)
                .map(|p| p.original.as_str())
        })
    }

    /// All pairs of one kind.
    pub fn pairs(&self, kind: EntityKind) -> &[IdPair] {
        self.0.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Total recorded pairs.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-field change on one surviving entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub id: String,
    pub field: String,
    pub before: serde_json::Value,
    pub after: serde_json::Value,
}

/// Diff of one entity kind between original and shadow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KindDiff {
    pub changed: Vec<FieldChange>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl KindDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }
}

/// The structured difference view, keyed by entity kind.
pub type DifferenceView = BTreeMap<EntityKind, KindDiff>;

/// An amendment of an intervention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionAmendment {
    pub id: AmendmentId,
    /// The amended (original) intervention.
    pub intervention_id: InterventionId,
    pub kind: AmendmentKind,
    pub types: Vec<InterventionAmendmentType>,
    /// Per-parent sequence: `amd/N` or `camd/N`.
    pub amendment_number: String,
    /// True while the shadow copy is being edited.
    pub is_active: bool,
    /// The shadow intervention; present iff `is_active`.
    pub amended_intervention: Option<InterventionId>,
    pub related_objects_map: RelatedObjectsMap,
    pub signed_amendment: Option<AttachmentRef>,
    pub signed_date: Option<NaiveDate>,
    /// Snapshot of the difference view captured at merge time.
    pub difference: Option<DifferenceView>,
    pub created: UtcTimestamp,
}

impl InterventionAmendment {
    pub fn new(
        intervention_id: InterventionId,
        kind: AmendmentKind,
        types: Vec<InterventionAmendmentType>,
        amendment_number: String,
    ) -> Self {
        Self {
            id: AmendmentId::new(),
            intervention_id,
            kind,
            types,
            amendment_number,
            is_active: true,
            amended_intervention: None,
            related_objects_map: RelatedObjectsMap::new(),
            signed_amendment: None,
            signed_date: None,
            difference: None,
            created: UtcTimestamp::now(),
        }
    }
}
