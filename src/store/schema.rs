//! store::schema
//!
//! Self-describing document envelopes.
//!
//! Every persisted document carries a `kind` and `schema_version`
//! envelope and is parsed strictly: wrong kinds and unsupported versions
//! are rejected before the body is touched. Version dispatch happens on
//! the envelope so future schema revisions can parse old bodies
//! explicitly.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Current schema version for all document kinds.
pub const SCHEMA_VERSION: u32 = 1;

/// Errors from envelope handling.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("failed to parse document: {0}")]
    Parse(String),

    #[error("invalid kind '{found}', expected '{expected}'")]
    InvalidKind { found: String, expected: String },

    #[error("unsupported schema version {0}, supported: {SCHEMA_VERSION}")]
    UnsupportedVersion(u32),

    #[error("failed to serialize document: {0}")]
    Serialize(String),
}

/// A persistable entity with a stable kind tag and string id.
pub trait Entity: Serialize + DeserializeOwned {
    /// The document kind tag, also the storage subdirectory name.
    const KIND: &'static str;

    /// The entity id in canonical string form.
    fn id_string(&self) -> String;
}

/// Envelope for version dispatch before full parsing.
#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    kind: String,
    schema_version: u32,
    body: serde_json::Value,
}

/// Wrap an entity into its storage document.
pub fn to_document<T: Entity>(entity: &T) -> Result<serde_json::Value, SchemaError> {
    let body = serde_json::to_value(entity).map_err(|e| SchemaError::Serialize(e.to_string()))?;
    Ok(serde_json::json!({
        "kind": T::KIND,
        "schema_version": SCHEMA_VERSION,
        "body": body,
    }))
}

/// Parse a storage document back into its entity, checking the envelope.
///
/// # Errors
///
/// - [`SchemaError::InvalidKind`] if the kind tag does not match `T`
/// - [`SchemaError::UnsupportedVersion`] for unknown schema versions
/// - [`SchemaError::Parse`] if the body does not deserialize
pub fn parse_document<T: Entity>(json: &str) -> Result<T, SchemaError> {
    let envelope: Envelope =
        serde_json::from_str(json).map_err(|e| SchemaError::Parse(e.to_string()))?;

    if envelope.kind != T::KIND {
        return Err(SchemaError::InvalidKind {
            found: envelope.kind,
            expected: T::KIND.to_string(),
        });
    }

    match envelope.schema_version {
        1 => serde_json::from_value(envelope.body).map_err(|e| SchemaError::Parse(e.to_string())),
        v => Err(SchemaError::UnsupportedVersion(v)),
    }
}

impl Entity for crate::core::partner::Partner {
    const KIND: &'static str = "partner";

    fn id_string(&self) -> String {
        self.id.to_string()
    }
}

impl Entity for crate::core::agreement::Agreement {
    const KIND: &'static str = "agreement";

    fn id_string(&self) -> String {
        self.id.to_string()
    }
}

impl Entity for crate::core::intervention::Intervention {
    const KIND: &'static str = "intervention";

    fn id_string(&self) -> String {
        self.id.to_string()
    }
}

impl Entity for crate::core::amendment::InterventionAmendment {
    const KIND: &'static str = "intervention_amendment";

    fn id_string(&self) -> String {
        self.id.to_string()
    }
}

impl Entity for crate::core::country::CountryProgramme {
    const KIND: &'static str = "country_programme";

    fn id_string(&self) -> String {
        self.id.to_string()
    }
}

impl Entity for crate::core::partner::MonitoringActivity {
    const KIND: &'static str = "monitoring_activity";

    fn id_string(&self) -> String {
        self.id.to_string()
    }
}

impl Entity for crate::core::partner::Assessment {
    const KIND: &'static str = "assessment";

    fn id_string(&self) -> String {
        self.id.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::partner::{Partner, PartnerType};
    use crate::core::types::VendorNumber;

    fn partner() -> Partner {
        Partner::new(
            VendorNumber::new("123456").unwrap(),
            "Relief Works",
            PartnerType::CivilSocietyOrganization,
        )
    }

    #[test]
    fn roundtrip_through_envelope() {
        let original = partner();
        let doc = to_document(&original).unwrap();
        let parsed: Partner = parse_document(&doc.to_string()).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn envelope_carries_kind_and_version() {
        let doc = to_document(&partner()).unwrap();
        assert_eq!(doc["kind"], "partner");
        assert_eq!(doc["schema_version"], 1);
    }

    #[test]
    fn wrong_kind_rejected() {
        let doc = to_document(&partner()).unwrap();
        let result: Result<crate::core::country::CountryProgramme, _> =
            parse_document(&doc.to_string());
        assert!(matches!(result, Err(SchemaError::InvalidKind { .. })));
    }

    #[test]
    fn unsupported_version_rejected() {
        let mut doc = to_document(&partner()).unwrap();
        doc["schema_version"] = serde_json::json!(99);
        let result: Result<Partner, _> = parse_document(&doc.to_string());
        assert!(matches!(result, Err(SchemaError::UnsupportedVersion(99))));
    }

    #[test]
    fn malformed_json_rejected() {
        let result: Result<Partner, _> = parse_document("{not json");
        assert!(matches!(result, Err(SchemaError::Parse(_))));
    }
}
