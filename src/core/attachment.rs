//! core::attachment
//!
//! Attachment references.
//!
//! Files themselves live in an external attachment store; entities hold
//! `(id, code)` references plus the display filename. Guards only ever
//! check for the presence of a reference with the right code.

use serde::{Deserialize, Serialize};

use crate::core::types::AttachmentId;

/// Attachment codes checked by lifecycle guards.
pub mod codes {
    /// Signed agreement document.
    pub const SIGNED_AGREEMENT: &str = "partners_agreement";
    /// Signed agreement termination notice.
    pub const AGREEMENT_TERMINATION: &str = "partners_agreement_termination_doc";
    /// Signed programme document.
    pub const SIGNED_PD: &str = "partners_intervention_signed_pd";
    /// Intervention termination notice.
    pub const INTERVENTION_TERMINATION: &str = "partners_intervention_termination_doc";
    /// Final partnership review.
    pub const FINAL_PARTNERSHIP_REVIEW: &str = "partners_intervention_final_review";
    /// Signed amendment document.
    pub const SIGNED_AMENDMENT: &str = "partners_amendment_signed";
    /// PRC review document.
    pub const PRC_REVIEW: &str = "partners_intervention_prc_review";
}

/// A reference to a stored file.
///
/// # Example
///
/// ```
/// use pactwork::core::attachment::{codes, AttachmentRef};
///
/// let doc = AttachmentRef::new(codes::SIGNED_PD, "pd-leb-2024.pdf");
/// assert_eq!(doc.code, codes::SIGNED_PD);
/// assert!(doc.has_code(codes::SIGNED_PD));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    /// Identifier in the attachment store.
    pub id: AttachmentId,
    /// Attachment code (what kind of document this is).
    pub code: String,
    /// Original filename, for display.
    pub filename: String,
}

impl AttachmentRef {
    /// Create a new attachment reference with a fresh id.
    pub fn new(code: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            id: AttachmentId::new(),
            code: code.into(),
            filename: filename.into(),
        }
    }

    /// Check the attachment code.
    pub fn has_code(&self, code: &str) -> bool {
        self.code == code
    }
}

/// Find an attachment with the given code in a slice of references.
pub fn find_by_code<'a>(attachments: &'a [AttachmentRef], code: &str) -> Option<&'a AttachmentRef> {
    attachments.iter().find(|a| a.has_code(code))
}
