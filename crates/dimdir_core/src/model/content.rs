//! Content-addressed sentence identity.
//!
//! # Responsibility
//! - Normalize raw sentence text under one system-wide policy.
//! - Derive the deterministic `ContentId` for normalized text.
//!
//! # Invariants
//! - Equal normalized text always yields an equal `ContentId`.
//! - `content_id_for` has no side effects; interning lives in the repo layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable content-addressed identifier for one distinct sentence text.
///
/// Derived as a name-based UUID (v5) of the normalized text, so the same
/// sentence gets the same id no matter which document it appears in.
pub type ContentId = Uuid;

/// Fixed namespace for content-addressed ids.
///
/// Changing this value changes every derived `ContentId`, so it is part of
/// the storage format.
const CONTENT_NAMESPACE: Uuid = Uuid::from_u128(0x8f9e_1c4a_7d23_4b56_9a01_c2e84d5f6a70);

/// System-wide text normalization policy.
///
/// The policy must be applied consistently: every identity derivation and
/// every lookup has to run through the same instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationPolicy {
    /// Collapse internal whitespace runs to a single space.
    pub collapse_whitespace: bool,
    /// Case-fold text to lowercase before hashing.
    pub case_fold: bool,
}

impl Default for NormalizationPolicy {
    fn default() -> Self {
        Self {
            collapse_whitespace: true,
            case_fold: true,
        }
    }
}

impl NormalizationPolicy {
    /// Normalizes raw sentence text. Leading/trailing whitespace is always
    /// trimmed; the remaining steps follow the policy flags.
    pub fn normalize(&self, raw_text: &str) -> String {
        let trimmed = raw_text.trim();
        let collapsed = if self.collapse_whitespace {
            trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
        } else {
            trimmed.to_string()
        };
        if self.case_fold {
            collapsed.to_lowercase()
        } else {
            collapsed
        }
    }
}

/// Derives the deterministic content id for already-normalized text.
pub fn content_id_for(normalized_text: &str) -> ContentId {
    Uuid::new_v5(&CONTENT_NAMESPACE, normalized_text.as_bytes())
}

/// One deduplicated sentence unit with its live reference count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentUnit {
    /// Content-addressed identity.
    pub id: ContentId,
    /// Text as first seen, before normalization.
    pub raw_text: String,
    /// Normalized text the id was derived from.
    pub normalized_text: String,
    /// Number of occurrences referencing this unit across all documents.
    pub ref_count: i64,
}
