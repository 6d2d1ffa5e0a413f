//! The VTI summary record and its cached metadata snapshot.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::ids::VtiId;

/// Default category tag for newly registered VTIs.
pub const DEFAULT_VTI_TYPE: &str = "crop-batch";

/// A Verifiable Traceable Item: the anchor that lifecycle events attach to.
///
/// The authoritative record is always the event log; `metadata` is a cached
/// convenience view updated opportunistically by certain events and never
/// required to be consistent with the full log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vti {
    /// Opaque unique identifier, immutable after creation.
    pub id: VtiId,
    /// The field this VTI was registered for.
    pub field_id: String,
    /// Category tag, e.g. `crop-batch`.
    pub vti_type: String,
    /// Cached summary snapshot, last-write-wins.
    pub metadata: VtiMetadata,
    /// Insertion time, microseconds since the Unix epoch. Set once.
    pub created_at_us: i64,
}

/// Cached summary fields for a VTI.
///
/// `None` means "not yet populated", not "absent from the log"; fields are
/// filled in as events carrying summary data arrive.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VtiMetadata {
    /// Crop planted, from the PLANTED event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_type: Option<String>,
    /// Yield recorded by the first HARVESTED event, in kilograms.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_yield_kg: Option<f64>,
    /// Quality grade recorded at harvest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_quality_grade: Option<String>,
    /// Unknown fields, preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl VtiMetadata {
    /// Shallow-merge `patch` into `self`: fields present in the patch win,
    /// fields absent are left untouched. No versioning, no conflict
    /// detection — the event log is the authority.
    pub fn merge(&mut self, patch: Self) {
        if patch.crop_type.is_some() {
            self.crop_type = patch.crop_type;
        }
        if patch.initial_yield_kg.is_some() {
            self.initial_yield_kg = patch.initial_yield_kg;
        }
        if patch.initial_quality_grade.is_some() {
            self.initial_quality_grade = patch.initial_quality_grade;
        }
        for (key, value) in patch.extra {
            self.extra.insert(key, value);
        }
    }

    /// Returns `true` when no summary field has been populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.crop_type.is_none()
            && self.initial_yield_kg.is_none()
            && self.initial_quality_grade.is_none()
            && self.extra.is_empty()
    }
}
