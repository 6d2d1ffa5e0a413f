//! Typed payload structs for each event type.
//!
//! The type discriminant is external to the payload JSON (it lives in the
//! event's `event_type` column), so [`EventData`] does not implement
//! `Deserialize` directly — use [`EventData::deserialize_for`] with the
//! known [`EventType`]. Unknown fields are preserved via `#[serde(flatten)]`
//! for forward compatibility.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::types::EventType;

/// Typed payload for an event, keyed by [`EventType`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventData {
    /// Payload for `PLANTED`.
    Planted(PlantedData),
    /// Payload for `OBSERVED`.
    Observed(ObservedData),
    /// Payload for `INPUT_APPLIED`.
    InputApplied(InputAppliedData),
    /// Payload for `HARVESTED`.
    Harvested(HarvestedData),
    /// Payload for `PACKAGED`.
    Packaged(PackagedData),
    /// Payload for `VERIFIED`.
    Verified(VerifiedData),
    /// Raw payload of an event whose type tag is not recognised.
    Extension(BTreeMap<String, serde_json::Value>),
}

impl EventData {
    /// Deserialize a JSON string into the correct variant for `event_type`.
    ///
    /// # Errors
    ///
    /// Returns a [`DataParseError`] if the JSON is malformed or does not
    /// match the expected schema for the given event type (including a
    /// missing required field).
    pub fn deserialize_for(event_type: &EventType, json: &str) -> Result<Self, DataParseError> {
        let result = match event_type {
            EventType::Planted => serde_json::from_str::<PlantedData>(json).map(Self::Planted),
            EventType::Observed => serde_json::from_str::<ObservedData>(json).map(Self::Observed),
            EventType::InputApplied => {
                serde_json::from_str::<InputAppliedData>(json).map(Self::InputApplied)
            }
            EventType::Harvested => {
                serde_json::from_str::<HarvestedData>(json).map(Self::Harvested)
            }
            EventType::Packaged => serde_json::from_str::<PackagedData>(json).map(Self::Packaged),
            EventType::Verified => serde_json::from_str::<VerifiedData>(json).map(Self::Verified),
            EventType::Extension(_) => {
                serde_json::from_str::<BTreeMap<String, serde_json::Value>>(json)
                    .map(Self::Extension)
            }
        };

        result.map_err(|source| DataParseError {
            event_type: event_type.clone(),
            source,
        })
    }

    /// Serialize the payload to a [`serde_json::Value`].
    ///
    /// # Errors
    ///
    /// Returns an error if the inner struct fails to serialize (should not
    /// happen with well-formed data).
    pub fn to_json_value(&self) -> Result<serde_json::Value, serde_json::Error> {
        match self {
            Self::Planted(d) => serde_json::to_value(d),
            Self::Observed(d) => serde_json::to_value(d),
            Self::InputApplied(d) => serde_json::to_value(d),
            Self::Harvested(d) => serde_json::to_value(d),
            Self::Packaged(d) => serde_json::to_value(d),
            Self::Verified(d) => serde_json::to_value(d),
            Self::Extension(d) => serde_json::to_value(d),
        }
    }

    /// Semantic checks beyond schema shape.
    ///
    /// # Errors
    ///
    /// Returns a human-readable description of the first violated constraint.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Planted(d) => {
                if d.crop_type.trim().is_empty() {
                    return Err("PLANTED requires a non-empty cropType".into());
                }
            }
            Self::Observed(d) => {
                if d.observation_type.trim().is_empty() {
                    return Err("OBSERVED requires a non-empty observationType".into());
                }
                if d.details.trim().is_empty() {
                    return Err("OBSERVED requires non-empty details".into());
                }
            }
            Self::InputApplied(d) => {
                if d.input_type.trim().is_empty() {
                    return Err("INPUT_APPLIED requires a non-empty inputType".into());
                }
            }
            Self::Harvested(d) => {
                if !d.yield_kg.is_finite() || d.yield_kg <= 0.0 {
                    return Err("HARVESTED requires a positive yieldKg".into());
                }
            }
            Self::Packaged(_) | Self::Verified(_) | Self::Extension(_) => {}
        }
        Ok(())
    }
}

impl Serialize for EventData {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Planted(d) => d.serialize(serializer),
            Self::Observed(d) => d.serialize(serializer),
            Self::InputApplied(d) => d.serialize(serializer),
            Self::Harvested(d) => d.serialize(serializer),
            Self::Packaged(d) => d.serialize(serializer),
            Self::Verified(d) => d.serialize(serializer),
            Self::Extension(d) => d.serialize(serializer),
        }
    }
}

/// Error returned when deserializing an event's JSON payload fails.
#[derive(Debug)]
pub struct DataParseError {
    /// The event type that was being deserialized.
    pub event_type: EventType,
    /// The underlying JSON parse error.
    pub source: serde_json::Error,
}

impl fmt::Display for DataParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {} payload: {}", self.event_type, self.source)
    }
}

impl std::error::Error for DataParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

// ---------------------------------------------------------------------------
// Payload structs — one per event type
// ---------------------------------------------------------------------------

/// Payload for `PLANTED`. First event for a field; creates the VTI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantedData {
    /// Crop being planted (required).
    pub crop_type: String,
    /// Seed variety, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variety: Option<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Unknown fields, preserved for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Payload for `OBSERVED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservedData {
    /// Kind of observation: scouting note, pest sighting, growth stage...
    pub observation_type: String,
    /// What was observed (required).
    pub details: String,
    /// Photo/video URLs attached to the observation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub media_urls: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Payload for `INPUT_APPLIED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAppliedData {
    /// Input category: fertilizer, pesticide, irrigation...
    pub input_type: String,
    /// Quantity applied, in `unit`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    /// Unit for `quantity` (kg, L, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Payload for `HARVESTED`. Carries the summary fields merged into the VTI
/// metadata cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestedData {
    /// Harvested yield in kilograms (required, positive).
    pub yield_kg: f64,
    /// Quality grade assigned at harvest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_grade: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Payload for `PACKAGED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackagedData {
    /// Number of packages produced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_count: Option<u32>,
    /// Package kind (crate, sack, carton...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Payload for `VERIFIED`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifiedData {
    /// Identity of the verifying body or inspector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifier: Option<String>,
    /// Verification outcome.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}
