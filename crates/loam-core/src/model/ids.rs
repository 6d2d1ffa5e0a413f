//! Identifier newtypes.
//!
//! Both ids are derived from content, not drawn from a random source:
//!
//! - `vti-<12 hex>` — BLAKE3 of the originating field id. Deterministic, so
//!   every replica that registers the same field computes the same VTI id.
//! - `ev-<16 hex>` — BLAKE3 of the canonical event fields. Deterministic, so
//!   a retried offline flush recomputes the same event id, and id tie-breaks
//!   in history ordering are stable across rebuilds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Hex length of the VTI id suffix.
const VTI_HEX_LEN: usize = 12;

/// Hex length of the event id suffix.
const EVENT_HEX_LEN: usize = 16;

/// Error returned when parsing a malformed identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {expected} id '{raw}'")]
pub struct InvalidIdError {
    /// Which id family was expected (`vti` or `ev`).
    pub expected: &'static str,
    /// The rejected input.
    pub raw: String,
}

/// Identifier of a Verifiable Traceable Item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct VtiId(String);

impl VtiId {
    /// Derive the VTI id for a field. Same field, same id, on every replica.
    #[must_use]
    pub fn for_field(field_id: &str) -> Self {
        let hash = blake3::hash(format!("field\n{field_id}").as_bytes());
        Self(format!("vti-{}", &hash.to_hex()[..VTI_HEX_LEN]))
    }

    /// Wrap a string without format validation. Callers must know it is valid.
    #[must_use]
    pub fn new_unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a raw string carries the `vti-` prefix.
    #[must_use]
    pub fn is_vti_ref(raw: &str) -> bool {
        raw.starts_with("vti-")
    }
}

impl FromStr for VtiId {
    type Err = InvalidIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let suffix = s.strip_prefix("vti-").unwrap_or_default();
        if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidIdError {
                expected: "vti",
                raw: s.to_string(),
            })
        }
    }
}

impl fmt::Display for VtiId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for VtiId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identifier of a single traceability event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    /// Derive an event id from the canonical hash input bytes.
    #[must_use]
    pub fn derive(hash_input: &[u8]) -> Self {
        let hash = blake3::hash(hash_input);
        Self(format!("ev-{}", &hash.to_hex()[..EVENT_HEX_LEN]))
    }

    /// Wrap a string without format validation. Callers must know it is valid.
    #[must_use]
    pub fn new_unchecked(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for EventId {
    type Err = InvalidIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let suffix = s.strip_prefix("ev-").unwrap_or_default();
        if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_hexdigit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(InvalidIdError {
                expected: "ev",
                raw: s.to_string(),
            })
        }
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vti_id_deterministic_per_field() {
        let a = VtiId::for_field("field-7");
        let b = VtiId::for_field("field-7");
        let c = VtiId::for_field("field-8");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn vti_id_format() {
        let id = VtiId::for_field("field-7");
        assert!(id.as_str().starts_with("vti-"));
        assert_eq!(id.as_str().len(), 4 + 12);
        assert!(id.as_str()[4..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn event_id_deterministic() {
        let a = EventId::derive(b"same input");
        let b = EventId::derive(b"same input");
        let c = EventId::derive(b"other input");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.as_str().starts_with("ev-"));
        assert_eq!(a.as_str().len(), 3 + 16);
    }

    #[test]
    fn parse_rejects_wrong_prefix_or_non_hex() {
        assert!("bn-a3f8".parse::<VtiId>().is_err());
        assert!("vti-".parse::<VtiId>().is_err());
        assert!("vti-not hex!".parse::<VtiId>().is_err());
        assert!("vti-abc123".parse::<VtiId>().is_ok());
        assert!("harvest-1000".parse::<EventId>().is_err());
        assert!("ev-zz".parse::<EventId>().is_err());
        assert!("ev-0011aabb".parse::<EventId>().is_ok());
    }

    #[test]
    fn serde_roundtrip() {
        let id = VtiId::for_field("f1");
        let json = serde_json::to_string(&id).expect("serialize");
        let deser: VtiId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(id, deser);

        let bad: Result<VtiId, _> = serde_json::from_str("\"nope\"");
        assert!(bad.is_err());
    }
}
