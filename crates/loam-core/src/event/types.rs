//! Lifecycle event types.
//!
//! Six event types cover the known crop lifecycle. The enumeration is open:
//! a tag written by a newer client round-trips through [`EventType::Extension`]
//! instead of failing the read path. The recorder rejects extension tags at
//! write time; the history assembler tolerates them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A lifecycle event tag, in the `UPPER_SNAKE` wire form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    /// First event for a field; creates the VTI.
    Planted,
    /// Field observation (scouting note, pest sighting, growth stage).
    Observed,
    /// Fertilizer, pesticide, or other input applied.
    InputApplied,
    /// Crop harvested; carries yield and quality summary fields.
    Harvested,
    /// Harvested lot packaged into a sellable unit.
    Packaged,
    /// Lot verified by an inspector after sale; conceptually terminal.
    Verified,
    /// Unrecognised tag, preserved as written.
    Extension(String),
}

impl EventType {
    /// The known event types in lifecycle order.
    pub const KNOWN: [Self; 6] = [
        Self::Planted,
        Self::Observed,
        Self::InputApplied,
        Self::Harvested,
        Self::Packaged,
        Self::Verified,
    ];

    /// Return the canonical wire string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Planted => "PLANTED",
            Self::Observed => "OBSERVED",
            Self::InputApplied => "INPUT_APPLIED",
            Self::Harvested => "HARVESTED",
            Self::Packaged => "PACKAGED",
            Self::Verified => "VERIFIED",
            Self::Extension(raw) => raw,
        }
    }

    /// Parse a wire string. Never fails: unknown tags become `Extension`.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "PLANTED" => Self::Planted,
            "OBSERVED" => Self::Observed,
            "INPUT_APPLIED" => Self::InputApplied,
            "HARVESTED" => Self::Harvested,
            "PACKAGED" => Self::Packaged,
            "VERIFIED" => Self::Verified,
            other => Self::Extension(other.to_string()),
        }
    }

    /// Returns `true` for the six known lifecycle types.
    #[must_use]
    pub const fn is_known(&self) -> bool {
        !matches!(self, Self::Extension(_))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// Custom serde: serialize as the wire string.
impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Self::parse(&s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_all_known_types() {
        let expected = [
            (EventType::Planted, "PLANTED"),
            (EventType::Observed, "OBSERVED"),
            (EventType::InputApplied, "INPUT_APPLIED"),
            (EventType::Harvested, "HARVESTED"),
            (EventType::Packaged, "PACKAGED"),
            (EventType::Verified, "VERIFIED"),
        ];

        for (et, s) in expected {
            assert_eq!(et.to_string(), s);
            assert_eq!(et.as_str(), s);
        }
    }

    #[test]
    fn parse_display_roundtrip() {
        for et in EventType::KNOWN {
            let reparsed = EventType::parse(et.as_str());
            assert_eq!(et, reparsed);
        }
    }

    #[test]
    fn unknown_tag_preserved_as_extension() {
        let et = EventType::parse("IRRIGATED");
        assert_eq!(et, EventType::Extension("IRRIGATED".into()));
        assert_eq!(et.as_str(), "IRRIGATED");
        assert!(!et.is_known());
    }

    #[test]
    fn known_types_are_known() {
        for et in EventType::KNOWN {
            assert!(et.is_known());
        }
    }

    #[test]
    fn serde_json_roundtrip() {
        for et in EventType::KNOWN {
            let json = serde_json::to_string(&et).expect("serialize");
            assert_eq!(json, format!("\"{}\"", et.as_str()));

            let deser: EventType = serde_json::from_str(&json).expect("deserialize");
            assert_eq!(deser, et);
        }
    }

    #[test]
    fn serde_preserves_extension_tag() {
        let deser: EventType = serde_json::from_str("\"GRADED\"").expect("deserialize");
        assert_eq!(deser, EventType::Extension("GRADED".into()));
        let json = serde_json::to_string(&deser).expect("serialize");
        assert_eq!(json, "\"GRADED\"");
    }
}
