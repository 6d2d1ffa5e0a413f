//! Event data model for the loam traceability log.
//!
//! A [`Event`] is one immutable entry in a VTI's lineage. Events are
//! append-only: there is no update or delete path. Identity is a BLAKE3
//! content hash over the canonical event fields, so a retried write of the
//! same logical event produces the same id.
//!
//! Event-time (`event_ts_us`, possibly client-chosen and backdated) is kept
//! distinct from write-time (`recorded_at_us`). Ordering in history views is
//! by event-time, ties broken by event id.

pub mod canonical;
pub mod data;
pub mod types;

pub use canonical::canonical_json;
pub use data::{
    DataParseError, EventData, HarvestedData, InputAppliedData, ObservedData, PackagedData,
    PlantedData, VerifiedData,
};
pub use types::EventType;

use crate::model::{EventId, VtiId};
use serde::{Deserialize, Serialize};

/// Optional `{lat, lng}` attached to an event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
}

/// A single immutable event in a VTI's lineage.
///
/// # Serde
///
/// The payload schema depends on `event_type`, which is external to the
/// payload JSON, so `Event` carries a custom `Deserialize` impl that reads
/// the type tag first and then drives typed payload deserialization.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Content-hash identity (`ev-<hex>`), computed at write time.
    pub event_id: EventId,
    /// The VTI this event belongs to. Required, immutable.
    pub vti_id: VtiId,
    /// Lifecycle event tag.
    pub event_type: EventType,
    /// The user who performed the event. Required.
    pub actor_id: String,
    /// Event-time in microseconds since the Unix epoch. May be
    /// client-supplied (e.g. a backdated observation).
    pub event_ts_us: i64,
    /// Write-time in microseconds since the Unix epoch.
    pub recorded_at_us: i64,
    /// Typed payload specific to the event type.
    pub data: EventData,
    /// Optional capture location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo: Option<GeoPoint>,
    /// Client-generated idempotency key, present when the event originated
    /// from the offline outbox.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

impl Event {
    /// The canonical byte string hashed to produce the event id.
    ///
    /// When a `client_ref` is present it salts the hash instead of the
    /// write-time, so a retried flush of the same queued action recomputes
    /// the same id. Without one, two otherwise-identical submissions are
    /// distinct events and the write-time keeps their ids apart.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload fails to serialize (should not happen
    /// with well-formed data).
    pub fn hash_input(&self) -> Result<String, serde_json::Error> {
        let payload = canonical_json(&self.data.to_json_value()?);
        let geo = self.geo.map_or_else(String::new, |g| {
            format!("{:.6},{:.6}", g.lat, g.lng)
        });
        let salt = self
            .client_ref
            .clone()
            .unwrap_or_else(|| self.recorded_at_us.to_string());

        Ok(format!(
            "{}\t{}\t{}\t{}\t{}\t{}\n",
            self.event_ts_us, self.actor_id, self.vti_id, self.event_type, geo, payload,
        ) + &salt)
    }

    /// Compute the content-hash id for this event.
    ///
    /// # Errors
    ///
    /// Same as [`Event::hash_input`].
    pub fn compute_id(&self) -> Result<EventId, serde_json::Error> {
        Ok(EventId::derive(self.hash_input()?.as_bytes()))
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        /// Two-pass deserialization: read the type tag, then use it to
        /// deserialize the payload.
        #[derive(Deserialize)]
        struct EventRaw {
            event_id: EventId,
            vti_id: VtiId,
            event_type: EventType,
            actor_id: String,
            event_ts_us: i64,
            recorded_at_us: i64,
            data: serde_json::Value,
            #[serde(default)]
            geo: Option<GeoPoint>,
            #[serde(default)]
            client_ref: Option<String>,
        }

        let raw = EventRaw::deserialize(deserializer)?;
        let data_json = raw.data.to_string();
        let data = EventData::deserialize_for(&raw.event_type, &data_json)
            .map_err(serde::de::Error::custom)?;

        Ok(Self {
            event_id: raw.event_id,
            vti_id: raw.vti_id,
            event_type: raw.event_type,
            actor_id: raw.actor_id,
            event_ts_us: raw.event_ts_us,
            recorded_at_us: raw.recorded_at_us,
            data,
            geo: raw.geo,
            client_ref: raw.client_ref,
        })
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}",
            self.event_ts_us,
            self.actor_id,
            self.event_type,
            self.vti_id,
            // Abbreviated payload display
            match &self.data {
                EventData::Planted(d) => format!("planted: {}", d.crop_type),
                EventData::Observed(d) => {
                    // Truncate on a char boundary, not a byte offset.
                    let preview = match d.details.char_indices().nth(40) {
                        Some((idx, _)) => format!("{}...", &d.details[..idx]),
                        None => d.details.clone(),
                    };
                    format!("{}: {preview}", d.observation_type)
                }
                EventData::InputApplied(d) => format!("input: {}", d.input_type),
                EventData::Harvested(d) => format!("harvested: {} kg", d.yield_kg),
                EventData::Packaged(_) => "packaged".to_string(),
                EventData::Verified(d) => {
                    format!("verified: {}", d.result.as_deref().unwrap_or("-"))
                }
                EventData::Extension(_) => "extension".to_string(),
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_planted_event() -> Event {
        Event {
            event_id: EventId::new_unchecked("ev-0000000000000000"),
            vti_id: VtiId::for_field("f1"),
            event_type: EventType::Planted,
            actor_id: "u1".into(),
            event_ts_us: 1_755_000_000_000_000,
            recorded_at_us: 1_755_000_000_000_100,
            data: EventData::Planted(PlantedData {
                crop_type: "Maize".into(),
                variety: Some("SC719".into()),
                notes: None,
                extra: BTreeMap::new(),
            }),
            geo: Some(GeoPoint { lat: -17.82, lng: 31.05 }),
            client_ref: None,
        }
    }

    #[test]
    fn compute_id_deterministic() {
        let event = sample_planted_event();
        let a = event.compute_id().expect("hash");
        let b = event.compute_id().expect("hash");
        assert_eq!(a, b);
        assert!(a.as_str().starts_with("ev-"));
    }

    #[test]
    fn compute_id_changes_with_content() {
        let event = sample_planted_event();
        let mut other = event.clone();
        other.event_ts_us += 1;
        assert_ne!(
            event.compute_id().expect("hash"),
            other.compute_id().expect("hash")
        );
    }

    #[test]
    fn client_ref_pins_the_id_across_retries() {
        let mut first = sample_planted_event();
        first.client_ref = Some("plant-1000".into());
        let mut retry = first.clone();
        retry.recorded_at_us += 5_000_000; // later retry after lost ack
        assert_eq!(
            first.compute_id().expect("hash"),
            retry.compute_id().expect("hash")
        );
    }

    #[test]
    fn without_client_ref_write_time_separates_ids() {
        let first = sample_planted_event();
        let mut second = first.clone();
        second.recorded_at_us += 1;
        assert_ne!(
            first.compute_id().expect("hash"),
            second.compute_id().expect("hash")
        );
    }

    #[test]
    fn serde_roundtrip() {
        let event = sample_planted_event();
        let json = serde_json::to_string(&event).expect("serialize");
        let deser: Event = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(event, deser);
    }

    #[test]
    fn display_truncates_details_on_a_char_boundary() {
        let mut event = sample_planted_event();
        event.event_type = EventType::Observed;
        event.data = EventData::Observed(ObservedData {
            observation_type: "pest".into(),
            details: format!("{}é and more text past the cutoff", "x".repeat(39)),
            media_urls: Vec::new(),
            extra: BTreeMap::new(),
        });

        let line = event.to_string();
        assert!(line.contains("pest: "));
        assert!(line.ends_with("..."));

        // Short details pass through untouched.
        event.data = EventData::Observed(ObservedData {
            observation_type: "pest".into(),
            details: "aphids on édge rows".into(),
            media_urls: Vec::new(),
            extra: BTreeMap::new(),
        });
        assert!(event.to_string().ends_with("pest: aphids on édge rows"));
    }

    #[test]
    fn serde_roundtrip_extension_type() {
        let mut event = sample_planted_event();
        event.event_type = EventType::Extension("IRRIGATED".into());
        event.data = EventData::Extension(BTreeMap::from([(
            "litres".to_string(),
            serde_json::json!(500),
        )]));
        let json = serde_json::to_string(&event).expect("serialize");
        let deser: Event = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(event, deser);
    }
}
