//! Event recorder: validates and appends a single lifecycle event.
//!
//! Validation is layered, cheapest first:
//!
//! 1. **Identity** — a non-empty actor id must be present.
//! 2. **Shape** — known event type, non-empty target id, payload matching
//!    the typed schema for the event type.
//! 3. **Semantics** — per-type constraints (positive yield, non-empty
//!    observation details).
//!
//! Only then does the recorder touch the store: resolve (or, for PLANTED,
//! create) the target VTI, append exactly one immutable event row, and
//! opportunistically merge summary fields into the VTI metadata cache —
//! all inside one transaction.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TraceError;
use crate::event::{Event, EventData, EventType, GeoPoint, HarvestedData, PlantedData};
use crate::model::{EventId, VtiId, VtiMetadata};
use crate::registry;

/// A request to record one lifecycle event, in the wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRequest {
    /// Lifecycle event tag.
    pub event_type: EventType,
    /// Either a `vti-` id or a field id. PLANTED creates the VTI for a
    /// field; every other type requires it to exist.
    pub field_or_vti_id: String,
    /// The acting user. Required.
    pub actor_id: String,
    /// Event-time. Defaults to now; may be backdated by the client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Event payload; shape depends on `event_type`.
    pub payload: serde_json::Value,
    /// Optional capture location.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<GeoPoint>,
    /// Client-generated idempotency key. Retried submissions carrying the
    /// same key produce exactly one persisted event.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_ref: Option<String>,
}

/// What the recorder hands back on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordReceipt {
    /// Id of the appended (or already-present, for an idempotent retry) event.
    pub event_id: EventId,
    /// The VTI the event was attached to.
    pub vti_id: VtiId,
}

/// Validate and persist one lifecycle event.
///
/// # Errors
///
/// - `Unauthenticated` — empty actor id.
/// - `InvalidArgument` — unknown event type, empty target id, payload not
///   matching the event type's schema, or a violated semantic constraint.
/// - `NotFound` — the target VTI/field does not exist and the event type
///   does not create one.
/// - `Storage` — persistence failure. Nothing is written on any error.
pub fn record_event(conn: &Connection, req: &RecordRequest) -> Result<RecordReceipt, TraceError> {
    if req.actor_id.trim().is_empty() {
        return Err(TraceError::Unauthenticated);
    }

    if !req.event_type.is_known() {
        return Err(TraceError::InvalidArgument(format!(
            "unknown event type '{}'",
            req.event_type
        )));
    }

    let target = req.field_or_vti_id.trim();
    if target.is_empty() {
        return Err(TraceError::InvalidArgument(
            "fieldOrVtiId must be non-empty".into(),
        ));
    }

    let payload_json = req.payload.to_string();
    let data = EventData::deserialize_for(&req.event_type, &payload_json)
        .map_err(|e| TraceError::InvalidArgument(e.to_string()))?;
    data.validate().map_err(TraceError::InvalidArgument)?;

    let vti_id = resolve_target(conn, &req.event_type, target)?;

    let now = Utc::now();
    let mut event = Event {
        event_id: EventId::new_unchecked("ev-pending"),
        vti_id,
        event_type: req.event_type.clone(),
        actor_id: req.actor_id.clone(),
        event_ts_us: req.timestamp.unwrap_or(now).timestamp_micros(),
        recorded_at_us: now.timestamp_micros(),
        data,
        geo: req.geo_location,
        client_ref: req.client_ref.clone(),
    };
    event.event_id = event
        .compute_id()
        .map_err(|e| TraceError::Internal(format!("serialize payload: {e}")))?;

    append(conn, &event)
}

/// Resolve the request target to a VTI id, creating one for PLANTED.
fn resolve_target(
    conn: &Connection,
    event_type: &EventType,
    target: &str,
) -> Result<VtiId, TraceError> {
    if VtiId::is_vti_ref(target) {
        let vti_id: VtiId = target
            .parse()
            .map_err(|e: crate::model::InvalidIdError| TraceError::InvalidArgument(e.to_string()))?;
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM vtis WHERE vti_id = ?1",
                [vti_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(TraceError::NotFound(format!("no VTI {vti_id}")));
        }
        return Ok(vti_id);
    }

    if *event_type == EventType::Planted {
        return registry::ensure(conn, target);
    }

    registry::lookup_field(conn, target)?
        .ok_or_else(|| TraceError::NotFound(format!("no VTI registered for field '{target}'")))
}

/// Append the event and merge any summary fields, in one transaction.
fn append(conn: &Connection, event: &Event) -> Result<RecordReceipt, TraceError> {
    let tx = conn.unchecked_transaction()?;

    // Idempotent retry: a lost acknowledgement leads the outbox to resubmit
    // with the same client_ref. Return the original receipt untouched.
    if let Some(client_ref) = &event.client_ref {
        let existing: Option<(String, String)> = tx
            .query_row(
                "SELECT event_id, vti_id FROM events WHERE client_ref = ?1",
                [client_ref],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        if let Some((event_id, vti_id)) = existing {
            debug!(client_ref, event = %event_id, "duplicate submission, reusing event");
            return Ok(RecordReceipt {
                event_id: EventId::new_unchecked(event_id),
                vti_id: VtiId::new_unchecked(vti_id),
            });
        }
    }

    let payload = event
        .data
        .to_json_value()
        .map_err(|e| TraceError::Internal(format!("serialize payload: {e}")))?
        .to_string();

    tx.execute(
        "INSERT INTO events (
            event_id, vti_id, event_type, actor_id,
            event_ts_us, recorded_at_us, payload, lat, lng, client_ref
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            event.event_id.as_str(),
            event.vti_id.as_str(),
            event.event_type.as_str(),
            event.actor_id,
            event.event_ts_us,
            event.recorded_at_us,
            payload,
            event.geo.map(|g| g.lat),
            event.geo.map(|g| g.lng),
            event.client_ref,
        ],
    )?;

    if let Some(patch) = summary_patch(&event.data) {
        registry::merge_metadata_in(&tx, &event.vti_id, patch)?;
    }

    tx.commit()?;
    debug!(event = %event.event_id, vti = %event.vti_id, kind = %event.event_type, "appended event");

    Ok(RecordReceipt {
        event_id: event.event_id.clone(),
        vti_id: event.vti_id.clone(),
    })
}

/// Summary fields certain events contribute to the VTI metadata cache.
fn summary_patch(data: &EventData) -> Option<VtiMetadata> {
    match data {
        EventData::Planted(PlantedData { crop_type, .. }) => Some(VtiMetadata {
            crop_type: Some(crop_type.clone()),
            ..VtiMetadata::default()
        }),
        EventData::Harvested(HarvestedData {
            yield_kg,
            quality_grade,
            ..
        }) => Some(VtiMetadata {
            initial_yield_kg: Some(*yield_kg),
            initial_quality_grade: quality_grade.clone(),
            ..VtiMetadata::default()
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use serde_json::json;

    fn conn() -> Connection {
        db::open_in_memory().expect("open store")
    }

    fn planted_request(field: &str) -> RecordRequest {
        RecordRequest {
            event_type: EventType::Planted,
            field_or_vti_id: field.into(),
            actor_id: "u1".into(),
            timestamp: None,
            payload: json!({"cropType": "Maize"}),
            geo_location: None,
            client_ref: None,
        }
    }

    #[test]
    fn planted_creates_vti_and_event() {
        let conn = conn();
        let receipt = record_event(&conn, &planted_request("f1")).expect("record");

        assert_eq!(receipt.vti_id, VtiId::for_field("f1"));

        let events: i64 = conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .expect("count");
        assert_eq!(events, 1);

        let vti = registry::get_summary(&conn, &receipt.vti_id).expect("summary");
        assert_eq!(vti.metadata.crop_type.as_deref(), Some("Maize"));
    }

    #[test]
    fn harvested_requires_existing_vti() {
        let conn = conn();
        let err = record_event(
            &conn,
            &RecordRequest {
                event_type: EventType::Harvested,
                field_or_vti_id: "f1".into(),
                actor_id: "u1".into(),
                timestamp: None,
                payload: json!({"yieldKg": 120.0}),
                geo_location: None,
                client_ref: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TraceError::NotFound(_)));
    }

    #[test]
    fn harvested_merges_summary_metadata() {
        let conn = conn();
        record_event(&conn, &planted_request("f1")).expect("plant");

        let receipt = record_event(
            &conn,
            &RecordRequest {
                event_type: EventType::Harvested,
                field_or_vti_id: "f1".into(),
                actor_id: "u1".into(),
                timestamp: None,
                payload: json!({"yieldKg": 120.0, "qualityGrade": "A"}),
                geo_location: None,
                client_ref: None,
            },
        )
        .expect("harvest");

        let vti = registry::get_summary(&conn, &receipt.vti_id).expect("summary");
        assert_eq!(vti.metadata.initial_yield_kg, Some(120.0));
        assert_eq!(vti.metadata.initial_quality_grade.as_deref(), Some("A"));
        assert_eq!(vti.metadata.crop_type.as_deref(), Some("Maize"));
    }

    #[test]
    fn missing_yield_is_invalid_argument_and_writes_nothing() {
        let conn = conn();
        record_event(&conn, &planted_request("f1")).expect("plant");

        let err = record_event(
            &conn,
            &RecordRequest {
                event_type: EventType::Harvested,
                field_or_vti_id: "f1".into(),
                actor_id: "u1".into(),
                timestamp: None,
                payload: json!({"qualityGrade": "A"}),
                geo_location: None,
                client_ref: None,
            },
        )
        .unwrap_err();
        assert!(matches!(err, TraceError::InvalidArgument(_)));

        let events: i64 = conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .expect("count");
        assert_eq!(events, 1, "only the PLANTED event should exist");
    }

    #[test]
    fn empty_actor_is_unauthenticated() {
        let conn = conn();
        let mut req = planted_request("f1");
        req.actor_id = "  ".into();
        let err = record_event(&conn, &req).unwrap_err();
        assert!(matches!(err, TraceError::Unauthenticated));
    }

    #[test]
    fn unknown_event_type_is_invalid_argument() {
        let conn = conn();
        let mut req = planted_request("f1");
        req.event_type = EventType::Extension("IRRIGATED".into());
        let err = record_event(&conn, &req).unwrap_err();
        assert!(matches!(err, TraceError::InvalidArgument(_)));
    }

    #[test]
    fn vti_ref_target_must_exist() {
        let conn = conn();
        let mut req = planted_request("vti-000000000000");
        let err = record_event(&conn, &req).unwrap_err();
        assert!(matches!(err, TraceError::NotFound(_)));
        req.field_or_vti_id = "f1".into();
        record_event(&conn, &req).expect("field target still works");
    }

    #[test]
    fn same_client_ref_records_once() {
        let conn = conn();
        let mut req = planted_request("f1");
        req.client_ref = Some("plant-1000".into());

        let first = record_event(&conn, &req).expect("first");
        let second = record_event(&conn, &req).expect("retry");
        assert_eq!(first, second);

        let events: i64 = conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .expect("count");
        assert_eq!(events, 1);
    }

    #[test]
    fn backdated_timestamp_is_preserved() {
        let conn = conn();
        let past = "2026-03-01T08:00:00Z"
            .parse::<DateTime<Utc>>()
            .expect("parse ts");
        let mut req = planted_request("f1");
        req.timestamp = Some(past);

        let receipt = record_event(&conn, &req).expect("record");
        let stored: i64 = conn
            .query_row(
                "SELECT event_ts_us FROM events WHERE event_id = ?1",
                [receipt.event_id.as_str()],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(stored, past.timestamp_micros());
    }
}
