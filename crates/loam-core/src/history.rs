//! History assembler: the full, ordered lineage of a VTI for display/audit.
//!
//! Ordering contract: ascending event-time, ties broken by event id. Both
//! keys are stable, so repeated calls return the same order regardless of
//! arrival order at the store — concurrent submissions from different actors
//! interleave purely by their timestamps.
//!
//! Actor identities come from an external profile source behind the
//! [`ActorDirectory`] trait. Lookups are batched (distinct ids, one call)
//! and failures degrade to a placeholder profile; a broken directory never
//! fails a history read.

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

use crate::error::TraceError;
use crate::event::{EventType, GeoPoint};
use crate::model::{EventId, Vti, VtiId};
use crate::registry;

/// Display identity for an event's actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorProfile {
    /// Display name.
    pub name: String,
    /// Role label (farmer, field agent, processor...).
    pub role: String,
    /// Avatar image URL, if the profile has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl ActorProfile {
    /// Fallback identity for an actor the directory could not resolve.
    #[must_use]
    pub fn placeholder(actor_id: &str) -> Self {
        Self {
            name: actor_id.to_string(),
            role: "unknown".to_string(),
            avatar_url: None,
        }
    }
}

/// External profile lookup.
///
/// Implementations shuttle actor ids to whatever holds user profiles — a
/// config table, a service client, a test double. The assembler batches the
/// distinct ids of a history into a single call.
pub trait ActorDirectory {
    /// Error type for directory lookups.
    type Error: std::fmt::Debug + std::fmt::Display;

    /// Resolve a batch of actor ids. Ids absent from the returned map
    /// degrade to placeholders; a total failure degrades every actor.
    fn resolve_batch(
        &self,
        actor_ids: &[String],
    ) -> Result<HashMap<String, ActorProfile>, Self::Error>;
}

/// A static directory backed by an in-memory map. Used by the CLI's
/// config-file actor table and by tests.
impl ActorDirectory for BTreeMap<String, ActorProfile> {
    type Error = std::convert::Infallible;

    fn resolve_batch(
        &self,
        actor_ids: &[String],
    ) -> Result<HashMap<String, ActorProfile>, Self::Error> {
        Ok(actor_ids
            .iter()
            .filter_map(|id| self.get(id).map(|p| (id.clone(), p.clone())))
            .collect())
    }
}

/// One event in a lineage view, with its actor resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Event id.
    pub id: EventId,
    /// Lifecycle tag (extension tags are preserved, not dropped).
    pub event_type: EventType,
    /// Event-time, microseconds since the Unix epoch.
    pub timestamp_us: i64,
    /// The payload exactly as recorded.
    pub payload: serde_json::Value,
    /// Who performed the event.
    pub actor_id: String,
    /// Resolved (or placeholder) display identity.
    pub actor: ActorProfile,
    /// Capture location, if recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geo_location: Option<GeoPoint>,
}

/// A VTI's metadata plus its ordered event lineage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct History {
    /// Summary record.
    pub vti: Vti,
    /// Events in ascending (timestamp, id) order. Legitimately empty for a
    /// VTI that was registered but has no events yet.
    pub events: Vec<HistoryEntry>,
}

/// Assemble the ordered lineage for a VTI.
///
/// # Errors
///
/// `NotFound` if no such VTI exists; `Storage`/`Internal` on read failure.
/// Actor-resolution failures are absorbed, never propagated.
pub fn get_history<D: ActorDirectory>(
    conn: &Connection,
    vti_id: &VtiId,
    directory: &D,
) -> Result<History, TraceError> {
    let vti = registry::get_summary(conn, vti_id)?;

    let mut stmt = conn.prepare(
        "SELECT event_id, event_type, actor_id, event_ts_us, payload, lat, lng
         FROM events
         WHERE vti_id = ?1
         ORDER BY event_ts_us ASC, event_id ASC",
    )?;

    struct Row {
        event_id: String,
        event_type: String,
        actor_id: String,
        event_ts_us: i64,
        payload: String,
        lat: Option<f64>,
        lng: Option<f64>,
    }

    let rows = stmt
        .query_map([vti_id.as_str()], |row| {
            Ok(Row {
                event_id: row.get(0)?,
                event_type: row.get(1)?,
                actor_id: row.get(2)?,
                event_ts_us: row.get(3)?,
                payload: row.get(4)?,
                lat: row.get(5)?,
                lng: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let profiles = resolve_actors(directory, &rows.iter().map(|r| r.actor_id.clone()).collect::<Vec<_>>());

    let mut events = Vec::with_capacity(rows.len());
    for row in rows {
        let payload: serde_json::Value = serde_json::from_str(&row.payload).map_err(|e| {
            TraceError::Internal(format!("corrupt payload for {}: {e}", row.event_id))
        })?;
        let actor = profiles
            .get(&row.actor_id)
            .cloned()
            .unwrap_or_else(|| ActorProfile::placeholder(&row.actor_id));
        let geo_location = match (row.lat, row.lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
            _ => None,
        };

        events.push(HistoryEntry {
            id: EventId::new_unchecked(row.event_id),
            event_type: EventType::parse(&row.event_type),
            timestamp_us: row.event_ts_us,
            payload,
            actor_id: row.actor_id,
            actor,
            geo_location,
        });
    }

    Ok(History { vti, events })
}

/// Batch-resolve the distinct actor ids of a lineage. Total directory
/// failure is absorbed with a warning; every actor then gets a placeholder.
fn resolve_actors<D: ActorDirectory>(
    directory: &D,
    actor_ids: &[String],
) -> HashMap<String, ActorProfile> {
    let mut distinct: Vec<String> = actor_ids.to_vec();
    distinct.sort();
    distinct.dedup();

    if distinct.is_empty() {
        return HashMap::new();
    }

    match directory.resolve_batch(&distinct) {
        Ok(profiles) => profiles,
        Err(e) => {
            warn!(error = %e, actors = distinct.len(), "actor resolution failed, using placeholders");
            HashMap::new()
        }
    }
}

/// Convenience existence probe used by callers that only need to know
/// whether a VTI has any events at all.
///
/// # Errors
///
/// `Storage` on read failure.
pub fn has_events(conn: &Connection, vti_id: &VtiId) -> Result<bool, TraceError> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM events WHERE vti_id = ?1 LIMIT 1",
            [vti_id.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}
