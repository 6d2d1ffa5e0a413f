//! VTI registry: single source of truth for a VTI's identity and cached
//! summary metadata.
//!
//! `ensure` is the concurrency-sensitive operation: two near-simultaneous
//! first-events for the same field (two devices recording a planting
//! offline, later flushing) must not mint two VTIs. The create is a single
//! conditional INSERT guarded by `UNIQUE(field_id)`, so the second writer
//! observes and reuses the first writer's id. The id itself is also derived
//! from the field id, so every replica computes the same one.

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::TraceError;
use crate::model::vti::DEFAULT_VTI_TYPE;
use crate::model::{Vti, VtiId, VtiMetadata};

/// Idempotently return the VTI id for a field, creating the VTI if absent.
///
/// # Errors
///
/// `InvalidArgument` for an empty field id; `Storage` on persistence failure.
pub fn ensure(conn: &Connection, field_id: &str) -> Result<VtiId, TraceError> {
    let field_id = field_id.trim();
    if field_id.is_empty() {
        return Err(TraceError::InvalidArgument(
            "field id must be non-empty".into(),
        ));
    }

    let vti_id = VtiId::for_field(field_id);
    let now_us = Utc::now().timestamp_micros();

    // Conditional create-if-absent: UNIQUE(field_id) makes the second
    // concurrent writer a no-op that falls through to the SELECT below.
    let inserted = conn.execute(
        "INSERT INTO vtis (vti_id, field_id, vti_type, metadata, created_at_us)
         VALUES (?1, ?2, ?3, '{}', ?4)
         ON CONFLICT(field_id) DO NOTHING",
        params![vti_id.as_str(), field_id, DEFAULT_VTI_TYPE, now_us],
    )?;

    if inserted > 0 {
        debug!(field = field_id, vti = %vti_id, "registered new VTI");
    }

    let existing: String = conn.query_row(
        "SELECT vti_id FROM vtis WHERE field_id = ?1",
        [field_id],
        |row| row.get(0),
    )?;

    Ok(VtiId::new_unchecked(existing))
}

/// Look up the VTI registered for a field, if any.
///
/// # Errors
///
/// `Storage` on persistence failure.
pub fn lookup_field(conn: &Connection, field_id: &str) -> Result<Option<VtiId>, TraceError> {
    let id: Option<String> = conn
        .query_row(
            "SELECT vti_id FROM vtis WHERE field_id = ?1",
            [field_id.trim()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(id.map(VtiId::new_unchecked))
}

/// Fetch the summary record for a VTI.
///
/// # Errors
///
/// `NotFound` if no such VTI exists; `Storage` on persistence failure.
pub fn get_summary(conn: &Connection, vti_id: &VtiId) -> Result<Vti, TraceError> {
    let row = conn
        .query_row(
            "SELECT vti_id, field_id, vti_type, metadata, created_at_us
             FROM vtis WHERE vti_id = ?1",
            [vti_id.as_str()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )
        .optional()?;

    let Some((id, field_id, vti_type, metadata_json, created_at_us)) = row else {
        return Err(TraceError::NotFound(format!("no VTI {vti_id}")));
    };

    let metadata: VtiMetadata = serde_json::from_str(&metadata_json)
        .map_err(|e| TraceError::Internal(format!("corrupt metadata for {vti_id}: {e}")))?;

    Ok(Vti {
        id: VtiId::new_unchecked(id),
        field_id,
        vti_type,
        metadata,
        created_at_us,
    })
}

/// Shallow-merge new fields into a VTI's cached metadata. Last write wins,
/// no versioning: the metadata row is a non-authoritative cache and the
/// event log remains the authority.
///
/// # Errors
///
/// `NotFound` if no such VTI exists; `Storage` on persistence failure.
pub fn merge_metadata(
    conn: &Connection,
    vti_id: &VtiId,
    patch: VtiMetadata,
) -> Result<(), TraceError> {
    if patch.is_empty() {
        return Ok(());
    }

    let tx = conn.unchecked_transaction()?;
    merge_metadata_in(&tx, vti_id, patch)?;
    tx.commit()?;
    Ok(())
}

/// The merge body, without transaction management. Used by the recorder,
/// which runs it inside its own append transaction.
pub(crate) fn merge_metadata_in(
    conn: &Connection,
    vti_id: &VtiId,
    patch: VtiMetadata,
) -> Result<(), TraceError> {
    let current: Option<String> = conn
        .query_row(
            "SELECT metadata FROM vtis WHERE vti_id = ?1",
            [vti_id.as_str()],
            |row| row.get(0),
        )
        .optional()?;

    let Some(metadata_json) = current else {
        return Err(TraceError::NotFound(format!("no VTI {vti_id}")));
    };

    let mut metadata: VtiMetadata = serde_json::from_str(&metadata_json)
        .map_err(|e| TraceError::Internal(format!("corrupt metadata for {vti_id}: {e}")))?;
    metadata.merge(patch);

    let updated = serde_json::to_string(&metadata)
        .map_err(|e| TraceError::Internal(format!("serialize metadata for {vti_id}: {e}")))?;

    conn.execute(
        "UPDATE vtis SET metadata = ?1 WHERE vti_id = ?2",
        params![updated, vti_id.as_str()],
    )?;

    debug!(vti = %vti_id, "merged metadata snapshot");
    Ok(())
}
