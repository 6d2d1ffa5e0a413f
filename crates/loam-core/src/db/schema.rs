//! Canonical SQLite schema for the loam ledger store.
//!
//! Two tables carry the whole model:
//! - `vtis` keeps identity and the cached summary metadata for each VTI
//! - `events` is the append-only lifecycle log (no UPDATE/DELETE path)
//!
//! `store_meta` tracks the schema version alongside `PRAGMA user_version`.

/// Migration v1: core tables plus store metadata.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS vtis (
    vti_id TEXT PRIMARY KEY,
    field_id TEXT NOT NULL UNIQUE,
    vti_type TEXT NOT NULL DEFAULT 'crop-batch',
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at_us INTEGER NOT NULL,
    CHECK (vti_id LIKE 'vti-%'),
    CHECK (length(trim(field_id)) > 0)
);

CREATE TABLE IF NOT EXISTS events (
    event_id TEXT PRIMARY KEY,
    vti_id TEXT NOT NULL REFERENCES vtis(vti_id),
    event_type TEXT NOT NULL,
    actor_id TEXT NOT NULL CHECK (length(trim(actor_id)) > 0),
    event_ts_us INTEGER NOT NULL,
    recorded_at_us INTEGER NOT NULL,
    payload TEXT NOT NULL,
    lat REAL,
    lng REAL,
    client_ref TEXT UNIQUE,
    CHECK (event_id LIKE 'ev-%')
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, created_at_us)
VALUES (1, 1, 0);
"#;

/// Migration v2: read-path indexes for history assembly and field lookup.
pub const MIGRATION_V2_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_events_vti_ts_id
    ON events(vti_id, event_ts_us, event_id);

CREATE INDEX IF NOT EXISTS idx_events_actor
    ON events(actor_id);

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
"#;

/// Indexes expected by the history read path.
pub const REQUIRED_INDEXES: &[&str] = &["idx_events_vti_ts_id", "idx_events_actor"];
