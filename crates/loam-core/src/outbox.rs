//! Offline outbox: queued event submissions that reconcile later.
//!
//! When the device has no connectivity, submissions land here instead of
//! the recorder and flush once connectivity returns. The queue is an
//! explicit, constructor-injected object over its own SQLite file — no
//! ambient global state — and survives process restarts.
//!
//! Per-action state machine: `Queued -> Flushing -> Committed`, or
//! `Queued -> Flushing -> Failed -> Queued` for transient failures.
//! Terminal failures (validation, permission) are dropped with a warning:
//! retrying cannot succeed. Transient failures back off exponentially and
//! actions past the configured max age are evicted rather than retried
//! forever.
//!
//! Idempotency: the `document_id` chosen at enqueue time rides through to
//! the recorder as `client_ref`, so a retried flush after a lost
//! acknowledgement produces exactly one persisted event.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, params};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::config::OutboxConfig;
use crate::error::TraceError;
use crate::recorder::{RecordReceipt, RecordRequest, record_event};

/// The remote operation the outbox knows how to replay.
pub const OP_RECORD_EVENT: &str = "recordEvent";

const OUTBOX_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS outbox_actions (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    operation TEXT NOT NULL,
    document_id TEXT NOT NULL UNIQUE,
    payload TEXT NOT NULL,
    enqueued_at_us INTEGER NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    next_attempt_at_us INTEGER NOT NULL DEFAULT 0
);
"#;

/// Where flushed actions are submitted.
///
/// The production implementation is the ledger connection itself; tests
/// inject failing sinks to exercise the retry and drop paths.
pub trait EventSink {
    /// Submit one record request, returning the recorder's receipt.
    ///
    /// # Errors
    ///
    /// Any [`TraceError`]; the outbox classifies it terminal or transient.
    fn submit(&mut self, req: &RecordRequest) -> Result<RecordReceipt, TraceError>;
}

impl EventSink for Connection {
    fn submit(&mut self, req: &RecordRequest) -> Result<RecordReceipt, TraceError> {
        record_event(self, req)
    }
}

/// One queued submission.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxAction {
    /// Remote operation name, e.g. [`OP_RECORD_EVENT`].
    pub operation: String,
    /// Client-generated idempotency key, e.g. `harvest-1755000000`.
    pub document_id: String,
    /// The request to replay.
    pub payload: RecordRequest,
    /// Enqueue time, microseconds since the Unix epoch.
    pub enqueued_at_us: i64,
    /// Transient-failure count so far.
    pub attempts: u32,
    /// Message from the most recent transient failure.
    pub last_error: Option<String>,
}

/// Summary of one flush pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct FlushReport {
    /// Actions submitted and removed from the queue.
    pub committed: usize,
    /// Actions dropped because the failure was terminal.
    pub dropped: usize,
    /// Actions evicted for exceeding the max age.
    pub expired: usize,
    /// Actions left queued: transient failure or backoff not yet elapsed.
    pub deferred: usize,
}

impl FlushReport {
    /// Returns `true` if the pass had nothing to do.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.committed == 0 && self.dropped == 0 && self.expired == 0 && self.deferred == 0
    }
}

/// The persisted offline queue.
pub struct Outbox {
    conn: Connection,
    policy: OutboxConfig,
}

impl Outbox {
    /// Open (or create) the outbox database at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialised.
    pub fn open(path: &Path, policy: OutboxConfig) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create outbox directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("open outbox {}", path.display()))?;
        conn.execute_batch(OUTBOX_SCHEMA_SQL)
            .context("initialise outbox schema")?;
        Ok(Self { conn, policy })
    }

    /// Open a throwaway in-memory outbox.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialised.
    pub fn open_in_memory(policy: OutboxConfig) -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory outbox")?;
        conn.execute_batch(OUTBOX_SCHEMA_SQL)
            .context("initialise outbox schema")?;
        Ok(Self { conn, policy })
    }

    /// Queue a submission. Returns immediately; never touches the network.
    /// Re-enqueueing an already-queued `document_id` is a no-op.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an empty document id; `Storage`/`Internal` on
    /// persistence failure.
    pub fn enqueue(
        &self,
        operation: &str,
        document_id: &str,
        payload: &RecordRequest,
    ) -> Result<(), TraceError> {
        if document_id.trim().is_empty() {
            return Err(TraceError::InvalidArgument(
                "document id must be non-empty".into(),
            ));
        }

        let payload_json = serde_json::to_string(payload)
            .map_err(|e| TraceError::Internal(format!("serialize outbox payload: {e}")))?;

        self.conn.execute(
            "INSERT INTO outbox_actions (operation, document_id, payload, enqueued_at_us)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(document_id) DO NOTHING",
            params![
                operation,
                document_id,
                payload_json,
                Utc::now().timestamp_micros()
            ],
        )?;

        debug!(document_id, operation, "queued offline action");
        Ok(())
    }

    /// Number of actions currently queued.
    ///
    /// # Errors
    ///
    /// `Storage` on read failure.
    pub fn len(&self) -> Result<usize, TraceError> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM outbox_actions", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Returns `true` when nothing is queued.
    ///
    /// # Errors
    ///
    /// `Storage` on read failure.
    pub fn is_empty(&self) -> Result<bool, TraceError> {
        Ok(self.len()? == 0)
    }

    /// Snapshot the queue in FIFO order, for display.
    ///
    /// # Errors
    ///
    /// `Storage`/`Internal` on read failure.
    pub fn pending(&self) -> Result<Vec<OutboxAction>, TraceError> {
        let mut stmt = self.conn.prepare(
            "SELECT operation, document_id, payload, enqueued_at_us, attempts, last_error
             FROM outbox_actions ORDER BY seq ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, u32>(4)?,
                    row.get::<_, Option<String>>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut actions = Vec::with_capacity(rows.len());
        for (operation, document_id, payload_json, enqueued_at_us, attempts, last_error) in rows {
            let payload: RecordRequest = serde_json::from_str(&payload_json).map_err(|e| {
                TraceError::Internal(format!("corrupt outbox payload {document_id}: {e}"))
            })?;
            actions.push(OutboxAction {
                operation,
                document_id,
                payload,
                enqueued_at_us,
                attempts,
                last_error,
            });
        }
        Ok(actions)
    }

    /// Replay due actions into `sink`, FIFO.
    ///
    /// Invoked on connectivity-regained or app-foreground. One pass over
    /// the queue; actions in backoff are skipped and counted as deferred.
    ///
    /// # Errors
    ///
    /// `Storage`/`Internal` on queue persistence failure. Sink failures are
    /// classified per action and never abort the pass.
    pub fn flush(&self, sink: &mut impl EventSink) -> Result<FlushReport, TraceError> {
        let now_us = Utc::now().timestamp_micros();
        let max_age_us = i64::try_from(self.policy.max_action_age_hours)
            .unwrap_or(i64::MAX / 3_600_000_000)
            .saturating_mul(3_600_000_000);

        let mut report = FlushReport::default();

        for action in self.pending()? {
            let row_due: i64 = self.conn.query_row(
                "SELECT next_attempt_at_us FROM outbox_actions WHERE document_id = ?1",
                [&action.document_id],
                |row| row.get(0),
            )?;
            if row_due > now_us {
                report.deferred += 1;
                continue;
            }

            if now_us.saturating_sub(action.enqueued_at_us) > max_age_us {
                warn!(
                    document_id = action.document_id,
                    attempts = action.attempts,
                    "evicting expired offline action; it will not be synced"
                );
                self.remove(&action.document_id)?;
                report.expired += 1;
                continue;
            }

            // The document id rides along as the idempotency key.
            let mut request = action.payload.clone();
            request.client_ref = Some(action.document_id.clone());

            match sink.submit(&request) {
                Ok(receipt) => {
                    self.remove(&action.document_id)?;
                    report.committed += 1;
                    debug!(
                        document_id = action.document_id,
                        event = %receipt.event_id,
                        "flushed offline action"
                    );
                }
                Err(e) if e.is_terminal() => {
                    warn!(
                        document_id = action.document_id,
                        code = %e.code(),
                        error = %e,
                        "dropping offline action; retrying cannot succeed"
                    );
                    self.remove(&action.document_id)?;
                    report.dropped += 1;
                }
                Err(e) => {
                    let attempts = action.attempts + 1;
                    let next_attempt = now_us + self.backoff_us(attempts);
                    self.conn.execute(
                        "UPDATE outbox_actions
                         SET attempts = ?1, last_error = ?2, next_attempt_at_us = ?3
                         WHERE document_id = ?4",
                        params![attempts, e.to_string(), next_attempt, action.document_id],
                    )?;
                    report.deferred += 1;
                    debug!(
                        document_id = action.document_id,
                        attempts,
                        error = %e,
                        "transient flush failure, will retry"
                    );
                }
            }
        }

        if !report.is_noop() {
            info!(
                committed = report.committed,
                dropped = report.dropped,
                expired = report.expired,
                deferred = report.deferred,
                "outbox flush pass complete"
            );
        }
        Ok(report)
    }

    fn remove(&self, document_id: &str) -> Result<(), TraceError> {
        self.conn.execute(
            "DELETE FROM outbox_actions WHERE document_id = ?1",
            [document_id],
        )?;
        Ok(())
    }

    /// Exponential backoff in microseconds: `base * 2^(attempts-1)`, capped.
    /// A base of zero disables backoff entirely: the action is due again on
    /// the very next flush pass.
    fn backoff_us(&self, attempts: u32) -> i64 {
        let base = self.policy.base_backoff_secs;
        let cap = self.policy.backoff_cap_secs.max(base);
        let secs = base
            .saturating_mul(1_u64 << attempts.saturating_sub(1).min(32))
            .min(cap);
        i64::try_from(secs).unwrap_or(i64::MAX / 1_000_000) * 1_000_000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::event::EventType;
    use serde_json::json;

    fn harvest_request(field: &str) -> RecordRequest {
        RecordRequest {
            event_type: EventType::Harvested,
            field_or_vti_id: field.into(),
            actor_id: "u1".into(),
            timestamp: None,
            payload: json!({"yieldKg": 120.0, "qualityGrade": "A"}),
            geo_location: None,
            client_ref: None,
        }
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

    fn outbox() -> Outbox {
        Outbox::open_in_memory(OutboxConfig::default()).expect("open outbox")
    }

    #[test]
    fn enqueue_is_immediate_and_idempotent() {
        let outbox = outbox();
        outbox
            .enqueue(OP_RECORD_EVENT, "harvest-1000", &harvest_request("f1"))
            .expect("enqueue");
        outbox
            .enqueue(OP_RECORD_EVENT, "harvest-1000", &harvest_request("f1"))
            .expect("re-enqueue");
        assert_eq!(outbox.len().expect("len"), 1);
    }

    #[test]
    fn enqueue_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("outbox.sqlite3");

        let outbox = Outbox::open(&path, OutboxConfig::default()).expect("open");
        outbox
            .enqueue(OP_RECORD_EVENT, "plant-1", &planted_request("f1"))
            .expect("enqueue");
        drop(outbox);

        let reopened = Outbox::open(&path, OutboxConfig::default()).expect("reopen");
        let pending = reopened.pending().expect("pending");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].document_id, "plant-1");
        assert_eq!(pending[0].payload, planted_request("f1"));
    }

    #[test]
    fn flush_commits_fifo_and_drains_queue() {
        let mut ledger = db::open_in_memory().expect("open ledger");
        let outbox = outbox();

        outbox
            .enqueue(OP_RECORD_EVENT, "plant-1", &planted_request("f1"))
            .expect("enqueue plant");
        outbox
            .enqueue(OP_RECORD_EVENT, "harvest-1", &harvest_request("f1"))
            .expect("enqueue harvest");

        let report = outbox.flush(&mut ledger).expect("flush");
        assert_eq!(report.committed, 2);
        assert_eq!(report.dropped, 0);
        assert!(outbox.is_empty().expect("empty"));

        // FIFO mattered: the harvest found the VTI the plant created.
        let events: i64 = ledger
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .expect("count");
        assert_eq!(events, 2);
    }

    #[test]
    fn double_flush_of_same_action_is_idempotent() {
        // Simulate a lost acknowledgement: the sink writes but the outbox
        // treats the first attempt as failed and retries.
        struct LossyAck<'c> {
            conn: &'c Connection,
            swallow_first: bool,
        }
        impl EventSink for LossyAck<'_> {
            fn submit(&mut self, req: &RecordRequest) -> Result<RecordReceipt, TraceError> {
                let receipt = record_event(self.conn, req)?;
                if self.swallow_first {
                    self.swallow_first = false;
                    return Err(TraceError::Internal("connection reset".into()));
                }
                Ok(receipt)
            }
        }

        let ledger = db::open_in_memory().expect("open ledger");
        crate::registry::ensure(&ledger, "f1").expect("ensure");

        let outbox = Outbox::open_in_memory(OutboxConfig {
            base_backoff_secs: 0,
            ..OutboxConfig::default()
        })
        .expect("open outbox");
        outbox
            .enqueue(OP_RECORD_EVENT, "harvest-1000", &harvest_request("f1"))
            .expect("enqueue");

        let mut sink = LossyAck {
            conn: &ledger,
            swallow_first: true,
        };

        let first = outbox.flush(&mut sink).expect("first flush");
        assert_eq!(first.committed, 0);
        assert_eq!(first.deferred, 1);

        let second = outbox.flush(&mut sink).expect("second flush");
        assert_eq!(second.committed, 1);
        assert!(outbox.is_empty().expect("empty"));

        let events: i64 = ledger
            .query_row(
                "SELECT COUNT(*) FROM events WHERE client_ref = 'harvest-1000'",
                [],
                |row| row.get(0),
            )
            .expect("count");
        assert_eq!(events, 1, "retried flush must not duplicate the event");
    }

    #[test]
    fn terminal_errors_drop_the_action() {
        let mut ledger = db::open_in_memory().expect("open ledger");
        let outbox = outbox();

        // HARVESTED with a missing yield can never succeed.
        let mut bad = harvest_request("f1");
        bad.payload = json!({"qualityGrade": "A"});
        crate::registry::ensure(&ledger, "f1").expect("ensure");

        outbox
            .enqueue(OP_RECORD_EVENT, "harvest-bad", &bad)
            .expect("enqueue");

        let report = outbox.flush(&mut ledger).expect("flush");
        assert_eq!(report.dropped, 1);
        assert!(outbox.is_empty().expect("empty"));
    }

    #[test]
    fn transient_errors_back_off_and_stay_queued() {
        struct Unreachable;
        impl EventSink for Unreachable {
            fn submit(&mut self, _req: &RecordRequest) -> Result<RecordReceipt, TraceError> {
                Err(TraceError::Internal("network unreachable".into()))
            }
        }

        let outbox = outbox();
        outbox
            .enqueue(OP_RECORD_EVENT, "plant-1", &planted_request("f1"))
            .expect("enqueue");

        let report = outbox.flush(&mut Unreachable).expect("flush");
        assert_eq!(report.deferred, 1);
        assert_eq!(outbox.len().expect("len"), 1);

        let pending = outbox.pending().expect("pending");
        assert_eq!(pending[0].attempts, 1);
        assert!(pending[0].last_error.as_deref().is_some_and(|e| e.contains("unreachable")));

        // Default backoff is 60s, so an immediate second pass defers again
        // without calling the sink.
        struct Panicking;
        impl EventSink for Panicking {
            fn submit(&mut self, _req: &RecordRequest) -> Result<RecordReceipt, TraceError> {
                panic!("sink must not be called while backing off");
            }
        }
        let report = outbox.flush(&mut Panicking).expect("second flush");
        assert_eq!(report.deferred, 1);
    }

    #[test]
    fn expired_actions_are_evicted() {
        let mut ledger = db::open_in_memory().expect("open ledger");
        let outbox = Outbox::open_in_memory(OutboxConfig {
            max_action_age_hours: 1,
            ..OutboxConfig::default()
        })
        .expect("open outbox");

        outbox
            .enqueue(OP_RECORD_EVENT, "plant-old", &planted_request("f1"))
            .expect("enqueue");
        // Age the action two hours.
        outbox
            .conn
            .execute(
                "UPDATE outbox_actions SET enqueued_at_us = enqueued_at_us - 7200000000",
                [],
            )
            .expect("age action");

        let report = outbox.flush(&mut ledger).expect("flush");
        assert_eq!(report.expired, 1);
        assert!(outbox.is_empty().expect("empty"));

        let events: i64 = ledger
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))
            .expect("count");
        assert_eq!(events, 0);
    }

    #[test]
    fn backoff_grows_and_caps() {
        let outbox = Outbox::open_in_memory(OutboxConfig {
            base_backoff_secs: 60,
            backoff_cap_secs: 600,
            ..OutboxConfig::default()
        })
        .expect("open outbox");

        assert_eq!(outbox.backoff_us(1), 60_000_000);
        assert_eq!(outbox.backoff_us(2), 120_000_000);
        assert_eq!(outbox.backoff_us(3), 240_000_000);
        assert_eq!(outbox.backoff_us(10), 600_000_000, "capped");
        assert_eq!(outbox.backoff_us(63), 600_000_000, "no overflow");
    }

    #[test]
    fn zero_base_backoff_is_due_on_the_next_flush() {
        let outbox = Outbox::open_in_memory(OutboxConfig {
            base_backoff_secs: 0,
            ..OutboxConfig::default()
        })
        .expect("open outbox");

        assert_eq!(outbox.backoff_us(1), 0);
        assert_eq!(outbox.backoff_us(7), 0);
    }

    #[test]
    fn noop_report() {
        assert!(FlushReport::default().is_noop());
        let busy = FlushReport {
            committed: 1,
            ..FlushReport::default()
        };
        assert!(!busy.is_noop());
    }
}
