use anyhow::{Context as _, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use std::io::Write;

use loam_core::config::LoamConfig;
use loam_core::event::GeoPoint;
use loam_core::outbox::OP_RECORD_EVENT;
use loam_core::{EventType, Outbox, RecordRequest, TraceError, db, record_event};

use crate::output::{self, OutputMode};
use crate::paths::Paths;

#[derive(Args, Debug)]
pub struct RecordArgs {
    /// Lifecycle event type (PLANTED, OBSERVED, INPUT_APPLIED, HARVESTED,
    /// PACKAGED, VERIFIED).
    #[arg(value_name = "EVENT_TYPE")]
    pub event_type: String,

    /// Target: a field id, or a vti- id for post-harvest stages.
    #[arg(value_name = "TARGET")]
    pub target: String,

    /// Acting user id. Defaults to $LOAM_ACTOR.
    #[arg(long)]
    pub actor: Option<String>,

    /// Event time as RFC 3339 (defaults to now; may be backdated).
    #[arg(long, value_name = "TIMESTAMP")]
    pub at: Option<String>,

    /// Event payload as a JSON object.
    #[arg(long, default_value = "{}")]
    pub payload: String,

    /// Capture latitude; requires --lng.
    #[arg(long, requires = "lng")]
    pub lat: Option<f64>,

    /// Capture longitude; requires --lat.
    #[arg(long, requires = "lat")]
    pub lng: Option<f64>,

    /// Client idempotency key; retries with the same key record once.
    #[arg(long)]
    pub client_ref: Option<String>,

    /// Queue for later sync instead of writing to the ledger now.
    #[arg(long)]
    pub offline: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueuedSummary {
    queued: bool,
    document_id: String,
}

/// Execute `loam record`.
///
/// # Errors
///
/// Returns an error on malformed flags or storage failure. Domain failures
/// (validation, unknown target) render a structured error and exit non-zero.
pub fn run_record(args: &RecordArgs, mode: OutputMode, paths: &Paths) -> Result<()> {
    let actor_id = args
        .actor
        .clone()
        .or_else(|| std::env::var("LOAM_ACTOR").ok())
        .unwrap_or_default();

    let timestamp = args
        .at
        .as_deref()
        .map(|raw| {
            raw.parse::<DateTime<Utc>>()
                .with_context(|| format!("invalid --at timestamp '{raw}'"))
        })
        .transpose()?;

    let payload: serde_json::Value = serde_json::from_str(&args.payload)
        .with_context(|| format!("invalid --payload JSON '{}'", args.payload))?;

    let geo_location = match (args.lat, args.lng) {
        (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
        _ => None,
    };

    let request = RecordRequest {
        event_type: EventType::parse(&args.event_type),
        field_or_vti_id: args.target.clone(),
        actor_id,
        timestamp,
        payload,
        geo_location,
        client_ref: args.client_ref.clone(),
    };

    if args.offline {
        return queue_for_sync(&request, mode, paths);
    }

    let conn = db::open_store(&paths.ledger())?;
    match record_event(&conn, &request) {
        Ok(receipt) => output::render(mode, &receipt, |r, w| {
            writeln!(
                w,
                "✓ Recorded {} as {} on {}",
                request.event_type, r.event_id, r.vti_id
            )
        }),
        Err(e) => output::fail(mode, &e),
    }
}

/// Queue the request in the offline outbox instead of submitting it.
fn queue_for_sync(request: &RecordRequest, mode: OutputMode, paths: &Paths) -> Result<()> {
    let config = match LoamConfig::load(&paths.config()) {
        Ok(c) => c,
        Err(e) => output::fail(mode, &e),
    };
    let outbox = Outbox::open(&paths.outbox(), config.outbox)?;

    let document_id = request.client_ref.clone().unwrap_or_else(|| {
        format!(
            "{}-{}",
            request.event_type.as_str().to_lowercase(),
            Utc::now().timestamp()
        )
    });

    tracing::info!(document_id, "queueing action for offline sync");
    if let Err(e) = outbox.enqueue(OP_RECORD_EVENT, &document_id, request) {
        match e {
            TraceError::Storage(_) | TraceError::Internal(_) => {
                return Err(e).context("failed to queue offline action");
            }
            other => output::fail(mode, &other),
        }
    }

    let summary = QueuedSummary {
        queued: true,
        document_id,
    };
    output::render(mode, &summary, |s, w| {
        writeln!(w, "✓ Queued {} for sync (run `loam sync`)", s.document_id)
    })
}
