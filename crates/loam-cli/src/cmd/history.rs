use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use std::io::Write;

use loam_core::config::LoamConfig;
use loam_core::{TraceError, VtiId, db, history, registry};

use crate::output::{self, OutputMode};
use crate::paths::Paths;

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// A vti- id, or the field id it was registered for.
    #[arg(value_name = "TARGET")]
    pub target: String,
}

/// Execute `loam history`: print a VTI's full lineage.
///
/// # Errors
///
/// Returns an error on storage failure. An unknown target renders a
/// structured error and exits non-zero.
pub fn run_history(args: &HistoryArgs, mode: OutputMode, paths: &Paths) -> Result<()> {
    let conn = db::open_store(&paths.ledger())?;
    let config = match LoamConfig::load(&paths.config()) {
        Ok(c) => c,
        Err(e) => output::fail(mode, &e),
    };

    let vti_id = match resolve_target(&conn, &args.target) {
        Ok(id) => id,
        Err(e) => output::fail(mode, &e),
    };

    match history::get_history(&conn, &vti_id, &config.actors) {
        Ok(lineage) => output::render(mode, &lineage, |h, w| {
            writeln!(w, "{}  (field {})", h.vti.id, h.vti.field_id)?;
            if let Some(crop) = &h.vti.metadata.crop_type {
                writeln!(w, "  crop:    {crop}")?;
            }
            if let Some(yield_kg) = h.vti.metadata.initial_yield_kg {
                writeln!(w, "  yield:   {yield_kg} kg")?;
            }
            if let Some(grade) = &h.vti.metadata.initial_quality_grade {
                writeln!(w, "  grade:   {grade}")?;
            }
            writeln!(w)?;
            if h.events.is_empty() {
                writeln!(w, "  (no events recorded yet)")?;
            }
            for entry in &h.events {
                writeln!(
                    w,
                    "  {}  {:<14} {} ({})  {}",
                    format_ts(entry.timestamp_us),
                    entry.event_type.as_str(),
                    entry.actor.name,
                    entry.actor.role,
                    entry.payload
                )?;
            }
            Ok(())
        }),
        Err(e) => output::fail(mode, &e),
    }
}

fn resolve_target(conn: &rusqlite::Connection, target: &str) -> Result<VtiId, TraceError> {
    if VtiId::is_vti_ref(target) {
        return target
            .parse()
            .map_err(|e: loam_core::model::InvalidIdError| TraceError::InvalidArgument(e.to_string()));
    }
    registry::lookup_field(conn, target)?
        .ok_or_else(|| TraceError::NotFound(format!("no VTI registered for field '{target}'")))
}

fn format_ts(timestamp_us: i64) -> String {
    DateTime::<Utc>::from_timestamp_micros(timestamp_us).map_or_else(
        || timestamp_us.to_string(),
        |t| t.format("%Y-%m-%d %H:%M").to_string(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_accepts_field_and_vti_ref() {
        let conn = db::open_in_memory().expect("open");
        let id = registry::ensure(&conn, "field-1").expect("ensure");

        let by_field = resolve_target(&conn, "field-1").expect("by field");
        assert_eq!(by_field, id);

        let by_ref = resolve_target(&conn, id.as_str()).expect("by ref");
        assert_eq!(by_ref, id);
    }

    #[test]
    fn resolve_unknown_field_is_not_found() {
        let conn = db::open_in_memory().expect("open");
        let err = resolve_target(&conn, "field-missing").unwrap_err();
        assert!(matches!(err, TraceError::NotFound(_)));
    }

    #[test]
    fn resolve_malformed_ref_is_invalid() {
        let conn = db::open_in_memory().expect("open");
        let err = resolve_target(&conn, "vti-not hex!").unwrap_err();
        assert!(matches!(err, TraceError::InvalidArgument(_)));
    }

    #[test]
    fn timestamps_format_readably() {
        let ts = "2026-03-10T08:30:00Z"
            .parse::<DateTime<Utc>>()
            .expect("parse")
            .timestamp_micros();
        assert_eq!(format_ts(ts), "2026-03-10 08:30");
    }
}
