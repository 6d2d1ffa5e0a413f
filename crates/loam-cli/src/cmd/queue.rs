use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use std::io::Write;

use loam_core::Outbox;
use loam_core::config::LoamConfig;

use crate::output::{self, OutputMode};
use crate::paths::Paths;

#[derive(Args, Debug)]
pub struct QueueArgs {}

/// Execute `loam queue`: list actions waiting for sync.
///
/// # Errors
///
/// Returns an error if the outbox cannot be opened or read.
pub fn run_queue(_args: &QueueArgs, mode: OutputMode, paths: &Paths) -> Result<()> {
    let config = match LoamConfig::load(&paths.config()) {
        Ok(c) => c,
        Err(e) => output::fail(mode, &e),
    };
    let outbox = Outbox::open(&paths.outbox(), config.outbox)?;
    let pending = outbox.pending()?;

    output::render(mode, &pending, |actions, w| {
        if actions.is_empty() {
            writeln!(w, "Outbox is empty.")?;
            return Ok(());
        }
        writeln!(
            w,
            "{:<24} {:<14} {:<17} {:>8}  LAST ERROR",
            "DOCUMENT", "OPERATION", "ENQUEUED", "ATTEMPTS"
        )?;
        for action in actions {
            writeln!(
                w,
                "{:<24} {:<14} {:<17} {:>8}  {}",
                action.document_id,
                action.operation,
                format_ts(action.enqueued_at_us),
                action.attempts,
                action.last_error.as_deref().unwrap_or("-"),
            )?;
        }
        writeln!(w)?;
        writeln!(w, "{} action(s) queued. Run `loam sync` to flush.", actions.len())
    })
}

fn format_ts(timestamp_us: i64) -> String {
    DateTime::<Utc>::from_timestamp_micros(timestamp_us).map_or_else(
        || timestamp_us.to_string(),
        |t| t.format("%Y-%m-%d %H:%M").to_string(),
    )
}
