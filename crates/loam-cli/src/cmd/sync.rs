use anyhow::Result;
use clap::Args;
use std::io::Write;

use loam_core::Outbox;
use loam_core::config::LoamConfig;
use loam_core::db;

use crate::output::{self, OutputMode};
use crate::paths::Paths;

#[derive(Args, Debug)]
pub struct SyncArgs {}

/// Execute `loam sync`: flush the offline outbox into the ledger.
///
/// # Errors
///
/// Returns an error if the outbox or ledger cannot be opened, or on a
/// queue persistence failure. Per-action submission failures are handled
/// by the outbox retry policy and only show up in the report.
pub fn run_sync(_args: &SyncArgs, mode: OutputMode, paths: &Paths) -> Result<()> {
    let config = match LoamConfig::load(&paths.config()) {
        Ok(c) => c,
        Err(e) => output::fail(mode, &e),
    };
    let outbox = Outbox::open(&paths.outbox(), config.outbox)?;
    let mut ledger = db::open_store(&paths.ledger())?;

    tracing::debug!(outbox = %paths.outbox().display(), "starting sync pass");
    let report = outbox.flush(&mut ledger)?;

    output::render(mode, &report, |r, w| {
        if r.is_noop() {
            writeln!(w, "Nothing to sync.")?;
            return Ok(());
        }
        writeln!(w, "✓ Sync complete.")?;
        writeln!(w, "  committed: {}", r.committed)?;
        if r.deferred > 0 {
            writeln!(w, "  deferred:  {} (will retry)", r.deferred)?;
        }
        if r.dropped > 0 {
            writeln!(w, "  dropped:   {} (permanently invalid)", r.dropped)?;
        }
        if r.expired > 0 {
            writeln!(w, "  expired:   {} (older than the max age)", r.expired)?;
        }
        Ok(())
    })
}
