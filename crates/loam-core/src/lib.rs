//! loam-core library.
//!
//! Tracks a Verifiable Traceable Item (VTI) — a crop planting, later a
//! harvested lot — through an append-only sequence of immutable lifecycle
//! events contributed by different actors. The pieces, leaves first:
//!
//! - [`registry`] — identity and cached summary metadata for each VTI
//! - [`recorder`] — validates and appends one lifecycle event
//! - [`outbox`] — client-local persisted queue for offline submissions
//! - [`history`] — ordered lineage assembly for display and audit
//!
//! # Conventions
//!
//! - **Errors**: [`error::TraceError`] inside the core; `anyhow::Result`
//!   with `.context(...)` at store-opening boundaries.
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).

pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod history;
pub mod model;
pub mod outbox;
pub mod recorder;
pub mod registry;

pub use error::{ErrorCode, TraceError};
pub use event::{Event, EventData, EventType};
pub use history::{ActorDirectory, ActorProfile, History};
pub use model::{EventId, Vti, VtiId, VtiMetadata};
pub use outbox::{EventSink, FlushReport, Outbox, OutboxAction};
pub use recorder::{RecordReceipt, RecordRequest, record_event};
