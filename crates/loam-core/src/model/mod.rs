//! Domain model: identifiers and the VTI summary record.

pub mod ids;
pub mod vti;

pub use ids::{EventId, InvalidIdError, VtiId};
pub use vti::{Vti, VtiMetadata};
