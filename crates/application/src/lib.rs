//! Application orchestration layer for Folio.
//!
//! Views never touch [`folio_core::BookState`] directly; they go through a
//! [`Store`] handed to them by the caller, plus the session types here.

mod annotations;
mod reader;
mod recommendations;
mod stats;
mod store;

pub use annotations::{annotations_on_page, submit_annotation};
pub use reader::{MAX_ZOOM, MIN_ZOOM, ReaderSession, ZOOM_STEP};
pub use recommendations::{Credential, RecommendationRequest, RecommendationsPanel, RequestState};
pub use stats::ReadingStats;
pub use store::{MemoryPersistence, Store};
