//! Paged directory browsing.
//!
//! - [`state`]: the per-panel listing window and its ticketed load phases.
//! - [`engine`]: async page fetching with abort-on-supersede, debounced
//!   jumps, load-all aggregation and quick locate.
//! - [`preview`]: per-path cache of derived data, invalidated by refreshes
//!   and deletes.

pub mod engine;
pub mod preview;
pub mod state;

pub use engine::BrowseEngine;
pub use preview::PreviewCache;
pub use state::{BrowseState, LoadKind, LoadPhase};
