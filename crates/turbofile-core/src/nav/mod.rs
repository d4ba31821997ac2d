//! Panels, their selections and listing order.

pub mod filter;
pub mod panel;
pub mod selection;

pub use panel::{Panel, PanelSide};
pub use selection::Selection;
