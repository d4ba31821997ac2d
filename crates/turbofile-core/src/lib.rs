//! TurboFile core library: transfer orchestration for a dual-pane remote
//! file manager.
//!
//! `turbofile-core` holds the client-side state machines and the async
//! plumbing around them. It is UI-agnostic: a frontend drives a
//! [`Driver`], renders the [`Workspace`] and answers [`Prompter`] questions.
//!
//! # Modules
//!
//! - [`transfer`] : The transfer session, the copy/cut clipboard and progress snapshots.
//! - [`browse`] : Paginated directory windows, the page loader and the preview cache.
//! - [`reconcile`] : Optimistic listing patches and their inverses.
//! - [`nav`] : Panels, selections, natural sorting and filtering.
//! - [`workspace`] : Both panels plus the transfer session as one synchronous state object.
//! - [`driver`] : Async orchestration: services, timers and inbound events.
//! - [`service`] / [`http`] : Service traits and their `reqwest` implementation.
//! - [`socket`] : The `/ws/transfer` client feeding the driver.
//! - [`event`] / [`dto`] : Wire types for the transfer channel and the HTTP API.
//! - [`config`] : TOML-based settings.
//! - [`error`] : Unified error type ([`CoreError`]) and result alias ([`CoreResult`]).

pub mod browse;
pub mod config;
pub mod driver;
pub mod dto;
pub mod error;
pub mod event;
pub mod fs;
pub mod http;
pub mod log;
pub mod nav;
pub mod reconcile;
pub mod service;
pub mod socket;
pub mod transfer;
pub mod workspace;

#[cfg(test)]
mod testing;

pub use browse::{BrowseEngine, BrowseState, LoadKind, LoadPhase, PreviewCache};
pub use config::settings::Config;
pub use driver::Driver;
pub use error::{CoreError, CoreResult, TransferRejection};
pub use event::{ClientMessage, Direction, ServerEvent, TransferMode};
pub use fs::entry::{FileEntry, TransferFile};
pub use fs::path::{OsType, RemotePath};
pub use http::HttpClient;
pub use log::{ActivityLog, LogLevel};
pub use nav::filter::{filter_hidden, find_first_match, natural_cmp, sort_entries};
pub use nav::panel::{Panel, PanelSide};
pub use service::{DirectoryService, EventSink, FileOpsService, Prompter};
pub use socket::TransferSocket;
pub use transfer::session::{TransferRequest, TransferSession};
pub use workspace::{SharedWorkspace, Workspace};

/// Normalises a string to NFC (composed) form.
///
/// macOS stores filenames in NFD (decomposed), which makes Korean Hangul
/// show up as individual Jamo. Names from every backend go through this.
pub fn nfc_string(s: &str) -> String {
    use unicode_normalization::UnicodeNormalization;
    s.nfc().collect()
}
