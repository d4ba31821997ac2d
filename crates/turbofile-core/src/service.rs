//! Seams between the orchestration core and the outside world.
//!
//! The core never talks to the network directly. Directory listings and
//! file operations go through [`DirectoryService`] and [`FileOpsService`],
//! outbound transfer frames through an [`EventSink`], and anything that
//! needs the user through a [`Prompter`]. [`crate::http::HttpClient`]
//! implements the service traits against `turbofile-web` and
//! [`crate::socket::TransferSocket`] carries the transfer frames; tests use
//! in-memory fakes.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::dto::{
    BrowsePage, BrowseRequest, ClientPathSave, CompareRequest, DeleteOutcome, DiffLine,
    PanelLocation, QuickSearchRequest, SearchHit, ServerInfo, SizeSummary,
};
use crate::error::{CoreError, CoreResult};
use crate::event::ClientMessage;
use crate::fs::path::RemotePath;
use crate::nav::panel::PanelSide;

/// Read side: servers, listings, search and remembered locations.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    async fn servers(&self) -> CoreResult<Vec<ServerInfo>>;

    async fn browse(&self, request: &BrowseRequest) -> CoreResult<BrowsePage>;

    async fn quick_search(&self, request: &QuickSearchRequest) -> CoreResult<Option<SearchHit>>;

    async fn client_paths(&self) -> CoreResult<HashMap<PanelSide, PanelLocation>>;

    async fn save_client_path(&self, save: &ClientPathSave) -> CoreResult<()>;
}

/// Write side: every mutating request/response operation.
#[async_trait]
pub trait FileOpsService: Send + Sync {
    async fn delete(&self, server: &str, paths: &[RemotePath]) -> CoreResult<DeleteOutcome>;

    async fn create_folder(&self, server: &str, parent: &RemotePath, name: &str)
        -> CoreResult<String>;

    async fn create_file(&self, server: &str, parent: &RemotePath, name: &str) -> CoreResult<String>;

    async fn rename(&self, server: &str, old_path: &RemotePath, new_name: &str) -> CoreResult<String>;

    async fn compute_size(&self, server: &str, path: &RemotePath) -> CoreResult<SizeSummary>;

    async fn compress(&self, server: &str, path: &RemotePath) -> CoreResult<RemotePath>;

    async fn extract(&self, server: &str, path: &RemotePath) -> CoreResult<String>;

    /// Starts a script and returns its run id. Output arrives later as
    /// `run_output` events on the transfer channel.
    async fn run_file(&self, server: &str, path: &RemotePath) -> CoreResult<String>;

    async fn compare_files(&self, request: &CompareRequest) -> CoreResult<Vec<DiffLine>>;
}

/// Outbound half of the transfer channel.
pub trait EventSink: Send + Sync {
    fn send(&self, message: ClientMessage) -> CoreResult<()>;
}

impl EventSink for mpsc::UnboundedSender<ClientMessage> {
    fn send(&self, message: ClientMessage) -> CoreResult<()> {
        mpsc::UnboundedSender::send(self, message)
            .map_err(|_| CoreError::Transport("transfer channel closed".to_string()))
    }
}

/// Interactive confirmation and blocking alerts.
#[async_trait]
pub trait Prompter: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;

    fn alert(&self, message: &str);
}

/// Prompter for non-interactive use: confirms everything, logs alerts.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoConfirm;

#[async_trait]
impl Prompter for AutoConfirm {
    async fn confirm(&self, _message: &str) -> bool {
        true
    }

    fn alert(&self, message: &str) {
        tracing::warn!(message, "alert");
    }
}
