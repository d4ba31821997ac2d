//! Async orchestration of a [`Workspace`].
//!
//! The [`Driver`] owns the services and performs the I/O that workspace
//! transitions ask for: sending transfer frames, refreshing panels, running
//! the cancel timer and calling the file-operation endpoints with
//! optimistic patches around them.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::browse::engine::BrowseEngine;
use crate::browse::state::LoadKind;
use crate::dto::{CompareRequest, DeleteOutcome, DiffLine, SizeSummary};
use crate::error::{CoreError, CoreResult, TransferRejection};
use crate::event::{Direction, ServerEvent, TransferMode};
use crate::fs::entry::TransferFile;
use crate::fs::path::RemotePath;
use crate::log::LogLevel;
use crate::nav::panel::PanelSide;
use crate::reconcile::{self, Patch, PatchOp};
use crate::service::{DirectoryService, EventSink, FileOpsService, Prompter};
use crate::transfer::session::{CancelAction, TransferRequest};
use crate::workspace::{lock, Effect, SharedWorkspace, Workspace};

#[derive(Clone)]
pub struct Driver {
    ws: SharedWorkspace,
    engine: BrowseEngine,
    dir: Arc<dyn DirectoryService>,
    ops: Arc<dyn FileOpsService>,
    sink: Arc<dyn EventSink>,
    prompter: Arc<dyn Prompter>,
}

impl Driver {
    pub fn new(
        workspace: Workspace,
        dir: Arc<dyn DirectoryService>,
        ops: Arc<dyn FileOpsService>,
        sink: Arc<dyn EventSink>,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        let ws = workspace.into_shared();
        let engine = BrowseEngine::new(Arc::clone(&ws), Arc::clone(&dir));
        Self {
            ws,
            engine,
            dir,
            ops,
            sink,
            prompter,
        }
    }

    pub fn workspace(&self) -> &SharedWorkspace {
        &self.ws
    }

    pub fn engine(&self) -> &BrowseEngine {
        &self.engine
    }

    /// Fetches the server list and the remembered panel locations. A
    /// failure to fetch remembered locations is not an error.
    pub async fn bootstrap(&self) -> CoreResult<()> {
        let servers = self.dir.servers().await?;
        let remembered = match self.dir.client_paths().await {
            Ok(paths) => paths,
            Err(e) => {
                tracing::debug!(error = %e, "no remembered paths");
                Default::default()
            }
        };
        let mut ws = lock(&self.ws);
        tracing::info!(count = servers.len(), "servers loaded");
        ws.set_servers(servers);
        ws.set_remembered(remembered);
        Ok(())
    }

    // ── Browsing ──────────────────────────────────────────────────────

    /// Points `side` at `server` (its default location) and loads it.
    pub async fn select_server(&self, side: PanelSide, server: &str) -> CoreResult<()> {
        let selected = lock(&self.ws).select_server(side, server);
        match selected {
            Some(_) => self.engine.load_page(side, LoadKind::Reset, false).await,
            None => Ok(()),
        }
    }

    pub async fn open_dir(&self, side: PanelSide, path: RemotePath) -> CoreResult<()> {
        if !lock(&self.ws).open_dir(side, path) {
            return Err(CoreError::PanelNotReady("no server selected".to_string()));
        }
        self.engine.load_page(side, LoadKind::Reset, false).await
    }

    pub async fn go_up(&self, side: PanelSide) -> CoreResult<()> {
        if !lock(&self.ws).go_up(side) {
            return Ok(());
        }
        self.engine.load_page(side, LoadKind::Reset, false).await
    }

    pub async fn refresh(&self, side: PanelSide) -> CoreResult<()> {
        self.engine.refresh(side).await
    }

    pub async fn set_show_hidden(&self, side: PanelSide, show_hidden: bool) -> CoreResult<()> {
        lock(&self.ws).set_show_hidden(side, show_hidden);
        self.engine.load_page(side, LoadKind::Reset, false).await
    }

    pub async fn scroll_to(&self, side: PanelSide, index: usize) -> CoreResult<()> {
        self.engine.ensure_visible(side, index).await
    }

    pub async fn quick_locate(&self, side: PanelSide, keyword: &str) -> CoreResult<Option<usize>> {
        self.engine.quick_locate(side, keyword).await
    }

    /// Loads the whole listing, then selects all of it.
    pub async fn select_all(&self, side: PanelSide) -> CoreResult<usize> {
        self.engine.ensure_all_loaded(side).await?;
        Ok(lock(&self.ws).select_all_loaded(side))
    }

    // ── Transfers ─────────────────────────────────────────────────────

    /// Validates, confirms a move, then starts `request`.
    ///
    /// Preconditions are checked before the confirmation prompt and again
    /// after it, since the user may take arbitrarily long to answer. A move
    /// is confirmed unless `request.skip_move_confirm` is set or moves are
    /// configured not to ask.
    pub async fn start_transfer(&self, request: TransferRequest) -> Result<(), TransferRejection> {
        let confirm_move = {
            let mut ws = lock(&self.ws);
            if let Err(rejection) = ws.validate_transfer(&request) {
                drop(ws);
                self.prompter.alert(&rejection.to_string());
                return Err(rejection);
            }
            ws.config().transfer.confirm_move
        };

        if request.mode == TransferMode::Move && confirm_move && !request.skip_move_confirm {
            let question = format!(
                "Move {} item(s) to {}:{}? The source will be deleted.",
                request.files.len(),
                request.target_server.as_deref().unwrap_or_default(),
                request
                    .target_path
                    .as_ref()
                    .map(RemotePath::as_str)
                    .unwrap_or_default(),
            );
            if !self.prompter.confirm(&question).await {
                lock(&self.ws).push_log(LogLevel::Info, "Move cancelled");
                return Err(TransferRejection::NotConfirmed);
            }
        }

        let message = {
            let mut ws = lock(&self.ws);
            match ws.start_transfer(request) {
                Ok(message) => message,
                Err(rejection) => {
                    drop(ws);
                    self.prompter.alert(&rejection.to_string());
                    return Err(rejection);
                }
            }
        };
        if let Err(e) = self.sink.send(message) {
            lock(&self.ws).abort_unsent_transfer(&e.to_string());
            let rejection = TransferRejection::SendFailed(e.to_string());
            self.prompter.alert(&rejection.to_string());
            return Err(rejection);
        }
        Ok(())
    }

    /// Transfers the selection of the panel `direction` reads from.
    pub async fn transfer_selection(
        &self,
        direction: Direction,
        mode: TransferMode,
    ) -> Result<(), TransferRejection> {
        let request = lock(&self.ws).selection_request(direction, mode);
        match request {
            Ok(request) => self.start_transfer(request).await,
            Err(rejection) => {
                self.prompter.alert(&rejection.to_string());
                Err(rejection)
            }
        }
    }

    /// Moves `files` into `dir`, a folder in the same panel, without asking.
    pub async fn drop_move(
        &self,
        side: PanelSide,
        files: Vec<TransferFile>,
        dir: RemotePath,
    ) -> Result<(), TransferRejection> {
        let request = lock(&self.ws).drop_move_request(side, files, dir);
        self.start_transfer(request).await
    }

    pub fn copy_selection(&self, mode: TransferMode) -> Result<usize, TransferRejection> {
        let result = lock(&self.ws).copy_selection(mode);
        if let Err(TransferRejection::AmbiguousSelection) = &result {
            self.prompter
                .alert(&TransferRejection::AmbiguousSelection.to_string());
        }
        result
    }

    /// Pastes the clipboard into `dest`.
    pub async fn paste(&self, dest: PanelSide) -> Result<(), TransferRejection> {
        let request = lock(&self.ws).paste_request(dest)?;
        self.start_transfer(request).await?;
        lock(&self.ws).clipboard_pasted();
        Ok(())
    }

    /// Asks the server to cancel. Without an answer within the cancel
    /// timeout the transfer is abandoned locally.
    pub fn cancel_transfer(&self) -> CoreResult<()> {
        let (action, timeout) = {
            let mut ws = lock(&self.ws);
            let timeout = ws.config().transfer.cancel_timeout();
            (ws.cancel_transfer(), timeout)
        };
        if let CancelAction::Send {
            message,
            transfer_id,
        } = action
        {
            let ws = Arc::clone(&self.ws);
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                lock(&ws).cancel_timed_out(&transfer_id);
            });
            self.sink.send(message)?;
        }
        Ok(())
    }

    pub fn force_cancel_transfer(&self) -> CoreResult<()> {
        let message = lock(&self.ws).force_cancel_transfer();
        match message {
            Some(message) => self.sink.send(message),
            None => Ok(()),
        }
    }

    /// Feeds one inbound event through the workspace and performs the
    /// resulting effects. Refreshes run in the background.
    pub fn handle_event(&self, event: ServerEvent) {
        let effects = lock(&self.ws).handle_event(event);
        for effect in effects {
            match effect {
                Effect::Send(message) => {
                    if let Err(e) = self.sink.send(message) {
                        tracing::warn!(error = %e, "failed to send frame");
                    }
                }
                Effect::Refresh(side) => {
                    let engine = self.engine.clone();
                    tokio::spawn(async move { engine.refresh_silently(side).await });
                }
            }
        }
    }

    /// Handles inbound events until the channel closes.
    pub async fn run_events(&self, mut events: mpsc::UnboundedReceiver<ServerEvent>) {
        while let Some(event) = events.recv().await {
            self.handle_event(event);
        }
        tracing::debug!("transfer channel closed");
    }

    // ── File operations ───────────────────────────────────────────────

    fn location(&self, side: PanelSide) -> CoreResult<(String, RemotePath)> {
        let ws = lock(&self.ws);
        let panel = ws.panel(side);
        match (panel.server(), panel.path()) {
            (Some(server), Some(path)) => Ok((server.to_string(), path.clone())),
            _ => Err(CoreError::PanelNotReady(format!("{side:?} panel has no location"))),
        }
    }

    fn revert(&self, patch: Option<Patch>) {
        if let Some(patch) = patch {
            let mut ws = lock(&self.ws);
            let side = patch.side();
            patch.revert(ws.panel_mut(side));
        }
    }

    /// Refreshes every panel showing `dir` on `server`, in the background.
    fn refresh_dir(&self, server: &str, dir: &RemotePath) {
        let sides = lock(&self.ws).panels_browsing(server, dir);
        for side in sides {
            let engine = self.engine.clone();
            tokio::spawn(async move { engine.refresh_silently(side).await });
        }
    }

    fn report<T>(&self, what: &str, result: &CoreResult<T>, success: impl FnOnce(&T) -> String) {
        let mut ws = lock(&self.ws);
        match result {
            Ok(value) => {
                ws.push_log(LogLevel::Success, success(value));
            }
            Err(e) => {
                tracing::warn!(error = %e, "{what} failed");
                ws.push_log(LogLevel::Error, format!("❌ {what} failed: {e}"));
            }
        }
    }

    pub async fn create_folder(&self, side: PanelSide, name: &str) -> CoreResult<String> {
        self.create_entry(side, name, true).await
    }

    pub async fn create_file(&self, side: PanelSide, name: &str) -> CoreResult<String> {
        self.create_entry(side, name, false).await
    }

    async fn create_entry(&self, side: PanelSide, name: &str, is_dir: bool) -> CoreResult<String> {
        let name = validate_name(name)?;
        let (server, parent) = self.location(side)?;
        let patch = {
            let mut ws = lock(&self.ws);
            reconcile::apply(
                ws.panel_mut(side),
                PatchOp::Insert {
                    server: server.clone(),
                    parent: parent.clone(),
                    files: vec![TransferFile::new(parent.join(name), is_dir)],
                },
            )
        };

        let result = if is_dir {
            self.ops.create_folder(&server, &parent, name).await
        } else {
            self.ops.create_file(&server, &parent, name).await
        };
        if result.is_err() {
            self.revert(patch);
        }
        let what = if is_dir { "create folder" } else { "create file" };
        self.report(what, &result, |msg| {
            if msg.is_empty() {
                format!("Created {name}")
            } else {
                msg.clone()
            }
        });
        self.refresh_dir(&server, &parent);
        result
    }

    /// Renames `old_path` to `new_name`. The selection is cleared on
    /// success.
    pub async fn rename(&self, side: PanelSide, old_path: &RemotePath, new_name: &str) -> CoreResult<String> {
        let new_name = validate_name(new_name)?;
        let (server, _) = self.location(side)?;
        let patch = {
            let mut ws = lock(&self.ws);
            reconcile::apply(
                ws.panel_mut(side),
                PatchOp::Rename {
                    server: server.clone(),
                    old_path: old_path.clone(),
                    new_name: new_name.to_string(),
                },
            )
        };

        let result = self.ops.rename(&server, old_path, new_name).await;
        match &result {
            Ok(_) => lock(&self.ws).clear_selection(side),
            Err(_) => self.revert(patch),
        }
        self.report("rename", &result, |_| {
            format!("Renamed {} to {new_name}", old_path.file_name())
        });
        self.refresh_dir(&server, &old_path.parent());
        result
    }

    /// Deletes `paths` after confirmation. Entries disappear once the
    /// server reports them deleted; failed items stay.
    pub async fn delete(&self, side: PanelSide, paths: &[RemotePath]) -> CoreResult<DeleteOutcome> {
        if paths.is_empty() {
            return Err(CoreError::InvalidName("nothing to delete".to_string()));
        }
        let (server, dir) = self.location(side)?;
        let question = format!("Delete {} item(s) on {server}? This cannot be undone.", paths.len());
        if !self.prompter.confirm(&question).await {
            return Err(CoreError::Cancelled);
        }

        let result = self.ops.delete(&server, paths).await;
        if let Ok(outcome) = &result {
            let failed: HashSet<&RemotePath> = outcome.failed_items.iter().map(|f| &f.path).collect();
            let deleted: Vec<RemotePath> = paths
                .iter()
                .filter(|p| !failed.contains(p))
                .cloned()
                .collect();
            let mut ws = lock(&self.ws);
            for side in PanelSide::BOTH {
                reconcile::apply(
                    ws.panel_mut(side),
                    PatchOp::Remove {
                        server: server.clone(),
                        parent: dir.clone(),
                        paths: deleted.clone(),
                    },
                );
            }
            ws.previews_mut().invalidate(&server, &deleted);
            for item in &outcome.failed_items {
                ws.push_log(LogLevel::Warning, format!("⚠️ {}: {}", item.path, item.error));
            }
        }
        self.report("delete", &result, |outcome| {
            format!("Deleted {} item(s)", outcome.deleted_count)
        });
        self.refresh_dir(&server, &dir);
        result
    }

    /// Size of `path`, served from the preview cache when known.
    pub async fn compute_size(&self, side: PanelSide, path: &RemotePath) -> CoreResult<SizeSummary> {
        let (server, _) = self.location(side)?;
        if let Some(cached) = lock(&self.ws).previews().get(&server, path) {
            return Ok(cached);
        }
        let result = self.ops.compute_size(&server, path).await;
        if let Ok(summary) = &result {
            lock(&self.ws)
                .previews_mut()
                .insert(&server, path.clone(), summary.clone());
        }
        self.report("compute size", &result, |s| {
            format!(
                "{}: {} ({} files, {} folders)",
                path.file_name(),
                s.size_human,
                s.file_count,
                s.dir_count
            )
        });
        result
    }

    pub async fn compress(&self, side: PanelSide, path: &RemotePath) -> CoreResult<RemotePath> {
        let (server, _) = self.location(side)?;
        let result = self.ops.compress(&server, path).await;
        self.report("compress", &result, |archive| format!("Created {archive}"));
        self.refresh_dir(&server, &path.parent());
        result
    }

    pub async fn extract(&self, side: PanelSide, path: &RemotePath) -> CoreResult<String> {
        let (server, _) = self.location(side)?;
        let result = self.ops.extract(&server, path).await;
        self.report("extract", &result, |msg| msg.clone());
        self.refresh_dir(&server, &path.parent());
        result
    }

    /// Starts a script; its output arrives as `run_output` events.
    pub async fn run_file(&self, side: PanelSide, path: &RemotePath) -> CoreResult<String> {
        let (server, _) = self.location(side)?;
        let result = self.ops.run_file(&server, path).await;
        self.report("run", &result, |run_id| {
            format!("▶ Started {} ({run_id})", path.file_name())
        });
        result
    }

    /// Side-by-side diff of one file from each panel.
    pub async fn compare(
        &self,
        left: (PanelSide, &RemotePath),
        right: (PanelSide, &RemotePath),
    ) -> CoreResult<Vec<DiffLine>> {
        let (server_a, _) = self.location(left.0)?;
        let (server_b, _) = self.location(right.0)?;
        let request = CompareRequest {
            server_a,
            path_a: left.1.clone(),
            server_b,
            path_b: right.1.clone(),
        };
        self.ops.compare_files(&request).await
    }
}

fn validate_name(name: &str) -> CoreResult<&str> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(CoreError::InvalidName(name.to_string()));
    }
    Ok(name)
}
