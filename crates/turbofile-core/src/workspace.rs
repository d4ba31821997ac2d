//! The client-side state of one TurboFile window.
//!
//! A [`Workspace`] owns the two panels, the transfer session, the clipboard,
//! the activity log and the preview cache. Everything here is synchronous:
//! handlers mutate state and return [`Effect`]s describing the I/O the
//! caller must perform. [`crate::driver::Driver`] shares a workspace behind
//! a mutex and carries out those effects.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::browse::preview::PreviewCache;
use crate::config::settings::Config;
use crate::dto::{ClientPathSave, FailedItem, PanelLocation, ServerInfo, SizeSummary};
use crate::error::TransferRejection;
use crate::event::{
    CancelStatus, ClientMessage, CompleteStatus, Direction, ServerEvent, TransferMode,
};
use crate::fs::entry::TransferFile;
use crate::fs::path::RemotePath;
use crate::log::{ActivityLog, LogLevel};
use crate::nav::panel::{Panel, PanelSide};
use crate::reconcile::{self, PatchOp};
use crate::transfer::clipboard::TransferClipboard;
use crate::transfer::session::{
    CancelAction, EventDisposition, TransferContext, TransferRequest, TransferSession,
};

/// A workspace shared between the driver, the browse engine and timers.
pub type SharedWorkspace = Arc<Mutex<Workspace>>;

/// Locks `ws`. A panic while holding the lock leaves plain data behind, so a
/// poisoned lock is recovered rather than propagated.
pub fn lock(ws: &SharedWorkspace) -> MutexGuard<'_, Workspace> {
    ws.lock().unwrap_or_else(PoisonError::into_inner)
}

/// I/O requested by a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send a frame on the transfer channel.
    Send(ClientMessage),
    /// Re-browse a panel with `force_refresh`, without surfacing errors.
    Refresh(PanelSide),
}

const FILE_LIST_PREVIEW: usize = 50;

#[derive(Debug)]
pub struct Workspace {
    config: Config,
    source: Panel,
    target: Panel,
    session: TransferSession,
    clipboard: TransferClipboard,
    log: ActivityLog,
    previews: PreviewCache<SizeSummary>,
    servers: BTreeMap<String, ServerInfo>,
    remembered: HashMap<PanelSide, PanelLocation>,
}

impl Workspace {
    pub fn new(config: Config) -> Self {
        let mut source = Panel::new(PanelSide::Source);
        let mut target = Panel::new(PanelSide::Target);
        source.browse_mut().set_show_hidden(config.browse.show_hidden);
        target.browse_mut().set_show_hidden(config.browse.show_hidden);
        Self {
            log: ActivityLog::new(config.log.clone()),
            config,
            source,
            target,
            session: TransferSession::new(),
            clipboard: TransferClipboard::new(),
            previews: PreviewCache::new(),
            servers: BTreeMap::new(),
            remembered: HashMap::new(),
        }
    }

    pub fn into_shared(self) -> SharedWorkspace {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn panel(&self, side: PanelSide) -> &Panel {
        match side {
            PanelSide::Source => &self.source,
            PanelSide::Target => &self.target,
        }
    }

    pub fn panel_mut(&mut self, side: PanelSide) -> &mut Panel {
        match side {
            PanelSide::Source => &mut self.source,
            PanelSide::Target => &mut self.target,
        }
    }

    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    pub fn is_transferring(&self) -> bool {
        self.session.is_active()
    }

    pub fn clipboard(&self) -> &TransferClipboard {
        &self.clipboard
    }

    pub fn log(&self) -> &ActivityLog {
        &self.log
    }

    pub fn previews(&self) -> &PreviewCache<SizeSummary> {
        &self.previews
    }

    pub fn previews_mut(&mut self) -> &mut PreviewCache<SizeSummary> {
        &mut self.previews
    }

    /// Appends to the activity log, applying the progress filter while a
    /// transfer runs.
    pub fn push_log(&mut self, level: LogLevel, message: impl Into<String>) -> bool {
        let transferring = self.session.is_active();
        self.log.push(level, message, transferring)
    }

    // ── Servers and locations ─────────────────────────────────────────

    pub fn set_servers(&mut self, servers: Vec<ServerInfo>) {
        self.servers = servers.into_iter().map(|s| (s.name.clone(), s)).collect();
    }

    pub fn servers(&self) -> impl Iterator<Item = &ServerInfo> {
        self.servers.values()
    }

    pub fn set_remembered(&mut self, paths: HashMap<PanelSide, PanelLocation>) {
        self.remembered = paths;
    }

    pub fn remembered(&self, side: PanelSide) -> Option<&PanelLocation> {
        self.remembered.get(&side)
    }

    /// Records the location a panel just loaded. Returns the save request to
    /// forward to the server.
    pub fn remember_location(&mut self, side: PanelSide) -> Option<ClientPathSave> {
        let panel = self.panel(side);
        let location = PanelLocation {
            server: panel.server()?.to_string(),
            path: panel.path()?.clone(),
        };
        if self.remembered.get(&side) == Some(&location) {
            return None;
        }
        self.remembered.insert(side, location.clone());
        Some(ClientPathSave {
            panel: side,
            server: location.server,
            path: location.path,
        })
    }

    /// Where a panel opens when `server` is selected: the last path used on
    /// that server in this panel, else the configured default, else the
    /// server's advertised default, else its root.
    pub fn default_location(&self, side: PanelSide, server: &str) -> RemotePath {
        if let Some(loc) = self.remembered.get(&side).filter(|l| l.server == server) {
            return loc.path.clone();
        }
        if let Some(path) = self
            .config
            .servers
            .get(server)
            .and_then(|s| s.default_path.clone())
        {
            return path;
        }
        if let Some(info) = self.servers.get(server) {
            return info.default_path.clone();
        }
        self.config.os_of(server).default_root()
    }

    /// Points `side` at `server`. An empty name clears the panel.
    pub fn select_server(&mut self, side: PanelSide, server: &str) -> Option<RemotePath> {
        if server.is_empty() {
            let panel = self.panel_mut(side);
            panel.browse_mut().clear();
            panel.selection_mut().clear();
            return None;
        }
        let path = self.default_location(side, server);
        self.panel_mut(side).navigate(server, path.clone());
        Some(path)
    }

    /// Opens `path` on the panel's current server.
    pub fn open_dir(&mut self, side: PanelSide, path: RemotePath) -> bool {
        let panel = self.panel_mut(side);
        match panel.server().map(str::to_string) {
            Some(server) => {
                panel.navigate(server, path);
                true
            }
            None => false,
        }
    }

    /// Opens the parent of the current directory.
    pub fn go_up(&mut self, side: PanelSide) -> bool {
        let parent = match self.panel(side).path() {
            Some(path) if !path.is_root() => path.parent(),
            _ => return false,
        };
        self.open_dir(side, parent)
    }

    pub fn set_show_hidden(&mut self, side: PanelSide, show_hidden: bool) {
        let panel = self.panel_mut(side);
        panel.browse_mut().set_show_hidden(show_hidden);
        panel.selection_mut().clear();
    }

    /// Panels currently showing `dir` on `server`.
    pub fn panels_browsing(&self, server: &str, dir: &RemotePath) -> Vec<PanelSide> {
        PanelSide::BOTH
            .into_iter()
            .filter(|side| self.panel(*side).browse().is_browsing(server, dir))
            .collect()
    }

    // ── Selection ─────────────────────────────────────────────────────

    pub fn toggle_selection(&mut self, side: PanelSide, path: &RemotePath) -> bool {
        let panel = self.panel_mut(side);
        let file = match panel.browse().items().iter().find(|e| e.path() == path) {
            Some(entry) => TransferFile::from(entry),
            None => return false,
        };
        panel.selection_mut().toggle(file);
        true
    }

    pub fn select_range(&mut self, side: PanelSide, to: &RemotePath) {
        let panel = self.panel_mut(side);
        let items = panel.browse().items().to_vec();
        panel.selection_mut().select_range(&items, to);
    }

    /// Selects every loaded item. Callers load the full listing first.
    pub fn select_all_loaded(&mut self, side: PanelSide) -> usize {
        let panel = self.panel_mut(side);
        let items = panel.browse().items().to_vec();
        panel.selection_mut().select_all(&items);
        panel.selection().len()
    }

    pub fn clear_selection(&mut self, side: PanelSide) {
        self.panel_mut(side).selection_mut().clear();
    }

    // ── Transfers ─────────────────────────────────────────────────────

    /// Builds the transfer for the selection of the panel `direction` reads
    /// from. Refused while the other panel also has a selection.
    pub fn selection_request(
        &mut self,
        direction: Direction,
        mode: TransferMode,
    ) -> Result<TransferRequest, TransferRejection> {
        if !self.source.selection().is_empty() && !self.target.selection().is_empty() {
            let rejection = TransferRejection::AmbiguousSelection;
            self.reject(&rejection);
            return Err(rejection);
        }
        let (from, to) = match direction {
            Direction::Ltr => (&self.source, &self.target),
            Direction::Rtl => (&self.target, &self.source),
        };
        Ok(TransferRequest {
            source_server: from.server().map(str::to_string),
            target_server: to.server().map(str::to_string),
            target_path: to.path().cloned(),
            files: from.selection().to_vec(),
            mode,
            direction,
            refresh_override: None,
            skip_move_confirm: false,
        })
    }

    /// Move of `files` into `dir`, a folder shown in the same panel `side`.
    /// Unconfirmed; only `side` is refreshed afterwards.
    pub fn drop_move_request(
        &self,
        side: PanelSide,
        files: Vec<TransferFile>,
        dir: RemotePath,
    ) -> TransferRequest {
        let server = self.panel(side).server().map(str::to_string);
        let direction = match side {
            PanelSide::Target => Direction::Ltr,
            PanelSide::Source => Direction::Rtl,
        };
        TransferRequest {
            source_server: server.clone(),
            target_server: server,
            target_path: Some(dir),
            files,
            mode: TransferMode::Move,
            direction,
            refresh_override: Some(vec![side]),
            skip_move_confirm: true,
        }
    }

    /// Checks `request` without changing anything; a rejection is logged.
    pub fn validate_transfer(&mut self, request: &TransferRequest) -> Result<(), TransferRejection> {
        let result = self.session.validate(request);
        if let Err(rejection) = &result {
            self.reject(rejection);
        }
        result
    }

    /// Starts `request` and returns the single frame to send.
    pub fn start_transfer(&mut self, request: TransferRequest) -> Result<ClientMessage, TransferRejection> {
        let (fast_mode, parallel) = (self.config.transfer.fast_mode, self.config.transfer.parallel);
        let announce = announcement(&request);
        match self.session.start(request, fast_mode, parallel) {
            Ok(message) => {
                for line in announce {
                    self.log.push(LogLevel::Info, line, false);
                }
                Ok(message)
            }
            Err(rejection) => {
                self.reject(&rejection);
                Err(rejection)
            }
        }
    }

    fn reject(&mut self, rejection: &TransferRejection) {
        tracing::warn!(%rejection, "transfer rejected");
        self.push_log(LogLevel::Warning, format!("⚠️ {rejection}"));
    }

    /// Rolls back a start whose frame could not be sent.
    pub fn abort_unsent_transfer(&mut self, reason: &str) {
        if self.session.abort_unsent() {
            tracing::error!(reason, "start_transfer not sent");
            self.push_log(LogLevel::Error, format!("❌ Transfer not started: {reason}"));
        }
    }

    pub fn cancel_transfer(&mut self) -> CancelAction {
        let action = self.session.cancel();
        match &action {
            CancelAction::Send { transfer_id, .. } => {
                tracing::info!(transfer_id, "cancelling transfer");
                self.push_log(LogLevel::Warning, "⏹ Cancelling transfer...");
            }
            CancelAction::Abandoned => {
                self.push_log(LogLevel::Warning, "⏹ Transfer cancelled before it started");
            }
            CancelAction::AlreadyCancelling | CancelAction::NothingToCancel => {}
        }
        action
    }

    pub fn force_cancel_transfer(&mut self) -> Option<ClientMessage> {
        let was_active = self.session.is_active();
        let message = self.session.force_cancel();
        if was_active {
            self.push_log(LogLevel::Warning, "⏹ Transfer force-cancelled");
        }
        message
    }

    /// Handles the cancel timer firing for `transfer_id`.
    pub fn cancel_timed_out(&mut self, transfer_id: &str) -> bool {
        let reset = self.session.cancel_timed_out(transfer_id);
        if reset {
            self.push_log(
                LogLevel::Warning,
                "⚠️ Cancel was not acknowledged; transfer abandoned",
            );
        }
        reset
    }

    /// Captures the selection of the panel that has one.
    pub fn copy_selection(&mut self, mode: TransferMode) -> Result<usize, TransferRejection> {
        let transferring = self.session.is_active();
        let result = self
            .clipboard
            .capture(&self.source, &self.target, mode, transferring)
            .map(|c| c.files.len());
        match &result {
            Ok(count) => {
                let verb = if mode == TransferMode::Move { "Cut" } else { "Copied" };
                self.push_log(LogLevel::Success, format!("📋 {verb} {count} item(s)"));
            }
            Err(rejection) => self.reject(rejection),
        }
        result
    }

    /// Transfer request for pasting the clipboard into `dest`.
    pub fn paste_request(&mut self, dest: PanelSide) -> Result<TransferRequest, TransferRejection> {
        let transferring = self.session.is_active();
        let origin = match self.clipboard.contents() {
            Some(contents) => contents.origin,
            None => dest,
        };
        let result = self
            .clipboard
            .paste(self.panel(origin), self.panel(dest), transferring);
        if let Err(rejection) = &result {
            self.reject(rejection);
        }
        result
    }

    /// Marks the clipboard as used by a started paste.
    pub fn clipboard_pasted(&mut self) {
        self.clipboard.pasted();
    }

    /// Runs one inbound event through the id filter and the state machine.
    pub fn handle_event(&mut self, event: ServerEvent) -> Vec<Effect> {
        match self.session.filter(&event) {
            EventDisposition::Discard => return Vec::new(),
            EventDisposition::Orphan(transfer_id) => {
                tracing::warn!(transfer_id, "transfer started after local cancel; cancelling");
                return vec![Effect::Send(ClientMessage::CancelTransfer {
                    transfer_id,
                    force: true,
                })];
            }
            EventDisposition::Accept => {}
        }

        match event {
            ServerEvent::TransferStarted { transfer_id, .. } => {
                if self.session.on_started(&transfer_id) {
                    tracing::debug!(transfer_id, "transfer running");
                }
                Vec::new()
            }
            ServerEvent::TransferLog { message, .. } => {
                self.log.push_transfer_log(&message);
                Vec::new()
            }
            ServerEvent::SpeedUpdate(update) => {
                self.session.record_progress(&update);
                Vec::new()
            }
            ServerEvent::TransferComplete {
                transfer_id,
                status,
                message,
                total_time,
                failed_items,
            } => {
                let banner = self
                    .session
                    .progress()
                    .completion_banner(total_time.as_deref());
                let ctx = match self.session.finish() {
                    Some(ctx) => ctx,
                    None => return Vec::new(),
                };
                tracing::info!(transfer_id, ?status, "transfer finished");
                match status {
                    CompleteStatus::Success => {
                        self.commit_transfer(&ctx, &[]);
                        self.log.push(LogLevel::Success, banner, false);
                    }
                    CompleteStatus::PartialSuccess => {
                        self.commit_transfer(&ctx, &failed_items);
                        let summary = message.unwrap_or_else(|| {
                            format!("{} item(s) failed", failed_items.len())
                        });
                        self.log
                            .push(LogLevel::Warning, format!("⚠️ Transfer partially completed: {summary}"), false);
                        for item in &failed_items {
                            self.log
                                .push(LogLevel::Error, format!("❌ {}: {}", item.path, item.error), false);
                        }
                    }
                    CompleteStatus::Failure => {
                        let reason = message.unwrap_or_else(|| "unknown error".to_string());
                        self.log
                            .push(LogLevel::Error, format!("❌ Transfer failed: {reason}"), false);
                    }
                }
                refresh_effects(&ctx)
            }
            ServerEvent::TransferCancelled {
                transfer_id,
                status,
                message,
            } => {
                let ctx = match self.session.finish() {
                    Some(ctx) => ctx,
                    None => return Vec::new(),
                };
                tracing::info!(transfer_id, ?status, "transfer cancelled");
                match status {
                    CancelStatus::Success => {
                        self.log.push(LogLevel::Warning, "⏹ Transfer cancelled", false);
                    }
                    CancelStatus::Failure => {
                        let reason = message.unwrap_or_else(|| "cancel failed".to_string());
                        self.log.push(LogLevel::Error, format!("❌ {reason}"), false);
                    }
                }
                refresh_effects(&ctx)
            }
            ServerEvent::RunOutput {
                run_id,
                message,
                is_error,
                is_final,
                exit_code,
            } => {
                let text = message.trim_end();
                if !text.is_empty() {
                    let level = if is_error { LogLevel::Error } else { LogLevel::Info };
                    self.push_log(level, text.to_string());
                }
                if is_final {
                    let code = exit_code.unwrap_or(-1);
                    let level = if code == 0 { LogLevel::Success } else { LogLevel::Error };
                    self.push_log(level, format!("▶ {run_id} exited with code {code}"));
                }
                Vec::new()
            }
        }
    }

    /// Shows the transferred files before the refresh confirms them. Files
    /// named in `failed` are left out.
    fn commit_transfer(&mut self, ctx: &TransferContext, failed: &[FailedItem]) {
        let done: Vec<TransferFile> = ctx
            .files()
            .iter()
            .filter(|f| !failed.iter().any(|item| failed_matches(item, f)))
            .cloned()
            .collect();
        if done.is_empty() {
            return;
        }

        for side in PanelSide::BOTH {
            reconcile::apply(
                self.panel_mut(side),
                PatchOp::Insert {
                    server: ctx.target_server().to_string(),
                    parent: ctx.target_path().clone(),
                    files: done.clone(),
                },
            );
        }

        if ctx.mode() == TransferMode::Move {
            let mut by_parent: BTreeMap<RemotePath, Vec<RemotePath>> = BTreeMap::new();
            for file in &done {
                by_parent
                    .entry(file.path.parent())
                    .or_default()
                    .push(file.path.clone());
            }
            for (parent, paths) in by_parent {
                for side in PanelSide::BOTH {
                    reconcile::apply(
                        self.panel_mut(side),
                        PatchOp::Remove {
                            server: ctx.source_server().to_string(),
                            parent: parent.clone(),
                            paths: paths.clone(),
                        },
                    );
                }
            }
        }
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

fn refresh_effects(ctx: &TransferContext) -> Vec<Effect> {
    let mut seen = HashSet::new();
    ctx.refresh_sides()
        .into_iter()
        .filter(|side| seen.insert(*side))
        .map(Effect::Refresh)
        .collect()
}

fn failed_matches(item: &FailedItem, file: &TransferFile) -> bool {
    item.path == file.path || item.path.as_str().trim_start_matches('/') == file.name
}

/// Activity log lines announcing a transfer.
fn announcement(request: &TransferRequest) -> Vec<String> {
    let names = request
        .files
        .iter()
        .map(|f| f.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let names = if names.chars().count() > FILE_LIST_PREVIEW {
        let cut: String = names.chars().take(FILE_LIST_PREVIEW).collect();
        format!("{cut}...")
    } else {
        names
    };
    vec![
        format!(
            "📤 Source: {} ({} item(s))",
            request.source_server.as_deref().unwrap_or_default(),
            request.files.len()
        ),
        format!(
            "📥 Target: {}:{}",
            request.target_server.as_deref().unwrap_or_default(),
            request
                .target_path
                .as_ref()
                .map(RemotePath::as_str)
                .unwrap_or_default()
        ),
        format!("📋 Files: {names}"),
    ]
}
