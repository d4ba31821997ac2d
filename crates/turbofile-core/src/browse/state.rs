//! Per-panel listing window and its load state machine.
//!
//! A panel shows a window of a possibly huge directory. `items` holds the
//! loaded slice `[window_start, window_start + items.len())` of the sorted
//! server listing; `loaded_count` is where the next forward page starts and
//! `total_count` is the size of the whole listing.
//!
//! Every request gets a ticket stamped with the current generation. Starting
//! a new request or navigating bumps the generation, so a response that
//! comes back for an older ticket is dropped on the floor.

use std::collections::HashSet;

use crate::dto::{BrowsePage, BrowseRequest};
use crate::error::{CoreError, CoreResult};
use crate::fs::entry::FileEntry;
use crate::fs::path::RemotePath;
use crate::nav::filter::{insertion_index, sort_entries};

/// What a page request does with the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadKind {
    /// Reload from offset 0, replacing the window.
    Reset,
    /// Fetch the page after the window and append it.
    Append,
    /// Replace the window with the page starting at the given offset.
    Jump(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadPhase {
    Idle,
    Loading(LoadKind),
    Error(String),
}

/// A request issued by [`BrowseState::begin`], to be handed back with its
/// response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageTicket {
    pub generation: u64,
    pub kind: LoadKind,
    pub request: BrowseRequest,
}

/// Start of the page containing `index`.
pub fn page_start(index: usize, page_size: usize) -> usize {
    let page_size = page_size.max(1);
    (index / page_size) * page_size
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseState {
    server: Option<String>,
    path: Option<RemotePath>,
    show_hidden: bool,
    items: Vec<FileEntry>,
    total_count: usize,
    has_more: bool,
    window_start: usize,
    loaded_count: usize,
    generation: u64,
    phase: LoadPhase,
}

impl Default for BrowseState {
    fn default() -> Self {
        Self {
            server: None,
            path: None,
            show_hidden: false,
            items: Vec::new(),
            total_count: 0,
            has_more: false,
            window_start: 0,
            loaded_count: 0,
            generation: 0,
            phase: LoadPhase::Idle,
        }
    }
}

impl BrowseState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(&self) -> Option<&str> {
        self.server.as_deref()
    }

    pub fn path(&self) -> Option<&RemotePath> {
        self.path.as_ref()
    }

    pub fn show_hidden(&self) -> bool {
        self.show_hidden
    }

    pub fn items(&self) -> &[FileEntry] {
        &self.items
    }

    pub fn total_count(&self) -> usize {
        self.total_count
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    pub fn window_start(&self) -> usize {
        self.window_start
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded_count
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> &LoadPhase {
        &self.phase
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, LoadPhase::Loading(_))
    }

    /// Returns `true` when this panel currently shows `path` on `server`.
    pub fn is_browsing(&self, server: &str, path: &RemotePath) -> bool {
        self.server.as_deref() == Some(server) && self.path.as_ref() == Some(path)
    }

    /// Points the panel at `path` on `server`. A change of location empties
    /// the window and invalidates in-flight requests.
    pub fn navigate(&mut self, server: impl Into<String>, path: RemotePath) {
        let server = server.into();
        if self.server.as_deref() == Some(server.as_str()) && self.path.as_ref() == Some(&path) {
            return;
        }
        self.server = Some(server);
        self.path = Some(path);
        self.reset_window();
    }

    /// Forgets the current location, e.g. when the server selection is cleared.
    pub fn clear(&mut self) {
        self.server = None;
        self.path = None;
        self.reset_window();
    }

    /// Toggling hidden files changes the listing, so the window is dropped.
    pub fn set_show_hidden(&mut self, show_hidden: bool) {
        if self.show_hidden != show_hidden {
            self.show_hidden = show_hidden;
            self.reset_window();
        }
    }

    fn reset_window(&mut self) {
        self.items.clear();
        self.total_count = 0;
        self.has_more = false;
        self.window_start = 0;
        self.loaded_count = 0;
        self.generation += 1;
        self.phase = LoadPhase::Idle;
    }

    /// `true` when a forward page can be requested.
    pub fn can_append(&self) -> bool {
        self.has_more && !self.is_loading()
    }

    /// `true` when `index` lies too far outside the loaded window to be
    /// reached by appending.
    pub fn needs_jump(&self, index: usize, margin: usize) -> bool {
        if self.total_count == 0 {
            return false;
        }
        index < self.window_start || index >= self.loaded_count + margin
    }

    /// Absolute listing index of the loaded entry at `path`.
    pub fn index_of(&self, path: &RemotePath) -> Option<usize> {
        self.items
            .iter()
            .position(|e| e.path() == path)
            .map(|pos| self.window_start + pos)
    }

    /// Issues a page request and moves to `Loading`.
    ///
    /// # Errors
    ///
    /// [`CoreError::PanelNotReady`] when no server or path is selected.
    pub fn begin(
        &mut self,
        kind: LoadKind,
        limit: usize,
        force_refresh: bool,
    ) -> CoreResult<PageTicket> {
        let (server, path) = match (&self.server, &self.path) {
            (Some(server), Some(path)) => (server.clone(), path.clone()),
            _ => return Err(CoreError::PanelNotReady("no server or path".to_string())),
        };
        let offset = match kind {
            LoadKind::Reset => 0,
            LoadKind::Append => self.loaded_count,
            LoadKind::Jump(start) => start,
        };
        self.generation += 1;
        self.phase = LoadPhase::Loading(kind);
        Ok(PageTicket {
            generation: self.generation,
            kind,
            request: BrowseRequest {
                server,
                path,
                show_hidden: self.show_hidden,
                offset,
                limit,
                force_refresh,
            },
        })
    }

    fn is_current(&self, ticket: &PageTicket) -> bool {
        ticket.generation == self.generation
            && self.is_browsing(&ticket.request.server, &ticket.request.path)
    }

    /// Applies a page. Returns `false` (and changes nothing) for a stale ticket.
    pub fn apply(&mut self, ticket: &PageTicket, page: BrowsePage) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        match ticket.kind {
            LoadKind::Reset | LoadKind::Jump(_) => {
                self.items = sort_entries(&dedup_by_path(page.files));
                self.window_start = page.offset;
            }
            LoadKind::Append => {
                let known: HashSet<RemotePath> =
                    self.items.iter().map(|e| e.path().clone()).collect();
                let mut merged = std::mem::take(&mut self.items);
                merged.extend(
                    dedup_by_path(page.files)
                        .into_iter()
                        .filter(|e| !known.contains(e.path())),
                );
                self.items = sort_entries(&merged);
            }
        }
        self.loaded_count = page.loaded_count.max(self.window_start);
        self.has_more = page.has_more;
        self.total_count = page.total_count.max(self.window_start + self.items.len());
        self.phase = LoadPhase::Idle;
        true
    }

    /// Records a failed request. Stale failures are ignored.
    pub fn fail(&mut self, ticket: &PageTicket, message: impl Into<String>) -> bool {
        if !self.is_current(ticket) {
            return false;
        }
        self.phase = LoadPhase::Error(message.into());
        true
    }

    /// Inserts `entry` at its sorted position unless its path is present.
    pub(crate) fn insert_entry(&mut self, entry: FileEntry) -> bool {
        if self.items.iter().any(|e| e.path() == entry.path()) {
            return false;
        }
        let idx = insertion_index(&self.items, &entry);
        self.items.insert(idx, entry);
        self.total_count += 1;
        self.loaded_count += 1;
        true
    }

    /// Removes every entry whose path is in `paths`, returning them with
    /// their former positions (ascending).
    pub(crate) fn remove_paths(&mut self, paths: &HashSet<RemotePath>) -> Vec<(usize, FileEntry)> {
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(self.items.len());
        for (idx, entry) in std::mem::take(&mut self.items).into_iter().enumerate() {
            if paths.contains(entry.path()) {
                removed.push((idx, entry));
            } else {
                kept.push(entry);
            }
        }
        self.items = kept;
        self.total_count = self.total_count.saturating_sub(removed.len());
        self.loaded_count = self.loaded_count.saturating_sub(removed.len());
        removed
    }

    /// Puts back entries returned by [`BrowseState::remove_paths`].
    pub(crate) fn restore(&mut self, removed: &[(usize, FileEntry)]) {
        for (idx, entry) in removed {
            let idx = (*idx).min(self.items.len());
            self.items.insert(idx, entry.clone());
        }
        self.total_count += removed.len();
        self.loaded_count += removed.len();
    }

    /// Moves the entry at `old` to `new_path`, keeping sort order. Returns
    /// the renamed entry.
    pub(crate) fn rename_entry(&mut self, old: &RemotePath, new_path: &RemotePath) -> Option<FileEntry> {
        let pos = self.items.iter().position(|e| e.path() == old)?;
        if self.items.iter().any(|e| e.path() == new_path) {
            return None;
        }
        let renamed = self.items.remove(pos).renamed(new_path.clone());
        let idx = insertion_index(&self.items, &renamed);
        self.items.insert(idx, renamed.clone());
        Some(renamed)
    }
}

fn dedup_by_path(entries: Vec<FileEntry>) -> Vec<FileEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.path().clone()))
        .collect()
}
