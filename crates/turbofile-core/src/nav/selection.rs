//! Per-panel selection set.

use std::collections::HashSet;

use crate::fs::entry::{FileEntry, TransferFile};
use crate::fs::path::RemotePath;

/// Ordered set of selected files, unique by path.
///
/// Insertion order is preserved so the first selected item can serve as
/// the anchor for range selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    items: Vec<TransferFile>,
    anchor: Option<RemotePath>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[TransferFile] {
        &self.items
    }

    pub fn to_vec(&self) -> Vec<TransferFile> {
        self.items.clone()
    }

    pub fn contains(&self, path: &RemotePath) -> bool {
        self.items.iter().any(|f| &f.path == path)
    }

    /// Anchor for shift-click range selection.
    pub fn anchor(&self) -> Option<&RemotePath> {
        self.anchor.as_ref()
    }

    /// Adds `file` unless already present. Returns `true` if it was added.
    pub fn insert(&mut self, file: TransferFile) -> bool {
        if self.contains(&file.path) {
            return false;
        }
        if self.anchor.is_none() {
            self.anchor = Some(file.path.clone());
        }
        self.items.push(file);
        true
    }

    /// Removes the entry at `path`. Returns `true` if something was removed.
    pub fn remove(&mut self, path: &RemotePath) -> bool {
        let before = self.items.len();
        self.items.retain(|f| &f.path != path);
        if self.anchor.as_ref() == Some(path) {
            self.anchor = self.items.first().map(|f| f.path.clone());
        }
        before != self.items.len()
    }

    /// Click behaviour: selects `file` if absent, deselects it otherwise.
    pub fn toggle(&mut self, file: TransferFile) {
        if !self.remove(&file.path) {
            self.anchor = Some(file.path.clone());
            self.insert(file);
        }
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.anchor = None;
    }

    /// Replaces the selection with every entry between the anchor and `to`
    /// (inclusive) in `entries`. Without an anchor only `to` is selected.
    pub fn select_range(&mut self, entries: &[FileEntry], to: &RemotePath) {
        let end = match entries.iter().position(|e| e.path() == to) {
            Some(idx) => idx,
            None => return,
        };
        let start = self
            .anchor
            .as_ref()
            .and_then(|a| entries.iter().position(|e| e.path() == a))
            .unwrap_or(end);
        let anchor = entries[start].path().clone();
        let (lo, hi) = if start <= end { (start, end) } else { (end, start) };

        self.items = entries[lo..=hi].iter().map(TransferFile::from).collect();
        self.anchor = Some(anchor);
    }

    /// Selects every entry in `entries`, in listing order.
    pub fn select_all(&mut self, entries: &[FileEntry]) {
        self.items = entries.iter().map(TransferFile::from).collect();
        self.anchor = self.items.first().map(|f| f.path.clone());
    }

    /// Drops every selected entry whose path is in `paths`.
    pub fn remove_paths(&mut self, paths: &HashSet<RemotePath>) -> usize {
        let before = self.items.len();
        self.items.retain(|f| !paths.contains(&f.path));
        if self.anchor.as_ref().is_some_and(|a| paths.contains(a)) {
            self.anchor = self.items.first().map(|f| f.path.clone());
        }
        before - self.items.len()
    }

    /// Rewrites the entry at `old` to point at `new_path`. Returns `true`
    /// if an entry referenced `old`.
    pub fn rename(&mut self, old: &RemotePath, new_path: &RemotePath) -> bool {
        let mut hit = false;
        for item in self.items.iter_mut().filter(|f| &f.path == old) {
            *item = TransferFile::new(new_path.clone(), item.is_directory);
            hit = true;
        }
        if self.anchor.as_ref() == Some(old) {
            self.anchor = Some(new_path.clone());
        }
        hit
    }
}
