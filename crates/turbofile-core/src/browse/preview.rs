//! Cache of per-path preview data.
//!
//! Entries are keyed by server and path. Invalidating a path drops the entry
//! for that path and every entry beneath it.

use std::collections::HashMap;

use crate::fs::path::RemotePath;

#[derive(Debug, Clone)]
pub struct PreviewCache<V> {
    entries: HashMap<(String, RemotePath), V>,
}

impl<V> Default for PreviewCache<V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<V: Clone> PreviewCache<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, server: &str, path: &RemotePath) -> Option<V> {
        self.entries
            .get(&(server.to_string(), path.clone()))
            .cloned()
    }

    pub fn insert(&mut self, server: &str, path: RemotePath, value: V) {
        self.entries.insert((server.to_string(), path), value);
    }

    /// Drops cached data for `paths` and anything under them. Returns the
    /// number of entries removed.
    pub fn invalidate(&mut self, server: &str, paths: &[RemotePath]) -> usize {
        if paths.is_empty() {
            return 0;
        }
        let before = self.entries.len();
        self.entries
            .retain(|(s, cached), _| s != server || !paths.iter().any(|p| p.contains(cached)));
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(server, removed, "preview cache invalidated");
        }
        removed
    }

    pub fn invalidate_under(&mut self, server: &str, dir: &RemotePath) -> usize {
        self.invalidate(server, std::slice::from_ref(dir))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
