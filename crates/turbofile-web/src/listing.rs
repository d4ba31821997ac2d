//! Sorted directory listings cached per `server:path:hidden`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use turbofile_core::{filter_hidden, sort_entries, FileEntry, RemotePath};

use crate::backend::{Backend, BackendResult};

struct Cached {
    loaded_at: Instant,
    entries: Arc<Vec<FileEntry>>,
}

pub struct ListingCache {
    ttl: Duration,
    entries: DashMap<String, Cached>,
}

impl ListingCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    fn key(server: &str, dir: &RemotePath, show_hidden: bool) -> String {
        format!("{server}:{dir}:{show_hidden}")
    }

    /// The listing of `dir`, directories first in natural order, hidden
    /// entries dropped unless `show_hidden`. `force` bypasses and replaces
    /// the cached copy.
    pub async fn get_or_load(
        &self,
        backend: &dyn Backend,
        server: &str,
        dir: &RemotePath,
        show_hidden: bool,
        force: bool,
    ) -> BackendResult<Arc<Vec<FileEntry>>> {
        if force {
            self.invalidate(server, dir);
        }
        let key = Self::key(server, dir, show_hidden);
        let cached = self
            .entries
            .get(&key)
            .filter(|c| c.loaded_at.elapsed() < self.ttl)
            .map(|c| Arc::clone(&c.entries));
        if let Some(entries) = cached {
            return Ok(entries);
        }

        let raw = backend.list(dir).await?;
        let entries = Arc::new(sort_entries(&filter_hidden(raw, show_hidden)));
        tracing::debug!(server, dir = %dir, count = entries.len(), "listing loaded");
        self.entries.insert(
            key,
            Cached {
                loaded_at: Instant::now(),
                entries: Arc::clone(&entries),
            },
        );
        Ok(entries)
    }

    /// Drops both hidden/visible variants of `dir`.
    pub fn invalidate(&self, server: &str, dir: &RemotePath) -> usize {
        [true, false]
            .into_iter()
            .filter(|hidden| self.entries.remove(&Self::key(server, dir, *hidden)).is_some())
            .count()
    }

    pub fn purge_expired(&self) {
        let ttl = self.ttl;
        self.entries.retain(|_, c| c.loaded_at.elapsed() < ttl);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::local::LocalBackend;
    use tempfile::TempDir;
    use turbofile_core::OsType;

    fn setup() -> (TempDir, LocalBackend, RemotePath) {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();
        std::fs::create_dir(dir.path().join("z")).unwrap();
        let root = RemotePath::new(dir.path().to_string_lossy());
        (dir, LocalBackend::new(OsType::Posix), root)
    }

    fn names(entries: &[FileEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.name()).collect()
    }

    #[tokio::test]
    async fn sorted_and_filtered() {
        let (_dir, backend, root) = setup();
        let cache = ListingCache::new(Duration::from_secs(60));
        let visible = cache.get_or_load(&backend, "local", &root, false, false).await.unwrap();
        assert_eq!(names(&visible), vec!["z", "b.txt"]);
        let all = cache.get_or_load(&backend, "local", &root, true, false).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn cached_until_forced() {
        let (dir, backend, root) = setup();
        let cache = ListingCache::new(Duration::from_secs(60));
        cache.get_or_load(&backend, "local", &root, false, false).await.unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();

        let stale = cache.get_or_load(&backend, "local", &root, false, false).await.unwrap();
        assert_eq!(stale.len(), 2);
        let fresh = cache.get_or_load(&backend, "local", &root, false, true).await.unwrap();
        assert_eq!(names(&fresh), vec!["z", "a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn expired_entries_reload() {
        let (dir, backend, root) = setup();
        let cache = ListingCache::new(Duration::ZERO);
        cache.get_or_load(&backend, "local", &root, false, false).await.unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let listing = cache.get_or_load(&backend, "local", &root, false, false).await.unwrap();
        assert_eq!(listing.len(), 3);
        cache.purge_expired();
        assert_eq!(cache.len(), 0);
    }

    #[tokio::test]
    async fn invalidate_drops_both_variants() {
        let (_dir, backend, root) = setup();
        let cache = ListingCache::new(Duration::from_secs(60));
        cache.get_or_load(&backend, "local", &root, false, false).await.unwrap();
        cache.get_or_load(&backend, "local", &root, true, false).await.unwrap();
        assert_eq!(cache.invalidate("local", &root), 2);
        assert_eq!(cache.invalidate("other", &root), 0);
    }
}
