//! Last `{server, path}` per panel, remembered per client address.
//!
//! Kept in memory and, when a file is configured, persisted as JSON
//! (`{"<ip>": {"source": {...}, "target": {...}}}`) after every save.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use dashmap::DashMap;
use tokio::sync::Mutex;
use turbofile_core::dto::PanelLocation;
use turbofile_core::PanelSide;

type ClientPaths = HashMap<PanelSide, PanelLocation>;

pub struct ClientPathStore {
    file: Option<PathBuf>,
    paths: DashMap<String, ClientPaths>,
    write_lock: Mutex<()>,
}

impl ClientPathStore {
    pub fn in_memory() -> Self {
        Self {
            file: None,
            paths: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Loads `file` if it exists. A missing or unreadable file starts empty.
    pub fn load(file: PathBuf) -> Self {
        let mut paths = DashMap::new();
        match std::fs::read_to_string(&file) {
            Ok(text) if !text.trim().is_empty() => {
                match serde_json::from_str::<HashMap<String, ClientPaths>>(&text) {
                    Ok(saved) => paths.extend(saved),
                    Err(e) => tracing::warn!(file = %file.display(), "ignoring client path file: {e}"),
                }
            }
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(file = %file.display(), "cannot read client path file: {e}"),
        }
        Self {
            file: Some(file),
            paths,
            write_lock: Mutex::new(()),
        }
    }

    pub fn get(&self, client: &str) -> ClientPaths {
        self.paths.get(client).map(|p| p.clone()).unwrap_or_default()
    }

    pub async fn remember(&self, client: &str, panel: PanelSide, location: PanelLocation) -> anyhow::Result<()> {
        self.paths
            .entry(client.to_string())
            .or_default()
            .insert(panel, location);
        self.persist().await
    }

    async fn persist(&self) -> anyhow::Result<()> {
        let Some(file) = &self.file else {
            return Ok(());
        };
        let _guard = self.write_lock.lock().await;
        let snapshot: BTreeMap<String, ClientPaths> = self
            .paths
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(dir) = file.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }
        let tmp = file.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, file).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use turbofile_core::RemotePath;

    fn location(server: &str, path: &str) -> PanelLocation {
        PanelLocation {
            server: server.to_string(),
            path: RemotePath::new(path),
        }
    }

    #[tokio::test]
    async fn remembers_per_client_and_panel() {
        let store = ClientPathStore::in_memory();
        store.remember("10.0.0.1", PanelSide::Source, location("a", "/x")).await.unwrap();
        store.remember("10.0.0.1", PanelSide::Target, location("b", "/y")).await.unwrap();
        store.remember("10.0.0.1", PanelSide::Source, location("a", "/z")).await.unwrap();

        let paths = store.get("10.0.0.1");
        assert_eq!(paths[&PanelSide::Source], location("a", "/z"));
        assert_eq!(paths[&PanelSide::Target], location("b", "/y"));
        assert!(store.get("10.0.0.2").is_empty());
    }

    #[tokio::test]
    async fn survives_reload() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("state/client_paths.json");
        let store = ClientPathStore::load(file.clone());
        store.remember("::1", PanelSide::Target, location("nas", "/share")).await.unwrap();

        let reloaded = ClientPathStore::load(file);
        assert_eq!(reloaded.get("::1")[&PanelSide::Target], location("nas", "/share"));
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("client_paths.json");
        std::fs::write(&file, "{not json").unwrap();
        assert!(ClientPathStore::load(file).get("::1").is_empty());
    }
}
