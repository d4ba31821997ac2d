//! In-memory service doubles shared by the unit tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::dto::{
    BrowsePage, BrowseRequest, ClientPathSave, CompareRequest, DeleteOutcome, DiffLine, DiffTag,
    FailedItem, PanelLocation, QuickSearchRequest, SearchHit, ServerInfo, SizeSummary,
};
use crate::error::{CoreError, CoreResult};
use crate::event::ClientMessage;
use crate::fs::entry::{FileEntry, TransferFile};
use crate::fs::path::RemotePath;
use crate::nav::filter::{filter_hidden, find_first_match, sort_entries};
use crate::nav::panel::PanelSide;
use crate::service::{DirectoryService, EventSink, FileOpsService, Prompter};

type DirKey = (String, RemotePath);

#[derive(Default)]
struct State {
    dirs: BTreeMap<DirKey, Vec<FileEntry>>,
    browse_log: Vec<BrowseRequest>,
    search_count: usize,
    saved_paths: Vec<ClientPathSave>,
    browse_failures: VecDeque<String>,
    op_failures: VecDeque<String>,
    browse_delay: Option<Duration>,
    undeletable: Vec<RemotePath>,
}

/// A fake `turbofile-web` holding directory listings in memory.
#[derive(Default)]
pub struct FakeServer {
    state: Mutex<State>,
}

impl FakeServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Creates `dir` with `files` entries named `file_00000.txt`, ...
    pub fn add_dir(&self, server: &str, dir: &str, files: usize) {
        let dir = RemotePath::new(dir);
        let entries = (0..files)
            .map(|i| FileEntry::new(dir.join(&format!("file_{i:05}.txt")), false, 100, None))
            .collect();
        self.state().dirs.insert((server.to_string(), dir), entries);
    }

    pub fn add_entries(&self, server: &str, dir: &str, names: &[&str]) {
        let dir = RemotePath::new(dir);
        let mut state = self.state();
        let entries = state
            .dirs
            .entry((server.to_string(), dir.clone()))
            .or_default();
        for name in names {
            let is_dir = name.ends_with('/');
            entries.push(FileEntry::new(
                dir.join(name.trim_end_matches('/')),
                is_dir,
                100,
                None,
            ));
        }
    }

    pub fn names(&self, server: &str, dir: &str) -> Vec<String> {
        let state = self.state();
        let entries = state
            .dirs
            .get(&(server.to_string(), RemotePath::new(dir)))
            .cloned()
            .unwrap_or_default();
        sort_entries(&entries)
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }

    pub fn browse_log(&self) -> Vec<BrowseRequest> {
        self.state().browse_log.clone()
    }

    pub fn clear_browse_log(&self) {
        self.state().browse_log.clear();
    }

    pub fn search_count(&self) -> usize {
        self.state().search_count
    }

    pub fn saved_paths(&self) -> Vec<ClientPathSave> {
        self.state().saved_paths.clone()
    }

    pub fn fail_next_browse(&self, message: &str) {
        self.state().browse_failures.push_back(message.to_string());
    }

    pub fn fail_next_op(&self, message: &str) {
        self.state().op_failures.push_back(message.to_string());
    }

    pub fn set_browse_delay(&self, delay: Duration) {
        self.state().browse_delay = Some(delay);
    }

    pub fn set_undeletable(&self, path: &str) {
        self.state().undeletable.push(RemotePath::new(path));
    }

    fn take_op_failure(&self) -> CoreResult<()> {
        match self.state().op_failures.pop_front() {
            Some(message) => Err(CoreError::Service(message)),
            None => Ok(()),
        }
    }

    fn insert(&self, server: &str, parent: &RemotePath, name: &str, is_dir: bool) -> CoreResult<()> {
        let mut state = self.state();
        let entries = state
            .dirs
            .get_mut(&(server.to_string(), parent.clone()))
            .ok_or_else(|| CoreError::Service(format!("no such directory: {parent}")))?;
        let path = parent.join(name);
        if entries.iter().any(|e| e.path() == &path) {
            return Err(CoreError::Service(format!("{name} already exists")));
        }
        entries.push(FileEntry::new(path, is_dir, 0, None));
        Ok(())
    }
}

#[async_trait]
impl DirectoryService for FakeServer {
    async fn servers(&self) -> CoreResult<Vec<ServerInfo>> {
        let state = self.state();
        let mut names: Vec<&String> = state.dirs.keys().map(|(s, _)| s).collect();
        names.dedup();
        Ok(names
            .into_iter()
            .map(|name| ServerInfo {
                name: name.clone(),
                os: Default::default(),
                default_path: RemotePath::root(),
                local: false,
            })
            .collect())
    }

    async fn browse(&self, request: &BrowseRequest) -> CoreResult<BrowsePage> {
        let delay = {
            let mut state = self.state();
            state.browse_log.push(request.clone());
            if let Some(message) = state.browse_failures.pop_front() {
                return Err(CoreError::Service(message));
            }
            state.browse_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state();
        let entries = state
            .dirs
            .get(&(request.server.clone(), request.path.clone()))
            .cloned()
            .ok_or_else(|| CoreError::Service(format!("no such directory: {}", request.path)))?;
        let sorted = sort_entries(&filter_hidden(entries, request.show_hidden));
        let total = sorted.len();
        let start = request.offset.min(total);
        let end = (start + request.limit.max(1)).min(total);
        let has_more = end < total;
        Ok(BrowsePage {
            files: sorted[start..end].to_vec(),
            total_count: total,
            offset: start,
            loaded_count: end,
            has_more,
            next_offset: has_more.then_some(end),
        })
    }

    async fn quick_search(&self, request: &QuickSearchRequest) -> CoreResult<Option<SearchHit>> {
        let mut state = self.state();
        state.search_count += 1;
        let entries = state
            .dirs
            .get(&(request.server.clone(), request.path.clone()))
            .cloned()
            .unwrap_or_default();
        let sorted = sort_entries(&filter_hidden(entries, request.show_hidden));
        Ok(find_first_match(&sorted, &request.keyword).map(|(index, entry)| SearchHit {
            file: TransferFile::from(entry),
            index,
        }))
    }

    async fn client_paths(&self) -> CoreResult<HashMap<PanelSide, PanelLocation>> {
        let state = self.state();
        Ok(state
            .saved_paths
            .iter()
            .map(|s| {
                (
                    s.panel,
                    PanelLocation {
                        server: s.server.clone(),
                        path: s.path.clone(),
                    },
                )
            })
            .collect())
    }

    async fn save_client_path(&self, save: &ClientPathSave) -> CoreResult<()> {
        self.state().saved_paths.push(save.clone());
        Ok(())
    }
}

#[async_trait]
impl FileOpsService for FakeServer {
    async fn delete(&self, server: &str, paths: &[RemotePath]) -> CoreResult<DeleteOutcome> {
        self.take_op_failure()?;
        let mut state = self.state();
        let undeletable = state.undeletable.clone();
        let mut outcome = DeleteOutcome::default();
        for path in paths {
            if undeletable.contains(path) {
                outcome.failed_items.push(FailedItem {
                    path: path.clone(),
                    error: "permission denied".into(),
                });
                continue;
            }
            if let Some(entries) = state.dirs.get_mut(&(server.to_string(), path.parent())) {
                let before = entries.len();
                entries.retain(|e| e.path() != path);
                if entries.len() < before {
                    outcome.deleted_count += 1;
                }
            }
        }
        Ok(outcome)
    }

    async fn create_folder(&self, server: &str, parent: &RemotePath, name: &str) -> CoreResult<String> {
        self.take_op_failure()?;
        self.insert(server, parent, name, true)?;
        self.state()
            .dirs
            .insert((server.to_string(), parent.join(name)), Vec::new());
        Ok(format!("created folder {name}"))
    }

    async fn create_file(&self, server: &str, parent: &RemotePath, name: &str) -> CoreResult<String> {
        self.take_op_failure()?;
        self.insert(server, parent, name, false)?;
        Ok(format!("created file {name}"))
    }

    async fn rename(&self, server: &str, old_path: &RemotePath, new_name: &str) -> CoreResult<String> {
        self.take_op_failure()?;
        let mut state = self.state();
        let parent = old_path.parent();
        let entries = state
            .dirs
            .get_mut(&(server.to_string(), parent.clone()))
            .ok_or_else(|| CoreError::Service("no such directory".into()))?;
        let pos = entries
            .iter()
            .position(|e| e.path() == old_path)
            .ok_or_else(|| CoreError::Service("no such file".into()))?;
        let renamed = entries[pos].renamed(parent.join(new_name));
        entries[pos] = renamed;
        Ok(format!("renamed to {new_name}"))
    }

    async fn compute_size(&self, _server: &str, _path: &RemotePath) -> CoreResult<SizeSummary> {
        self.take_op_failure()?;
        Ok(SizeSummary {
            size_bytes: 2048,
            size_human: "2.00 KB".into(),
            file_count: 2,
            dir_count: 1,
        })
    }

    async fn compress(&self, server: &str, path: &RemotePath) -> CoreResult<RemotePath> {
        self.take_op_failure()?;
        let name = format!("{}.zip", path.file_name());
        self.insert(server, &path.parent(), &name, false)?;
        Ok(path.parent().join(&name))
    }

    async fn extract(&self, _server: &str, path: &RemotePath) -> CoreResult<String> {
        self.take_op_failure()?;
        Ok(format!("extracted {}", path.file_name()))
    }

    async fn run_file(&self, _server: &str, _path: &RemotePath) -> CoreResult<String> {
        self.take_op_failure()?;
        Ok("run_1".into())
    }

    async fn compare_files(&self, _request: &CompareRequest) -> CoreResult<Vec<DiffLine>> {
        self.take_op_failure()?;
        Ok(vec![DiffLine {
            tag: DiffTag::Equal,
            left_no: Some(1),
            right_no: Some(1),
            left: "same".into(),
            right: "same".into(),
        }])
    }
}

/// Collects outbound transfer frames.
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<ClientMessage>>,
    fail_next: Mutex<bool>,
}

impl RecordingSink {
    pub fn sent(&self) -> Vec<ClientMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// The next send fails as if the channel were closed.
    pub fn fail_next_send(&self) {
        *self.fail_next.lock().unwrap() = true;
    }
}

impl EventSink for RecordingSink {
    fn send(&self, message: ClientMessage) -> CoreResult<()> {
        if std::mem::take(&mut *self.fail_next.lock().unwrap()) {
            return Err(CoreError::Transport("transfer channel closed".to_string()));
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }
}

/// Answers confirmations with a fixed value and records every prompt.
pub struct ScriptedPrompter {
    answer: bool,
    prompts: Mutex<Vec<String>>,
    alerts: Mutex<Vec<String>>,
}

impl ScriptedPrompter {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            prompts: Mutex::new(Vec::new()),
            alerts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn alerts(&self) -> Vec<String> {
        self.alerts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Prompter for ScriptedPrompter {
    async fn confirm(&self, message: &str) -> bool {
        self.prompts.lock().unwrap().push(message.to_string());
        self.answer
    }

    fn alert(&self, message: &str) {
        self.alerts.lock().unwrap().push(message.to_string());
    }
}
