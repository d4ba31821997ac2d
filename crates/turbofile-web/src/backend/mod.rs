//! Storage backends behind one trait.
//!
//! A [`Backend`] is one configured server: the local machine
//! ([`local::LocalBackend`]) or an SSH host reached over SFTP
//! ([`sftp::SftpBackend`]). Handlers and the transfer engine only ever see
//! `Arc<dyn Backend>` and [`RemotePath`]s.

pub mod local;
pub mod sftp;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use turbofile_core::{FileEntry, OsType, RemotePath};

use crate::config::{BackendKind, ServerConfig};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("SFTP error: {0}")]
    Sftp(String),

    #[error("command failed: {0}")]
    Exec(String),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(std::io::Error),
}

impl BackendError {
    /// Maps an I/O error on `path` to the closest variant.
    pub fn from_io(e: std::io::Error, path: &RemotePath) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => BackendError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => BackendError::PermissionDenied(path.to_string()),
            std::io::ErrorKind::AlreadyExists => BackendError::AlreadyExists(path.to_string()),
            _ => BackendError::Io(e),
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError::Io(e)
    }
}

pub type BackendResult<T> = Result<T, BackendError>;

pub type ReadStream = Box<dyn AsyncRead + Send + Unpin>;
pub type WriteStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Result of a command run to completion.
#[derive(Debug, Clone, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Turns a non-zero exit into [`BackendError::Exec`] carrying stderr
    /// (or `fallback` when stderr is empty).
    pub fn check(self, fallback: &str) -> BackendResult<Self> {
        if self.success() {
            return Ok(self);
        }
        let stderr = self.stderr.trim();
        Err(BackendError::Exec(if stderr.is_empty() {
            fallback.to_string()
        } else {
            stderr.to_string()
        }))
    }
}

/// A piece of streamed command output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputChunk {
    pub text: String,
    pub is_error: bool,
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn os(&self) -> OsType;

    fn is_local(&self) -> bool;

    /// Entries of `dir`, unsorted, without `.` and `..`.
    async fn list(&self, dir: &RemotePath) -> BackendResult<Vec<FileEntry>>;

    async fn stat(&self, path: &RemotePath) -> BackendResult<FileEntry>;

    async fn remove_file(&self, path: &RemotePath) -> BackendResult<()>;

    /// Removes an empty directory.
    async fn remove_dir(&self, path: &RemotePath) -> BackendResult<()>;

    async fn mkdir(&self, path: &RemotePath) -> BackendResult<()>;

    /// Creates an empty file. Fails if `path` exists.
    async fn create_file(&self, path: &RemotePath) -> BackendResult<()>;

    async fn rename(&self, from: &RemotePath, to: &RemotePath) -> BackendResult<()>;

    async fn open_read(&self, path: &RemotePath) -> BackendResult<ReadStream>;

    /// Opens `path` for writing, truncating it.
    async fn open_write(&self, path: &RemotePath) -> BackendResult<WriteStream>;

    /// Runs a shell command to completion.
    async fn exec(&self, command: &str) -> BackendResult<ExecOutput>;

    /// Runs a shell command, forwarding output as it arrives. Returns the
    /// exit code; cancelling `cancel` kills the command.
    async fn exec_streaming(
        &self,
        command: &str,
        output: mpsc::UnboundedSender<OutputChunk>,
        cancel: CancellationToken,
    ) -> BackendResult<Option<i32>>;

    async fn exists(&self, path: &RemotePath) -> BackendResult<bool> {
        match self.stat(path).await {
            Ok(_) => Ok(true),
            Err(BackendError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Every entry beneath `root` (excluding `root`), parents before children.
pub async fn walk(backend: &dyn Backend, root: &RemotePath) -> BackendResult<Vec<FileEntry>> {
    let mut out = Vec::new();
    let mut pending = vec![root.clone()];
    while let Some(dir) = pending.pop() {
        for entry in backend.list(&dir).await? {
            if entry.is_dir() {
                pending.push(entry.path().clone());
            }
            out.push(entry);
        }
    }
    Ok(out)
}

/// Removes `path` and, for directories, everything beneath it.
pub async fn remove_tree(backend: &dyn Backend, path: &RemotePath) -> BackendResult<()> {
    let entry = backend.stat(path).await?;
    if !entry.is_dir() {
        return backend.remove_file(path).await;
    }
    let children = walk(backend, path).await?;
    for child in children.iter().filter(|c| !c.is_dir()) {
        backend.remove_file(child.path()).await?;
    }
    // Deepest directories first.
    let mut dirs: Vec<&FileEntry> = children.iter().filter(|c| c.is_dir()).collect();
    dirs.sort_by_key(|d| std::cmp::Reverse(d.path().as_str().len()));
    for dir in dirs {
        backend.remove_dir(dir.path()).await?;
    }
    backend.remove_dir(path).await
}

/// Reads a whole file as lossy UTF-8, refusing anything over `max_bytes`.
pub async fn read_text(backend: &dyn Backend, path: &RemotePath, max_bytes: u64) -> BackendResult<String> {
    let entry = backend.stat(path).await?;
    if entry.is_dir() {
        return Err(BackendError::Unsupported(format!("{path} is a directory")));
    }
    if entry.size() > max_bytes {
        return Err(BackendError::Unsupported(format!(
            "{path} is larger than {max_bytes} bytes"
        )));
    }
    let mut stream = backend.open_read(path).await?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    stream.read_to_end(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Configured servers by name.
pub struct Backends {
    servers: BTreeMap<String, Arc<dyn Backend>>,
    defaults: BTreeMap<String, RemotePath>,
}

impl Backends {
    pub fn from_config(config: &ServerConfig) -> Self {
        let mut servers: BTreeMap<String, Arc<dyn Backend>> = BTreeMap::new();
        let mut defaults = BTreeMap::new();
        for (name, server) in &config.servers {
            let backend: Arc<dyn Backend> = match server.kind {
                BackendKind::Local => Arc::new(local::LocalBackend::new(server.os())),
                BackendKind::Sftp => Arc::new(sftp::SftpBackend::new(
                    sftp::SftpConfig {
                        host: server.host.clone(),
                        port: server.port,
                        username: server.username.clone(),
                        password: server.password.clone(),
                    },
                    server.os(),
                )),
            };
            tracing::info!(server = %name, kind = ?server.kind, "backend configured");
            servers.insert(name.clone(), backend);
            defaults.insert(name.clone(), server.default_path());
        }
        Self { servers, defaults }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Backend>> {
        self.servers.get(name).cloned()
    }

    pub fn default_path(&self, name: &str) -> Option<&RemotePath> {
        self.defaults.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Arc<dyn Backend>)> {
        self.servers.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use local::LocalBackend;
    use tempfile::TempDir;

    fn tree() -> (TempDir, LocalBackend, RemotePath) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("a/b")).unwrap();
        std::fs::write(dir.path().join("a/one.txt"), "1").unwrap();
        std::fs::write(dir.path().join("a/b/two.txt"), "22").unwrap();
        let root = RemotePath::new(dir.path().to_string_lossy());
        (dir, LocalBackend::new(OsType::Posix), root)
    }

    #[tokio::test]
    async fn walk_lists_parents_first() {
        let (_dir, backend, root) = tree();
        let entries = walk(&backend, &root).await.unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name()).collect();
        assert_eq!(entries.len(), 4);
        let b = names.iter().position(|n| *n == "b").unwrap();
        let two = names.iter().position(|n| *n == "two.txt").unwrap();
        assert!(b < two);
    }

    #[tokio::test]
    async fn remove_tree_deletes_everything() {
        let (dir, backend, root) = tree();
        remove_tree(&backend, &root.join("a")).await.unwrap();
        assert!(!dir.path().join("a").exists());
    }

    #[tokio::test]
    async fn read_text_respects_limit() {
        let (_dir, backend, root) = tree();
        let path = root.join("a/b/two.txt");
        assert_eq!(read_text(&backend, &path, 10).await.unwrap(), "22");
        assert!(matches!(
            read_text(&backend, &path, 1).await,
            Err(BackendError::Unsupported(_))
        ));
    }

    #[test]
    fn failed_exec_carries_stderr() {
        let out = ExecOutput {
            stdout: String::new(),
            stderr: "zip: command not found\n".into(),
            exit_code: Some(127),
        };
        match out.check("compress failed") {
            Err(BackendError::Exec(msg)) => assert_eq!(msg, "zip: command not found"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
