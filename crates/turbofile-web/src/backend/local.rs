//! The machine `turbofile-web` runs on.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use chrono::{DateTime, Local};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use turbofile_core::{FileEntry, OsType, RemotePath};

use super::{Backend, BackendError, BackendResult, ExecOutput, OutputChunk, ReadStream, WriteStream};

pub struct LocalBackend {
    os: OsType,
}

impl LocalBackend {
    pub fn new(os: OsType) -> Self {
        Self { os }
    }

    fn native(&self, path: &RemotePath) -> PathBuf {
        PathBuf::from(path.to_native(self.os))
    }

    fn shell(&self, command: &str) -> Command {
        let mut cmd = match self.os {
            OsType::Windows => {
                let mut c = Command::new("cmd");
                c.arg("/C");
                c
            }
            OsType::Posix => {
                let mut c = Command::new("sh");
                c.arg("-c");
                c
            }
        };
        cmd.arg(command).stdin(Stdio::null()).kill_on_drop(true);
        cmd
    }
}

fn entry_from_metadata(path: RemotePath, meta: &std::fs::Metadata) -> FileEntry {
    let modified = meta
        .modified()
        .ok()
        .map(|t| DateTime::<Local>::from(t).naive_local());
    FileEntry::new(path, meta.is_dir(), meta.len(), modified)
}

#[async_trait]
impl Backend for LocalBackend {
    fn os(&self) -> OsType {
        self.os
    }

    fn is_local(&self) -> bool {
        true
    }

    async fn list(&self, dir: &RemotePath) -> BackendResult<Vec<FileEntry>> {
        let mut read_dir = tokio::fs::read_dir(self.native(dir))
            .await
            .map_err(|e| BackendError::from_io(e, dir))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            // Follow symlinks; a dangling one is listed as itself.
            let meta = match tokio::fs::metadata(entry.path()).await {
                Ok(m) => m,
                Err(_) => match entry.metadata().await {
                    Ok(m) => m,
                    Err(_) => continue,
                },
            };
            entries.push(entry_from_metadata(dir.join(&name), &meta));
        }
        Ok(entries)
    }

    async fn stat(&self, path: &RemotePath) -> BackendResult<FileEntry> {
        let meta = tokio::fs::metadata(self.native(path))
            .await
            .map_err(|e| BackendError::from_io(e, path))?;
        Ok(entry_from_metadata(path.clone(), &meta))
    }

    async fn remove_file(&self, path: &RemotePath) -> BackendResult<()> {
        tokio::fs::remove_file(self.native(path))
            .await
            .map_err(|e| BackendError::from_io(e, path))
    }

    async fn remove_dir(&self, path: &RemotePath) -> BackendResult<()> {
        tokio::fs::remove_dir(self.native(path))
            .await
            .map_err(|e| BackendError::from_io(e, path))
    }

    async fn mkdir(&self, path: &RemotePath) -> BackendResult<()> {
        tokio::fs::create_dir(self.native(path))
            .await
            .map_err(|e| BackendError::from_io(e, path))
    }

    async fn create_file(&self, path: &RemotePath) -> BackendResult<()> {
        tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.native(path))
            .await
            .map_err(|e| BackendError::from_io(e, path))?;
        Ok(())
    }

    async fn rename(&self, from: &RemotePath, to: &RemotePath) -> BackendResult<()> {
        tokio::fs::rename(self.native(from), self.native(to))
            .await
            .map_err(|e| BackendError::from_io(e, from))
    }

    async fn open_read(&self, path: &RemotePath) -> BackendResult<ReadStream> {
        let file = tokio::fs::File::open(self.native(path))
            .await
            .map_err(|e| BackendError::from_io(e, path))?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &RemotePath) -> BackendResult<WriteStream> {
        let file = tokio::fs::File::create(self.native(path))
            .await
            .map_err(|e| BackendError::from_io(e, path))?;
        Ok(Box::new(file))
    }

    async fn exec(&self, command: &str) -> BackendResult<ExecOutput> {
        tracing::debug!(command, "local exec");
        let output = self.shell(command).output().await?;
        Ok(ExecOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    async fn exec_streaming(
        &self,
        command: &str,
        output: mpsc::UnboundedSender<OutputChunk>,
        cancel: CancellationToken,
    ) -> BackendResult<Option<i32>> {
        let mut child = self
            .shell(command)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| BackendError::Exec("stdout unavailable".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| BackendError::Exec("stderr unavailable".into()))?;
        let mut out_lines = BufReader::new(stdout).lines();
        let mut err_lines = BufReader::new(stderr).lines();
        let (mut out_done, mut err_done) = (false, false);

        while !(out_done && err_done) {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(BackendError::Cancelled);
                }
                line = out_lines.next_line(), if !out_done => match line? {
                    Some(text) => {
                        let _ = output.send(OutputChunk { text: format!("{text}\n"), is_error: false });
                    }
                    None => out_done = true,
                },
                line = err_lines.next_line(), if !err_done => match line? {
                    Some(text) => {
                        let _ = output.send(OutputChunk { text: format!("{text}\n"), is_error: true });
                    }
                    None => err_done = true,
                },
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.kill().await;
                Err(BackendError::Cancelled)
            }
            status = child.wait() => Ok(status?.code()),
        }
    }
}
