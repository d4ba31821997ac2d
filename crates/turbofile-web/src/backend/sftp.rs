//! SSH hosts reached through `russh` and `russh-sftp`.
//!
//! One SSH connection per server is opened lazily and shared by every
//! request; file operations go over its SFTP subsystem and commands over
//! fresh exec channels. A closed connection is replaced on next use.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use russh::client;
use russh::keys::key::PublicKey;
use russh::ChannelMsg;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::{FileAttributes, StatusCode};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use turbofile_core::{FileEntry, OsType, RemotePath};

use super::{Backend, BackendError, BackendResult, ExecOutput, OutputChunk, ReadStream, WriteStream};

#[derive(Debug, Clone)]
pub struct SftpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl SftpConfig {
    /// Returns a display label like `"user@host"` or `"user@host:port"`.
    pub fn display_label(&self) -> String {
        if self.port == 22 {
            format!("{}@{}", self.username, self.host)
        } else {
            format!("{}@{}:{}", self.username, self.host, self.port)
        }
    }
}

struct SshHandler;

#[async_trait]
impl client::Handler for SshHandler {
    type Error = russh::Error;

    // TODO: verify host keys against a known_hosts file.
    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

struct Connection {
    handle: client::Handle<SshHandler>,
    sftp: SftpSession,
}

pub struct SftpBackend {
    config: SftpConfig,
    os: OsType,
    connection: Mutex<Option<Arc<Connection>>>,
}

impl SftpBackend {
    pub fn new(config: SftpConfig, os: OsType) -> Self {
        Self {
            config,
            os,
            connection: Mutex::new(None),
        }
    }

    async fn connection(&self) -> BackendResult<Arc<Connection>> {
        let mut slot = self.connection.lock().await;
        if let Some(conn) = slot.as_ref() {
            if !conn.handle.is_closed() {
                return Ok(Arc::clone(conn));
            }
            tracing::info!(server = %self.config.display_label(), "SSH connection closed, reconnecting");
        }
        let conn = Arc::new(self.connect().await?);
        *slot = Some(Arc::clone(&conn));
        Ok(conn)
    }

    async fn connect(&self) -> BackendResult<Connection> {
        let ssh_config = client::Config {
            inactivity_timeout: Some(Duration::from_secs(300)),
            keepalive_interval: Some(Duration::from_secs(30)),
            keepalive_max: 3,
            ..Default::default()
        };

        let mut handle = client::connect(
            Arc::new(ssh_config),
            (self.config.host.as_str(), self.config.port),
            SshHandler,
        )
        .await
        .map_err(|e| BackendError::Connection(e.to_string()))?;

        let auth_ok = handle
            .authenticate_password(&self.config.username, &self.config.password)
            .await
            .map_err(|e| BackendError::Auth(e.to_string()))?;
        if !auth_ok {
            return Err(BackendError::Auth("invalid username or password".to_string()));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| BackendError::Sftp(e.to_string()))?;
        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| BackendError::Sftp(e.to_string()))?;

        tracing::info!(server = %self.config.display_label(), "SFTP session opened");
        Ok(Connection { handle, sftp })
    }

    /// Windows OpenSSH addresses drives as `/C:/...`.
    fn sftp_path(&self, path: &RemotePath) -> String {
        if path.is_windows() {
            format!("/{path}")
        } else {
            path.to_string()
        }
    }
}

fn sftp_error(e: russh_sftp::client::error::Error, path: &RemotePath) -> BackendError {
    use russh_sftp::client::error::Error;
    match e {
        Error::Status(status) if status.status_code == StatusCode::NoSuchFile => {
            BackendError::NotFound(path.to_string())
        }
        Error::Status(status) if status.status_code == StatusCode::PermissionDenied => {
            BackendError::PermissionDenied(path.to_string())
        }
        other => BackendError::Sftp(format!("{path}: {other}")),
    }
}

fn entry_from_attrs(path: RemotePath, attrs: &FileAttributes) -> FileEntry {
    let modified = attrs
        .mtime
        .and_then(|t| DateTime::from_timestamp(i64::from(t), 0))
        .map(|t| t.with_timezone(&chrono::Local).naive_local());
    FileEntry::new(path, attrs.is_dir(), attrs.size.unwrap_or(0), modified)
}

#[async_trait]
impl Backend for SftpBackend {
    fn os(&self) -> OsType {
        self.os
    }

    fn is_local(&self) -> bool {
        false
    }

    async fn list(&self, dir: &RemotePath) -> BackendResult<Vec<FileEntry>> {
        let conn = self.connection().await?;
        let read_dir = conn
            .sftp
            .read_dir(self.sftp_path(dir))
            .await
            .map_err(|e| sftp_error(e, dir))?;
        Ok(read_dir
            .filter(|de| {
                let name = de.file_name();
                name != "." && name != ".."
            })
            .map(|de| entry_from_attrs(dir.join(&de.file_name()), &de.metadata()))
            .collect())
    }

    async fn stat(&self, path: &RemotePath) -> BackendResult<FileEntry> {
        let conn = self.connection().await?;
        let attrs = conn
            .sftp
            .metadata(self.sftp_path(path))
            .await
            .map_err(|e| sftp_error(e, path))?;
        Ok(entry_from_attrs(path.clone(), &attrs))
    }

    async fn remove_file(&self, path: &RemotePath) -> BackendResult<()> {
        let conn = self.connection().await?;
        conn.sftp
            .remove_file(self.sftp_path(path))
            .await
            .map_err(|e| sftp_error(e, path))
    }

    async fn remove_dir(&self, path: &RemotePath) -> BackendResult<()> {
        let conn = self.connection().await?;
        conn.sftp
            .remove_dir(self.sftp_path(path))
            .await
            .map_err(|e| sftp_error(e, path))
    }

    async fn mkdir(&self, path: &RemotePath) -> BackendResult<()> {
        let conn = self.connection().await?;
        conn.sftp
            .create_dir(self.sftp_path(path))
            .await
            .map_err(|e| sftp_error(e, path))
    }

    async fn create_file(&self, path: &RemotePath) -> BackendResult<()> {
        if self.exists(path).await? {
            return Err(BackendError::AlreadyExists(path.to_string()));
        }
        let conn = self.connection().await?;
        conn.sftp
            .create(self.sftp_path(path))
            .await
            .map_err(|e| sftp_error(e, path))?;
        Ok(())
    }

    async fn rename(&self, from: &RemotePath, to: &RemotePath) -> BackendResult<()> {
        let conn = self.connection().await?;
        conn.sftp
            .rename(self.sftp_path(from), self.sftp_path(to))
            .await
            .map_err(|e| sftp_error(e, from))
    }

    async fn open_read(&self, path: &RemotePath) -> BackendResult<ReadStream> {
        let conn = self.connection().await?;
        let file = conn
            .sftp
            .open(self.sftp_path(path))
            .await
            .map_err(|e| sftp_error(e, path))?;
        Ok(Box::new(file))
    }

    async fn open_write(&self, path: &RemotePath) -> BackendResult<WriteStream> {
        let conn = self.connection().await?;
        let file = conn
            .sftp
            .create(self.sftp_path(path))
            .await
            .map_err(|e| sftp_error(e, path))?;
        Ok(Box::new(file))
    }

    async fn exec(&self, command: &str) -> BackendResult<ExecOutput> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let exit_code = self
            .exec_streaming(command, tx, CancellationToken::new())
            .await?;
        let mut out = ExecOutput {
            exit_code,
            ..ExecOutput::default()
        };
        while let Ok(chunk) = rx.try_recv() {
            if chunk.is_error {
                out.stderr.push_str(&chunk.text);
            } else {
                out.stdout.push_str(&chunk.text);
            }
        }
        Ok(out)
    }

    async fn exec_streaming(
        &self,
        command: &str,
        output: mpsc::UnboundedSender<OutputChunk>,
        cancel: CancellationToken,
    ) -> BackendResult<Option<i32>> {
        tracing::debug!(server = %self.config.display_label(), command, "remote exec");
        let conn = self.connection().await?;
        let mut channel = conn
            .handle
            .channel_open_session()
            .await
            .map_err(|e| BackendError::Connection(e.to_string()))?;
        channel
            .exec(true, command)
            .await
            .map_err(|e| BackendError::Exec(e.to_string()))?;

        let mut exit_code = None;
        loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = channel.close().await;
                    return Err(BackendError::Cancelled);
                }
                msg = channel.wait() => msg,
            };
            match msg {
                Some(ChannelMsg::Data { data }) => {
                    let _ = output.send(OutputChunk {
                        text: String::from_utf8_lossy(&data).into_owned(),
                        is_error: false,
                    });
                }
                Some(ChannelMsg::ExtendedData { data, ext }) if ext == 1 => {
                    let _ = output.send(OutputChunk {
                        text: String::from_utf8_lossy(&data).into_owned(),
                        is_error: true,
                    });
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = i32::try_from(exit_status).ok();
                }
                Some(_) => {}
                None => break,
            }
        }
        Ok(exit_code)
    }
}
