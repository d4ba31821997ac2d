use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use turbofile_core::{OsType, RemotePath};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub browse: BrowseSettings,
    #[serde(default)]
    pub transfer: TransferSettings,
    /// JSON file holding the remembered panel locations. In memory only
    /// when unset.
    #[serde(default)]
    pub client_paths: Option<PathBuf>,
    #[serde(default)]
    pub servers: BTreeMap<String, BackendConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsConfig {
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrowseSettings {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_page_size_min")]
    pub page_size_min: usize,
    #[serde(default = "default_page_size")]
    pub page_size_default: usize,
    #[serde(default = "default_page_size_max")]
    pub page_size_max: usize,
}

impl BrowseSettings {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// `0` means "server default"; everything else is clamped to the
    /// configured bounds.
    pub fn clamp_limit(&self, limit: usize) -> usize {
        if limit == 0 {
            return self.page_size_default;
        }
        limit.clamp(self.page_size_min, self.page_size_max.max(self.page_size_min))
    }
}

impl Default for BrowseSettings {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            page_size_min: default_page_size_min(),
            page_size_default: default_page_size(),
            page_size_max: default_page_size_max(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferSettings {
    #[serde(default = "default_speed_interval_ms")]
    pub speed_interval_ms: u64,
    #[serde(default = "default_chunk_size_kb")]
    pub chunk_size_kb: usize,
}

impl TransferSettings {
    pub fn speed_interval(&self) -> Duration {
        Duration::from_millis(self.speed_interval_ms.max(50))
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size_kb.max(4) * 1024
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            speed_interval_ms: default_speed_interval_ms(),
            chunk_size_kb: default_chunk_size_kb(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Sftp,
}

/// One entry of `[servers.<name>]`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendConfig {
    #[serde(default)]
    pub kind: BackendKind,
    #[serde(default)]
    pub os: Option<OsType>,
    #[serde(default)]
    pub default_path: Option<RemotePath>,
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl BackendConfig {
    pub fn os(&self) -> OsType {
        match (self.os, self.kind) {
            (Some(os), _) => os,
            (None, BackendKind::Local) if cfg!(windows) => OsType::Windows,
            (None, _) => OsType::Posix,
        }
    }

    pub fn default_path(&self) -> RemotePath {
        self.default_path
            .clone()
            .unwrap_or_else(|| self.os().default_root())
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9090))
}

fn default_cache_ttl_secs() -> u64 { 120 }
fn default_page_size_min() -> usize { 100 }
fn default_page_size() -> usize { 400 }
fn default_page_size_max() -> usize { 2000 }
fn default_speed_interval_ms() -> u64 { 500 }
fn default_chunk_size_kb() -> usize { 256 }
fn default_ssh_port() -> u16 { 22 }

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            tls: TlsConfig::default(),
            browse: BrowseSettings::default(),
            transfer: TransferSettings::default(),
            client_paths: None,
            servers: BTreeMap::new(),
        }
    }
}

impl ServerConfig {
    pub fn parse(contents: &str) -> anyhow::Result<Self> {
        let mut config: ServerConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> anyhow::Result<()> {
        for (name, server) in &self.servers {
            if server.kind == BackendKind::Sftp && (server.host.is_empty() || server.username.is_empty()) {
                anyhow::bail!("server `{name}`: sftp servers need host and username");
            }
        }
        if self.servers.is_empty() {
            self.servers.insert("local".to_string(), BackendConfig::default());
        }
        Ok(())
    }

    pub fn load() -> anyhow::Result<Self> {
        let config_path = std::env::var("TURBOFILE_WEB_CONFIG")
            .map(PathBuf::from)
            .ok();

        let mut config = match config_path {
            Some(path) => {
                let contents = std::fs::read_to_string(&path)?;
                Self::parse(&contents)?
            }
            None => Self::parse("")?,
        };

        if let Ok(addr) = std::env::var("TURBOFILE_BIND_ADDR") {
            config.bind_addr = addr.parse()?;
        }
        if let Ok(path) = std::env::var("TURBOFILE_CLIENT_PATHS") {
            config.client_paths = Some(PathBuf::from(path));
        }
        if let Ok(cert) = std::env::var("TURBOFILE_TLS_CERT") {
            config.tls.cert_path = Some(cert);
        }
        if let Ok(key) = std::env::var("TURBOFILE_TLS_KEY") {
            config.tls.key_path = Some(key);
        }

        // No authentication exists, so only loopback unless told otherwise.
        if config.bind_addr.ip().is_unspecified() {
            if std::env::var("TURBOFILE_INSECURE").is_ok() {
                tracing::warn!(
                    "Serving file operations on all interfaces ({}) without authentication",
                    config.bind_addr
                );
            } else {
                let safe_addr: SocketAddr = ([127, 0, 0, 1], config.bind_addr.port()).into();
                tracing::warn!(
                    "Binding to {} instead of {}. Set TURBOFILE_INSECURE=1 to override.",
                    safe_addr,
                    config.bind_addr
                );
                config.bind_addr = safe_addr;
            }
        }

        Ok(config)
    }
}
