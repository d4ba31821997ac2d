//! Client configuration loaded from a TOML file.
//!
//! Every field has a default, so an empty file (or none at all) gives the
//! stock behaviour: 400-entry pages, 120 ms jump debounce, 3 s cancel
//! timeout and a 100-entry activity log.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::fs::path::{OsType, RemotePath};

/// Top-level client configuration.
///
/// Call [`Config::load`] to read from a TOML path.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub browse: BrowseConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// Per-server overrides, keyed by server name.
    #[serde(default)]
    pub servers: BTreeMap<String, ServerSettings>,
}

impl Config {
    /// Loads configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the file does not exist.
    /// - [`CoreError::PermissionDenied`] if the file is not readable.
    /// - [`CoreError::ConfigParse`] if the TOML is malformed.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => CoreError::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                CoreError::PermissionDenied(path.display().to_string())
            }
            _ => CoreError::Io(e),
        })?;
        toml::from_str(&content).map_err(|e| CoreError::ConfigParse(e.to_string()))
    }

    /// OS family of `server`; unknown servers are POSIX.
    pub fn os_of(&self, server: &str) -> OsType {
        self.servers.get(server).map(|s| s.os).unwrap_or_default()
    }
}

/// Where the HTTP and WebSocket interfaces live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Directory paging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowseConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_page_size_max")]
    pub page_size_max: usize,
    #[serde(default = "default_jump_debounce_ms")]
    pub jump_debounce_ms: u64,
    /// Distance past the loaded window that is still served by appending.
    /// Defaults to half a page, at least 100.
    #[serde(default)]
    pub jump_margin: Option<usize>,
    #[serde(default)]
    pub show_hidden: bool,
}

impl BrowseConfig {
    pub fn jump_debounce(&self) -> Duration {
        Duration::from_millis(self.jump_debounce_ms)
    }

    pub fn jump_margin(&self) -> usize {
        self.jump_margin
            .unwrap_or_else(|| (self.page_size / 2).max(100))
    }
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            page_size_max: default_page_size_max(),
            jump_debounce_ms: default_jump_debounce_ms(),
            jump_margin: None,
            show_hidden: false,
        }
    }
}

/// Transfer session behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default = "default_cancel_timeout_ms")]
    pub cancel_timeout_ms: u64,
    #[serde(default = "default_true")]
    pub fast_mode: bool,
    #[serde(default = "default_true")]
    pub parallel: bool,
    /// Ask before starting a move.
    #[serde(default = "default_true")]
    pub confirm_move: bool,
}

impl TransferConfig {
    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            cancel_timeout_ms: default_cancel_timeout_ms(),
            fast_mode: true,
            parallel: true,
            confirm_move: true,
        }
    }
}

/// Activity log retention and filtering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// `transfer_log` messages are kept only if they start with one of these.
    #[serde(default = "default_transfer_log_prefixes")]
    pub transfer_log_prefixes: Vec<String>,
    /// Messages containing any of these are dropped while a transfer runs.
    #[serde(default = "default_progress_keywords")]
    pub progress_keywords: Vec<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
            transfer_log_prefixes: default_transfer_log_prefixes(),
            progress_keywords: default_progress_keywords(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default)]
    pub os: OsType,
    #[serde(default)]
    pub default_path: Option<RemotePath>,
}

fn default_base_url() -> String {
    "http://127.0.0.1:9090".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_page_size() -> usize {
    400
}

fn default_page_size_max() -> usize {
    2000
}

fn default_jump_debounce_ms() -> u64 {
    120
}

fn default_cancel_timeout_ms() -> u64 {
    3000
}

fn default_max_entries() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn default_transfer_log_prefixes() -> Vec<String> {
    ["📤", "📥", "📋", "❌", "✅"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_progress_keywords() -> Vec<String> {
    [
        "bytes", "%", "MB/s", "KB/s", "GB/s", "progress", "字节", "进度", "传输速度", "剩余时间",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.browse.page_size, 400);
        assert_eq!(config.browse.page_size_max, 2000);
        assert_eq!(config.browse.jump_debounce(), Duration::from_millis(120));
        assert_eq!(config.browse.jump_margin(), 200);
        assert_eq!(config.transfer.cancel_timeout(), Duration::from_secs(3));
        assert!(config.transfer.confirm_move);
        assert_eq!(config.log.max_entries, 100);
        assert!(config.log.progress_keywords.iter().any(|k| k == "MB/s"));
    }

    #[test]
    fn jump_margin_has_floor() {
        let browse = BrowseConfig {
            page_size: 50,
            ..BrowseConfig::default()
        };
        assert_eq!(browse.jump_margin(), 100);
    }

    #[test]
    fn load_full_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("turbofile.toml");
        fs::write(
            &path,
            r#"
[client]
base_url = "http://files.lan:8080"

[browse]
page_size = 1000
jump_debounce_ms = 50
show_hidden = true

[transfer]
cancel_timeout_ms = 500
confirm_move = false

[log]
max_entries = 10

[servers.nas]
os = "windows"
default_path = 'D:\share'
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.client.base_url, "http://files.lan:8080");
        assert_eq!(config.browse.page_size, 1000);
        assert_eq!(config.browse.page_size_max, 2000);
        assert!(config.browse.show_hidden);
        assert_eq!(config.transfer.cancel_timeout_ms, 500);
        assert!(!config.transfer.confirm_move);
        assert!(config.transfer.fast_mode);
        assert_eq!(config.log.max_entries, 10);
        assert_eq!(config.os_of("nas"), OsType::Windows);
        assert_eq!(
            config.servers["nas"].default_path.as_ref().unwrap().as_str(),
            "D:/share"
        );
        assert_eq!(config.os_of("unknown"), OsType::Posix);
    }

    #[test]
    fn load_empty_toml_uses_all_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("turbofile.toml");
        fs::write(&path, "").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.browse.page_size, 400);
        assert!(config.servers.is_empty());
    }

    #[test]
    fn load_nonexistent_returns_not_found() {
        let tmp = TempDir::new().unwrap();
        let result = Config::load(&tmp.path().join("nonexistent.toml"));
        assert!(matches!(result.unwrap_err(), CoreError::NotFound(_)));
    }

    #[test]
    fn load_invalid_toml_returns_config_parse() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("turbofile.toml");
        fs::write(&path, "this is not valid [[[toml").unwrap();

        let result = Config::load(&path);
        assert!(matches!(result.unwrap_err(), CoreError::ConfigParse(_)));
    }
}
