//! Request and response bodies of the HTTP interface.
//!
//! Every response carries `success` plus an optional `error`. The
//! `into_*` helpers turn a `success: false` body into [`CoreError::Service`]
//! so callers only ever see `CoreResult`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::fs::entry::{FileEntry, TransferFile};
use crate::fs::path::{OsType, RemotePath};
use crate::nav::panel::PanelSide;

fn service_error(error: Option<String>, fallback: &str) -> CoreError {
    CoreError::Service(error.unwrap_or_else(|| fallback.to_string()))
}

/// A configured server as listed by `GET /api/servers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub os: OsType,
    pub default_path: RemotePath,
    #[serde(default)]
    pub local: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServersResponse {
    pub success: bool,
    #[serde(default)]
    pub servers: Vec<ServerInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServersResponse {
    pub fn into_servers(self) -> CoreResult<Vec<ServerInfo>> {
        if !self.success {
            return Err(service_error(self.error, "failed to list servers"));
        }
        Ok(self.servers)
    }
}

/// Query of `GET /api/browse/{server}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseRequest {
    #[serde(skip)]
    pub server: String,
    pub path: RemotePath,
    #[serde(default)]
    pub show_hidden: bool,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrowseResponse {
    pub success: bool,
    #[serde(default)]
    pub path: Option<RemotePath>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
    #[serde(default)]
    pub total_count: usize,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_offset: Option<usize>,
    #[serde(default)]
    pub loaded_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BrowseResponse {
    pub fn into_page(self) -> CoreResult<BrowsePage> {
        if !self.success {
            return Err(service_error(self.error, "failed to list directory"));
        }
        let loaded_count = if self.loaded_count > 0 {
            self.loaded_count
        } else {
            self.offset + self.files.len()
        };
        Ok(BrowsePage {
            files: self.files,
            total_count: self.total_count,
            offset: self.offset,
            loaded_count,
            has_more: self.has_more,
            next_offset: self.next_offset,
        })
    }
}

/// One page of a directory listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowsePage {
    pub files: Vec<FileEntry>,
    pub total_count: usize,
    /// Index of `files[0]` in the full listing.
    pub offset: usize,
    /// `offset + files.len()`: where the next forward page starts.
    pub loaded_count: usize,
    pub has_more: bool,
    pub next_offset: Option<usize>,
}

/// Query of `GET /api/quick_search/{server}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickSearchRequest {
    #[serde(skip)]
    pub server: String,
    pub path: RemotePath,
    pub keyword: String,
    #[serde(default)]
    pub show_hidden: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuickSearchResponse {
    pub success: bool,
    #[serde(default, rename = "match")]
    pub hit: Option<TransferFile>,
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub total_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QuickSearchResponse {
    pub fn into_hit(self) -> CoreResult<Option<SearchHit>> {
        if !self.success {
            return Err(service_error(self.error, "quick search failed"));
        }
        Ok(match (self.hit, self.index) {
            (Some(file), Some(index)) => Some(SearchHit { file, index }),
            _ => None,
        })
    }
}

/// First match of a quick search and its index in the sorted listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub file: TransferFile,
    pub index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub server: String,
    pub paths: Vec<RemotePath>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub path: RemotePath,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub success: bool,
    #[serde(default)]
    pub deleted_count: usize,
    #[serde(default)]
    pub failed_items: Vec<FailedItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DeleteResponse {
    /// A delete counts as done when the server reports success or removed
    /// at least one item; failures of the rest are reported separately.
    pub fn into_outcome(self) -> CoreResult<DeleteOutcome> {
        if !self.success && self.deleted_count == 0 {
            return Err(service_error(self.error, "delete failed"));
        }
        Ok(DeleteOutcome {
            deleted_count: self.deleted_count,
            failed_items: self.failed_items,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    pub deleted_count: usize,
    pub failed_items: Vec<FailedItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFolderRequest {
    pub server: String,
    pub parent_path: RemotePath,
    pub folder_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFileRequest {
    pub server: String,
    pub parent_path: RemotePath,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameRequest {
    pub server: String,
    pub old_path: RemotePath,
    pub new_name: String,
}

/// Target of compute-size, compress, extract and run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathRequest {
    pub server: String,
    pub path: RemotePath,
}

/// Generic `{success, message, error}` body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MessageResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn into_message(self) -> CoreResult<String> {
        if !self.success {
            return Err(service_error(self.error, "operation failed"));
        }
        Ok(self.message.unwrap_or_default())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SizeResponse {
    pub success: bool,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub size_human: String,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default)]
    pub dir_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SizeResponse {
    pub fn into_summary(self) -> CoreResult<SizeSummary> {
        if !self.success {
            return Err(service_error(self.error, "failed to compute size"));
        }
        Ok(SizeSummary {
            size_bytes: self.size_bytes,
            size_human: self.size_human,
            file_count: self.file_count,
            dir_count: self.dir_count,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeSummary {
    pub size_bytes: u64,
    pub size_human: String,
    pub file_count: u64,
    pub dir_count: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompressResponse {
    pub success: bool,
    #[serde(default)]
    pub archive_path: Option<RemotePath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompressResponse {
    pub fn into_archive(self) -> CoreResult<RemotePath> {
        if !self.success {
            return Err(service_error(self.error, "compression failed"));
        }
        self.archive_path
            .ok_or_else(|| CoreError::Service("server did not report the archive path".into()))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResponse {
    pub success: bool,
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunResponse {
    pub fn into_run_id(self) -> CoreResult<String> {
        if !self.success {
            return Err(service_error(self.error, "failed to start script"));
        }
        self.run_id
            .ok_or_else(|| CoreError::Service("server did not return a run id".into()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareRequest {
    pub server_a: String,
    pub path_a: RemotePath,
    pub server_b: String,
    pub path_b: RemotePath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffTag {
    Equal,
    Insert,
    Delete,
    Replace,
}

/// One aligned row of a side-by-side diff. Line numbers are 1-based and
/// absent on the side that has no line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub tag: DiffTag,
    pub left_no: Option<usize>,
    pub right_no: Option<usize>,
    pub left: String,
    pub right: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompareResponse {
    pub success: bool,
    #[serde(default)]
    pub lines: Vec<DiffLine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompareResponse {
    pub fn into_lines(self) -> CoreResult<Vec<DiffLine>> {
        if !self.success {
            return Err(service_error(self.error, "compare failed"));
        }
        Ok(self.lines)
    }
}

/// Last server and path shown in a panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelLocation {
    pub server: String,
    pub path: RemotePath,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientPathSave {
    pub panel: PanelSide,
    pub server: String,
    pub path: RemotePath,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientPathsResponse {
    pub success: bool,
    #[serde(default)]
    pub paths: HashMap<PanelSide, PanelLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClientPathsResponse {
    pub fn into_paths(self) -> CoreResult<HashMap<PanelSide, PanelLocation>> {
        if !self.success {
            return Err(service_error(self.error, "failed to load remembered paths"));
        }
        Ok(self.paths)
    }
}

/// Entry of `GET /api/active_transfers`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveTransferInfo {
    pub transfer_id: String,
    pub source_server: String,
    pub target_server: String,
    pub target_path: RemotePath,
    pub mode: crate::event::TransferMode,
    pub file_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActiveTransfersResponse {
    pub success: bool,
    #[serde(default)]
    pub transfers: Vec<ActiveTransferInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browse_failure_becomes_service_error() {
        let resp: BrowseResponse =
            serde_json::from_str(r#"{"success":false,"error":"no such dir"}"#).unwrap();
        let err = resp.into_page().unwrap_err();
        assert_eq!(err.to_string(), "no such dir");
    }

    #[test]
    fn browse_page_from_wire() {
        let json = r#"{
            "success": true, "path": "/data",
            "files": [{"name":"a","path":"/data/a","is_directory":true,"size":0,"modified":null}],
            "total_count": 3, "file_count": 3, "offset": 0, "limit": 400,
            "has_more": true, "next_offset": 1, "loaded_count": 1
        }"#;
        let page = serde_json::from_str::<BrowseResponse>(json)
            .unwrap()
            .into_page()
            .unwrap();
        assert_eq!(page.files.len(), 1);
        assert_eq!(page.total_count, 3);
        assert_eq!(page.loaded_count, 1);
        assert_eq!(page.next_offset, Some(1));
    }

    #[test]
    fn quick_search_without_match() {
        let resp: QuickSearchResponse =
            serde_json::from_str(r#"{"success":true,"match":null,"index":null,"total_count":9}"#)
                .unwrap();
        assert!(resp.into_hit().unwrap().is_none());
    }

    #[test]
    fn partial_delete_is_an_outcome() {
        let resp: DeleteResponse = serde_json::from_str(
            r#"{"success":false,"deleted_count":1,"failed_items":[{"path":"/x/b","error":"busy"}]}"#,
        )
        .unwrap();
        let outcome = resp.into_outcome().unwrap();
        assert_eq!(outcome.deleted_count, 1);
        assert_eq!(outcome.failed_items[0].path.as_str(), "/x/b");
    }

    #[test]
    fn total_delete_failure_is_an_error() {
        let resp: DeleteResponse =
            serde_json::from_str(r#"{"success":false,"deleted_count":0,"error":"denied"}"#)
                .unwrap();
        assert!(resp.into_outcome().is_err());
    }

    #[test]
    fn diff_tags_are_lowercase() {
        let line = DiffLine {
            tag: DiffTag::Replace,
            left_no: Some(1),
            right_no: None,
            left: "a".into(),
            right: String::new(),
        };
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["tag"], "replace");
        assert!(json["right_no"].is_null());
    }
}
