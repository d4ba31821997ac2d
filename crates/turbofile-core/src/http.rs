//! HTTP implementation of the service traits.
//!
//! Talks JSON to `turbofile-web`. Every endpoint answers with a `success`
//! flag; a `success: false` body becomes [`CoreError::Service`] with the
//! server's message, anything that never produced a body becomes
//! [`CoreError::Transport`].

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::settings::ClientConfig;
use crate::dto::{
    BrowsePage, BrowseRequest, BrowseResponse, ClientPathSave, ClientPathsResponse,
    CompareRequest, CompareResponse, CompressResponse, CreateFileRequest, CreateFolderRequest,
    DeleteOutcome, DeleteRequest, DeleteResponse, DiffLine, MessageResponse, PanelLocation,
    PathRequest, QuickSearchRequest, QuickSearchResponse, RenameRequest, RunResponse, SearchHit,
    ServerInfo, ServersResponse, SizeResponse, SizeSummary,
};
use crate::error::{CoreError, CoreResult};
use crate::fs::path::RemotePath;
use crate::nav::panel::PanelSide;
use crate::service::{DirectoryService, FileOpsService};

#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base: Url,
}

impl HttpClient {
    /// Builds a client for the server at `config.base_url`.
    ///
    /// # Errors
    ///
    /// [`CoreError::ConfigParse`] if the base URL is not a valid absolute
    /// URL, [`CoreError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> CoreResult<Self> {
        let mut base = Url::parse(&config.base_url)
            .map_err(|e| CoreError::ConfigParse(format!("base_url: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(CoreError::ConfigParse(format!(
                "base_url: {} cannot be a base",
                config.base_url
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;
        Ok(Self { client, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    /// `base/api/<segments...>`, each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> CoreResult<Url> {
        let mut url = self.base.clone();
        {
            let mut path = url
                .path_segments_mut()
                .map_err(|_| CoreError::ConfigParse("base_url cannot be a base".to_string()))?;
            path.pop_if_empty().push("api");
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    async fn get_json<Q, R>(&self, url: Url, query: Option<&Q>) -> CoreResult<R>
    where
        Q: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let mut request = self.client.get(url);
        if let Some(query) = query {
            request = request.query(query);
        }
        let body = request.send().await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn post_json<B, R>(&self, segments: &[&str], body: &B) -> CoreResult<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        tracing::debug!(%url, "POST");
        let body = self.client.post(url).json(body).send().await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl DirectoryService for HttpClient {
    async fn servers(&self) -> CoreResult<Vec<ServerInfo>> {
        let url = self.endpoint(&["servers"])?;
        let resp: ServersResponse = self.get_json::<(), _>(url, None).await?;
        resp.into_servers()
    }

    async fn browse(&self, request: &BrowseRequest) -> CoreResult<BrowsePage> {
        let url = self.endpoint(&["browse", &request.server])?;
        tracing::debug!(
            server = %request.server,
            path = %request.path,
            offset = request.offset,
            limit = request.limit,
            "browse"
        );
        let resp: BrowseResponse = self.get_json(url, Some(request)).await?;
        resp.into_page()
    }

    async fn quick_search(&self, request: &QuickSearchRequest) -> CoreResult<Option<SearchHit>> {
        let url = self.endpoint(&["quick_search", &request.server])?;
        let resp: QuickSearchResponse = self.get_json(url, Some(request)).await?;
        resp.into_hit()
    }

    async fn client_paths(&self) -> CoreResult<HashMap<PanelSide, PanelLocation>> {
        let url = self.endpoint(&["client_path"])?;
        let resp: ClientPathsResponse = self.get_json::<(), _>(url, None).await?;
        resp.into_paths()
    }

    async fn save_client_path(&self, save: &ClientPathSave) -> CoreResult<()> {
        let resp: MessageResponse = self.post_json(&["client_path", "save"], save).await?;
        resp.into_message().map(|_| ())
    }
}

#[async_trait]
impl FileOpsService for HttpClient {
    async fn delete(&self, server: &str, paths: &[RemotePath]) -> CoreResult<DeleteOutcome> {
        let body = DeleteRequest {
            server: server.to_string(),
            paths: paths.to_vec(),
        };
        let resp: DeleteResponse = self.post_json(&["delete"], &body).await?;
        resp.into_outcome()
    }

    async fn create_folder(
        &self,
        server: &str,
        parent: &RemotePath,
        name: &str,
    ) -> CoreResult<String> {
        let body = CreateFolderRequest {
            server: server.to_string(),
            parent_path: parent.clone(),
            folder_name: name.to_string(),
        };
        let resp: MessageResponse = self.post_json(&["create_folder"], &body).await?;
        resp.into_message()
    }

    async fn create_file(&self, server: &str, parent: &RemotePath, name: &str) -> CoreResult<String> {
        let body = CreateFileRequest {
            server: server.to_string(),
            parent_path: parent.clone(),
            file_name: name.to_string(),
        };
        let resp: MessageResponse = self.post_json(&["create_file"], &body).await?;
        resp.into_message()
    }

    async fn rename(&self, server: &str, old_path: &RemotePath, new_name: &str) -> CoreResult<String> {
        let body = RenameRequest {
            server: server.to_string(),
            old_path: old_path.clone(),
            new_name: new_name.to_string(),
        };
        let resp: MessageResponse = self.post_json(&["rename"], &body).await?;
        resp.into_message()
    }

    async fn compute_size(&self, server: &str, path: &RemotePath) -> CoreResult<SizeSummary> {
        let body = path_request(server, path);
        let resp: SizeResponse = self.post_json(&["compute_size"], &body).await?;
        resp.into_summary()
    }

    async fn compress(&self, server: &str, path: &RemotePath) -> CoreResult<RemotePath> {
        let body = path_request(server, path);
        let resp: CompressResponse = self.post_json(&["compress"], &body).await?;
        resp.into_archive()
    }

    async fn extract(&self, server: &str, path: &RemotePath) -> CoreResult<String> {
        let body = path_request(server, path);
        let resp: MessageResponse = self.post_json(&["extract"], &body).await?;
        resp.into_message()
    }

    async fn run_file(&self, server: &str, path: &RemotePath) -> CoreResult<String> {
        let body = path_request(server, path);
        let resp: RunResponse = self.post_json(&["run_file"], &body).await?;
        resp.into_run_id()
    }

    async fn compare_files(&self, request: &CompareRequest) -> CoreResult<Vec<DiffLine>> {
        let resp: CompareResponse = self.post_json(&["compare_files"], request).await?;
        resp.into_lines()
    }
}

fn path_request(server: &str, path: &RemotePath) -> PathRequest {
    PathRequest {
        server: server.to_string(),
        path: path.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base: &str) -> HttpClient {
        HttpClient::new(&ClientConfig {
            base_url: base.to_string(),
            ..ClientConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn endpoint_encodes_server_names() {
        let http = client("http://127.0.0.1:9090");
        let url = http.endpoint(&["browse", "my server/1"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9090/api/browse/my%20server%2F1");
    }

    #[test]
    fn endpoint_respects_base_path() {
        let http = client("http://files.lan/turbo");
        let url = http.endpoint(&["servers"]).unwrap();
        assert_eq!(url.as_str(), "http://files.lan/turbo/api/servers");
    }

    #[test]
    fn invalid_base_url_is_config_error() {
        let result = HttpClient::new(&ClientConfig {
            base_url: "not a url".to_string(),
            ..ClientConfig::default()
        });
        assert!(matches!(result, Err(CoreError::ConfigParse(_))));
    }
}
