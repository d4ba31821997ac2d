use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::Json;
use turbofile_core::dto::{
    ActiveTransfersResponse, BrowseRequest, BrowseResponse, ClientPathSave, ClientPathsResponse,
    MessageResponse, PanelLocation, QuickSearchRequest, QuickSearchResponse, ServerInfo,
    ServersResponse,
};
use turbofile_core::{find_first_match, TransferFile};

use crate::error::AppError;
use crate::state::AppState;

pub async fn servers(State(state): State<AppState>) -> Json<ServersResponse> {
    let servers = state
        .backends
        .iter()
        .map(|(name, backend)| ServerInfo {
            name: name.clone(),
            os: backend.os(),
            default_path: state
                .backends
                .default_path(name)
                .cloned()
                .unwrap_or_else(|| backend.os().default_root()),
            local: backend.is_local(),
        })
        .collect();
    Json(ServersResponse {
        success: true,
        servers,
        error: None,
    })
}

/// One page of a sorted listing. `limit` is clamped to the configured
/// bounds; an offset past the end yields an empty page.
pub async fn browse(
    State(state): State<AppState>,
    Path(server): Path<String>,
    Query(query): Query<BrowseRequest>,
) -> Result<Json<BrowseResponse>, AppError> {
    let backend = state.backend(&server)?;
    let entries = state
        .listings
        .get_or_load(
            backend.as_ref(),
            &server,
            &query.path,
            query.show_hidden,
            query.force_refresh,
        )
        .await?;

    let total = entries.len();
    let limit = state.config.browse.clamp_limit(query.limit);
    let offset = query.offset.min(total);
    let end = offset.saturating_add(limit).min(total);
    let has_more = end < total;

    Ok(Json(BrowseResponse {
        success: true,
        path: Some(query.path),
        files: entries[offset..end].to_vec(),
        total_count: total,
        offset,
        limit,
        has_more,
        next_offset: has_more.then_some(end),
        loaded_count: end,
        error: None,
    }))
}

pub async fn quick_search(
    State(state): State<AppState>,
    Path(server): Path<String>,
    Query(query): Query<QuickSearchRequest>,
) -> Result<Json<QuickSearchResponse>, AppError> {
    let backend = state.backend(&server)?;
    let entries = state
        .listings
        .get_or_load(backend.as_ref(), &server, &query.path, query.show_hidden, false)
        .await?;
    let found = find_first_match(&entries, &query.keyword);
    Ok(Json(QuickSearchResponse {
        success: true,
        hit: found.map(|(_, entry)| TransferFile::from(entry)),
        index: found.map(|(index, _)| index),
        total_count: entries.len(),
        error: None,
    }))
}

pub async fn client_paths(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> Json<ClientPathsResponse> {
    Json(ClientPathsResponse {
        success: true,
        paths: state.client_paths.get(&addr.ip().to_string()),
        error: None,
    })
}

pub async fn save_client_path(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(req): Json<ClientPathSave>,
) -> Result<Json<MessageResponse>, AppError> {
    if req.server.is_empty() {
        return Err(AppError::BadRequest("server is required".to_string()));
    }
    state
        .client_paths
        .remember(
            &addr.ip().to_string(),
            req.panel,
            PanelLocation {
                server: req.server,
                path: req.path,
            },
        )
        .await?;
    Ok(Json(MessageResponse::ok("saved")))
}

pub async fn active_transfers(State(state): State<AppState>) -> Json<ActiveTransfersResponse> {
    let mut transfers: Vec<_> = state
        .transfers
        .iter()
        .map(|entry| entry.value().info.clone())
        .collect();
    transfers.sort_by(|a, b| a.transfer_id.cmp(&b.transfer_id));
    Json(ActiveTransfersResponse {
        success: true,
        transfers,
    })
}
