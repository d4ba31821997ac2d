//! Mutating file operations. Each one drops the cached listing of every
//! directory it touched.

use axum::extract::State;
use axum::Json;
use turbofile_core::dto::{
    CreateFileRequest, CreateFolderRequest, DeleteRequest, DeleteResponse, FailedItem,
    MessageResponse, RenameRequest,
};
use turbofile_core::{OsType, RemotePath};

use crate::backend::{remove_tree, BackendError};
use crate::error::AppError;
use crate::state::AppState;

fn check_name(name: &str) -> Result<&str, AppError> {
    let name = name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(AppError::BadRequest(format!("invalid name: {name:?}")));
    }
    Ok(name)
}

/// Deletes every path it can. Failures are reported per item; the response
/// is `success: false` only when nothing was deleted.
pub async fn delete(
    State(state): State<AppState>,
    Json(req): Json<DeleteRequest>,
) -> Result<Json<DeleteResponse>, AppError> {
    if req.paths.is_empty() {
        return Err(AppError::BadRequest("no paths given".to_string()));
    }
    let backend = state.backend(&req.server)?;

    let mut deleted_count = 0;
    let mut failed_items = Vec::new();
    for path in &req.paths {
        let result = if path.is_root() {
            Err(BackendError::Unsupported("refusing to delete a root directory".into()))
        } else {
            remove_tree(backend.as_ref(), path).await
        };
        match result {
            Ok(()) => deleted_count += 1,
            Err(e) => {
                tracing::warn!(server = %req.server, %path, "delete failed: {e}");
                failed_items.push(FailedItem {
                    path: path.clone(),
                    error: e.to_string(),
                });
            }
        }
        state.listings.invalidate(&req.server, &path.parent());
        state.listings.invalidate(&req.server, path);
    }

    let success = deleted_count > 0 || failed_items.is_empty();
    let error = (deleted_count == 0)
        .then(|| failed_items.first().map(|f| f.error.clone()))
        .flatten();
    Ok(Json(DeleteResponse {
        success,
        deleted_count,
        message: Some(format!("Deleted {deleted_count} item(s)")),
        failed_items,
        error,
    }))
}

pub async fn create_folder(
    State(state): State<AppState>,
    Json(req): Json<CreateFolderRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let name = check_name(&req.folder_name)?;
    let backend = state.backend(&req.server)?;
    let path = req.parent_path.join(name);
    if backend.exists(&path).await? {
        return Err(AppError::BadRequest(format!("{name} already exists")));
    }
    backend.mkdir(&path).await?;
    state.listings.invalidate(&req.server, &req.parent_path);
    tracing::info!(server = %req.server, %path, "folder created");
    Ok(Json(MessageResponse::ok(format!("Created folder {name}"))))
}

pub async fn create_file(
    State(state): State<AppState>,
    Json(req): Json<CreateFileRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let name = check_name(&req.file_name)?;
    let backend = state.backend(&req.server)?;
    let path = req.parent_path.join(name);
    backend.create_file(&path).await?;
    state.listings.invalidate(&req.server, &req.parent_path);
    tracing::info!(server = %req.server, %path, "file created");
    Ok(Json(MessageResponse::ok(format!("Created file {name}"))))
}

pub async fn rename(
    State(state): State<AppState>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let name = check_name(&req.new_name)?;
    if req.old_path.is_root() {
        return Err(AppError::BadRequest("cannot rename a root directory".to_string()));
    }
    let backend = state.backend(&req.server)?;
    let parent = req.old_path.parent();
    let new_path: RemotePath = parent.join(name);
    if new_path == req.old_path {
        return Ok(Json(MessageResponse::ok("Name unchanged")));
    }
    // Windows names are case-insensitive, so `a.txt` -> `A.txt` finds itself.
    let case_only = backend.os() == OsType::Windows
        && new_path.as_str().eq_ignore_ascii_case(req.old_path.as_str());
    if !case_only && backend.exists(&new_path).await? {
        return Err(AppError::BadRequest(format!("{name} already exists")));
    }
    backend.rename(&req.old_path, &new_path).await?;
    state.listings.invalidate(&req.server, &parent);
    tracing::info!(server = %req.server, from = %req.old_path, to = %new_path, "renamed");
    Ok(Json(MessageResponse::ok(format!("Renamed to {name}"))))
}
