//! Size, archive, script and compare endpoints.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use turbofile_core::dto::{
    CompareRequest, CompareResponse, CompressResponse, MessageResponse, PathRequest, RunResponse,
    SizeResponse,
};
use turbofile_core::transfer::progress::format_size;
use turbofile_core::ServerEvent;

use crate::backend::{read_text, walk, BackendError};
use crate::diff;
use crate::error::AppError;
use crate::shell;
use crate::state::AppState;

/// Files larger than this are not compared.
const MAX_COMPARE_BYTES: u64 = 5 * 1024 * 1024;

pub async fn compute_size(
    State(state): State<AppState>,
    Json(req): Json<PathRequest>,
) -> Result<Json<SizeResponse>, AppError> {
    let backend = state.backend(&req.server)?;
    let entry = backend.stat(&req.path).await?;
    let (mut size_bytes, mut file_count, mut dir_count) = (entry.size(), 1, 0);
    if entry.is_dir() {
        (size_bytes, file_count) = (0, 0);
        for child in walk(backend.as_ref(), &req.path).await? {
            if child.is_dir() {
                dir_count += 1;
            } else {
                file_count += 1;
                size_bytes += child.size();
            }
        }
    }
    Ok(Json(SizeResponse {
        success: true,
        size_bytes,
        size_human: format_size(size_bytes as f64),
        file_count,
        dir_count,
        error: None,
    }))
}

pub async fn compress(
    State(state): State<AppState>,
    Json(req): Json<PathRequest>,
) -> Result<Json<CompressResponse>, AppError> {
    let backend = state.backend(&req.server)?;
    let command = shell::compress_command(backend.os(), &req.path)?;
    if !backend.exists(&req.path).await? {
        return Err(BackendError::NotFound(req.path.to_string()).into());
    }
    backend.exec(&command).await?.check("compression failed")?;
    state.listings.invalidate(&req.server, &req.path.parent());

    let archive = shell::archive_path(&req.path);
    tracing::info!(server = %req.server, %archive, "archive created");
    Ok(Json(CompressResponse {
        success: true,
        message: Some(format!("Created {}", archive.file_name())),
        archive_path: Some(archive),
        error: None,
    }))
}

pub async fn extract(
    State(state): State<AppState>,
    Json(req): Json<PathRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let backend = state.backend(&req.server)?;
    let command = shell::extract_command(backend.os(), &req.path)?;
    if !backend.exists(&req.path).await? {
        return Err(BackendError::NotFound(req.path.to_string()).into());
    }
    backend.exec(&command).await?.check("extraction failed")?;
    state.listings.invalidate(&req.server, &req.path.parent());
    Ok(Json(MessageResponse::ok(format!("Extracted {}", req.path.file_name()))))
}

/// Starts a script and streams its output as `run_output` events on every
/// transfer socket.
pub async fn run_file(
    State(state): State<AppState>,
    Json(req): Json<PathRequest>,
) -> Result<Json<RunResponse>, AppError> {
    let backend = state.backend(&req.server)?;
    let command = shell::run_command(backend.os(), &req.path)?;
    if backend.stat(&req.path).await?.is_dir() {
        return Err(AppError::BadRequest(format!("{} is a directory", req.path)));
    }

    let run_id = format!("run_{}", uuid::Uuid::new_v4().simple());
    let cancel = CancellationToken::new();
    state.runs.insert(run_id.clone(), cancel.clone());
    tracing::info!(server = %req.server, path = %req.path, %run_id, "script started");

    let runs = state.runs.clone();
    let events = state.run_events.clone();
    let id = run_id.clone();
    tokio::spawn(async move {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let exec = tokio::spawn(async move { backend.exec_streaming(&command, out_tx, cancel).await });
        while let Some(chunk) = out_rx.recv().await {
            let _ = events.send(ServerEvent::RunOutput {
                run_id: id.clone(),
                message: chunk.text,
                is_error: chunk.is_error,
                is_final: false,
                exit_code: None,
            });
        }

        let (message, is_error, exit_code) = match exec.await {
            Ok(Ok(code)) => {
                let code = code.unwrap_or(-1);
                (format!("Process exited with code {code}"), code != 0, Some(code))
            }
            Ok(Err(BackendError::Cancelled)) => ("Run cancelled".to_string(), true, None),
            Ok(Err(e)) => (e.to_string(), true, None),
            Err(e) => (format!("run task failed: {e}"), true, None),
        };
        tracing::info!(run_id = %id, ?exit_code, "script finished");
        let _ = events.send(ServerEvent::RunOutput {
            run_id: id.clone(),
            message,
            is_error,
            is_final: true,
            exit_code,
        });
        runs.remove(&id);
    });

    Ok(Json(RunResponse {
        success: true,
        message: Some(format!("Running {}", req.path)),
        run_id: Some(run_id),
        error: None,
    }))
}

#[derive(Deserialize)]
pub struct CancelRunRequest {
    pub run_id: String,
}

pub async fn cancel_run(
    State(state): State<AppState>,
    Json(req): Json<CancelRunRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let (_, cancel) = state
        .runs
        .remove(&req.run_id)
        .ok_or_else(|| AppError::NotFound(format!("no running script {}", req.run_id)))?;
    cancel.cancel();
    Ok(Json(MessageResponse::ok("Cancel requested")))
}

pub async fn compare_files(
    State(state): State<AppState>,
    Json(req): Json<CompareRequest>,
) -> Result<Json<CompareResponse>, AppError> {
    let left_backend = state.backend(&req.server_a)?;
    let right_backend = state.backend(&req.server_b)?;
    let (left, right) = tokio::try_join!(
        read_text(left_backend.as_ref(), &req.path_a, MAX_COMPARE_BYTES),
        read_text(right_backend.as_ref(), &req.path_b, MAX_COMPARE_BYTES),
    )?;
    Ok(Json(CompareResponse {
        success: true,
        lines: diff::side_by_side(&left, &right),
        error: None,
    }))
}
