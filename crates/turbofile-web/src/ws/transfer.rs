//! `/ws/transfer`: the duplex transfer channel.
//!
//! Frames are JSON `{event, data}` in both directions. Each connection owns
//! an outbound queue that its transfers write into, and also relays every
//! `run_output` event published by the run endpoint.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use turbofile_core::dto::ActiveTransferInfo;
use turbofile_core::event::{CancelStatus, CompleteStatus, StartTransfer};
use turbofile_core::{ClientMessage, ServerEvent};

use crate::state::{ActiveTransfer, AppState};
use crate::transfer::{TransferEngine, TransferJob};

pub async fn transfer_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    let mut run_events = state.run_events.subscribe();
    tracing::debug!("transfer socket connected");

    loop {
        let outbound = tokio::select! {
            event = rx.recv() => event,
            event = run_events.recv() => match event {
                Ok(event) => Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "transfer socket fell behind on run output");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => continue,
            },
            ws_msg = ws_receiver.next() => {
                match ws_msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientMessage>(&text) {
                            Ok(msg) => dispatch(&state, msg, &tx),
                            Err(e) => tracing::debug!("ignoring malformed frame: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
                continue;
            }
        };

        let Some(event) = outbound else { break };
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("cannot encode event: {e}");
                continue;
            }
        };
        if ws_sender.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
    tracing::debug!("transfer socket closed");
}

/// Handles one client frame. Events for the client go into `tx`.
pub fn dispatch(state: &AppState, msg: ClientMessage, tx: &mpsc::UnboundedSender<ServerEvent>) {
    match msg {
        ClientMessage::StartTransfer(request) => start_transfer(state, request, tx),
        ClientMessage::CancelTransfer { transfer_id, force } => {
            let event = cancel_transfer(state, transfer_id, force);
            let _ = tx.send(event);
        }
    }
}

fn start_transfer(state: &AppState, request: StartTransfer, tx: &mpsc::UnboundedSender<ServerEvent>) {
    let transfer_id = format!("transfer_{}", uuid::Uuid::new_v4());
    let reject = |reason: String| {
        tracing::warn!(%transfer_id, "transfer rejected: {reason}");
        let _ = tx.send(ServerEvent::TransferStarted {
            transfer_id: transfer_id.clone(),
            message: None,
        });
        let _ = tx.send(ServerEvent::TransferComplete {
            transfer_id: transfer_id.clone(),
            status: CompleteStatus::Failure,
            message: Some(reason),
            total_time: None,
            failed_items: Vec::new(),
        });
    };

    if request.source_files.is_empty() {
        return reject("no files selected".to_string());
    }
    let (source, target) = match (
        state.backends.get(&request.source_server),
        state.backends.get(&request.target_server),
    ) {
        (Some(source), Some(target)) => (source, target),
        (None, _) => return reject(format!("unknown server: {}", request.source_server)),
        (_, None) => return reject(format!("unknown server: {}", request.target_server)),
    };

    let cancel = CancellationToken::new();
    state.transfers.insert(
        transfer_id.clone(),
        ActiveTransfer {
            info: ActiveTransferInfo {
                transfer_id: transfer_id.clone(),
                source_server: request.source_server.clone(),
                target_server: request.target_server.clone(),
                target_path: request.target_path.clone(),
                mode: request.mode,
                file_count: request.source_files.len(),
            },
            cancel: cancel.clone(),
        },
    );

    let engine = TransferEngine::new(state.listings.clone(), state.config.transfer.clone());
    let transfers = state.transfers.clone();
    let job = TransferJob {
        transfer_id: transfer_id.clone(),
        request,
        source,
        target,
    };
    let tx = tx.clone();
    tokio::spawn(async move {
        engine.run(job, cancel, tx).await;
        transfers.remove(&transfer_id);
    });
}

fn cancel_transfer(state: &AppState, transfer_id: String, force: bool) -> ServerEvent {
    match state.transfers.remove(&transfer_id) {
        Some((_, active)) => {
            active.cancel.cancel();
            tracing::info!(%transfer_id, force, "transfer cancel requested");
            ServerEvent::TransferCancelled {
                transfer_id,
                status: CancelStatus::Success,
                message: Some("Transfer cancelled".to_string()),
            }
        }
        None if force => ServerEvent::TransferCancelled {
            transfer_id,
            status: CancelStatus::Success,
            message: Some("Transfer already finished".to_string()),
        },
        None => ServerEvent::TransferCancelled {
            message: Some(format!("No active transfer {transfer_id}")),
            transfer_id,
            status: CancelStatus::Failure,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use std::time::Duration;
    use tempfile::TempDir;
    use turbofile_core::{RemotePath, TransferFile, TransferMode};

    fn state(dir: &TempDir) -> AppState {
        let root = dir.path().to_string_lossy();
        let toml = format!(
            "[servers.left]\nkind = \"local\"\ndefault_path = \"{root}\"\n\
             [servers.right]\nkind = \"local\"\ndefault_path = \"{root}\"\n"
        );
        AppState::new(ServerConfig::parse(&toml).unwrap())
    }

    fn start(dir: &TempDir, target_server: &str) -> ClientMessage {
        let root = RemotePath::new(dir.path().to_string_lossy());
        ClientMessage::StartTransfer(StartTransfer {
            source_server: "left".into(),
            source_files: vec![TransferFile::new(root.join("f.txt"), false)],
            target_server: target_server.into(),
            target_path: root.join("out"),
            mode: TransferMode::Copy,
            fast_mode: true,
            parallel: true,
        })
    }

    async fn until_terminal(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> Vec<ServerEvent> {
        let mut events = Vec::new();
        while let Ok(Some(event)) = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await {
            let done = event.is_terminal();
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[tokio::test]
    async fn start_runs_and_unregisters() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f.txt"), "data").unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        let state = state(&dir);
        let (tx, mut rx) = mpsc::unbounded_channel();

        dispatch(&state, start(&dir, "right"), &tx);
        let events = until_terminal(&mut rx).await;

        let id = events[0].transfer_id().unwrap().to_string();
        assert!(id.starts_with("transfer_"));
        assert!(events.iter().all(|e| e.transfer_id() == Some(id.as_str())));
        assert!(matches!(
            events.last(),
            Some(ServerEvent::TransferComplete { status: CompleteStatus::Success, .. })
        ));
        assert_eq!(std::fs::read_to_string(dir.path().join("out/f.txt")).unwrap(), "data");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(state.transfers.is_empty());
    }

    #[tokio::test]
    async fn client_socket_drives_a_transfer() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("f.txt"), "data").unwrap();
        std::fs::create_dir(dir.path().join("out")).unwrap();
        let app = axum::Router::new()
            .nest("/ws", crate::ws::router())
            .with_state(state(&dir));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });

        let config = turbofile_core::config::settings::ClientConfig {
            base_url: format!("http://{addr}"),
            ..Default::default()
        };
        let socket = turbofile_core::TransferSocket::connect(&config).await.unwrap();
        let (sender, mut events) = socket.into_parts();
        sender.send(start(&dir, "right")).unwrap();

        let events = until_terminal(&mut events).await;
        assert!(matches!(events[0], ServerEvent::TransferStarted { .. }));
        assert!(matches!(
            events.last(),
            Some(ServerEvent::TransferComplete { status: CompleteStatus::Success, .. })
        ));
        assert_eq!(std::fs::read_to_string(dir.path().join("out/f.txt")).unwrap(), "data");
    }

    #[tokio::test]
    async fn unknown_server_is_rejected() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let (tx, mut rx) = mpsc::unbounded_channel();

        dispatch(&state, start(&dir, "nowhere"), &tx);
        let events = until_terminal(&mut rx).await;
        assert!(matches!(events[0], ServerEvent::TransferStarted { .. }));
        match events.last() {
            Some(ServerEvent::TransferComplete { status, message, .. }) => {
                assert_eq!(*status, CompleteStatus::Failure);
                assert!(message.as_deref().unwrap_or("").contains("nowhere"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(state.transfers.is_empty());
    }

    #[tokio::test]
    async fn cancel_trips_the_token() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        let cancel = CancellationToken::new();
        state.transfers.insert(
            "transfer_x".into(),
            ActiveTransfer {
                info: ActiveTransferInfo {
                    transfer_id: "transfer_x".into(),
                    source_server: "left".into(),
                    target_server: "right".into(),
                    target_path: RemotePath::root(),
                    mode: TransferMode::Copy,
                    file_count: 1,
                },
                cancel: cancel.clone(),
            },
        );

        let event = cancel_transfer(&state, "transfer_x".into(), false);
        assert!(matches!(
            event,
            ServerEvent::TransferCancelled { status: CancelStatus::Success, .. }
        ));
        assert!(cancel.is_cancelled());
        assert!(state.transfers.is_empty());
    }

    #[tokio::test]
    async fn cancel_of_unknown_id() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir);
        assert!(matches!(
            cancel_transfer(&state, "transfer_gone".into(), false),
            ServerEvent::TransferCancelled { status: CancelStatus::Failure, .. }
        ));
        assert!(matches!(
            cancel_transfer(&state, "transfer_gone".into(), true),
            ServerEvent::TransferCancelled { status: CancelStatus::Success, .. }
        ));
    }
}
