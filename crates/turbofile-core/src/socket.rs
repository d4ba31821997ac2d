//! Client side of `/ws/transfer`.
//!
//! [`TransferSocket::connect`] opens the WebSocket and spawns a pump task
//! that writes queued [`ClientMessage`]s as text frames and decodes inbound
//! `{event, data}` frames into [`ServerEvent`]s. The sender half is an
//! [`crate::EventSink`] for the [`crate::Driver`]; the event receiver feeds
//! [`crate::Driver::run_events`].

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use crate::config::settings::ClientConfig;
use crate::error::{CoreError, CoreResult};
use crate::event::{ClientMessage, ServerEvent};

/// An open transfer channel.
pub struct TransferSocket {
    sender: mpsc::UnboundedSender<ClientMessage>,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    pump: JoinHandle<()>,
}

impl TransferSocket {
    /// Connects to the transfer channel of the server at `config.base_url`.
    pub async fn connect(config: &ClientConfig) -> CoreResult<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| CoreError::ConfigParse(format!("base_url: {e}")))?;
        let url = transfer_url(&base)?;
        let (stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| CoreError::Transport(format!("{url}: {e}")))?;
        tracing::info!(%url, "transfer channel connected");

        let (sender, mut outbound) = mpsc::unbounded_channel::<ClientMessage>();
        let (events_tx, events) = mpsc::unbounded_channel::<ServerEvent>();
        let (mut ws_sender, mut ws_receiver) = stream.split();

        let pump = tokio::spawn(async move {
            loop {
                tokio::select! {
                    message = outbound.recv() => {
                        let Some(message) = message else { break };
                        let json = match serde_json::to_string(&message) {
                            Ok(json) => json,
                            Err(e) => {
                                tracing::error!("cannot encode frame: {e}");
                                continue;
                            }
                        };
                        if ws_sender.send(Message::Text(json.into())).await.is_err() {
                            break;
                        }
                    }
                    frame = ws_receiver.next() => match frame {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerEvent>(&text) {
                                Ok(event) => {
                                    if events_tx.send(event).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => tracing::debug!("ignoring malformed frame: {e}"),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                        Some(Ok(_)) => {}
                    },
                }
            }
            let _ = ws_sender.close().await;
            tracing::debug!("transfer channel closed");
        });

        Ok(Self {
            sender,
            events,
            pump,
        })
    }

    /// Outbound queue; usable as the driver's event sink.
    pub fn sender(&self) -> mpsc::UnboundedSender<ClientMessage> {
        self.sender.clone()
    }

    /// Splits into the outbound queue and the inbound event stream. The
    /// connection stays open until both are dropped or the server closes it.
    pub fn into_parts(
        self,
    ) -> (
        mpsc::UnboundedSender<ClientMessage>,
        mpsc::UnboundedReceiver<ServerEvent>,
    ) {
        (self.sender, self.events)
    }

    /// Closes the connection without waiting for queued frames.
    pub fn abort(&self) {
        self.pump.abort();
    }
}

/// `ws(s)://host/<base path>/ws/transfer` for an `http(s)` base URL.
pub fn transfer_url(base: &Url) -> CoreResult<Url> {
    let scheme = match base.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(CoreError::ConfigParse(format!(
                "base_url: unsupported scheme {other}"
            )))
        }
    };
    let mut url = base.clone();
    url.set_scheme(scheme)
        .map_err(|_| CoreError::ConfigParse(format!("base_url: cannot use {scheme}")))?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| CoreError::ConfigParse("base_url cannot be a base".to_string()))?;
        path.pop_if_empty().push("ws").push("transfer");
    }
    url.set_query(None);
    Ok(url)
}
