//! Messages carried by the duplex transfer channel.
//!
//! The client sends [`ClientMessage`]s and the server answers with
//! [`ServerEvent`]s. On the wire every frame is a JSON object
//! `{"event": "<name>", "data": {...}}`. All transfer events carry the
//! `transfer_id` minted by the server when it accepts `start_transfer`.

use serde::{Deserialize, Serialize};

use crate::dto::FailedItem;
use crate::fs::entry::TransferFile;
use crate::fs::path::RemotePath;

/// `copy` keeps the source, `move` deletes it on success.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMode {
    #[default]
    Copy,
    Move,
}

/// Which way a transfer flows between the two panels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Source panel → target panel.
    #[default]
    Ltr,
    /// Target panel → source panel.
    Rtl,
}

/// Endpoint kinds of a running transfer, as reported in `speed_update`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferRoute {
    LocalToRemote,
    RemoteToLocal,
    RemoteToRemote,
    LocalToLocal,
}

impl TransferRoute {
    pub fn from_locality(source_local: bool, target_local: bool) -> Self {
        match (source_local, target_local) {
            (true, true) => TransferRoute::LocalToLocal,
            (true, false) => TransferRoute::LocalToRemote,
            (false, true) => TransferRoute::RemoteToLocal,
            (false, false) => TransferRoute::RemoteToRemote,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompleteStatus {
    Success,
    PartialSuccess,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelStatus {
    Success,
    #[serde(alias = "error")]
    Failure,
}

/// Payload of `start_transfer`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartTransfer {
    pub source_server: String,
    pub source_files: Vec<TransferFile>,
    pub target_server: String,
    pub target_path: RemotePath,
    #[serde(default)]
    pub mode: TransferMode,
    #[serde(default = "default_true", alias = "fast_ssh")]
    pub fast_mode: bool,
    #[serde(default = "default_true", alias = "parallel_transfer")]
    pub parallel: bool,
}

fn default_true() -> bool {
    true
}

/// Frames sent from the client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    StartTransfer(StartTransfer),
    CancelTransfer {
        transfer_id: String,
        #[serde(default)]
        force: bool,
    },
}

/// Advisory progress fields of `speed_update`. Every field is optional and
/// only the ones present overwrite the previous snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpeedUpdate {
    pub transfer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transferred_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transferred_human: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_mode: Option<TransferRoute>,
}

/// Frames sent from the server to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    TransferStarted {
        transfer_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    TransferLog {
        transfer_id: String,
        message: String,
    },
    SpeedUpdate(SpeedUpdate),
    TransferComplete {
        transfer_id: String,
        status: CompleteStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_time: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        failed_items: Vec<FailedItem>,
    },
    TransferCancelled {
        transfer_id: String,
        status: CancelStatus,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Output of a script started through the run endpoint. Not tied to a
    /// transfer.
    RunOutput {
        run_id: String,
        message: String,
        #[serde(default)]
        is_error: bool,
        #[serde(default, rename = "final")]
        is_final: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit_code: Option<i32>,
    },
}

impl ServerEvent {
    /// The transfer this event belongs to, if any.
    pub fn transfer_id(&self) -> Option<&str> {
        match self {
            ServerEvent::TransferStarted { transfer_id, .. }
            | ServerEvent::TransferLog { transfer_id, .. }
            | ServerEvent::TransferComplete { transfer_id, .. }
            | ServerEvent::TransferCancelled { transfer_id, .. } => Some(transfer_id),
            ServerEvent::SpeedUpdate(update) => Some(&update.transfer_id),
            ServerEvent::RunOutput { .. } => None,
        }
    }

    /// `true` for `transfer_complete` and `transfer_cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ServerEvent::TransferComplete { .. } | ServerEvent::TransferCancelled { .. }
        )
    }
}
