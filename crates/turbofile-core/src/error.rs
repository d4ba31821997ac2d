//! Error types for `turbofile-core`.
//!
//! All fallible operations in the core library return [`CoreResult<T>`],
//! which is an alias for `Result<T, CoreError>`. Transfer preconditions have
//! their own [`TransferRejection`] type because every variant is shown to the
//! user verbatim.

/// Unified error type for all core operations.
///
/// Each variant captures just enough context for the caller to display
/// a meaningful message or take corrective action.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The target path or server does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The process lacks permission to access the path.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A file or directory name is invalid (empty, contains path separators, etc.).
    #[error("invalid name: {0}")]
    InvalidName(String),

    /// A panel has no server or path to operate on.
    #[error("panel not ready: {0}")]
    PanelNotReady(String),

    /// Failed to parse a TOML configuration file.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// The user cancelled an interactive operation.
    #[error("operation cancelled")]
    Cancelled,

    /// A newer request replaced this one before it finished.
    #[error("request superseded")]
    Superseded,

    /// The service answered with `success: false`.
    #[error("{0}")]
    Service(String),

    /// The request never produced a usable response.
    #[error("transport error: {0}")]
    Transport(String),

    /// An I/O error that doesn't fit a more specific variant.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// A payload could not be encoded or decoded.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Returns `true` for errors that mean "a newer request won", which are
    /// never surfaced to the user.
    pub fn is_superseded(&self) -> bool {
        matches!(self, CoreError::Superseded)
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(e: reqwest::Error) -> Self {
        CoreError::Transport(e.to_string())
    }
}

/// Convenience alias used throughout `turbofile-core`.
pub type CoreResult<T> = Result<T, CoreError>;

/// Reasons a transfer is refused before anything is sent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransferRejection {
    #[error("a transfer is already in progress")]
    AlreadyActive,

    #[error("no files selected")]
    NoFiles,

    #[error("source server is not selected")]
    MissingSourceServer,

    #[error("target server is not selected")]
    MissingTargetServer,

    #[error("target path is not set")]
    MissingTargetPath,

    #[error("cannot transfer {0} into itself or one of its subdirectories")]
    SelfContainment(String),

    #[error("both panels have a selection; clear one side first")]
    AmbiguousSelection,

    #[error("the clipboard is empty")]
    EmptyClipboard,

    #[error("the source panel changed server since the files were copied")]
    ClipboardServerChanged,

    #[error("move cancelled by user")]
    NotConfirmed,

    /// The `start_transfer` frame could not be handed to the channel.
    #[error("could not send the transfer request: {0}")]
    SendFailed(String),
}
