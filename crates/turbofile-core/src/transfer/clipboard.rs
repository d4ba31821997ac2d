//! Copy/cut/paste of selections between panels.
//!
//! Copying captures the selection of whichever panel has one; pasting turns
//! the captured files into a [`TransferRequest`] aimed at the active panel.

use crate::error::TransferRejection;
use crate::event::{Direction, TransferMode};
use crate::fs::entry::TransferFile;
use crate::nav::panel::{Panel, PanelSide};
use crate::transfer::session::TransferRequest;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipboardContents {
    pub mode: TransferMode,
    pub origin: PanelSide,
    pub source_server: String,
    pub files: Vec<TransferFile>,
}

#[derive(Debug, Clone, Default)]
pub struct TransferClipboard {
    contents: Option<ClipboardContents>,
}

impl TransferClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> Option<&ClipboardContents> {
        self.contents.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.as_ref().map_or(true, |c| c.files.is_empty())
    }

    pub fn clear(&mut self) {
        self.contents = None;
    }

    /// Captures the selection of the one panel that has a selection.
    /// `Move` marks the contents as cut.
    pub fn capture(
        &mut self,
        source: &Panel,
        target: &Panel,
        mode: TransferMode,
        transferring: bool,
    ) -> Result<&ClipboardContents, TransferRejection> {
        if transferring {
            return Err(TransferRejection::AlreadyActive);
        }
        let panel = match (source.selection().is_empty(), target.selection().is_empty()) {
            (false, false) => return Err(TransferRejection::AmbiguousSelection),
            (true, true) => return Err(TransferRejection::NoFiles),
            (false, true) => source,
            (true, false) => target,
        };
        let source_server = panel
            .server()
            .ok_or(TransferRejection::MissingSourceServer)?
            .to_string();

        tracing::debug!(
            side = ?panel.side(),
            count = panel.selection().len(),
            ?mode,
            "clipboard captured"
        );
        Ok(self.contents.insert(ClipboardContents {
            mode,
            origin: panel.side(),
            source_server,
            files: panel.selection().to_vec(),
        }))
    }

    /// Builds the transfer for pasting into `dest`. `origin` is the panel the
    /// files were copied from, as it is now.
    pub fn paste(
        &self,
        origin: &Panel,
        dest: &Panel,
        transferring: bool,
    ) -> Result<TransferRequest, TransferRejection> {
        let contents = match &self.contents {
            Some(c) if !c.files.is_empty() => c,
            _ => return Err(TransferRejection::EmptyClipboard),
        };
        if transferring {
            return Err(TransferRejection::AlreadyActive);
        }
        if let Some(current) = origin.server() {
            if current != contents.source_server {
                return Err(TransferRejection::ClipboardServerChanged);
            }
        }
        let target_server = match dest.server() {
            Some(server) => server.to_string(),
            None if dest.side() == PanelSide::Source => {
                return Err(TransferRejection::MissingSourceServer)
            }
            None => return Err(TransferRejection::MissingTargetServer),
        };
        let target_path = dest
            .path()
            .cloned()
            .ok_or(TransferRejection::MissingTargetPath)?;

        let direction = match dest.side() {
            PanelSide::Target => Direction::Ltr,
            PanelSide::Source => Direction::Rtl,
        };
        let refresh_override = (dest.side() == contents.origin).then(|| vec![dest.side()]);

        Ok(TransferRequest {
            source_server: Some(contents.source_server.clone()),
            target_server: Some(target_server),
            target_path: Some(target_path),
            files: contents.files.clone(),
            mode: contents.mode,
            direction,
            refresh_override,
            skip_move_confirm: false,
        })
    }

    /// Called once a paste has started a transfer. Cut contents are
    /// single-use.
    pub fn pasted(&mut self) {
        if self
            .contents
            .as_ref()
            .is_some_and(|c| c.mode == TransferMode::Move)
        {
            self.contents = None;
        }
    }
}
