//! The single active transfer.
//!
//! [`TransferSession`] is a small state machine:
//!
//! ```text
//! Idle ──start──▶ AwaitingStart ──transfer_started──▶ Running
//!                      │                                 │
//!                   cancel                            cancel
//!                      ▼                                 ▼
//!                    Idle                           Cancelling ──timeout──▶ Idle
//! ```
//!
//! Terminal events (`transfer_complete`, `transfer_cancelled`) and
//! `force_cancel` return it to `Idle` from any active phase. The session also
//! owns the transfer-id filter: an event is handled only if it belongs to the
//! tracked transfer.

use tokio::time::Instant;

use crate::error::TransferRejection;
use crate::event::{ClientMessage, Direction, ServerEvent, StartTransfer, TransferMode};
use crate::fs::entry::TransferFile;
use crate::fs::path::RemotePath;
use crate::nav::panel::PanelSide;
use crate::transfer::progress::ProgressSnapshot;

/// Everything needed to ask for a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub source_server: Option<String>,
    pub target_server: Option<String>,
    pub target_path: Option<RemotePath>,
    pub files: Vec<TransferFile>,
    pub mode: TransferMode,
    pub direction: Direction,
    /// Panels to refresh afterwards instead of the ones implied by
    /// `direction` and `mode`.
    pub refresh_override: Option<Vec<PanelSide>>,
    /// Start a move without asking, e.g. a drop onto a folder in the same
    /// panel.
    pub skip_move_confirm: bool,
}

/// The accepted transfer, from `start_transfer` until its terminal event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferContext {
    id: Option<String>,
    source_server: String,
    target_server: String,
    target_path: RemotePath,
    files: Vec<TransferFile>,
    mode: TransferMode,
    direction: Direction,
    refresh_override: Option<Vec<PanelSide>>,
    started_at: Instant,
}

impl TransferContext {
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn source_server(&self) -> &str {
        &self.source_server
    }

    pub fn target_server(&self) -> &str {
        &self.target_server
    }

    pub fn target_path(&self) -> &RemotePath {
        &self.target_path
    }

    pub fn files(&self) -> &[TransferFile] {
        &self.files
    }

    pub fn mode(&self) -> TransferMode {
        self.mode
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Panel that received the files.
    pub fn destination_side(&self) -> PanelSide {
        match self.direction {
            Direction::Ltr => PanelSide::Target,
            Direction::Rtl => PanelSide::Source,
        }
    }

    /// Panel the files came from.
    pub fn origin_side(&self) -> PanelSide {
        self.destination_side().other()
    }

    /// Panels to re-browse once the transfer is over.
    pub fn refresh_sides(&self) -> Vec<PanelSide> {
        if let Some(sides) = &self.refresh_override {
            if !sides.is_empty() {
                return sides.clone();
            }
        }
        let mut sides = vec![self.destination_side()];
        if self.mode == TransferMode::Move {
            sides.push(self.origin_side());
        }
        sides
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    /// `start_transfer` sent, id not yet known.
    AwaitingStart,
    Running,
    /// `cancel_transfer` sent at the given instant.
    Cancelling(Instant),
}

/// Result of [`TransferSession::cancel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelAction {
    /// Send this message and start the cancel timer for `transfer_id`.
    Send {
        message: ClientMessage,
        transfer_id: String,
    },
    /// The server had not assigned an id yet; the transfer was dropped
    /// locally.
    Abandoned,
    /// A cancel is already pending.
    AlreadyCancelling,
    NothingToCancel,
}

/// What the filter stage decided about an inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDisposition {
    Accept,
    Discard,
    /// A `transfer_started` for a transfer abandoned before its id was known.
    Orphan(String),
}

#[derive(Debug)]
pub struct TransferSession {
    phase: SessionPhase,
    context: Option<TransferContext>,
    progress: ProgressSnapshot,
    orphaned_starts: usize,
}

impl Default for TransferSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferSession {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Idle,
            context: None,
            progress: ProgressSnapshot::default(),
            orphaned_starts: 0,
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// The global "transferring" flag.
    pub fn is_active(&self) -> bool {
        self.phase != SessionPhase::Idle
    }

    pub fn context(&self) -> Option<&TransferContext> {
        self.context.as_ref()
    }

    pub fn transfer_id(&self) -> Option<&str> {
        self.context.as_ref().and_then(|c| c.id())
    }

    pub fn progress(&self) -> &ProgressSnapshot {
        &self.progress
    }

    /// Checks every precondition of `request` without changing state.
    pub fn validate(&self, request: &TransferRequest) -> Result<(), TransferRejection> {
        if self.is_active() {
            return Err(TransferRejection::AlreadyActive);
        }
        if request.files.is_empty() {
            return Err(TransferRejection::NoFiles);
        }
        let source = request
            .source_server
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(TransferRejection::MissingSourceServer)?;
        let target = request
            .target_server
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(TransferRejection::MissingTargetServer)?;
        let target_path = request
            .target_path
            .as_ref()
            .ok_or(TransferRejection::MissingTargetPath)?;
        if source == target {
            if let Some(file) = request.files.iter().find(|f| f.path.contains(target_path)) {
                return Err(TransferRejection::SelfContainment(file.path.to_string()));
            }
        }
        Ok(())
    }

    /// Validates `request`, records the context and returns the single
    /// `start_transfer` message to send.
    pub fn start(
        &mut self,
        request: TransferRequest,
        fast_mode: bool,
        parallel: bool,
    ) -> Result<ClientMessage, TransferRejection> {
        self.validate(&request)?;
        let (source_server, target_server, target_path) = match (
            request.source_server,
            request.target_server,
            request.target_path,
        ) {
            (Some(s), Some(t), Some(p)) => (s, t, p),
            _ => return Err(TransferRejection::MissingTargetPath),
        };

        let message = ClientMessage::StartTransfer(StartTransfer {
            source_server: source_server.clone(),
            source_files: request.files.clone(),
            target_server: target_server.clone(),
            target_path: target_path.clone(),
            mode: request.mode,
            fast_mode,
            parallel,
        });

        tracing::info!(
            source = %source_server,
            target = %target_server,
            path = %target_path,
            files = request.files.len(),
            mode = ?request.mode,
            "transfer accepted"
        );

        self.context = Some(TransferContext {
            id: None,
            source_server,
            target_server,
            target_path,
            files: request.files,
            mode: request.mode,
            direction: request.direction,
            refresh_override: request.refresh_override,
            started_at: Instant::now(),
        });
        self.progress = ProgressSnapshot::default();
        self.phase = SessionPhase::AwaitingStart;
        Ok(message)
    }

    /// The filter stage: decides whether `event` belongs to the tracked
    /// transfer. Non-transfer events are always accepted.
    pub fn filter(&mut self, event: &ServerEvent) -> EventDisposition {
        let id = match event.transfer_id() {
            Some(id) => id,
            None => return EventDisposition::Accept,
        };
        if let ServerEvent::TransferStarted { .. } = event {
            if self.orphaned_starts > 0 {
                self.orphaned_starts -= 1;
                return EventDisposition::Orphan(id.to_string());
            }
            if self.phase == SessionPhase::AwaitingStart {
                return EventDisposition::Accept;
            }
            return EventDisposition::Discard;
        }
        if self.transfer_id() == Some(id) {
            EventDisposition::Accept
        } else {
            tracing::debug!(transfer_id = id, tracked = ?self.transfer_id(), "discarding stale event");
            EventDisposition::Discard
        }
    }

    /// Records the id assigned by the server.
    pub fn on_started(&mut self, transfer_id: &str) -> bool {
        if self.phase != SessionPhase::AwaitingStart {
            return false;
        }
        if let Some(ctx) = self.context.as_mut() {
            ctx.id = Some(transfer_id.to_string());
            self.phase = SessionPhase::Running;
            return true;
        }
        false
    }

    pub fn record_progress(&mut self, update: &crate::event::SpeedUpdate) {
        self.progress.apply(update);
    }

    /// Requests cancellation. Idempotent while a cancel is pending.
    pub fn cancel(&mut self) -> CancelAction {
        match self.phase {
            SessionPhase::Idle => CancelAction::NothingToCancel,
            SessionPhase::Cancelling(_) => CancelAction::AlreadyCancelling,
            SessionPhase::AwaitingStart => {
                self.orphaned_starts += 1;
                self.reset();
                CancelAction::Abandoned
            }
            SessionPhase::Running => match self.transfer_id().map(str::to_string) {
                Some(id) => {
                    self.phase = SessionPhase::Cancelling(Instant::now());
                    CancelAction::Send {
                        message: ClientMessage::CancelTransfer {
                            transfer_id: id.clone(),
                            force: false,
                        },
                        transfer_id: id,
                    }
                }
                None => {
                    self.reset();
                    CancelAction::Abandoned
                }
            },
        }
    }

    /// Resets immediately. Returns the forced cancel to send, if the server
    /// knows the transfer.
    pub fn force_cancel(&mut self) -> Option<ClientMessage> {
        if self.phase == SessionPhase::AwaitingStart {
            self.orphaned_starts += 1;
        }
        let id = self.transfer_id().map(str::to_string);
        self.reset();
        id.map(|transfer_id| ClientMessage::CancelTransfer {
            transfer_id,
            force: true,
        })
    }

    /// Drops a transfer whose `start_transfer` never left the client. The
    /// server cannot answer it, so no orphan is expected.
    pub fn abort_unsent(&mut self) -> bool {
        if self.phase != SessionPhase::AwaitingStart {
            return false;
        }
        self.reset();
        true
    }

    /// Called when the cancel timer for `transfer_id` fires. Resets if that
    /// cancel is still unanswered.
    pub fn cancel_timed_out(&mut self, transfer_id: &str) -> bool {
        if matches!(self.phase, SessionPhase::Cancelling(_)) && self.transfer_id() == Some(transfer_id)
        {
            tracing::warn!(transfer_id, "cancel not acknowledged; resetting locally");
            self.reset();
            return true;
        }
        false
    }

    /// Ends the session after a terminal event, handing back its context.
    pub fn finish(&mut self) -> Option<TransferContext> {
        let ctx = self.context.take();
        self.phase = SessionPhase::Idle;
        ctx
    }

    fn reset(&mut self) {
        self.context = None;
        self.phase = SessionPhase::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CompleteStatus, SpeedUpdate};

    fn request(files: &[&str], target: &str) -> TransferRequest {
        TransferRequest {
            source_server: Some("S1".into()),
            target_server: Some("S2".into()),
            target_path: Some(RemotePath::new(target)),
            files: files
                .iter()
                .map(|p| TransferFile::new(RemotePath::new(p), false))
                .collect(),
            mode: TransferMode::Copy,
            direction: Direction::Ltr,
            refresh_override: None,
            skip_move_confirm: false,
        }
    }

    fn started(session: &mut TransferSession, id: &str) {
        let event = ServerEvent::TransferStarted {
            transfer_id: id.into(),
            message: None,
        };
        assert_eq!(session.filter(&event), EventDisposition::Accept);
        assert!(session.on_started(id));
    }

    fn complete(id: &str) -> ServerEvent {
        ServerEvent::TransferComplete {
            transfer_id: id.into(),
            status: CompleteStatus::Success,
            message: None,
            total_time: None,
            failed_items: vec![],
        }
    }

    #[test]
    fn start_emits_one_message() {
        let mut session = TransferSession::new();
        let msg = session.start(request(&["/src/f.txt"], "/dst"), true, true).unwrap();
        match msg {
            ClientMessage::StartTransfer(start) => {
                assert_eq!(start.source_files.len(), 1);
                assert_eq!(start.target_path.as_str(), "/dst");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(session.is_active());
        assert_eq!(session.phase(), SessionPhase::AwaitingStart);
    }

    #[test]
    fn rejects_empty_and_unset() {
        let session = TransferSession::new();
        assert_eq!(
            session.validate(&request(&[], "/dst")),
            Err(TransferRejection::NoFiles)
        );
        let mut req = request(&["/a"], "/dst");
        req.target_server = None;
        assert_eq!(
            session.validate(&req),
            Err(TransferRejection::MissingTargetServer)
        );
        let mut req = request(&["/a"], "/dst");
        req.source_server = Some(String::new());
        assert_eq!(
            session.validate(&req),
            Err(TransferRejection::MissingSourceServer)
        );
        let mut req = request(&["/a"], "/dst");
        req.target_path = None;
        assert_eq!(session.validate(&req), Err(TransferRejection::MissingTargetPath));
    }

    #[test]
    fn self_containment_guard_is_segment_aware() {
        let session = TransferSession::new();
        let mut same = request(&["/a/b"], "/a/b/c");
        same.target_server = Some("S1".into());
        assert!(matches!(
            session.validate(&same),
            Err(TransferRejection::SelfContainment(_))
        ));

        let mut sibling = request(&["/a/b"], "/a/bc");
        sibling.target_server = Some("S1".into());
        assert!(session.validate(&sibling).is_ok());

        let mut exact = request(&["/a/b"], "/a/b");
        exact.target_server = Some("S1".into());
        assert!(session.validate(&exact).is_err());

        // Different servers never conflict.
        assert!(session.validate(&request(&["/a/b"], "/a/b/c")).is_ok());
    }

    #[test]
    fn second_start_is_rejected_without_change() {
        let mut session = TransferSession::new();
        session.start(request(&["/src/f"], "/dst"), true, true).unwrap();
        started(&mut session, "transfer_1");
        let before = session.context().cloned();

        let err = session.start(request(&["/src/g"], "/other"), true, true);
        assert_eq!(err, Err(TransferRejection::AlreadyActive));
        assert_eq!(session.context().cloned(), before);
    }

    #[test]
    fn stale_events_are_discarded() {
        let mut session = TransferSession::new();
        session.start(request(&["/src/f"], "/dst"), true, true).unwrap();
        started(&mut session, "transfer_1");

        assert_eq!(session.filter(&complete("transfer_0")), EventDisposition::Discard);
        assert_eq!(session.filter(&complete("transfer_1")), EventDisposition::Accept);
        let progress = ServerEvent::SpeedUpdate(SpeedUpdate {
            transfer_id: "other".into(),
            ..SpeedUpdate::default()
        });
        assert_eq!(session.filter(&progress), EventDisposition::Discard);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut session = TransferSession::new();
        session.start(request(&["/src/f"], "/dst"), true, true).unwrap();
        started(&mut session, "transfer_1");

        match session.cancel() {
            CancelAction::Send { message, transfer_id } => {
                assert_eq!(transfer_id, "transfer_1");
                assert_eq!(
                    message,
                    ClientMessage::CancelTransfer {
                        transfer_id: "transfer_1".into(),
                        force: false
                    }
                );
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(session.cancel(), CancelAction::AlreadyCancelling);
        assert!(session.is_active());
    }

    #[test]
    fn cancel_timeout_resets_and_late_events_are_ignored() {
        let mut session = TransferSession::new();
        session.start(request(&["/src/f"], "/dst"), true, true).unwrap();
        started(&mut session, "transfer_1");
        session.cancel();

        assert!(!session.cancel_timed_out("transfer_other"));
        assert!(session.cancel_timed_out("transfer_1"));
        assert!(!session.is_active());
        assert_eq!(session.filter(&complete("transfer_1")), EventDisposition::Discard);
    }

    #[test]
    fn force_cancel_resets_immediately() {
        let mut session = TransferSession::new();
        session.start(request(&["/src/f"], "/dst"), true, true).unwrap();
        started(&mut session, "transfer_9");

        let msg = session.force_cancel().unwrap();
        assert_eq!(
            msg,
            ClientMessage::CancelTransfer {
                transfer_id: "transfer_9".into(),
                force: true
            }
        );
        assert!(!session.is_active());
        assert!(session.force_cancel().is_none());
    }

    #[test]
    fn cancel_before_id_orphans_the_next_start() {
        let mut session = TransferSession::new();
        session.start(request(&["/src/f"], "/dst"), true, true).unwrap();
        assert_eq!(session.cancel(), CancelAction::Abandoned);
        assert!(!session.is_active());

        session.start(request(&["/src/g"], "/dst"), true, true).unwrap();
        let late = ServerEvent::TransferStarted {
            transfer_id: "transfer_old".into(),
            message: None,
        };
        assert_eq!(session.filter(&late), EventDisposition::Orphan("transfer_old".into()));
        started(&mut session, "transfer_new");
        assert_eq!(session.transfer_id(), Some("transfer_new"));
    }

    #[test]
    fn unsent_start_leaves_no_orphan() {
        let mut session = TransferSession::new();
        session.start(request(&["/src/f"], "/dst"), true, true).unwrap();
        assert!(session.abort_unsent());
        assert!(!session.is_active());
        assert!(!session.abort_unsent());

        session.start(request(&["/src/g"], "/dst"), true, true).unwrap();
        started(&mut session, "transfer_2");
        assert_eq!(session.phase(), SessionPhase::Running);
    }

    #[test]
    fn refresh_sides_follow_direction_and_mode() {
        let mut session = TransferSession::new();
        let mut req = request(&["/src/f"], "/dst");
        req.mode = TransferMode::Move;
        req.direction = Direction::Rtl;
        session.start(req, true, true).unwrap();
        let ctx = session.finish().unwrap();
        assert_eq!(ctx.destination_side(), PanelSide::Source);
        assert_eq!(ctx.refresh_sides(), vec![PanelSide::Source, PanelSide::Target]);
    }

    #[test]
    fn refresh_override_wins() {
        let mut session = TransferSession::new();
        let mut req = request(&["/src/f"], "/dst");
        req.refresh_override = Some(vec![PanelSide::Source]);
        session.start(req, true, true).unwrap();
        assert_eq!(session.finish().unwrap().refresh_sides(), vec![PanelSide::Source]);
    }
}
