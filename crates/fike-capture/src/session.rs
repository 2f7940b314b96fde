//! Single-slot capture session state machine.
//!
//! The manager is deliberately clock-free: every time-dependent call takes a
//! `now_ms` argument and the owner decides when to call
//! [`CaptureSessionManager::on_deadline`]. That keeps the deadline and manual
//! stop behind one state check and makes the lifecycle testable without
//! sleeping.

use std::fs;
use std::mem;
use std::path::{Path, PathBuf};

use fike_core::{FailureKind, SessionId};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    CaptureBackend, CaptureError, CapturePurpose, EncoderProfile, PermissionGrant, RecordingPair,
    capture_still,
};

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session; ready to start.
    Idle,
    /// Waiting for the host permission prompt.
    AwaitingPermission,
    /// Encoder running.
    Recording,
    /// Resources being released. Only held inside [`CaptureSessionManager::request_stop`].
    Stopping,
    /// Last session produced an artifact.
    Completed,
    /// Last session ended without a usable artifact.
    Failed,
}

impl SessionState {
    /// Returns `true` for states a call sequence may legitimately end in.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Idle | Self::Completed | Self::Failed)
    }
}

/// Manager configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Directory receiving recordings and stills.
    pub output_dir: PathBuf,
    /// Auto-stop horizon.
    pub max_recording_ms: u64,
}

impl SessionConfig {
    /// Default auto-stop horizon.
    pub const DEFAULT_MAX_RECORDING_MS: u64 = 15_000;

    /// Creates a configuration with the default horizon.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            max_recording_ms: Self::DEFAULT_MAX_RECORDING_MS,
        }
    }
}

/// Live recording session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSession {
    /// Session identity.
    pub id: SessionId,
    /// Start time in epoch milliseconds.
    pub started_at_ms: u64,
    /// Auto-stop time in epoch milliseconds.
    pub deadline_ms: u64,
    /// Artifact the encoder writes to.
    pub output: PathBuf,
}

/// Permission round-trip the owner must forward to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionRequest {
    /// Session the answer belongs to.
    pub session_id: SessionId,
    /// What the grant will be used for.
    pub purpose: CapturePurpose,
}

/// Successful permission handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionOutcome {
    /// Recording started.
    RecordingStarted(CaptureSession),
    /// Still frame written.
    StillCaptured {
        /// Session identity.
        session_id: SessionId,
        /// Written image.
        path: PathBuf,
    },
}

/// Why a recording stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// User or host asked to stop.
    Manual,
    /// Auto-stop horizon reached.
    Deadline,
    /// The OS revoked the projection.
    ProjectionRevoked,
}

impl StopReason {
    /// Returns `true` when the deadline ended the recording.
    pub fn is_auto_stop(&self) -> bool {
        matches!(self, Self::Deadline)
    }
}

/// Finalized recording artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Location on disk.
    pub path: PathBuf,
    /// Size in bytes, always non-zero.
    pub size_bytes: u64,
}

/// Successful stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOutcome {
    /// Session identity.
    pub session_id: SessionId,
    /// Why the session stopped.
    pub reason: StopReason,
    /// Finalized artifact.
    pub artifact: Artifact,
    /// Time spent recording.
    pub duration_ms: u64,
    /// Swallowed encoder stop failure, if any.
    pub stop_warning: Option<String>,
}

enum Slot {
    Idle,
    Awaiting(PermissionRequest),
    Recording {
        session: CaptureSession,
        pair: RecordingPair,
    },
    Stopping(SessionId),
    Completed(SessionId),
    Failed(SessionId),
}

/// Owner of the single capture session slot and its resources.
pub struct CaptureSessionManager {
    backend: Box<dyn CaptureBackend>,
    config: SessionConfig,
    slot: Slot,
    next_session: u64,
    last_error: Option<FailureKind>,
}

impl CaptureSessionManager {
    /// Creates an idle manager.
    pub fn new(backend: Box<dyn CaptureBackend>, config: SessionConfig) -> Self {
        Self {
            backend,
            config,
            slot: Slot::Idle,
            next_session: 1,
            last_error: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        match self.slot {
            Slot::Idle => SessionState::Idle,
            Slot::Awaiting(_) => SessionState::AwaitingPermission,
            Slot::Recording { .. } => SessionState::Recording,
            Slot::Stopping(_) => SessionState::Stopping,
            Slot::Completed(_) => SessionState::Completed,
            Slot::Failed(_) => SessionState::Failed,
        }
    }

    /// Returns `true` while the encoder is running.
    pub fn is_recording(&self) -> bool {
        matches!(self.slot, Slot::Recording { .. })
    }

    /// Identity of the current or most recent session.
    pub fn session_id(&self) -> Option<SessionId> {
        match &self.slot {
            Slot::Idle => None,
            Slot::Awaiting(request) => Some(request.session_id),
            Slot::Recording { session, .. } => Some(session.id),
            Slot::Stopping(id) | Slot::Completed(id) | Slot::Failed(id) => Some(*id),
        }
    }

    /// Live recording session, if any.
    pub fn current_session(&self) -> Option<&CaptureSession> {
        match &self.slot {
            Slot::Recording { session, .. } => Some(session),
            _ => None,
        }
    }

    /// Pending permission request, if any.
    pub fn pending_request(&self) -> Option<PermissionRequest> {
        match &self.slot {
            Slot::Awaiting(request) => Some(*request),
            _ => None,
        }
    }

    /// Taxonomy kind of the most recent failure.
    pub fn last_error(&self) -> Option<FailureKind> {
        self.last_error
    }

    /// Auto-stop time of the live recording.
    pub fn deadline(&self) -> Option<u64> {
        self.current_session().map(|session| session.deadline_ms)
    }

    /// Configured auto-stop horizon.
    pub fn max_recording_ms(&self) -> u64 {
        self.config.max_recording_ms
    }

    /// Begins a session and asks the owner to run the permission prompt.
    ///
    /// A terminal slot is cleared first; any non-terminal slot rejects.
    ///
    /// # Errors
    /// Returns [`SessionError::AlreadyActive`] while a session is awaiting
    /// permission or recording. State is left untouched.
    pub fn request_start(
        &mut self,
        purpose: CapturePurpose,
    ) -> Result<PermissionRequest, SessionError> {
        if !self.state().is_settled() {
            debug!(state = ?self.state(), "start rejected: session already active");
            return Err(SessionError::AlreadyActive);
        }

        let request = PermissionRequest {
            session_id: SessionId(self.next_session),
            purpose,
        };
        self.next_session += 1;
        self.slot = Slot::Awaiting(request);
        info!(session_id = %request.session_id, purpose = ?purpose, "awaiting capture permission");
        Ok(request)
    }

    /// Consumes the host's answer to a permission request.
    ///
    /// # Errors
    /// - [`SessionError::UnexpectedPermissionResult`] when no request with this
    ///   id is pending (state untouched, token dropped).
    /// - [`SessionError::PermissionDenied`] on denial (state `Idle`).
    /// - [`SessionError::EncoderInitFailure`] when resources cannot be
    ///   acquired (state `Idle`, nothing held).
    /// - [`SessionError::EmptyOutputFile`] when a still capture wrote nothing
    ///   (state `Failed`).
    pub fn on_permission_result(
        &mut self,
        session_id: SessionId,
        grant: PermissionGrant,
        now_ms: u64,
    ) -> Result<PermissionOutcome, SessionError> {
        let request = match &self.slot {
            Slot::Awaiting(request) if request.session_id == session_id => *request,
            _ => {
                warn!(
                    session_id = %session_id,
                    "ignoring permission result without a pending request"
                );
                return Err(SessionError::UnexpectedPermissionResult(session_id));
            }
        };

        let token = match grant {
            PermissionGrant::Granted(token) => token,
            PermissionGrant::Denied => {
                info!(session_id = %session_id, "capture permission denied");
                return Err(self.settle_idle(SessionError::PermissionDenied));
            }
        };

        if let Err(error) = fs::create_dir_all(&self.config.output_dir) {
            return Err(self.settle_idle(SessionError::EncoderInitFailure(format!(
                "cannot create '{}': {error}",
                self.config.output_dir.display()
            ))));
        }

        match request.purpose {
            CapturePurpose::Recording => {
                let output = self.output_path("recording", "mp4", now_ms);
                let profile = EncoderProfile::for_display(&self.backend.display_metrics());
                let acquired =
                    RecordingPair::acquire(self.backend.as_mut(), token, &output, &profile);
                let pair = match acquired {
                    Ok(pair) => pair,
                    Err(error) => {
                        warn!(
                            session_id = %session_id,
                            error = %error,
                            "recording resources unavailable"
                        );
                        let error = SessionError::EncoderInitFailure(error.to_string());
                        return Err(self.settle_idle(error));
                    }
                };

                let session = CaptureSession {
                    id: session_id,
                    started_at_ms: now_ms,
                    deadline_ms: now_ms.saturating_add(self.config.max_recording_ms),
                    output,
                };
                info!(
                    session_id = %session_id,
                    deadline_ms = session.deadline_ms,
                    width = profile.width,
                    height = profile.height,
                    "recording started"
                );
                self.last_error = None;
                self.slot = Slot::Recording {
                    session: session.clone(),
                    pair,
                };
                Ok(PermissionOutcome::RecordingStarted(session))
            }
            CapturePurpose::Still => {
                let output = self.output_path("capture", "png", now_ms);
                if let Err(error) = capture_still(self.backend.as_mut(), token, &output) {
                    warn!(session_id = %session_id, error = %error, "still capture failed");
                    let _ = fs::remove_file(&output);
                    let error = SessionError::EncoderInitFailure(error.to_string());
                    return Err(self.settle_idle(error));
                }

                match inspect_artifact(&output) {
                    Some(_) => {
                        info!(session_id = %session_id, path = %output.display(), "still captured");
                        self.last_error = None;
                        self.slot = Slot::Completed(session_id);
                        Ok(PermissionOutcome::StillCaptured {
                            session_id,
                            path: output,
                        })
                    }
                    None => {
                        let error = SessionError::EmptyOutputFile(output);
                        Err(self.settle_failed(session_id, error))
                    }
                }
            }
        }
    }

    /// Stops the live recording if its deadline has passed.
    ///
    /// Returns `None` when nothing is recording or the deadline is still
    /// ahead, so a late or duplicate timer tick is harmless.
    pub fn on_deadline(&mut self, now_ms: u64) -> Option<Result<StopOutcome, SessionError>> {
        let deadline = self.deadline()?;
        if now_ms < deadline {
            return None;
        }
        Some(self.request_stop(StopReason::Deadline, now_ms))
    }

    /// Stops the live recording and inspects the artifact.
    ///
    /// Resources are released before the artifact is inspected, whatever the
    /// encoder reports.
    ///
    /// # Errors
    /// - [`SessionError::NotRecording`] when nothing is recording (state
    ///   untouched).
    /// - [`SessionError::EmptyOutputFile`] when the artifact is missing or
    ///   empty (state `Failed`, file removed).
    pub fn request_stop(
        &mut self,
        reason: StopReason,
        now_ms: u64,
    ) -> Result<StopOutcome, SessionError> {
        let (session, pair) = self.take_recording()?;

        let report = pair.stop();
        let duration_ms = now_ms.saturating_sub(session.started_at_ms);

        let Some(size_bytes) = inspect_artifact(&session.output) else {
            warn!(
                session_id = %session.id,
                reason = ?reason,
                path = %session.output.display(),
                "recording produced no data"
            );
            let _ = fs::remove_file(&session.output);
            let error = SessionError::EmptyOutputFile(session.output);
            return Err(self.settle_failed(session.id, error));
        };

        info!(
            session_id = %session.id,
            reason = ?reason,
            duration_ms,
            bytes = size_bytes,
            "recording completed"
        );
        self.last_error = None;
        self.slot = Slot::Completed(session.id);
        Ok(StopOutcome {
            session_id: session.id,
            reason,
            artifact: Artifact {
                path: session.output,
                size_bytes,
            },
            duration_ms,
            stop_warning: report.stop_error,
        })
    }

    /// Aborts the live recording after an encoder runtime failure.
    ///
    /// Returns the aborted session, or `None` when nothing was recording.
    pub fn on_encoder_fault(&mut self, message: &str) -> Option<SessionId> {
        let (session, pair) = self.take_recording().ok()?;
        warn!(session_id = %session.id, error = message, "encoder runtime failure");

        let _ = pair.stop();
        let _ = fs::remove_file(&session.output);
        let _ = self.settle_failed(
            session.id,
            SessionError::EncoderRuntimeFailure(message.to_string()),
        );
        Some(session.id)
    }

    /// Abandons the pending permission request for `session_id`, as when the
    /// prompt goes away without an answer.
    ///
    /// Returns `None`, leaving state untouched, when that request is not the
    /// pending one.
    pub fn cancel_pending(&mut self, session_id: SessionId) -> Option<SessionId> {
        let request = self
            .pending_request()
            .filter(|request| request.session_id == session_id)?;
        self.slot = Slot::Idle;
        debug!(session_id = %request.session_id, "pending permission request cancelled");
        Some(request.session_id)
    }

    /// Releases everything and returns to `Idle`, keeping whatever the encoder
    /// managed to write. Used on service teardown.
    pub fn abort(&mut self) {
        if let Ok((session, pair)) = self.take_recording() {
            let report = pair.stop();
            info!(
                session_id = %session.id,
                stop_error = report.stop_error.as_deref().unwrap_or("none"),
                "recording aborted"
            );
        }
        self.slot = Slot::Idle;
    }

    fn take_recording(&mut self) -> Result<(CaptureSession, RecordingPair), SessionError> {
        let Slot::Recording { session, .. } = &self.slot else {
            return Err(SessionError::NotRecording);
        };
        let id = session.id;
        match mem::replace(&mut self.slot, Slot::Stopping(id)) {
            Slot::Recording { session, pair } => Ok((session, pair)),
            other => {
                self.slot = other;
                Err(SessionError::NotRecording)
            }
        }
    }

    fn settle_idle(&mut self, error: SessionError) -> SessionError {
        self.last_error = Some(error.kind());
        self.slot = Slot::Idle;
        error
    }

    fn settle_failed(&mut self, session_id: SessionId, error: SessionError) -> SessionError {
        self.last_error = Some(error.kind());
        self.slot = Slot::Failed(session_id);
        error
    }

    fn output_path(&self, prefix: &str, extension: &str, now_ms: u64) -> PathBuf {
        self.config
            .output_dir
            .join(format!("{prefix}_{now_ms}.{extension}"))
    }
}

fn inspect_artifact(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .map(|metadata| metadata.len())
        .filter(|size| *size > 0)
}

/// Session manager error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// User declined the permission prompt.
    #[error("capture permission denied")]
    PermissionDenied,
    /// Output directory, projection or encoder could not be acquired.
    #[error("encoder init failure: {0}")]
    EncoderInitFailure(String),
    /// Encoder failed while recording.
    #[error("encoder runtime failure: {0}")]
    EncoderRuntimeFailure(String),
    /// Artifact missing or empty after stop.
    #[error("output file is missing or empty: {}", .0.display())]
    EmptyOutputFile(PathBuf),
    /// A session is already awaiting permission or recording.
    #[error("a capture session is already active")]
    AlreadyActive,
    /// Stop requested while nothing is recording.
    #[error("no recording in progress")]
    NotRecording,
    /// Permission answer for a request that is no longer pending.
    #[error("no pending permission request for {0}")]
    UnexpectedPermissionResult(SessionId),
}

impl SessionError {
    /// Maps the error onto the shared failure taxonomy.
    ///
    /// Stale stops and stale permission answers are races with an earlier
    /// request and report as [`FailureKind::AlreadyPending`].
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::PermissionDenied => FailureKind::PermissionDenied,
            Self::EncoderInitFailure(_) => FailureKind::EncoderInitFailure,
            Self::EncoderRuntimeFailure(_) => FailureKind::EncoderRuntimeFailure,
            Self::EmptyOutputFile(_) => FailureKind::EmptyOutputFile,
            Self::AlreadyActive => FailureKind::AlreadyActive,
            Self::NotRecording | Self::UnexpectedPermissionResult(_) => FailureKind::AlreadyPending,
        }
    }
}

impl From<CaptureError> for SessionError {
    fn from(error: CaptureError) -> Self {
        Self::EncoderInitFailure(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for slot transitions.

    use super::*;
    use crate::{PermissionToken, SyntheticCaptureBackend};

    fn manager(dir: &Path) -> CaptureSessionManager {
        CaptureSessionManager::new(
            Box::new(SyntheticCaptureBackend::default()),
            SessionConfig::new(dir),
        )
    }

    #[test]
    fn denial_returns_to_idle_without_resources() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let mut manager = manager(dir.path());

        let request = manager
            .request_start(CapturePurpose::Recording)
            .expect("start should be accepted");
        assert_eq!(manager.state(), SessionState::AwaitingPermission);

        let error = manager
            .on_permission_result(request.session_id, PermissionGrant::Denied, 1_000)
            .expect_err("denial should be reported");
        assert_eq!(error, SessionError::PermissionDenied);
        assert_eq!(manager.state(), SessionState::Idle);
        assert_eq!(manager.last_error(), Some(FailureKind::PermissionDenied));
    }

    #[test]
    fn stale_permission_result_leaves_state_untouched() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let mut manager = manager(dir.path());
        let request = manager
            .request_start(CapturePurpose::Recording)
            .expect("start should be accepted");

        let error = manager
            .on_permission_result(
                SessionId(request.session_id.0 + 10),
                PermissionGrant::Granted(PermissionToken::new(1)),
                1_000,
            )
            .expect_err("stale result should be rejected");
        assert_eq!(error.kind(), FailureKind::AlreadyPending);
        assert_eq!(manager.state(), SessionState::AwaitingPermission);
    }

    #[test]
    fn deadline_is_armed_at_the_configured_horizon() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let mut manager = manager(dir.path());
        let request = manager
            .request_start(CapturePurpose::Recording)
            .expect("start should be accepted");
        manager
            .on_permission_result(
                request.session_id,
                PermissionGrant::Granted(PermissionToken::new(1)),
                5_000,
            )
            .expect("recording should start");

        assert_eq!(manager.deadline(), Some(20_000));
        assert!(manager.on_deadline(19_999).is_none());
        assert_eq!(manager.state(), SessionState::Recording);
    }

    #[test]
    fn cancel_pending_clears_the_slot() {
        let dir = tempfile::tempdir().expect("temp dir should be created");
        let mut manager = manager(dir.path());
        let request = manager
            .request_start(CapturePurpose::Still)
            .expect("start should be accepted");

        assert_eq!(manager.cancel_pending(SessionId(request.session_id.0 + 1)), None);
        assert_eq!(manager.state(), SessionState::AwaitingPermission);

        assert_eq!(manager.cancel_pending(request.session_id), Some(request.session_id));
        assert_eq!(manager.state(), SessionState::Idle);
        assert_eq!(manager.cancel_pending(request.session_id), None);
    }
}
