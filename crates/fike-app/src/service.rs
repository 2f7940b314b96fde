//! Capture service actor.
//!
//! One thread owns the session manager, the overlay, the status presenter and
//! the event bridge. Every input (taps, host requests, permission answers,
//! upload progress, the auto-stop deadline) arrives as a [`Command`] on one
//! channel and is applied in order, so no two transitions interleave.

use std::collections::HashMap;
use std::mem;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use fike_bridge::{BridgeError, BridgeStats, EventBridge, HostLink, RpcKind, RpcOutcome};
use fike_capture::{
    CaptureBackend, CapturePurpose, CaptureSession, CaptureSessionManager, PermissionGrant,
    PermissionOutcome, PermissionRequest, PermissionToken, SessionError, SessionState, StopOutcome,
    StopReason,
};
use fike_core::{FailureKind, HostEvent, SessionId, now_epoch_ms};
use fike_ui::{
    NotificationAction, NotificationPhase, NotificationPresenter, NotificationState,
    OverlayController, OverlayState, RecordControl, RecordDispatch, RecordIcon, StatusView,
};
use fike_upload::{UploadClient, UploadTransport};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::worker::{UploadEvent, UploadEventSink, UploadFailure, UploadJob, UploadWorker};
use crate::AppError;

/// Host-side permission prompt.
///
/// Called on the service thread; implementations must not call back into
/// [`CaptureService`] synchronously. The answer goes through the
/// [`PermissionResponder`], from any thread, at any later time.
pub trait PermissionRequester: Send {
    /// Shows the capture permission prompt for `request`.
    fn request_permission(&mut self, request: PermissionRequest, responder: PermissionResponder);
}

/// One-shot answer channel for a permission prompt.
///
/// Dropping it unanswered abandons the request: the session returns to
/// `Idle` and a pending host `start` is rejected.
#[derive(Debug)]
pub struct PermissionResponder {
    tx: Sender<Command>,
    session_id: SessionId,
    answered: bool,
}

impl PermissionResponder {
    /// Session the answer belongs to.
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Grants capture. Returns `false` when the service is gone.
    pub fn grant(mut self, token: PermissionToken) -> bool {
        self.respond(PermissionGrant::Granted(token))
    }

    /// Declines capture. Returns `false` when the service is gone.
    pub fn deny(mut self) -> bool {
        self.respond(PermissionGrant::Denied)
    }

    fn respond(&mut self, grant: PermissionGrant) -> bool {
        self.answered = true;
        self.tx
            .send(Command::PermissionResult {
                session_id: self.session_id,
                grant,
            })
            .is_ok()
    }
}

impl Drop for PermissionResponder {
    fn drop(&mut self) {
        if !self.answered {
            let _ = self.tx.send(Command::PermissionAbandoned {
                session_id: self.session_id,
            });
        }
    }
}

/// Platform renderer of the status surface.
pub trait StatusSink: Send {
    /// Shows `view`. Called only when the projection changed.
    fn show(&mut self, view: &StatusView);
}

/// Status sink that only logs.
#[derive(Debug, Default)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn show(&mut self, view: &StatusView) {
        info!(title = %view.title, body = %view.body, visible = view.visible, "status surface");
    }
}

/// External collaborators of the service.
pub struct Collaborators {
    /// Screen capture provider.
    pub backend: Box<dyn CaptureBackend>,
    /// Host permission prompt.
    pub permissions: Box<dyn PermissionRequester>,
    /// Host application layer.
    pub host: Arc<dyn HostLink>,
    /// Upload transport.
    pub transport: Arc<dyn UploadTransport>,
    /// Status surface renderer.
    pub status: Box<dyn StatusSink>,
}

/// Consistent copy of the service state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSnapshot {
    /// Session lifecycle state.
    pub session_state: SessionState,
    /// Current or most recent session.
    pub session_id: Option<SessionId>,
    /// Most recent session failure.
    pub last_error: Option<FailureKind>,
    /// Overlay state.
    pub overlay: OverlayState,
    /// Record button icon.
    pub record_icon: RecordIcon,
    /// Status surface state.
    pub notification: NotificationState,
    /// Current status projection.
    pub status: StatusView,
    /// Host delivery counters.
    pub bridge: BridgeStats,
    /// Uploads queued or running.
    pub uploads_in_flight: usize,
}

/// Messages processed by the service thread.
#[derive(Debug)]
pub(crate) enum Command {
    Start {
        purpose: CapturePurpose,
        reply: Sender<Result<SessionId, FailureKind>>,
    },
    Stop {
        reply: Sender<Result<PathBuf, FailureKind>>,
    },
    PermissionResult {
        session_id: SessionId,
        grant: PermissionGrant,
    },
    PermissionAbandoned {
        session_id: SessionId,
    },
    ToggleMenu {
        reply: Sender<bool>,
    },
    RecordTapped {
        reply: Sender<RecordDispatch>,
    },
    Drag {
        dx: i32,
        dy: i32,
    },
    Notification {
        action: NotificationAction,
    },
    HostStart {
        result_token: String,
        reply: Sender<Result<(), BridgeError>>,
    },
    HostStop {
        result_token: String,
        reply: Sender<Result<(), BridgeError>>,
    },
    HostAttached,
    ProjectionRevoked,
    EncoderFault {
        message: String,
    },
    Upload(UploadEvent),
    Snapshot {
        reply: Sender<ServiceSnapshot>,
    },
    Shutdown,
}

/// Handle to the running capture service.
pub struct CaptureService {
    tx: Sender<Command>,
    actor: Option<JoinHandle<()>>,
}

impl CaptureService {
    /// Starts the service, upload worker and bridge delivery threads.
    ///
    /// # Errors
    /// Returns [`AppError::Upload`] for an invalid endpoint,
    /// [`AppError::Bridge`] or [`AppError::Spawn`] when a thread cannot start.
    pub fn spawn(config: ServiceConfig, collaborators: Collaborators) -> Result<Self, AppError> {
        let Collaborators {
            backend,
            permissions,
            host,
            transport,
            status,
        } = collaborators;

        let client = UploadClient::new(
            &config.analysis_url,
            config.user_id.clone(),
            config.upload_retry,
            transport,
        )
        .map_err(AppError::Upload)?;
        let bridge = EventBridge::spawn(host, config.bridge).map_err(AppError::Bridge)?;

        let (tx, rx) = mpsc::channel::<Command>();
        let upload_tx = tx.clone();
        let events: UploadEventSink = Arc::new(move |event| {
            let _ = upload_tx.send(Command::Upload(event));
        });
        let worker = UploadWorker::spawn(client, events)?;

        let actor = Actor {
            manager: CaptureSessionManager::new(backend, config.session_config()),
            overlay: OverlayController::new((0, 100), config.overlay_debounce_ms),
            presenter: NotificationPresenter::new(),
            presenter_session: None,
            uploads: HashMap::new(),
            bridge,
            worker,
            permissions,
            status,
            last_view: None,
            deadline_at: None,
            tx: tx.clone(),
        };

        let join = thread::Builder::new()
            .name("fike-capture-service".to_string())
            .spawn(move || actor.run(rx))
            .map_err(|error| AppError::Spawn(format!("failed to spawn service thread: {error}")))?;

        info!(
            endpoint = %config.analysis_url,
            output_dir = %config.output_dir.display(),
            max_recording_ms = config.max_recording_ms,
            "capture service started"
        );
        Ok(Self {
            tx,
            actor: Some(join),
        })
    }

    /// Starts a screen recording. Resolves once the permission prompt is
    /// shown, not when recording begins.
    ///
    /// # Errors
    /// [`AppError::Rejected`] with `AlreadyActive` while a session is live.
    pub fn request_start(&self) -> Result<SessionId, AppError> {
        self.call(|reply| Command::Start {
            purpose: CapturePurpose::Recording,
            reply,
        })?
        .map_err(AppError::Rejected)
    }

    /// Starts a one-shot still capture.
    ///
    /// # Errors
    /// [`AppError::Rejected`] with `AlreadyActive` while a session is live.
    pub fn request_still(&self) -> Result<SessionId, AppError> {
        self.call(|reply| Command::Start {
            purpose: CapturePurpose::Still,
            reply,
        })?
        .map_err(AppError::Rejected)
    }

    /// Stops the running recording and returns the artifact path.
    ///
    /// # Errors
    /// [`AppError::Rejected`] when nothing is recording or the artifact is
    /// empty.
    pub fn request_stop(&self) -> Result<PathBuf, AppError> {
        self.call(|reply| Command::Stop { reply })?
            .map_err(AppError::Rejected)
    }

    /// Overlay menu tap. Returns the resulting `expanded` flag.
    ///
    /// # Errors
    /// [`AppError::Stopped`] once the service is gone.
    pub fn toggle_menu(&self) -> Result<bool, AppError> {
        self.call(|reply| Command::ToggleMenu { reply })
    }

    /// Overlay record tap.
    ///
    /// # Errors
    /// [`AppError::Stopped`] once the service is gone.
    pub fn record_tapped(&self) -> Result<RecordDispatch, AppError> {
        self.call(|reply| Command::RecordTapped { reply })
    }

    /// Overlay drag.
    ///
    /// # Errors
    /// [`AppError::Stopped`] once the service is gone.
    pub fn drag_overlay(&self, dx: i32, dy: i32) -> Result<(), AppError> {
        self.send(Command::Drag { dx, dy })
    }

    /// Status surface button.
    ///
    /// # Errors
    /// [`AppError::Stopped`] once the service is gone.
    pub fn notification_action(&self, action: NotificationAction) -> Result<(), AppError> {
        self.send(Command::Notification { action })
    }

    /// Host-initiated `start(resultToken)`.
    ///
    /// # Errors
    /// [`AppError::Bridge`] with `AlreadyPending` while a start is outstanding.
    pub fn host_start(&self, result_token: impl Into<String>) -> Result<(), AppError> {
        let result_token = result_token.into();
        self.call(|reply| Command::HostStart {
            result_token,
            reply,
        })?
        .map_err(AppError::Bridge)
    }

    /// Host-initiated `stop(resultToken)`.
    ///
    /// # Errors
    /// [`AppError::Bridge`] with `AlreadyPending` while a stop is outstanding.
    pub fn host_stop(&self, result_token: impl Into<String>) -> Result<(), AppError> {
        let result_token = result_token.into();
        self.call(|reply| Command::HostStop {
            result_token,
            reply,
        })?
        .map_err(AppError::Bridge)
    }

    /// The host layer attached; queued messages are retried now.
    ///
    /// # Errors
    /// [`AppError::Stopped`] once the service is gone.
    pub fn host_attached(&self) -> Result<(), AppError> {
        self.send(Command::HostAttached)
    }

    /// The OS revoked the screen projection.
    ///
    /// # Errors
    /// [`AppError::Stopped`] once the service is gone.
    pub fn projection_revoked(&self) -> Result<(), AppError> {
        self.send(Command::ProjectionRevoked)
    }

    /// The encoder failed while recording.
    ///
    /// # Errors
    /// [`AppError::Stopped`] once the service is gone.
    pub fn encoder_fault(&self, message: impl Into<String>) -> Result<(), AppError> {
        self.send(Command::EncoderFault {
            message: message.into(),
        })
    }

    /// Returns a consistent copy of the service state.
    ///
    /// # Errors
    /// [`AppError::Stopped`] once the service is gone.
    pub fn snapshot(&self) -> Result<ServiceSnapshot, AppError> {
        self.call(|reply| Command::Snapshot { reply })
    }

    /// Stops the service: releases live capture resources, lets queued
    /// uploads finish, then stops host delivery.
    ///
    /// # Errors
    /// [`AppError::Spawn`] when the service thread panicked.
    pub fn shutdown(mut self) -> Result<(), AppError> {
        self.stop_actor()
    }

    fn stop_actor(&mut self) -> Result<(), AppError> {
        let Some(actor) = self.actor.take() else {
            return Ok(());
        };
        let _ = self.tx.send(Command::Shutdown);
        actor
            .join()
            .map_err(|_| AppError::Spawn("capture service thread panicked".to_string()))
    }

    fn send(&self, command: Command) -> Result<(), AppError> {
        self.tx.send(command).map_err(|_| AppError::Stopped)
    }

    fn call<T>(&self, build: impl FnOnce(Sender<T>) -> Command) -> Result<T, AppError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.send(build(reply_tx))?;
        reply_rx.recv().map_err(|_| AppError::Stopped)
    }
}

impl Drop for CaptureService {
    fn drop(&mut self) {
        if let Err(error) = self.stop_actor() {
            warn!(error = %error, "capture service did not stop cleanly");
        }
    }
}

struct Actor {
    manager: CaptureSessionManager,
    overlay: OverlayController,
    presenter: NotificationPresenter,
    /// Session whose upload the status surface is showing.
    presenter_session: Option<SessionId>,
    /// Uploads queued or running, with whether `analysis.started` went out.
    uploads: HashMap<SessionId, bool>,
    bridge: EventBridge,
    worker: UploadWorker,
    permissions: Box<dyn PermissionRequester>,
    status: Box<dyn StatusSink>,
    last_view: Option<StatusView>,
    /// Monotonic auto-stop instant of the live recording.
    deadline_at: Option<Instant>,
    tx: Sender<Command>,
}

/// Auto-stop instant for `session` when recording began at `armed_at`.
///
/// Wall-clock steps move the reported epoch times, never this instant.
fn deadline_instant(session: &CaptureSession, armed_at: Instant) -> Instant {
    armed_at + Duration::from_millis(session.deadline_ms.saturating_sub(session.started_at_ms))
}

impl Actor {
    fn run(mut self, rx: Receiver<Command>) {
        self.refresh_status();

        loop {
            let command = match self.deadline_at {
                Some(deadline_at) => {
                    let now = Instant::now();
                    if now >= deadline_at {
                        self.on_deadline();
                        continue;
                    }
                    match rx.recv_timeout(deadline_at - now) {
                        Ok(command) => command,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match rx.recv() {
                    Ok(command) => command,
                    Err(_) => break,
                },
            };

            if matches!(command, Command::Shutdown) {
                break;
            }
            self.handle(command);
        }

        self.teardown(&rx);
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Start { purpose, reply } => {
                let _ = reply.send(self.start(purpose));
            }
            Command::Stop { reply } => {
                let _ = reply.send(self.stop(StopReason::Manual));
            }
            Command::PermissionResult { session_id, grant } => {
                self.on_permission_result(session_id, grant);
            }
            Command::PermissionAbandoned { session_id } => {
                self.on_permission_abandoned(session_id);
            }
            Command::ToggleMenu { reply } => {
                let _ = reply.send(self.overlay.toggle_menu(now_epoch_ms()));
            }
            Command::RecordTapped { reply } => {
                let mut overlay = mem::take(&mut self.overlay);
                let dispatch = overlay.on_record_tapped(now_epoch_ms(), self);
                self.overlay = overlay;
                self.overlay.reflect_recording(self.manager.is_recording());
                debug!(dispatch = ?dispatch, "record tap");
                let _ = reply.send(dispatch);
            }
            Command::Drag { dx, dy } => self.overlay.on_drag(dx, dy),
            Command::Notification { action } => self.on_notification_action(action),
            Command::HostStart {
                result_token,
                reply,
            } => {
                let _ = reply.send(self.host_start(result_token));
            }
            Command::HostStop {
                result_token,
                reply,
            } => {
                let _ = reply.send(self.host_stop(result_token));
            }
            Command::HostAttached => self.bridge.host_attached(),
            Command::ProjectionRevoked => {
                if self.manager.is_recording() {
                    info!("projection revoked by the system");
                    let _ = self.stop(StopReason::ProjectionRevoked);
                }
            }
            Command::EncoderFault { message } => self.on_encoder_fault(&message),
            Command::Upload(event) => self.on_upload_event(event),
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown => {}
        }
        if !self.manager.is_recording() {
            self.deadline_at = None;
        }
        self.refresh_status();
    }

    fn start(&mut self, purpose: CapturePurpose) -> Result<SessionId, FailureKind> {
        let request = self
            .manager
            .request_start(purpose)
            .map_err(|error| error.kind())?;

        let responder = PermissionResponder {
            tx: self.tx.clone(),
            session_id: request.session_id,
            answered: false,
        };
        self.permissions.request_permission(request, responder);
        Ok(request.session_id)
    }

    fn on_permission_result(&mut self, session_id: SessionId, grant: PermissionGrant) {
        let result = self
            .manager
            .on_permission_result(session_id, grant, now_epoch_ms());

        match result {
            Ok(PermissionOutcome::RecordingStarted(session)) => {
                self.deadline_at = Some(deadline_instant(&session, Instant::now()));
                self.overlay.reflect_recording(true);
                self.presenter.on_session_started();
                self.presenter_session = None;
                self.resolve_rpc(
                    RpcKind::Start,
                    RpcOutcome::Resolved {
                        value: json!({
                            "sessionId": session.id.0,
                            "filePath": session.output.display().to_string(),
                            "deadlineMs": session.deadline_ms,
                        }),
                    },
                );
            }
            Ok(PermissionOutcome::StillCaptured { session_id, path }) => {
                let file_path = path.display().to_string();
                self.publish(HostEvent::CaptureCompleted {
                    file_path: file_path.clone(),
                });
                self.resolve_rpc(
                    RpcKind::Start,
                    RpcOutcome::Resolved {
                        value: json!({ "sessionId": session_id.0, "filePath": file_path }),
                    },
                );
            }
            Err(SessionError::UnexpectedPermissionResult(_)) => {}
            Err(error) => {
                let kind = error.kind();
                self.resolve_rpc(
                    RpcKind::Start,
                    RpcOutcome::Rejected {
                        kind,
                        message: error.to_string(),
                    },
                );
                if kind != FailureKind::PermissionDenied {
                    self.presenter.on_failure(kind, error.to_string());
                    self.presenter_session = None;
                }
            }
        }
    }

    fn on_permission_abandoned(&mut self, session_id: SessionId) {
        if self.manager.cancel_pending(session_id).is_none() {
            return;
        }
        info!(session_id = %session_id, "permission prompt closed without an answer");
        self.resolve_rpc(
            RpcKind::Start,
            RpcOutcome::Rejected {
                kind: FailureKind::PermissionDenied,
                message: "permission prompt closed without an answer".to_string(),
            },
        );
    }

    fn stop(&mut self, reason: StopReason) -> Result<PathBuf, FailureKind> {
        let result = self.manager.request_stop(reason, now_epoch_ms());
        self.finish_stop(result)
    }

    fn on_deadline(&mut self) {
        self.deadline_at = None;
        if self.manager.is_recording() {
            info!("recording deadline reached");
            let _ = self.stop(StopReason::Deadline);
            self.refresh_status();
        }
    }

    fn finish_stop(
        &mut self,
        result: Result<StopOutcome, SessionError>,
    ) -> Result<PathBuf, FailureKind> {
        self.overlay.reflect_recording(self.manager.is_recording());

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(SessionError::NotRecording) => return Err(SessionError::NotRecording.kind()),
            Err(error) => {
                let kind = error.kind();
                self.presenter.on_failure(kind, error.to_string());
                self.presenter_session = None;
                return Err(kind);
            }
        };

        let path = outcome.artifact.path.clone();
        self.publish(HostEvent::RecordingCompleted {
            file_path: path.display().to_string(),
            auto_stop: outcome.reason.is_auto_stop(),
        });

        self.presenter.on_recording_completed();
        self.presenter_session = Some(outcome.session_id);
        self.uploads.insert(outcome.session_id, false);
        let submitted = self.worker.submit(UploadJob {
            session_id: outcome.session_id,
            artifact: path.clone(),
        });
        if !submitted {
            self.on_upload_event(UploadEvent::Finished {
                session_id: outcome.session_id,
                outcome: Err(UploadFailure {
                    kind: FailureKind::UploadServerError,
                    message: "upload worker is not running".to_string(),
                }),
            });
        }
        Ok(path)
    }

    fn on_encoder_fault(&mut self, message: &str) {
        if self.manager.on_encoder_fault(message).is_some() {
            self.overlay.reflect_recording(false);
            self.presenter
                .on_failure(FailureKind::EncoderRuntimeFailure, message.to_string());
            self.presenter_session = None;
        }
    }

    fn on_upload_event(&mut self, event: UploadEvent) {
        match event {
            UploadEvent::Progress {
                session_id,
                progress,
            } => {
                let current = self.presenter_session == Some(session_id);
                if current {
                    self.presenter.on_upload_progress(progress.percent());
                }
                if progress.percent() == 100 {
                    if let Some(started) = self.uploads.get_mut(&session_id) {
                        if !*started {
                            *started = true;
                            self.publish(HostEvent::AnalysisStarted {});
                        }
                    }
                }
            }
            UploadEvent::Finished {
                session_id,
                outcome,
            } => {
                self.uploads.remove(&session_id);
                let current = self.presenter_session == Some(session_id);
                match outcome {
                    Ok(result) => {
                        self.publish(HostEvent::AnalysisReady(result.clone()));
                        if current {
                            self.presenter.on_result(result);
                        }
                    }
                    Err(failure) => {
                        self.publish(HostEvent::AnalysisFailed {
                            kind: failure.kind,
                            message: failure.message.clone(),
                        });
                        if current {
                            self.presenter.on_failure(failure.kind, failure.message);
                            self.presenter_session = None;
                        }
                    }
                }
                if !current {
                    debug!(session_id = %session_id, "result of a superseded session not shown");
                }
            }
        }
    }

    fn on_notification_action(&mut self, action: NotificationAction) {
        match action {
            NotificationAction::ToggleCapture => {
                let outcome = if self.manager.is_recording() {
                    self.stop(StopReason::Manual).map(|_| ())
                } else {
                    self.start(CapturePurpose::Recording).map(|_| ())
                };
                if let Err(kind) = outcome {
                    debug!(kind = %kind, "toggle capture rejected");
                }
            }
            NotificationAction::ViewResult => {
                let state = self.presenter.state();
                if state.phase == NotificationPhase::Completed {
                    if let Some(result) = &state.result {
                        let correlation_id = result.correlation_id.clone();
                        self.publish(HostEvent::ViewResult { correlation_id });
                    }
                }
            }
            NotificationAction::Dismiss => self.presenter.dismiss(),
        }
    }

    fn host_start(&mut self, result_token: String) -> Result<(), BridgeError> {
        self.bridge.begin_rpc(RpcKind::Start, result_token)?;
        if let Err(kind) = self.start(CapturePurpose::Recording) {
            self.resolve_rpc(
                RpcKind::Start,
                RpcOutcome::Rejected {
                    kind,
                    message: kind.to_string(),
                },
            );
        }
        Ok(())
    }

    fn host_stop(&mut self, result_token: String) -> Result<(), BridgeError> {
        self.bridge.begin_rpc(RpcKind::Stop, result_token)?;
        let outcome = match self.stop(StopReason::Manual) {
            Ok(path) => RpcOutcome::Resolved {
                value: json!({ "filePath": path.display().to_string() }),
            },
            Err(kind) => RpcOutcome::Rejected {
                kind,
                message: kind.to_string(),
            },
        };
        self.resolve_rpc(RpcKind::Stop, outcome);
        Ok(())
    }

    fn resolve_rpc(&mut self, kind: RpcKind, outcome: RpcOutcome) {
        if let Err(error) = self.bridge.complete_rpc(kind, outcome) {
            warn!(request = ?kind, error = %error, "host request completion not queued");
        }
    }

    fn publish(&mut self, event: HostEvent) {
        if let Err(error) = self.bridge.publish(&event) {
            warn!(event = event.name(), error = %error, "host event not queued");
        }
    }

    fn refresh_status(&mut self) {
        let view = self.presenter.render(self.manager.is_recording());
        if self.last_view.as_ref() != Some(&view) {
            self.status.show(&view);
            self.last_view = Some(view);
        }
    }

    fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot {
            session_state: self.manager.state(),
            session_id: self.manager.session_id(),
            last_error: self.manager.last_error(),
            overlay: self.overlay.state(),
            record_icon: self.overlay.record_icon(),
            notification: self.presenter.state().clone(),
            status: self.presenter.render(self.manager.is_recording()),
            bridge: self.bridge.stats(),
            uploads_in_flight: self.uploads.len(),
        }
    }

    fn teardown(mut self, rx: &Receiver<Command>) {
        self.manager.abort();
        self.overlay.reflect_recording(false);

        // In-flight uploads run to completion; publish what they produce.
        self.worker.shutdown();
        for command in rx.try_iter() {
            if let Command::Upload(event) = command {
                self.on_upload_event(event);
            }
        }

        let grace = self.bridge.policy().retry_interval;
        if !self.bridge.wait_idle(grace) {
            debug!(pending = self.bridge.pending_len(), "host delivery still pending at shutdown");
        }
        self.bridge.shutdown();
        info!("capture service stopped");
    }
}

impl RecordControl for Actor {
    fn is_recording(&self) -> bool {
        self.manager.is_recording()
    }

    fn start_recording(&mut self) -> Result<(), FailureKind> {
        self.start(CapturePurpose::Recording).map(|_| ())
    }

    fn stop_recording(&mut self) -> Result<(), FailureKind> {
        self.stop(StopReason::Manual).map(|_| ())
    }
}
