//! Shared fixtures and test doubles for service integration tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use fike_app::{
    CaptureService, Collaborators, PermissionRequester, PermissionResponder, ServiceConfig,
    StatusSink,
};
use fike_bridge::{BridgeMessage, DeliveryError, DeliveryPolicy, HostLink};
use fike_capture::{
    PermissionRequest, PermissionToken, ResourceLedger, SyntheticBehavior,
    SyntheticCaptureBackend,
};
use fike_ui::StatusView;
use fike_upload::{
    ProgressSink, RawResponse, UploadEnvelope, UploadError, UploadProgress, UploadTransport,
};

/// Body returned by the scripted analysis service.
#[allow(dead_code)]
pub const FAKE_83_BODY: &str =
    r#"{"videoId": "vid-42", "video_analysis": {"overall_confidence": 0.83}}"#;

/// How the scripted permission prompt answers.
#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionMode {
    /// Grant immediately.
    Grant,
    /// Decline immediately.
    Deny,
    /// Keep the responder for the test to answer.
    Hold,
}

/// Permission prompt double.
#[allow(dead_code)]
#[derive(Clone)]
pub struct ScriptedPermissions {
    pub mode: Arc<Mutex<PermissionMode>>,
    pub held: Arc<Mutex<Vec<PermissionResponder>>>,
    pub prompts: Arc<AtomicU32>,
}

impl ScriptedPermissions {
    #[allow(dead_code)]
    pub fn new(mode: PermissionMode) -> Self {
        Self {
            mode: Arc::new(Mutex::new(mode)),
            held: Arc::new(Mutex::new(Vec::new())),
            prompts: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Takes the oldest held responder.
    #[allow(dead_code)]
    pub fn take_held(&self) -> Option<PermissionResponder> {
        let mut held = self.held.lock().expect("held lock should work");
        if held.is_empty() {
            None
        } else {
            Some(held.remove(0))
        }
    }
}

impl PermissionRequester for ScriptedPermissions {
    fn request_permission(&mut self, request: PermissionRequest, responder: PermissionResponder) {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let mode = *self.mode.lock().expect("mode lock should work");
        match mode {
            PermissionMode::Grant => {
                responder.grant(PermissionToken::new(request.session_id.0));
            }
            PermissionMode::Deny => {
                responder.deny();
            }
            PermissionMode::Hold => self
                .held
                .lock()
                .expect("held lock should work")
                .push(responder),
        }
    }
}

/// Host link double recording every accepted message.
#[allow(dead_code)]
pub struct RecordingHost {
    pub attached: AtomicBool,
    pub messages: Mutex<Vec<BridgeMessage>>,
}

impl RecordingHost {
    #[allow(dead_code)]
    pub fn attached() -> Arc<Self> {
        Arc::new(Self {
            attached: AtomicBool::new(true),
            messages: Mutex::new(Vec::new()),
        })
    }

    #[allow(dead_code)]
    pub fn detached() -> Arc<Self> {
        let host = Self::attached();
        host.attached.store(false, Ordering::SeqCst);
        host
    }

    /// Copies of every accepted message.
    #[allow(dead_code)]
    pub fn messages(&self) -> Vec<BridgeMessage> {
        self.messages.lock().expect("messages lock should work").clone()
    }

    /// Names of accepted messages in delivery order.
    #[allow(dead_code)]
    pub fn names(&self) -> Vec<String> {
        self.messages()
            .iter()
            .map(|message| message.name().to_string())
            .collect()
    }

    /// Payload of the first event named `name`.
    #[allow(dead_code)]
    pub fn payload_of(&self, name: &str) -> Option<serde_json::Value> {
        self.messages().into_iter().find_map(|message| match message {
            BridgeMessage::Event {
                name: event,
                payload,
            } if event == name => Some(payload),
            _ => None,
        })
    }
}

impl HostLink for RecordingHost {
    fn deliver(&self, message: &BridgeMessage) -> Result<(), DeliveryError> {
        if !self.attached.load(Ordering::SeqCst) {
            return Err(DeliveryError::Detached);
        }
        self.messages
            .lock()
            .expect("messages lock should work")
            .push(message.clone());
        Ok(())
    }
}

/// Analysis service double: reports half and full progress, then answers.
#[allow(dead_code)]
pub struct ScriptedTransport {
    pub response: Mutex<Result<RawResponse, UploadError>>,
    pub calls: AtomicU32,
    pub envelopes: Mutex<Vec<UploadEnvelope>>,
}

impl ScriptedTransport {
    #[allow(dead_code)]
    pub fn answering(status: u16, body: &str) -> Arc<Self> {
        Self::with(Ok(RawResponse {
            status,
            body: body.to_string(),
        }))
    }

    #[allow(dead_code)]
    pub fn failing(error: UploadError) -> Arc<Self> {
        Self::with(Err(error))
    }

    fn with(response: Result<RawResponse, UploadError>) -> Arc<Self> {
        Arc::new(Self {
            response: Mutex::new(response),
            calls: AtomicU32::new(0),
            envelopes: Mutex::new(Vec::new()),
        })
    }
}

impl UploadTransport for ScriptedTransport {
    fn send(
        &self,
        envelope: &UploadEnvelope,
        progress: ProgressSink,
    ) -> Result<RawResponse, UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.envelopes
            .lock()
            .expect("envelopes lock should work")
            .push(envelope.clone());

        let total = envelope.content_length;
        progress(UploadProgress {
            sent_bytes: total / 2,
            total_bytes: total,
        });
        progress(UploadProgress {
            sent_bytes: total,
            total_bytes: total,
        });
        self.response.lock().expect("response lock should work").clone()
    }
}

/// Status sink double keeping every shown view.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct CollectingStatus {
    pub views: Arc<Mutex<Vec<StatusView>>>,
}

impl StatusSink for CollectingStatus {
    fn show(&mut self, view: &StatusView) {
        self.views
            .lock()
            .expect("views lock should work")
            .push(view.clone());
    }
}

/// Running service plus handles to every double.
#[allow(dead_code)]
pub struct TestService {
    pub service: CaptureService,
    pub host: Arc<RecordingHost>,
    pub transport: Arc<ScriptedTransport>,
    pub permissions: ScriptedPermissions,
    pub status: CollectingStatus,
    pub behavior: Arc<Mutex<SyntheticBehavior>>,
    pub ledger: Arc<ResourceLedger>,
}

/// Test configuration writing into `dir` with fast host delivery.
#[allow(dead_code)]
pub fn test_config(dir: &Path) -> ServiceConfig {
    ServiceConfig {
        analysis_url: "http://analysis.test".to_string(),
        output_dir: dir.to_path_buf(),
        bridge: DeliveryPolicy {
            max_attempts: 30,
            retry_interval: Duration::from_millis(10),
        },
        overlay_debounce_ms: 500,
        ..ServiceConfig::default()
    }
}

/// Spawns a service with the given doubles.
#[allow(dead_code)]
pub fn spawn_service(
    config: ServiceConfig,
    mode: PermissionMode,
    host: Arc<RecordingHost>,
    transport: Arc<ScriptedTransport>,
) -> TestService {
    let backend = SyntheticCaptureBackend::default();
    let behavior = backend.behavior();
    let ledger = backend.ledger();
    let permissions = ScriptedPermissions::new(mode);
    let status = CollectingStatus::default();

    let host_link: Arc<dyn HostLink> = host.clone();
    let upload: Arc<dyn UploadTransport> = transport.clone();
    let service = CaptureService::spawn(
        config,
        Collaborators {
            backend: Box::new(backend),
            permissions: Box::new(permissions.clone()),
            host: host_link,
            transport: upload,
            status: Box::new(status.clone()),
        },
    )
    .expect("service should spawn");

    TestService {
        service,
        host,
        transport,
        permissions,
        status,
        behavior,
        ledger,
    }
}

/// Spawns a granting service answering with [`FAKE_83_BODY`].
#[allow(dead_code)]
pub fn default_service(dir: &Path) -> TestService {
    spawn_service(
        test_config(dir),
        PermissionMode::Grant,
        RecordingHost::attached(),
        ScriptedTransport::answering(200, FAKE_83_BODY),
    )
}

/// Polls `condition` until it holds or `timeout` elapses.
#[allow(dead_code)]
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
}

/// Polls until the service reports recording.
#[allow(dead_code)]
pub fn wait_recording(test: &TestService) -> bool {
    wait_until(Duration::from_secs(2), || {
        test.service
            .snapshot()
            .map(|snapshot| snapshot.session_state == fike_capture::SessionState::Recording)
            .unwrap_or(false)
    })
}

/// Applies `edit` to the synthetic backend behavior.
#[allow(dead_code)]
pub fn configure_backend(test: &TestService, edit: impl FnOnce(&mut SyntheticBehavior)) {
    let mut guard = test.behavior.lock().expect("behavior lock should work");
    edit(&mut guard);
}
