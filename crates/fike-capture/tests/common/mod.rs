//! Shared fixtures for capture integration tests.

use std::path::Path;
use std::sync::{Arc, Mutex};

use fike_capture::{
    CaptureSessionManager, CapturePurpose, PermissionGrant, PermissionToken, ResourceLedger,
    SessionConfig, SyntheticBehavior, SyntheticCaptureBackend,
};

/// Manager wired to a synthetic backend plus handles to inspect it.
#[allow(dead_code)]
pub struct Harness {
    pub manager: CaptureSessionManager,
    pub behavior: Arc<Mutex<SyntheticBehavior>>,
    pub ledger: Arc<ResourceLedger>,
}

/// Builds a harness writing into `dir` with the default 15 s horizon.
#[allow(dead_code)]
pub fn harness(dir: &Path) -> Harness {
    let backend = SyntheticCaptureBackend::default();
    let behavior = backend.behavior();
    let ledger = backend.ledger();
    Harness {
        manager: CaptureSessionManager::new(Box::new(backend), SessionConfig::new(dir)),
        behavior,
        ledger,
    }
}

/// Starts a recording at `now_ms` and asserts it is live.
#[allow(dead_code)]
pub fn start_recording(manager: &mut CaptureSessionManager, now_ms: u64) {
    let request = manager
        .request_start(CapturePurpose::Recording)
        .expect("start should be accepted");
    manager
        .on_permission_result(
            request.session_id,
            PermissionGrant::Granted(PermissionToken::new(request.session_id.0)),
            now_ms,
        )
        .expect("recording should start");
}

/// Applies `edit` to the synthetic backend behavior.
#[allow(dead_code)]
pub fn configure(
    behavior: &Arc<Mutex<SyntheticBehavior>>,
    edit: impl FnOnce(&mut SyntheticBehavior),
) {
    let mut guard = behavior.lock().expect("behavior lock should work");
    edit(&mut guard);
}
