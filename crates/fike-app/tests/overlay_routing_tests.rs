//! Integration tests for overlay and status surface controls.

mod common;

use std::thread;
use std::time::Duration;

use common::{
    FAKE_83_BODY, PermissionMode, RecordingHost, ScriptedTransport, default_service,
    spawn_service, test_config, wait_recording, wait_until,
};
use fike_app::AppError;
use fike_capture::SessionState;
use fike_core::{EVENT_CAPTURE_COMPLETED, EVENT_RECORDING_COMPLETED, FailureKind};
use fike_ui::{NotificationAction, RecordDispatch, RecordIcon};

#[test]
fn overlay_routing_tests_record_tap_toggles_and_debounces() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let test = default_service(dir.path());

    assert_eq!(
        test.service.record_tapped().expect("tap should be handled"),
        RecordDispatch::StartRequested
    );
    assert!(wait_recording(&test));
    assert_eq!(
        test.service.record_tapped().expect("tap should be handled"),
        RecordDispatch::Debounced
    );
    assert_eq!(
        test.service.snapshot().expect("snapshot should work").record_icon,
        RecordIcon::Stop
    );

    thread::sleep(Duration::from_millis(550));
    assert_eq!(
        test.service.record_tapped().expect("tap should be handled"),
        RecordDispatch::StopRequested
    );
    assert!(wait_until(Duration::from_secs(2), || {
        test.host.payload_of(EVENT_RECORDING_COMPLETED).is_some()
    }));
    assert_eq!(
        test.service.snapshot().expect("snapshot should work").record_icon,
        RecordIcon::Record
    );
}

#[test]
fn overlay_routing_tests_menu_and_drag_never_touch_the_session() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let test = default_service(dir.path());

    assert!(test.service.toggle_menu().expect("menu tap should be handled"));
    assert!(
        test.service.toggle_menu().expect("menu tap should be handled"),
        "second flip inside the debounce window is ignored"
    );
    test.service.drag_overlay(15, -40).expect("drag should be handled");

    let snapshot = test.service.snapshot().expect("snapshot should work");
    assert!(snapshot.overlay.expanded);
    assert_eq!(snapshot.overlay.position, (15, 60));
    assert_eq!(snapshot.session_state, SessionState::Idle);
}

#[test]
fn overlay_routing_tests_second_start_is_already_active() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let test = spawn_service(
        test_config(dir.path()),
        PermissionMode::Hold,
        RecordingHost::attached(),
        ScriptedTransport::answering(200, FAKE_83_BODY),
    );

    test.service.request_start().expect("start should be accepted");
    let error = test
        .service
        .request_start()
        .expect_err("second start should be rejected");
    assert!(matches!(error, AppError::Rejected(FailureKind::AlreadyActive)));
    assert_eq!(
        test.service.snapshot().expect("snapshot should work").session_state,
        SessionState::AwaitingPermission
    );
}

#[test]
fn overlay_routing_tests_notification_toggle_starts_and_stops() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let test = default_service(dir.path());

    test.service
        .notification_action(NotificationAction::ToggleCapture)
        .expect("action should be accepted");
    assert!(wait_recording(&test));
    test.service
        .notification_action(NotificationAction::ToggleCapture)
        .expect("action should be accepted");
    assert!(wait_until(Duration::from_secs(2), || {
        test.host.payload_of(EVENT_RECORDING_COMPLETED).is_some()
    }));
}

#[test]
fn overlay_routing_tests_dismiss_hides_without_cancelling_upload() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let test = default_service(dir.path());

    test.service.request_start().expect("start should be accepted");
    assert!(wait_recording(&test));
    test.service.request_stop().expect("stop should succeed");
    test.service
        .notification_action(NotificationAction::Dismiss)
        .expect("action should be accepted");

    assert!(wait_until(Duration::from_secs(2), || {
        test.service
            .snapshot()
            .map(|snapshot| snapshot.notification.result.is_some())
            .unwrap_or(false)
    }));
}

#[test]
fn overlay_routing_tests_still_capture_publishes_capture_completed() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let test = default_service(dir.path());

    test.service.request_still().expect("still should be accepted");
    assert!(wait_until(Duration::from_secs(2), || {
        test.host.payload_of(EVENT_CAPTURE_COMPLETED).is_some()
    }));

    let payload = test
        .host
        .payload_of(EVENT_CAPTURE_COMPLETED)
        .expect("capture.completed should be delivered");
    let path = payload["filePath"].as_str().expect("path should be a string");
    assert!(path.ends_with(".png"));
    assert!(std::path::Path::new(path).exists());
    assert!(test.ledger.snapshot().is_balanced());
}
