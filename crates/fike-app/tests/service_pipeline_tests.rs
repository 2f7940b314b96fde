//! Integration tests for the record -> upload -> result pipeline.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{default_service, wait_recording, wait_until};
use fike_core::{
    EVENT_ANALYSIS_RESULT, EVENT_ANALYSIS_STARTED, EVENT_RECORDING_COMPLETED, EVENT_RESULT_VIEW,
};
use fike_ui::{NotificationAction, NotificationPhase, ProgressIndicator};
use serde_json::json;

#[test]
fn service_pipeline_tests_manual_stop_publishes_events_in_order() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let test = default_service(dir.path());

    test.service.request_start().expect("start should be accepted");
    assert!(wait_recording(&test));
    let artifact = test.service.request_stop().expect("stop should succeed");
    assert!(artifact.starts_with(dir.path()));

    assert!(wait_until(Duration::from_secs(2), || {
        test.host.names().iter().any(|name| name == EVENT_ANALYSIS_RESULT)
    }));
    assert_eq!(
        test.host.names(),
        vec![
            EVENT_RECORDING_COMPLETED.to_string(),
            EVENT_ANALYSIS_STARTED.to_string(),
            EVENT_ANALYSIS_RESULT.to_string(),
        ]
    );

    let completed = test
        .host
        .payload_of(EVENT_RECORDING_COMPLETED)
        .expect("recording.completed should be delivered");
    assert_eq!(completed["autoStop"], json!(false));
    assert_eq!(completed["filePath"], json!(artifact.display().to_string()));

    let result = test
        .host
        .payload_of(EVENT_ANALYSIS_RESULT)
        .expect("analysis.result should be delivered");
    assert_eq!(result["percentage"], json!(83));
    assert_eq!(result["label"], json!("FAKE"));
    assert_eq!(result["correlationId"], json!("vid-42"));
}

#[test]
fn service_pipeline_tests_status_surface_walks_every_phase() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let test = default_service(dir.path());

    test.service.request_start().expect("start should be accepted");
    assert!(wait_recording(&test));
    test.service.request_stop().expect("stop should succeed");

    assert!(wait_until(Duration::from_secs(2), || {
        test.service
            .snapshot()
            .map(|snapshot| snapshot.notification.phase == NotificationPhase::Completed)
            .unwrap_or(false)
    }));

    let views = test.status.views.lock().expect("views lock should work").clone();
    let titles: Vec<&str> = views.iter().map(|view| view.title.as_str()).collect();
    let uploading = titles
        .iter()
        .position(|title| *title == "Uploading recording")
        .expect("uploading should be shown");
    let complete = titles
        .iter()
        .position(|title| *title == "Analysis complete")
        .expect("completion should be shown");
    assert!(uploading < complete);
    assert!(
        views
            .iter()
            .any(|view| view.progress == ProgressIndicator::Determinate(50))
    );

    let snapshot = test.service.snapshot().expect("snapshot should work");
    let result = snapshot.notification.result.expect("result should be kept");
    assert_eq!(result.percentage, 83);
    assert_eq!(snapshot.uploads_in_flight, 0);
    assert_eq!(snapshot.status.body, "FAKE: 83% likely manipulated");
}

#[test]
fn service_pipeline_tests_view_result_forwards_correlation_id() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let test = default_service(dir.path());

    test.service.request_start().expect("start should be accepted");
    assert!(wait_recording(&test));
    test.service.request_stop().expect("stop should succeed");
    assert!(wait_until(Duration::from_secs(2), || {
        test.host.names().iter().any(|name| name == EVENT_ANALYSIS_RESULT)
    }));

    test.service
        .notification_action(NotificationAction::ViewResult)
        .expect("action should be accepted");
    assert!(wait_until(Duration::from_secs(2), || {
        test.host.payload_of(EVENT_RESULT_VIEW).is_some()
    }));
    assert_eq!(
        test.host.payload_of(EVENT_RESULT_VIEW),
        Some(json!({ "correlationId": "vid-42" }))
    );
}

#[test]
fn service_pipeline_tests_upload_envelope_carries_identity_and_artifact() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let test = default_service(dir.path());

    test.service.request_start().expect("start should be accepted");
    assert!(wait_recording(&test));
    let artifact = test.service.request_stop().expect("stop should succeed");
    assert!(wait_until(Duration::from_secs(2), || {
        test.transport.calls.load(Ordering::SeqCst) == 1
    }));

    let envelopes = test
        .transport
        .envelopes
        .lock()
        .expect("envelopes lock should work")
        .clone();
    let envelope = &envelopes[0];
    assert_eq!(envelope.user_id, "user123");
    assert_eq!(envelope.endpoint.as_str(), "http://analysis.test/analyze-video/");
    assert_eq!(envelope.artifact_path, artifact);
    assert!(envelope.file_name.starts_with("recording_"));
    assert!(envelope.file_name.ends_with(".mp4"));
    assert_eq!(envelope.idempotency_key.len(), 64);
}

#[test]
fn service_pipeline_tests_shutdown_releases_live_recording() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let test = default_service(dir.path());

    test.service.request_start().expect("start should be accepted");
    assert!(wait_recording(&test));

    let ledger = test.ledger.clone();
    test.service.shutdown().expect("shutdown should be clean");
    assert!(ledger.snapshot().is_balanced());
    assert_eq!(test.transport.calls.load(Ordering::SeqCst), 0);
}
