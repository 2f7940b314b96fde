//! Integration tests for the auto-stop deadline.

mod common;

use fike_capture::{SessionError, SessionState, StopReason};

#[test]
fn deadline_tests_fires_once_at_the_horizon() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let mut harness = common::harness(dir.path());
    common::start_recording(&mut harness.manager, 10_000);

    assert_eq!(harness.manager.deadline(), Some(25_000));
    assert!(harness.manager.on_deadline(24_999).is_none());

    let outcome = harness
        .manager
        .on_deadline(25_000)
        .expect("deadline should fire")
        .expect("auto stop should complete");
    assert_eq!(outcome.reason, StopReason::Deadline);
    assert!(outcome.reason.is_auto_stop());
    assert_eq!(outcome.duration_ms, 15_000);

    assert!(harness.manager.on_deadline(25_001).is_none());
    assert!(harness.manager.on_deadline(40_000).is_none());
    assert_eq!(harness.ledger.snapshot().encoders_stopped, 1);
}

#[test]
fn deadline_tests_manual_stop_disarms_the_deadline() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let mut harness = common::harness(dir.path());
    common::start_recording(&mut harness.manager, 0);

    harness
        .manager
        .request_stop(StopReason::Manual, 5_000)
        .expect("manual stop should complete");

    assert_eq!(harness.manager.deadline(), None);
    assert!(harness.manager.on_deadline(15_000).is_none());
    assert_eq!(
        harness.manager.request_stop(StopReason::Deadline, 15_000),
        Err(SessionError::NotRecording)
    );
    assert_eq!(harness.manager.state(), SessionState::Completed);
    assert_eq!(harness.ledger.snapshot().encoders_stopped, 1);
}

#[test]
fn deadline_tests_late_tick_still_stops_once() {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let mut harness = common::harness(dir.path());
    common::start_recording(&mut harness.manager, 1_000);

    let outcome = harness
        .manager
        .on_deadline(16_040)
        .expect("deadline should fire")
        .expect("auto stop should complete");
    assert_eq!(outcome.duration_ms, 15_040);
    assert!(harness.manager.on_deadline(16_041).is_none());
}
