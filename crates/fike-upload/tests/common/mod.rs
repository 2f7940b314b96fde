//! Shared fixtures for upload integration tests.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

/// Writes a deterministic fake recording and returns its directory guard and path.
#[allow(dead_code)]
pub fn fixture_recording(bytes: usize) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let path = dir.path().join("recording_1700000000000.mp4");
    let body: Vec<u8> = (0..bytes).map(|index| (index % 251) as u8).collect();
    fs::write(&path, body).expect("fixture recording should be written");
    (dir, path)
}

/// Fast retry policy for tests.
#[allow(dead_code)]
pub fn fast_retry(max_retries: u32) -> fike_upload::RetryPolicy {
    fike_upload::RetryPolicy {
        max_retries,
        base_delay_ms: 1,
        max_delay_ms: 10,
        jitter_ms: 0,
    }
}
