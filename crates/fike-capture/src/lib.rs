#![warn(missing_docs)]
//! # fike-capture
//!
//! ## Purpose
//! Owns screen-capture resources and the recording session state machine.
//!
//! ## Responsibilities
//! - Define backend-agnostic projection and encoder traits.
//! - Guarantee that a projection and its encoder are acquired and released
//!   together ([`RecordingPair`]).
//! - Provide a deterministic synthetic backend for CI and demos.
//! - Drive the single-session lifecycle ([`session::CaptureSessionManager`]).
//!
//! ## Data flow
//! Permission grant -> [`CaptureBackend::open_projection`] ->
//! [`Projection::start_encoder`] -> recording -> [`RecordingPair::stop`] ->
//! artifact inspected by the session manager.
//!
//! ## Ownership and lifetimes
//! A [`PermissionToken`] is consumed by the projection it opens. The projection
//! and encoder live inside one [`RecordingPair`], which releases both on stop
//! or on drop, exactly once.
//!
//! ## Error model
//! Backend failures are [`CaptureError`] values; the session manager converts
//! them into [`session::SessionError`] and the shared taxonomy.
//!
//! ## Security and privacy notes
//! Permission tokens are opaque and redacted from `Debug` output.

pub mod session;

use std::any::Any;
use std::fmt;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::{debug, warn};

pub use session::{
    Artifact, CaptureSession, CaptureSessionManager, PermissionOutcome, PermissionRequest,
    SessionConfig, SessionError, SessionState, StopOutcome, StopReason,
};

/// Opaque OS credential authorizing one capture session.
pub struct PermissionToken {
    id: u64,
    payload: Option<Box<dyn Any + Send>>,
}

impl PermissionToken {
    /// Creates a token with no platform payload.
    pub fn new(id: u64) -> Self {
        Self { id, payload: None }
    }

    /// Creates a token wrapping a platform-specific grant.
    pub fn with_payload(id: u64, payload: Box<dyn Any + Send>) -> Self {
        Self {
            id,
            payload: Some(payload),
        }
    }

    /// Returns the token identifier.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Takes the platform payload out of the token.
    pub fn take_payload(&mut self) -> Option<Box<dyn Any + Send>> {
        self.payload.take()
    }
}

impl fmt::Debug for PermissionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PermissionToken")
            .field("id", &self.id)
            .field("payload", &"<redacted>")
            .finish()
    }
}

/// Result of the host permission prompt.
#[derive(Debug)]
pub enum PermissionGrant {
    /// User granted capture.
    Granted(PermissionToken),
    /// User declined.
    Denied,
}

/// What a capture session produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePurpose {
    /// Time-boxed screen recording.
    Recording,
    /// One still frame.
    Still,
}

/// Physical display metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMetrics {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Density in dots per inch.
    pub density_dpi: u32,
}

/// Encoder settings for one recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncoderProfile {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Target video bitrate.
    pub bitrate_bps: u32,
    /// Target frame rate.
    pub frame_rate: u32,
    /// Whether an audio track is recorded.
    pub audio: bool,
}

impl EncoderProfile {
    /// Maximum encoded width.
    pub const MAX_WIDTH: u32 = 1280;
    /// Maximum encoded height.
    pub const MAX_HEIGHT: u32 = 720;
    /// Default bitrate (2 Mbps).
    pub const BITRATE_BPS: u32 = 2_000_000;
    /// Default frame rate.
    pub const FRAME_RATE: u32 = 24;

    /// Derives the H.264/MP4 profile for a display.
    ///
    /// Dimensions are capped and rounded down to even values, which the
    /// encoder requires.
    pub fn for_display(metrics: &DisplayMetrics) -> Self {
        Self {
            width: even_dimension(metrics.width.min(Self::MAX_WIDTH)),
            height: even_dimension(metrics.height.min(Self::MAX_HEIGHT)),
            bitrate_bps: Self::BITRATE_BPS,
            frame_rate: Self::FRAME_RATE,
            audio: false,
        }
    }
}

fn even_dimension(value: u32) -> u32 {
    (value & !1).max(2)
}

/// Platform capture provider.
pub trait CaptureBackend: Send {
    /// Returns metrics of the display being captured.
    fn display_metrics(&self) -> DisplayMetrics;

    /// Opens a projection with the granted token.
    ///
    /// # Errors
    /// Returns [`CaptureError::Projection`] when the grant cannot be used.
    fn open_projection(&mut self, token: PermissionToken)
    -> Result<Box<dyn Projection>, CaptureError>;
}

/// Live screen projection.
pub trait Projection: Send {
    /// Starts a virtual display feeding an encoder writing to `output`.
    ///
    /// # Errors
    /// Returns [`CaptureError::Encoder`] when the encoder cannot be prepared.
    fn start_encoder(
        &mut self,
        output: &Path,
        profile: &EncoderProfile,
    ) -> Result<Box<dyn Encoder>, CaptureError>;

    /// Writes a single frame as an image to `output`.
    ///
    /// # Errors
    /// Returns [`CaptureError::Still`] when the frame cannot be grabbed.
    fn capture_still(
        &mut self,
        output: &Path,
        metrics: &DisplayMetrics,
    ) -> Result<(), CaptureError>;

    /// Stops the projection. Must tolerate being called once per projection.
    fn release(&mut self);
}

/// Virtual display plus encoder for one recording.
pub trait Encoder: Send {
    /// Finalizes the output container.
    ///
    /// # Errors
    /// Returns [`CaptureError::Encoder`] when finalization fails; resources
    /// still have to be released afterwards.
    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Tears down the virtual display and encoder.
    fn release(&mut self);
}

/// Outcome of releasing a [`RecordingPair`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    /// Swallowed encoder stop failure, if any.
    pub stop_error: Option<String>,
}

/// Projection and encoder acquired as one unit.
///
/// Acquisition either yields both resources or neither. Release happens once,
/// either through [`RecordingPair::stop`] or on drop.
pub struct RecordingPair {
    encoder: Option<Box<dyn Encoder>>,
    projection: Option<Box<dyn Projection>>,
    output: PathBuf,
}

impl RecordingPair {
    /// Opens a projection and starts the encoder.
    ///
    /// # Errors
    /// Propagates the backend error; a projection opened before an encoder
    /// failure is released before returning.
    pub fn acquire(
        backend: &mut dyn CaptureBackend,
        token: PermissionToken,
        output: &Path,
        profile: &EncoderProfile,
    ) -> Result<Self, CaptureError> {
        let mut projection = backend.open_projection(token)?;
        match projection.start_encoder(output, profile) {
            Ok(encoder) => Ok(Self {
                encoder: Some(encoder),
                projection: Some(projection),
                output: output.to_path_buf(),
            }),
            Err(error) => {
                projection.release();
                Err(error)
            }
        }
    }

    /// Path the encoder writes to.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Stops the encoder and releases both resources.
    ///
    /// Stop failures are logged and reported, never propagated.
    pub fn stop(mut self) -> ReleaseReport {
        self.release_all()
    }

    fn release_all(&mut self) -> ReleaseReport {
        let mut report = ReleaseReport::default();

        if let Some(mut encoder) = self.encoder.take() {
            if let Err(error) = encoder.stop() {
                warn!(error = %error, output = %self.output.display(), "encoder stop failed");
                report.stop_error = Some(error.to_string());
            }
            encoder.release();
        }
        if let Some(mut projection) = self.projection.take() {
            projection.release();
        }

        debug!(output = %self.output.display(), "recording pair released");
        report
    }
}

impl Drop for RecordingPair {
    fn drop(&mut self) {
        if self.encoder.is_some() || self.projection.is_some() {
            let _ = self.release_all();
        }
    }
}

impl fmt::Debug for RecordingPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingPair")
            .field("output", &self.output)
            .field("live", &self.encoder.is_some())
            .finish()
    }
}

/// Opens a projection, grabs one frame and releases the projection.
///
/// # Errors
/// Propagates projection or still-capture failures.
pub fn capture_still(
    backend: &mut dyn CaptureBackend,
    token: PermissionToken,
    output: &Path,
) -> Result<(), CaptureError> {
    let metrics = backend.display_metrics();
    let mut projection = backend.open_projection(token)?;
    let result = projection.capture_still(output, &metrics);
    projection.release();
    result
}

/// Live resource counters of the synthetic backend.
#[derive(Debug, Default)]
pub struct ResourceLedger {
    projections_opened: AtomicUsize,
    projections_released: AtomicUsize,
    encoders_started: AtomicUsize,
    encoders_stopped: AtomicUsize,
    encoders_released: AtomicUsize,
}

/// Point-in-time copy of a [`ResourceLedger`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    /// Projections opened.
    pub projections_opened: usize,
    /// Projections released.
    pub projections_released: usize,
    /// Encoders started.
    pub encoders_started: usize,
    /// Encoder stop calls.
    pub encoders_stopped: usize,
    /// Encoders released.
    pub encoders_released: usize,
}

impl LedgerSnapshot {
    /// Returns `true` when every acquired resource was released exactly once.
    pub fn is_balanced(&self) -> bool {
        self.projections_opened == self.projections_released
            && self.encoders_started == self.encoders_released
    }
}

impl ResourceLedger {
    /// Returns current counters.
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            projections_opened: self.projections_opened.load(Ordering::SeqCst),
            projections_released: self.projections_released.load(Ordering::SeqCst),
            encoders_started: self.encoders_started.load(Ordering::SeqCst),
            encoders_stopped: self.encoders_stopped.load(Ordering::SeqCst),
            encoders_released: self.encoders_released.load(Ordering::SeqCst),
        }
    }
}

/// Failure injection switches for the synthetic backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticBehavior {
    /// Reject every projection request.
    pub fail_projection: bool,
    /// Fail encoder preparation.
    pub fail_encoder: bool,
    /// Fail encoder stop (bytes are still written).
    pub fail_stop: bool,
    /// Bytes written to the artifact on stop; `0` yields an empty file.
    pub artifact_bytes: usize,
}

impl Default for SyntheticBehavior {
    fn default() -> Self {
        Self {
            fail_projection: false,
            fail_encoder: false,
            fail_stop: false,
            artifact_bytes: 4_096,
        }
    }
}

/// Deterministic capture backend for CI, tests and demos.
#[derive(Debug, Clone)]
pub struct SyntheticCaptureBackend {
    metrics: DisplayMetrics,
    behavior: Arc<Mutex<SyntheticBehavior>>,
    ledger: Arc<ResourceLedger>,
}

impl SyntheticCaptureBackend {
    /// Creates a backend reporting `metrics`.
    pub fn new(metrics: DisplayMetrics) -> Self {
        Self {
            metrics,
            behavior: Arc::new(Mutex::new(SyntheticBehavior::default())),
            ledger: Arc::new(ResourceLedger::default()),
        }
    }

    /// Shared failure-injection switches; edits apply to later operations.
    pub fn behavior(&self) -> Arc<Mutex<SyntheticBehavior>> {
        Arc::clone(&self.behavior)
    }

    /// Shared resource counters.
    pub fn ledger(&self) -> Arc<ResourceLedger> {
        Arc::clone(&self.ledger)
    }

    fn current_behavior(&self) -> SyntheticBehavior {
        match self.behavior.lock() {
            Ok(behavior) => behavior.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for SyntheticCaptureBackend {
    fn default() -> Self {
        Self::new(DisplayMetrics {
            width: 1080,
            height: 2340,
            density_dpi: 420,
        })
    }
}

impl CaptureBackend for SyntheticCaptureBackend {
    fn display_metrics(&self) -> DisplayMetrics {
        self.metrics
    }

    fn open_projection(
        &mut self,
        token: PermissionToken,
    ) -> Result<Box<dyn Projection>, CaptureError> {
        let behavior = self.current_behavior();
        if behavior.fail_projection {
            return Err(CaptureError::Projection(format!(
                "synthetic projection refused token {}",
                token.id()
            )));
        }

        self.ledger.projections_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticProjection {
            behavior,
            ledger: Arc::clone(&self.ledger),
            released: false,
        }))
    }
}

struct SyntheticProjection {
    behavior: SyntheticBehavior,
    ledger: Arc<ResourceLedger>,
    released: bool,
}

impl Projection for SyntheticProjection {
    fn start_encoder(
        &mut self,
        output: &Path,
        profile: &EncoderProfile,
    ) -> Result<Box<dyn Encoder>, CaptureError> {
        if self.behavior.fail_encoder {
            return Err(CaptureError::Encoder(format!(
                "synthetic encoder refused {}x{}",
                profile.width, profile.height
            )));
        }

        File::create(output).map_err(|error| {
            CaptureError::Io(format!("cannot create '{}': {error}", output.display()))
        })?;
        self.ledger.encoders_started.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SyntheticEncoder {
            output: output.to_path_buf(),
            behavior: self.behavior.clone(),
            ledger: Arc::clone(&self.ledger),
            released: false,
        }))
    }

    fn capture_still(
        &mut self,
        output: &Path,
        metrics: &DisplayMetrics,
    ) -> Result<(), CaptureError> {
        let mut image = b"\x89PNG\r\n\x1a\n".to_vec();
        image.extend_from_slice(&metrics.width.to_be_bytes());
        image.extend_from_slice(&metrics.height.to_be_bytes());
        fs::write(output, image).map_err(|error| {
            CaptureError::Still(format!("cannot write '{}': {error}", output.display()))
        })
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.ledger.projections_released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct SyntheticEncoder {
    output: PathBuf,
    behavior: SyntheticBehavior,
    ledger: Arc<ResourceLedger>,
    released: bool,
}

impl Encoder for SyntheticEncoder {
    fn stop(&mut self) -> Result<(), CaptureError> {
        self.ledger.encoders_stopped.fetch_add(1, Ordering::SeqCst);

        if self.behavior.artifact_bytes > 0 {
            let mut file = File::options()
                .append(true)
                .open(&self.output)
                .map_err(|error| CaptureError::Io(error.to_string()))?;
            let body: Vec<u8> = (0..self.behavior.artifact_bytes)
                .map(|index| (index % 251) as u8)
                .collect();
            file.write_all(&body)
                .map_err(|error| CaptureError::Io(error.to_string()))?;
        }

        if self.behavior.fail_stop {
            return Err(CaptureError::Encoder("synthetic stop failure".to_string()));
        }
        Ok(())
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.ledger.encoders_released.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Capture backend error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    /// Projection could not be opened with the given grant.
    #[error("projection unavailable: {0}")]
    Projection(String),
    /// Encoder preparation, runtime or finalization failure.
    #[error("encoder failure: {0}")]
    Encoder(String),
    /// Still frame could not be captured.
    #[error("still capture failed: {0}")]
    Still(String),
    /// Filesystem failure around the output artifact.
    #[error("capture io failure: {0}")]
    Io(String),
}
