#![warn(missing_docs)]
//! # fike-core
//!
//! ## Purpose
//! Defines the pure data model shared across the `fike` workspace.
//!
//! ## Responsibilities
//! - Represent session identities and the normalized [`AnalysisResult`].
//! - Define the failure taxonomy ([`FailureKind`]) every component translates
//!   its errors into before crossing a component boundary.
//! - Define the named events ([`HostEvent`]) delivered to the host layer.
//!
//! ## Data flow
//! The session manager allocates [`SessionId`] values, the normalizer produces
//! [`AnalysisResult`], and the service wraps both into [`HostEvent`] values that
//! the event bridge serializes for the host application layer.
//!
//! ## Ownership and lifetimes
//! All types own their data (`String`, `PathBuf`-free string paths) so events
//! can move between the actor, upload worker and delivery threads freely.
//!
//! ## Error model
//! Only serialization can fail here; it is reported as [`CoreError::Codec`].
//!
//! ## Security and privacy notes
//! Nothing in this crate carries permission tokens or media bytes.
//!
//! ## Example
//! ```rust
//! use fike_core::{percentage_from_confidence, AnalysisResult, Verdict};
//!
//! let result = AnalysisResult::new(percentage_from_confidence(0.875), Verdict::Fake);
//! assert_eq!(result.percentage, 88);
//! ```

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Event emitted once a screen recording has been finalized on disk.
pub const EVENT_RECORDING_COMPLETED: &str = "recording.completed";
/// Event emitted once a still capture has been written.
pub const EVENT_CAPTURE_COMPLETED: &str = "capture.completed";
/// Event emitted once the artifact body has been fully sent for analysis.
pub const EVENT_ANALYSIS_STARTED: &str = "analysis.started";
/// Event emitted with the normalized analysis outcome.
pub const EVENT_ANALYSIS_RESULT: &str = "analysis.result";
/// Event emitted when upload or analysis failed.
pub const EVENT_ANALYSIS_FAILED: &str = "analysis.failed";
/// Event emitted when the user asks to open the detailed result.
pub const EVENT_RESULT_VIEW: &str = "result.view";

/// Identity of one capture session, unique within a service lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Binary verdict returned by the analysis service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    /// Content judged authentic.
    Real,
    /// Content judged manipulated.
    Fake,
}

impl Verdict {
    /// Parses a service label case-insensitively (`"FAKE"`, `"fake"`, ...).
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.eq_ignore_ascii_case("fake") {
            Some(Self::Fake)
        } else if trimmed.eq_ignore_ascii_case("real") {
            Some(Self::Real)
        } else {
            None
        }
    }

    /// Wire label (`REAL` / `FAKE`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Real => "REAL",
            Self::Fake => "FAKE",
        }
    }
}

/// Normalized outcome of one remote analysis.
///
/// Immutable once produced; shared by the status surface and host events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Manipulation likelihood in `[0, 100]`.
    pub percentage: u8,
    /// Final verdict.
    pub label: Verdict,
    /// Service-side identifier used to fetch the detailed report later.
    #[serde(default)]
    pub correlation_id: Option<String>,
    /// Audio-track manipulation likelihood in `[0, 100]`, when reported.
    #[serde(default)]
    pub audio_percentage: Option<u8>,
}

impl AnalysisResult {
    /// Creates a result without correlation id or audio score.
    pub fn new(percentage: u8, label: Verdict) -> Self {
        Self {
            percentage: percentage.min(100),
            label,
            correlation_id: None,
            audio_percentage: None,
        }
    }

    /// Default outcome when the service response carries no usable score.
    pub fn authentic_default() -> Self {
        Self::new(0, Verdict::Real)
    }
}

/// Converts a `[0, 1]` confidence into an integer percentage.
///
/// Out-of-range inputs are clamped and non-finite inputs map to `0`. Rounding
/// is half away from zero.
pub fn percentage_from_confidence(confidence: f64) -> u8 {
    if !confidence.is_finite() {
        return 0;
    }
    (confidence.clamp(0.0, 1.0) * 100.0).round() as u8
}

/// Failure taxonomy shared by every component boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The user declined the capture permission prompt.
    PermissionDenied,
    /// Projection or encoder could not be acquired.
    EncoderInitFailure,
    /// Encoder failed while recording.
    EncoderRuntimeFailure,
    /// Recording finished without a usable artifact.
    EmptyOutputFile,
    /// Upload or analysis exceeded its time budget.
    UploadTimeout,
    /// Upload rejected or analysis service failed.
    UploadServerError,
    /// Host layer never accepted a message.
    BridgeDeliveryFailure,
    /// A session is already in flight.
    AlreadyActive,
    /// A host request of the same kind is already outstanding.
    AlreadyPending,
}

impl FailureKind {
    /// Returns `true` when the user can simply try again.
    pub fn is_user_retriable(&self) -> bool {
        !matches!(self, Self::AlreadyActive | Self::AlreadyPending)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::PermissionDenied => "permission denied",
            Self::EncoderInitFailure => "encoder init failure",
            Self::EncoderRuntimeFailure => "encoder runtime failure",
            Self::EmptyOutputFile => "empty output file",
            Self::UploadTimeout => "upload timeout",
            Self::UploadServerError => "upload server error",
            Self::BridgeDeliveryFailure => "bridge delivery failure",
            Self::AlreadyActive => "already active",
            Self::AlreadyPending => "already pending",
        };
        f.write_str(label)
    }
}

/// Named event delivered to the host application layer.
///
/// Serialized as `{"name": "...", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "payload")]
pub enum HostEvent {
    /// A recording was finalized and handed to the upload pipeline.
    #[serde(rename = "recording.completed", rename_all = "camelCase")]
    RecordingCompleted {
        /// Absolute path of the finalized artifact.
        file_path: String,
        /// `true` when the recording deadline stopped the session.
        auto_stop: bool,
    },
    /// A still capture was written.
    #[serde(rename = "capture.completed", rename_all = "camelCase")]
    CaptureCompleted {
        /// Absolute path of the written image.
        file_path: String,
    },
    /// Artifact fully sent; the service is analyzing.
    #[serde(rename = "analysis.started")]
    AnalysisStarted {},
    /// Normalized analysis outcome.
    #[serde(rename = "analysis.result")]
    AnalysisReady(AnalysisResult),
    /// Upload or analysis failed.
    #[serde(rename = "analysis.failed")]
    AnalysisFailed {
        /// Taxonomy kind.
        kind: FailureKind,
        /// Human-readable detail.
        message: String,
    },
    /// User asked to open the detailed result.
    #[serde(rename = "result.view", rename_all = "camelCase")]
    ViewResult {
        /// Correlation id of the result to open.
        correlation_id: Option<String>,
    },
}

impl HostEvent {
    /// Returns the wire event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::RecordingCompleted { .. } => EVENT_RECORDING_COMPLETED,
            Self::CaptureCompleted { .. } => EVENT_CAPTURE_COMPLETED,
            Self::AnalysisStarted {} => EVENT_ANALYSIS_STARTED,
            Self::AnalysisReady(_) => EVENT_ANALYSIS_RESULT,
            Self::AnalysisFailed { .. } => EVENT_ANALYSIS_FAILED,
            Self::ViewResult { .. } => EVENT_RESULT_VIEW,
        }
    }

    /// Serializes the event payload (without the name envelope).
    ///
    /// # Errors
    /// Returns [`CoreError::Codec`] when JSON serialization fails.
    pub fn payload(&self) -> Result<Value, CoreError> {
        let mut envelope = serde_json::to_value(self)?;
        Ok(envelope
            .get_mut("payload")
            .map(Value::take)
            .unwrap_or_else(|| Value::Object(Default::default())))
    }
}

/// Current wall-clock time in Unix epoch milliseconds.
pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

/// Error type for core model codec failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// JSON encoding/decoding error.
    #[error("event codec failure: {0}")]
    Codec(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    //! Unit tests for verdict parsing and event envelopes.

    use super::*;

    #[test]
    fn verdict_parse_ignores_case_and_whitespace() {
        assert_eq!(Verdict::parse(" fake "), Some(Verdict::Fake));
        assert_eq!(Verdict::parse("REAL"), Some(Verdict::Real));
        assert_eq!(Verdict::parse("unknown"), None);
    }

    #[test]
    fn percentage_rounds_half_away_from_zero_and_clamps() {
        assert_eq!(percentage_from_confidence(0.005), 1);
        assert_eq!(percentage_from_confidence(0.004), 0);
        assert_eq!(percentage_from_confidence(1.7), 100);
        assert_eq!(percentage_from_confidence(-0.2), 0);
        assert_eq!(percentage_from_confidence(f64::NAN), 0);
    }

    #[test]
    fn analysis_started_payload_is_empty_object() {
        let payload = HostEvent::AnalysisStarted {}
            .payload()
            .expect("payload should serialize");
        assert_eq!(payload, serde_json::json!({}));
    }
}
