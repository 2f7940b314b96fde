#![warn(missing_docs)]
//! # fike-analysis-contract
//!
//! ## Purpose
//! Defines the analysis service response schema and normalizes it into a
//! single [`AnalysisResult`].
//!
//! ## Responsibilities
//! - Parse the heterogeneous `POST /analyze-video/` response body.
//! - Resolve the manipulation score through a fixed precedence list
//!   ([`SCORE_PRECEDENCE`]).
//! - Derive the verdict, audio score and correlation id.
//!
//! ## Data flow
//! Raw JSON body -> [`parse_analysis_response`] -> [`normalize`] ->
//! status surface and host events.
//!
//! ## Ownership and lifetimes
//! Parsed values are owned structs to avoid borrowing from transient network
//! buffers.
//!
//! ## Error model
//! Only invalid JSON is an error ([`AnalysisContractError::Decode`]). A body
//! that parses but carries no recognizable score normalizes to
//! `{0, REAL}`.
//!
//! ## Security and privacy notes
//! This crate processes model outputs only; it never sees media bytes.

use fike_core::{AnalysisResult, Verdict, percentage_from_confidence};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Response shapes that can carry the manipulation score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreShape {
    /// `video_analysis.overall_confidence`.
    VideoOverall,
    /// `summary.overall_confidence`, only when `summary.overall_result` is FAKE.
    FakeSummary,
    /// Average of FAKE-labeled `timeline` segments.
    SegmentTimeline,
}

/// Precedence in which score shapes are consulted. The first shape present
/// wins; when none is present the result defaults to `{0, REAL}`.
pub const SCORE_PRECEDENCE: [ScoreShape; 3] = [
    ScoreShape::VideoOverall,
    ScoreShape::FakeSummary,
    ScoreShape::SegmentTimeline,
];

/// Percentages strictly above this value are labeled FAKE when the response
/// carries no explicit label.
pub const FAKE_THRESHOLD_PERCENT: u8 = 50;

/// Parsed analysis response. Every field is optional because the service
/// emits different subsets depending on its pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Whole-video classifier output.
    #[serde(default)]
    pub video_analysis: Option<VideoAnalysis>,
    /// Aggregated summary.
    #[serde(default)]
    pub summary: Option<AnalysisSummary>,
    /// Audio classifier output.
    #[serde(default)]
    pub audio_analysis: Option<ModalityScore>,
    /// Per-segment results.
    #[serde(default)]
    pub timeline: Option<Vec<TimelineSegment>>,
    /// Identifier for fetching the detailed report.
    #[serde(default, rename = "videoId")]
    pub video_id: Option<String>,
}

/// Whole-video classifier output.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VideoAnalysis {
    /// FAKE confidence in `[0, 1]`.
    #[serde(default)]
    pub overall_confidence: Option<f64>,
    /// `REAL` / `FAKE`.
    #[serde(default)]
    pub overall_result: Option<String>,
}

/// Aggregated summary block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// `REAL` / `FAKE`.
    #[serde(default)]
    pub overall_result: Option<String>,
    /// Confidence in `[0, 1]`; a FAKE confidence only when the result is FAKE.
    #[serde(default)]
    pub overall_confidence: Option<f64>,
    /// Audio FAKE confidence in `[0, 1]`.
    #[serde(default)]
    pub audio_confidence: Option<f64>,
}

/// Single-modality classifier output (audio track, or video within a segment).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModalityScore {
    /// FAKE confidence in `[0, 1]`.
    #[serde(default)]
    pub fake_confidence: Option<f64>,
}

/// One timeline segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelineSegment {
    /// Segment label (`FAKE` / `REAL`, any case).
    #[serde(default)]
    pub result: Option<String>,
    /// Segment confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Per-modality details.
    #[serde(default)]
    pub details: Option<SegmentDetails>,
}

/// Per-modality segment details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentDetails {
    /// Video classifier details for the segment.
    #[serde(default)]
    pub video: Option<ModalityScore>,
}

impl TimelineSegment {
    fn is_fake(&self) -> bool {
        self.result
            .as_deref()
            .and_then(Verdict::parse)
            .is_some_and(|verdict| verdict == Verdict::Fake)
    }

    fn fake_confidence(&self) -> Option<f64> {
        self.details
            .as_ref()
            .and_then(|details| details.video.as_ref())
            .and_then(|video| video.fake_confidence)
            .or(self.confidence)
            .filter(|value| value.is_finite())
    }
}

/// Parses a raw response body.
///
/// # Errors
/// Returns [`AnalysisContractError::Decode`] for invalid JSON or a body whose
/// known fields carry the wrong JSON type.
pub fn parse_analysis_response(raw: &str) -> Result<AnalysisResponse, AnalysisContractError> {
    serde_json::from_str(raw).map_err(AnalysisContractError::Decode)
}

/// Parses and normalizes a raw response body in one step.
///
/// # Errors
/// See [`parse_analysis_response`].
pub fn normalize_body(raw: &str) -> Result<AnalysisResult, AnalysisContractError> {
    parse_analysis_response(raw).map(|response| normalize(&response))
}

/// Maps a parsed response into the normalized result.
///
/// Deterministic: the same response always yields the same result.
pub fn normalize(response: &AnalysisResponse) -> AnalysisResult {
    let score = SCORE_PRECEDENCE
        .iter()
        .find_map(|shape| extract_score(*shape, response));

    let Some(confidence) = score else {
        let mut result = AnalysisResult::authentic_default();
        result.correlation_id = correlation_id(response);
        result.audio_percentage = audio_percentage(response);
        return result;
    };

    let percentage = percentage_from_confidence(confidence);
    let label = explicit_label(response).unwrap_or(if percentage > FAKE_THRESHOLD_PERCENT {
        Verdict::Fake
    } else {
        Verdict::Real
    });

    AnalysisResult {
        percentage,
        label,
        correlation_id: correlation_id(response),
        audio_percentage: audio_percentage(response),
    }
}

/// Returns the `[0, 1]` score carried by `shape`, if the response has it.
pub fn extract_score(shape: ScoreShape, response: &AnalysisResponse) -> Option<f64> {
    match shape {
        ScoreShape::VideoOverall => response
            .video_analysis
            .as_ref()
            .and_then(|video| video.overall_confidence)
            .filter(|value| value.is_finite()),
        ScoreShape::FakeSummary => response
            .summary
            .as_ref()
            .filter(|summary| {
                summary
                    .overall_result
                    .as_deref()
                    .and_then(Verdict::parse)
                    .is_some_and(|verdict| verdict == Verdict::Fake)
            })
            .and_then(|summary| summary.overall_confidence)
            .filter(|value| value.is_finite()),
        ScoreShape::SegmentTimeline => timeline_score(response.timeline.as_deref()?),
    }
}

fn timeline_score(segments: &[TimelineSegment]) -> Option<f64> {
    if segments.is_empty() {
        return None;
    }

    let fake: Vec<&TimelineSegment> = segments.iter().filter(|segment| segment.is_fake()).collect();
    if fake.is_empty() {
        return Some(0.0);
    }

    let confidences: Vec<f64> = fake
        .iter()
        .filter_map(|segment| segment.fake_confidence())
        .collect();
    if confidences.is_empty() {
        // No segment reports a confidence: fall back to the FAKE share.
        return Some(fake.len() as f64 / segments.len() as f64);
    }

    Some(confidences.iter().sum::<f64>() / confidences.len() as f64)
}

fn explicit_label(response: &AnalysisResponse) -> Option<Verdict> {
    response
        .summary
        .as_ref()
        .and_then(|summary| summary.overall_result.as_deref())
        .and_then(Verdict::parse)
        .or_else(|| {
            response
                .video_analysis
                .as_ref()
                .and_then(|video| video.overall_result.as_deref())
                .and_then(Verdict::parse)
        })
}

fn audio_percentage(response: &AnalysisResponse) -> Option<u8> {
    response
        .audio_analysis
        .as_ref()
        .and_then(|audio| audio.fake_confidence)
        .or_else(|| {
            response
                .summary
                .as_ref()
                .and_then(|summary| summary.audio_confidence)
        })
        .filter(|value| value.is_finite())
        .map(percentage_from_confidence)
}

fn correlation_id(response: &AnalysisResponse) -> Option<String> {
    response
        .video_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Analysis contract errors.
#[derive(Debug, Error)]
pub enum AnalysisContractError {
    /// JSON decode failure.
    #[error("analysis decode failure: {0}")]
    Decode(#[from] serde_json::Error),
}
