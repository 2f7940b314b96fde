//! Validates contract fixtures and serialized wire values against frozen JSON
//! schemas.

use fike_analysis_contract::normalize_body;
use fike_bridge::{BridgeMessage, RpcKind, RpcOutcome};
use fike_core::{AnalysisResult, FailureKind, HostEvent, Verdict};
use jsonschema::JSONSchema;
use serde_json::{Value, json};

const CONTRACTS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../contracts");

fn read(relative: &str) -> String {
    std::fs::read_to_string(format!("{CONTRACTS}/{relative}"))
        .expect("contract file should be readable")
}

fn load_json(relative: &str) -> Value {
    serde_json::from_str(&read(relative)).expect("json file should be valid")
}

fn compile_validator(schema: &str) -> JSONSchema {
    let schema = load_json(schema);
    JSONSchema::compile(&schema).expect("schema should compile")
}

#[test]
fn analysis_fixtures_match_schema() {
    let validator = compile_validator("analysis-response.schema.json");
    for fixture in [
        "fixtures/analysis-response.video.valid.json",
        "fixtures/analysis-response.timeline.valid.json",
    ] {
        assert!(
            validator.is_valid(&load_json(fixture)),
            "{fixture} should validate against schema"
        );
    }
    assert!(!validator.is_valid(&load_json("fixtures/analysis-response.invalid.json")));
}

#[test]
fn analysis_fixtures_normalize_to_expected_results() {
    let video = normalize_body(&read("fixtures/analysis-response.video.valid.json"))
        .expect("video fixture should normalize");
    assert_eq!(
        video,
        AnalysisResult {
            percentage: 83,
            label: Verdict::Fake,
            correlation_id: Some("vid-7f3a".to_string()),
            audio_percentage: Some(46),
        }
    );

    let timeline = normalize_body(&read("fixtures/analysis-response.timeline.valid.json"))
        .expect("timeline fixture should normalize");
    assert_eq!(timeline.percentage, 80);
    assert_eq!(timeline.label, Verdict::Fake);
    assert_eq!(timeline.correlation_id.as_deref(), Some("vid-91c2"));
}

#[test]
fn schema_invalid_analysis_fixture_is_rejected_by_normalizer() {
    assert!(normalize_body(&read("fixtures/analysis-response.invalid.json")).is_err());
}

#[test]
fn host_event_fixtures_match_schema() {
    let validator = compile_validator("host-event.schema.json");
    assert!(validator.is_valid(&load_json("fixtures/host-event.recording-completed.valid.json")));
    assert!(validator.is_valid(&load_json("fixtures/host-event.analysis-result.valid.json")));
    assert!(!validator.is_valid(&load_json("fixtures/host-event.analysis-result.invalid.json")));
}

#[test]
fn serialized_host_events_match_schema() {
    let validator = compile_validator("host-event.schema.json");
    let mut result = AnalysisResult::new(62, Verdict::Fake);
    result.correlation_id = Some("vid-1".to_string());

    let events = [
        HostEvent::RecordingCompleted {
            file_path: "/tmp/recording_1.mp4".to_string(),
            auto_stop: false,
        },
        HostEvent::CaptureCompleted {
            file_path: "/tmp/capture_1.png".to_string(),
        },
        HostEvent::AnalysisStarted {},
        HostEvent::AnalysisReady(result),
        HostEvent::AnalysisFailed {
            kind: FailureKind::UploadTimeout,
            message: "upload timed out".to_string(),
        },
        HostEvent::ViewResult {
            correlation_id: None,
        },
    ];

    for event in events {
        let value = serde_json::to_value(&event).expect("event should serialize");
        assert!(validator.is_valid(&value), "{} should match schema: {value}", event.name());
    }
}

#[test]
fn bridge_messages_match_schema() {
    let validator = compile_validator("bridge-message.schema.json");
    assert!(validator.is_valid(&load_json("fixtures/bridge-message.rpc-completion.valid.json")));

    let event = BridgeMessage::from_event(&HostEvent::AnalysisStarted {})
        .expect("event should encode");
    let completion = BridgeMessage::RpcCompletion {
        request: RpcKind::Stop,
        result_token: "token-9".to_string(),
        outcome: RpcOutcome::Resolved {
            value: json!({ "filePath": "/tmp/recording_1.mp4" }),
        },
    };

    for message in [event, completion] {
        let line = message.to_json().expect("message should encode");
        let value: Value = serde_json::from_str(&line).expect("line should be json");
        assert!(validator.is_valid(&value), "{} should match schema: {value}", message.name());
    }
    assert!(!validator.is_valid(&json!({ "type": "rpc_completion", "request": "start" })));
}
