//! Persistent status surface state machine.
//!
//! Phases only move forward within a session
//! (`Initial -> Uploading -> Analyzing -> Completed`). A new session resets to
//! `Initial`; a failure also lands in `Initial`, carrying an [`ErrorBanner`].

use fike_core::{AnalysisResult, FailureKind};

/// Status surface phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NotificationPhase {
    /// Nothing in flight.
    Initial,
    /// Artifact body being sent.
    Uploading,
    /// Body sent; waiting for the verdict.
    Analyzing,
    /// Verdict available.
    Completed,
}

/// Failure shown on the `Initial` surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorBanner {
    /// Taxonomy kind.
    pub kind: FailureKind,
    /// Human-readable detail.
    pub message: String,
}

/// Process-wide status surface state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationState {
    /// Current phase.
    pub phase: NotificationPhase,
    /// Upload progress in `[0, 100]`.
    pub upload_progress: u8,
    /// Present only in `Completed`.
    pub result: Option<AnalysisResult>,
    /// Present only after a failure.
    pub error: Option<ErrorBanner>,
    /// Hidden by the user until the next phase change.
    pub dismissed: bool,
}

impl Default for NotificationState {
    fn default() -> Self {
        Self {
            phase: NotificationPhase::Initial,
            upload_progress: 0,
            result: None,
            error: None,
            dismissed: false,
        }
    }
}

/// Action buttons on the status surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    /// Start or stop a recording.
    ToggleCapture,
    /// Open the detailed result in the host app.
    ViewResult,
    /// Hide the surface.
    Dismiss,
}

/// Rendered action button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusAction {
    /// Action dispatched on tap.
    pub action: NotificationAction,
    /// Button label.
    pub label: &'static str,
}

/// Progress bar mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressIndicator {
    /// No progress bar.
    None,
    /// Known percentage.
    Determinate(u8),
    /// Spinner.
    Indeterminate,
}

/// Derived projection handed to the platform renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusView {
    /// Headline.
    pub title: String,
    /// Detail line.
    pub body: String,
    /// Progress bar mode.
    pub progress: ProgressIndicator,
    /// Buttons, in display order.
    pub actions: Vec<StatusAction>,
    /// `false` after the user dismissed the surface.
    pub visible: bool,
}

/// Status surface state machine.
#[derive(Debug, Clone, Default)]
pub struct NotificationPresenter {
    state: NotificationState,
}

impl NotificationPresenter {
    /// Creates a presenter in `Initial`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state.
    pub fn state(&self) -> &NotificationState {
        &self.state
    }

    /// Current phase.
    pub fn phase(&self) -> NotificationPhase {
        self.state.phase
    }

    /// A new session started; forget everything about the previous one.
    pub fn on_session_started(&mut self) {
        self.state = NotificationState::default();
    }

    /// Recording finalized; the upload begins.
    ///
    /// Returns `false` when an upload is already in flight.
    pub fn on_recording_completed(&mut self) -> bool {
        if matches!(
            self.state.phase,
            NotificationPhase::Uploading | NotificationPhase::Analyzing
        ) {
            return false;
        }
        self.state = NotificationState {
            phase: NotificationPhase::Uploading,
            ..NotificationState::default()
        };
        true
    }

    /// Upload progress update. Reaching 100 % moves to `Analyzing`.
    ///
    /// Progress never moves backwards. Returns `true` when the phase changed.
    pub fn on_upload_progress(&mut self, percent: u8) -> bool {
        if self.state.phase != NotificationPhase::Uploading {
            return false;
        }
        self.state.upload_progress = self.state.upload_progress.max(percent.min(100));
        if self.state.upload_progress == 100 {
            return self.on_upload_sent();
        }
        false
    }

    /// Upload body fully sent. Returns `true` when the phase changed.
    pub fn on_upload_sent(&mut self) -> bool {
        if self.state.phase != NotificationPhase::Uploading {
            return false;
        }
        self.state.phase = NotificationPhase::Analyzing;
        self.state.upload_progress = 100;
        self.state.dismissed = false;
        true
    }

    /// Verdict available. Returns `true` when the phase changed.
    pub fn on_result(&mut self, result: AnalysisResult) -> bool {
        if !matches!(
            self.state.phase,
            NotificationPhase::Uploading | NotificationPhase::Analyzing
        ) {
            return false;
        }
        self.state = NotificationState {
            phase: NotificationPhase::Completed,
            upload_progress: 100,
            result: Some(result),
            error: None,
            dismissed: false,
        };
        true
    }

    /// Upload or analysis failed; back to `Initial` with a banner.
    pub fn on_failure(&mut self, kind: FailureKind, message: impl Into<String>) {
        self.state = NotificationState {
            error: Some(ErrorBanner {
                kind,
                message: message.into(),
            }),
            ..NotificationState::default()
        };
    }

    /// Hides the surface. Presentation only.
    pub fn dismiss(&mut self) {
        self.state.dismissed = true;
    }

    /// Projects the state into a view. Pure; safe to call any number of times.
    pub fn render(&self, recording: bool) -> StatusView {
        let state = &self.state;
        let (title, body, progress) = match state.phase {
            NotificationPhase::Initial => {
                let body = if recording {
                    "Recording your screen".to_string()
                } else if let Some(error) = &state.error {
                    format!("Analysis failed: {}", error.message)
                } else {
                    "Tap record to check what is on screen".to_string()
                };
                let title = if recording {
                    "Recording"
                } else if state.error.is_some() {
                    "Analysis failed"
                } else {
                    "Fike is ready"
                };
                (title.to_string(), body, ProgressIndicator::None)
            }
            NotificationPhase::Uploading => (
                "Uploading recording".to_string(),
                format!("{}% sent", state.upload_progress),
                ProgressIndicator::Determinate(state.upload_progress),
            ),
            NotificationPhase::Analyzing => (
                "Analyzing recording".to_string(),
                "Checking for manipulation".to_string(),
                ProgressIndicator::Indeterminate,
            ),
            NotificationPhase::Completed => {
                let body = match &state.result {
                    Some(result) => completed_body(result),
                    None => "No result available".to_string(),
                };
                ("Analysis complete".to_string(), body, ProgressIndicator::None)
            }
        };

        let mut actions = vec![StatusAction {
            action: NotificationAction::ToggleCapture,
            label: if recording { "Stop recording" } else { "Record" },
        }];
        if state.phase == NotificationPhase::Completed && state.result.is_some() {
            actions.push(StatusAction {
                action: NotificationAction::ViewResult,
                label: "View result",
            });
        }
        actions.push(StatusAction {
            action: NotificationAction::Dismiss,
            label: "Dismiss",
        });

        StatusView {
            title,
            body,
            progress,
            actions,
            visible: !state.dismissed,
        }
    }
}

fn completed_body(result: &AnalysisResult) -> String {
    let mut body = format!(
        "{}: {}% likely manipulated",
        result.label.as_str(),
        result.percentage
    );
    if let Some(audio) = result.audio_percentage {
        body.push_str(&format!(" (audio {audio}%)"));
    }
    body
}
