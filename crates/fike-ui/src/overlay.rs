//! Floating overlay interaction state.

use fike_core::FailureKind;

/// Default jitter guard applied to overlay taps.
pub const DEFAULT_DEBOUNCE_MS: u64 = 700;
/// Smallest accepted jitter guard.
pub const MIN_DEBOUNCE_MS: u64 = 500;

/// Visual state of the overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverlayState {
    /// Whether the action menu is shown.
    pub expanded: bool,
    /// Top-left corner in screen pixels.
    pub position: (i32, i32),
}

/// Icon shown on the record button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordIcon {
    /// Tap starts a recording.
    Record,
    /// Tap stops the running recording.
    Stop,
}

/// Session operations the overlay can trigger.
pub trait RecordControl {
    /// Returns `true` while a recording is running.
    fn is_recording(&self) -> bool;

    /// Asks for a new recording.
    ///
    /// # Errors
    /// Returns the taxonomy kind of a synchronous rejection.
    fn start_recording(&mut self) -> Result<(), FailureKind>;

    /// Asks to stop the running recording.
    ///
    /// # Errors
    /// Returns the taxonomy kind of a synchronous rejection.
    fn stop_recording(&mut self) -> Result<(), FailureKind>;
}

/// What a record tap turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordDispatch {
    /// A start was requested.
    StartRequested,
    /// A stop was requested.
    StopRequested,
    /// The session owner rejected the request.
    Rejected(FailureKind),
    /// Ignored as touch jitter.
    Debounced,
}

/// Overlay interaction controller.
#[derive(Debug, Clone)]
pub struct OverlayController {
    state: OverlayState,
    debounce_ms: u64,
    menu_guard_until: u64,
    record_guard_until: u64,
    recording: bool,
}

impl OverlayController {
    /// Creates a collapsed overlay at `position`.
    ///
    /// `debounce_ms` is raised to [`MIN_DEBOUNCE_MS`] when smaller.
    pub fn new(position: (i32, i32), debounce_ms: u64) -> Self {
        Self {
            state: OverlayState {
                expanded: false,
                position,
            },
            debounce_ms: debounce_ms.max(MIN_DEBOUNCE_MS),
            menu_guard_until: 0,
            record_guard_until: 0,
            recording: false,
        }
    }

    /// Current visual state.
    pub fn state(&self) -> OverlayState {
        self.state
    }

    /// Effective debounce window.
    pub fn debounce_ms(&self) -> u64 {
        self.debounce_ms
    }

    /// Flips the menu unless a previous flip is still inside the debounce
    /// window. Returns the resulting `expanded` value.
    pub fn toggle_menu(&mut self, now_ms: u64) -> bool {
        if now_ms < self.menu_guard_until {
            return self.state.expanded;
        }
        self.state.expanded = !self.state.expanded;
        self.menu_guard_until = now_ms.saturating_add(self.debounce_ms);
        self.state.expanded
    }

    /// Routes a record tap: stop when recording, start otherwise. The menu is
    /// collapsed whatever happens.
    pub fn on_record_tapped(
        &mut self,
        now_ms: u64,
        control: &mut dyn RecordControl,
    ) -> RecordDispatch {
        let dispatch = if now_ms < self.record_guard_until {
            RecordDispatch::Debounced
        } else {
            self.record_guard_until = now_ms.saturating_add(self.debounce_ms);
            if control.is_recording() {
                match control.stop_recording() {
                    Ok(()) => RecordDispatch::StopRequested,
                    Err(kind) => RecordDispatch::Rejected(kind),
                }
            } else {
                match control.start_recording() {
                    Ok(()) => RecordDispatch::StartRequested,
                    Err(kind) => RecordDispatch::Rejected(kind),
                }
            }
        };

        self.state.expanded = false;
        self.recording = control.is_recording();
        dispatch
    }

    /// Moves the overlay; never touches the session.
    pub fn on_drag(&mut self, dx: i32, dy: i32) {
        let (x, y) = self.state.position;
        self.state.position = (x.saturating_add(dx), y.saturating_add(dy));
    }

    /// Mirrors the session's recording flag.
    pub fn reflect_recording(&mut self, recording: bool) {
        self.recording = recording;
    }

    /// Icon for the record button.
    pub fn record_icon(&self) -> RecordIcon {
        if self.recording {
            RecordIcon::Stop
        } else {
            RecordIcon::Record
        }
    }
}

impl Default for OverlayController {
    fn default() -> Self {
        Self::new((0, 100), DEFAULT_DEBOUNCE_MS)
    }
}
