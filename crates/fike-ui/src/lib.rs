#![warn(missing_docs)]
//! # fike-ui
//!
//! ## Purpose
//! Interaction and presentation state for the floating overlay and the
//! persistent status surface.
//!
//! ## Responsibilities
//! - Track overlay menu expansion, position and the record icon.
//! - Debounce touch jitter on menu and record taps.
//! - Route record taps to the session owner through [`overlay::RecordControl`].
//! - Drive the status surface phases and project them into a [`StatusView`].
//!
//! ## Data flow
//! Overlay taps -> [`OverlayController`] -> session owner. Session and upload
//! events -> [`NotificationPresenter`] -> [`StatusView`] -> platform renderer.
//!
//! ## Ownership and lifetimes
//! Both controllers own plain state values and are mutated only by the
//! service actor; renderers receive cloned [`StatusView`] snapshots.
//!
//! ## Error model
//! Neither controller fails. Rejections from the session owner are reflected
//! as [`RecordDispatch::Rejected`] and failures as an [`ErrorBanner`].
//!
//! ## Security and privacy notes
//! Views carry verdicts and percentages only, never media or tokens.

pub mod notification;
pub mod overlay;

pub use notification::{
    ErrorBanner, NotificationAction, NotificationPhase, NotificationPresenter, NotificationState,
    ProgressIndicator, StatusAction, StatusView,
};
pub use overlay::{
    OverlayController, OverlayState, RecordControl, RecordDispatch, RecordIcon,
    DEFAULT_DEBOUNCE_MS, MIN_DEBOUNCE_MS,
};
