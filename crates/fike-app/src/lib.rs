#![warn(missing_docs)]
//! # fike-app
//!
//! ## Purpose
//! Wires capture, upload, normalization, status surface and host bridge into
//! one running capture-and-notify service.
//!
//! ## Responsibilities
//! - Own every mutable component on a single service thread.
//! - Run uploads on a dedicated worker so progress and results arrive as
//!   ordinary service commands.
//! - Translate host RPCs, overlay taps and status surface buttons into session
//!   transitions.
//! - Load configuration and install logging for the binary.
//!
//! ## Data flow
//! Overlay tap / host `start` -> permission prompt -> recording -> stop or
//! deadline -> `recording.completed` -> upload worker -> normalized result ->
//! status surface + `analysis.result`.
//!
//! ## Ownership and lifetimes
//! [`CaptureService`] is a handle; the actor thread owns the session manager,
//! presenter, overlay and bridge for its whole life. Callers only ever receive
//! owned snapshots.
//!
//! ## Error model
//! Component errors are wrapped in [`AppError`]; [`AppError::kind`] maps them
//! back to the shared failure taxonomy where one applies.
//!
//! ## Security and privacy notes
//! - Permission tokens are never logged.
//! - Non-HTTPS analysis endpoints are accepted but logged as a warning.

pub mod config;
pub mod service;
mod worker;

use std::io::{self, IsTerminal};

use fike_bridge::BridgeError;
use fike_core::FailureKind;
use fike_upload::UploadError;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

pub use config::{ServiceConfig, parse_analysis_url};
pub use service::{
    CaptureService, Collaborators, LogStatusSink, PermissionRequester, PermissionResponder,
    ServiceSnapshot, StatusSink,
};

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("FIKE_VERSION");

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Installs the global `tracing` subscriber writing to stderr.
///
/// Stdout is reserved for host JSON lines. Honors `RUST_LOG`; defaults to
/// `info`. Colors only when stderr is a terminal. A second call is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .try_init();
}

/// Service-level errors.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration value missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
    /// A background thread could not be started or panicked.
    #[error("thread error: {0}")]
    Spawn(String),
    /// Upload client setup failed.
    #[error(transparent)]
    Upload(#[from] UploadError),
    /// Host bridge failure.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
    /// The service refused the request.
    #[error("request rejected: {0}")]
    Rejected(FailureKind),
    /// The service thread is gone.
    #[error("capture service is not running")]
    Stopped,
}

impl AppError {
    /// Taxonomy kind, when the error maps onto one.
    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            Self::Upload(error) => Some(error.kind()),
            Self::Bridge(error) => Some(error.kind()),
            Self::Rejected(kind) => Some(*kind),
            Self::Config(_) | Self::Spawn(_) | Self::Stopped => None,
        }
    }
}
