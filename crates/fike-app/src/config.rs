//! Service configuration with environment overrides.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use fike_bridge::DeliveryPolicy;
use fike_capture::SessionConfig;
use fike_ui::DEFAULT_DEBOUNCE_MS;
use fike_upload::{RetryPolicy, UploadTimeouts};
use tracing::warn;
use url::Url;

use crate::AppError;

/// Analysis service base URL.
pub const ENV_ANALYSIS_URL: &str = "FIKE_ANALYSIS_URL";
/// Value of the multipart `user_id` field.
pub const ENV_USER_ID: &str = "FIKE_USER_ID";
/// Directory receiving recordings and stills.
pub const ENV_OUTPUT_DIR: &str = "FIKE_OUTPUT_DIR";
/// Auto-stop horizon in milliseconds.
pub const ENV_MAX_RECORDING_MS: &str = "FIKE_MAX_RECORDING_MS";
/// Upload retries after the first attempt.
pub const ENV_UPLOAD_RETRIES: &str = "FIKE_UPLOAD_RETRIES";
/// Host delivery attempts per message.
pub const ENV_BRIDGE_MAX_ATTEMPTS: &str = "FIKE_BRIDGE_MAX_ATTEMPTS";
/// Delay between host delivery attempts in milliseconds.
pub const ENV_BRIDGE_RETRY_MS: &str = "FIKE_BRIDGE_RETRY_MS";

const DEFAULT_ANALYSIS_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_USER_ID: &str = "user123";

/// Runtime configuration of the capture service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Analysis service base URL; uploads go to `<base>/analyze-video/`.
    pub analysis_url: String,
    /// Identity sent with each upload.
    pub user_id: String,
    /// Directory receiving recordings and stills.
    pub output_dir: PathBuf,
    /// Auto-stop horizon.
    pub max_recording_ms: u64,
    /// Upload retry policy.
    pub upload_retry: RetryPolicy,
    /// Upload HTTP timeouts.
    pub upload_timeouts: UploadTimeouts,
    /// Host delivery policy.
    pub bridge: DeliveryPolicy,
    /// Overlay tap debounce window.
    pub overlay_debounce_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            analysis_url: DEFAULT_ANALYSIS_URL.to_string(),
            user_id: DEFAULT_USER_ID.to_string(),
            output_dir: env::temp_dir().join("fike").join("recordings"),
            max_recording_ms: SessionConfig::DEFAULT_MAX_RECORDING_MS,
            upload_retry: RetryPolicy::default(),
            upload_timeouts: UploadTimeouts::default(),
            bridge: DeliveryPolicy::default(),
            overlay_debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

impl ServiceConfig {
    /// Reads overrides from the process environment.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for malformed values.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads overrides through `lookup`. Unset or blank keys keep defaults.
    ///
    /// # Errors
    /// Returns [`AppError::Config`] for malformed values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let value = |key: &str| {
            lookup(key)
                .map(|raw| raw.trim().to_string())
                .filter(|raw| !raw.is_empty())
        };
        let mut config = Self::default();

        if let Some(raw) = value(ENV_ANALYSIS_URL) {
            config.analysis_url = parse_analysis_url(&raw)?.to_string();
        }
        if let Some(raw) = value(ENV_USER_ID) {
            config.user_id = raw;
        }
        if let Some(raw) = value(ENV_OUTPUT_DIR) {
            config.output_dir = PathBuf::from(raw);
        }
        if let Some(raw) = value(ENV_MAX_RECORDING_MS) {
            config.max_recording_ms = parse_positive(ENV_MAX_RECORDING_MS, &raw)?;
        }
        if let Some(raw) = value(ENV_UPLOAD_RETRIES) {
            config.upload_retry.max_retries = parse_number(ENV_UPLOAD_RETRIES, &raw)?;
        }
        if let Some(raw) = value(ENV_BRIDGE_MAX_ATTEMPTS) {
            config.bridge.max_attempts = parse_positive(ENV_BRIDGE_MAX_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = value(ENV_BRIDGE_RETRY_MS) {
            config.bridge.retry_interval =
                Duration::from_millis(parse_positive(ENV_BRIDGE_RETRY_MS, &raw)?);
        }

        Ok(config)
    }

    /// Session manager settings derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            output_dir: self.output_dir.clone(),
            max_recording_ms: self.max_recording_ms,
        }
    }
}

/// Parses and validates an analysis base URL.
///
/// # Errors
/// Returns [`AppError::Config`] for unparsable or non-HTTP(S) URLs.
pub fn parse_analysis_url(raw: &str) -> Result<Url, AppError> {
    let url = Url::parse(raw.trim()).map_err(|error| {
        AppError::Config(format!("{ENV_ANALYSIS_URL}: invalid url '{raw}': {error}"))
    })?;
    match url.scheme() {
        "https" => Ok(url),
        "http" => {
            warn!(url = %url, "analysis endpoint is not using https");
            Ok(url)
        }
        other => Err(AppError::Config(format!(
            "{ENV_ANALYSIS_URL}: unsupported scheme '{other}'"
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, AppError> {
    raw.parse::<T>().map_err(|_| {
        AppError::Config(format!("{key}: expected a non-negative integer, got '{raw}'"))
    })
}

fn parse_positive<T>(key: &str, raw: &str) -> Result<T, AppError>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    let parsed: T = parse_number(key, raw)?;
    if parsed <= T::default() {
        return Err(AppError::Config(format!("{key}: must be greater than zero")));
    }
    Ok(parsed)
}
