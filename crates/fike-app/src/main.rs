#![warn(missing_docs)]
//! # fike-app binary
//!
//! Headless host for the capture service. Host events are written to stdout
//! as JSON lines; commands are read from stdin, one per line.

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use fike_app::{
    AppError, CaptureService, Collaborators, LogStatusSink, PermissionRequester,
    PermissionResponder, ServiceConfig, app_version, init_tracing, parse_analysis_url,
};
use fike_bridge::JsonLinesHostLink;
use fike_capture::{PermissionRequest, PermissionToken, SyntheticCaptureBackend};
use fike_ui::NotificationAction;
use fike_upload::HttpTransport;
use tracing::{error, info, warn};

/// Command line options. Flags override environment configuration.
#[derive(Debug, Parser)]
#[command(
    name = "fike",
    version = fike_app::APP_VERSION,
    about = "Screen capture and analysis service"
)]
struct Cli {
    /// Analysis service base URL.
    #[arg(long)]
    analysis_url: Option<String>,
    /// Identity sent with each upload.
    #[arg(long)]
    user_id: Option<String>,
    /// Directory receiving recordings and stills.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Auto-stop horizon in milliseconds.
    #[arg(long)]
    max_recording_ms: Option<u64>,
    /// Record for this many milliseconds with the synthetic backend, upload,
    /// print the result events and exit.
    #[arg(long, value_name = "MS")]
    demo: Option<u64>,
}

/// Grants every prompt; a headless host has nobody to ask.
struct AutoGrant {
    next_token: u64,
}

impl PermissionRequester for AutoGrant {
    fn request_permission(&mut self, request: PermissionRequest, responder: PermissionResponder) {
        self.next_token += 1;
        info!(session_id = %request.session_id, purpose = ?request.purpose, "permission granted");
        responder.grant(PermissionToken::new(self.next_token));
    }
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!(error = %error, "fike exited with an error");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let config = load_config(&cli)?;
    info!(version = app_version(), "starting fike");

    let transport = HttpTransport::new(config.upload_timeouts)?;
    let upload_budget = config.upload_timeouts.request_budget();
    let collaborators = Collaborators {
        backend: Box::new(SyntheticCaptureBackend::default()),
        permissions: Box::new(AutoGrant { next_token: 0 }),
        host: Arc::new(JsonLinesHostLink::new(io::stdout())),
        transport: Arc::new(transport),
        status: Box::new(LogStatusSink),
    };
    let service = CaptureService::spawn(config, collaborators)?;

    match cli.demo {
        Some(record_ms) => run_demo(&service, record_ms, upload_budget)?,
        None => run_stdin(&service)?,
    }
    service.shutdown()
}

fn load_config(cli: &Cli) -> Result<ServiceConfig, AppError> {
    let mut config = ServiceConfig::from_env()?;
    if let Some(url) = &cli.analysis_url {
        config.analysis_url = parse_analysis_url(url)?.to_string();
    }
    if let Some(user_id) = &cli.user_id {
        config.user_id = user_id.clone();
    }
    if let Some(output_dir) = &cli.output_dir {
        config.output_dir = output_dir.clone();
    }
    if let Some(max_recording_ms) = cli.max_recording_ms {
        if max_recording_ms == 0 {
            return Err(AppError::Config(
                "--max-recording-ms must be greater than zero".to_string(),
            ));
        }
        config.max_recording_ms = max_recording_ms;
    }
    Ok(config)
}

fn run_demo(
    service: &CaptureService,
    record_ms: u64,
    upload_budget: Duration,
) -> Result<(), AppError> {
    let session_id = service.request_start()?;
    info!(session_id = %session_id, record_ms, "demo recording");
    thread::sleep(Duration::from_millis(record_ms));

    match service.request_stop() {
        Ok(path) => info!(artifact = %path.display(), "demo recording stopped"),
        // The deadline may have fired first; the upload is already queued.
        Err(AppError::Rejected(kind)) => warn!(kind = %kind, "demo stop rejected"),
        Err(error) => return Err(error),
    }

    let deadline = Instant::now() + upload_budget + Duration::from_secs(1);
    while Instant::now() < deadline {
        if service.snapshot()?.uploads_in_flight == 0 {
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    let snapshot = service.snapshot()?;
    info!(
        phase = ?snapshot.notification.phase,
        status = %snapshot.status.body,
        "demo finished"
    );
    Ok(())
}

fn run_stdin(service: &CaptureService) -> Result<(), AppError> {
    info!(
        commands = "start still stop tap menu view dismiss attach status quit",
        "reading commands from stdin"
    );
    for line in io::stdin().lock().lines() {
        let line = line.map_err(|error| AppError::Config(format!("stdin: {error}")))?;
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };
        let token = words.next().unwrap_or("cli");

        let outcome = match command {
            "start" => service.host_start(token),
            "stop" => service.host_stop(token),
            "still" => service.request_still().map(|_| ()),
            "tap" => service
                .record_tapped()
                .map(|dispatch| info!(dispatch = ?dispatch, "record tap")),
            "menu" => service
                .toggle_menu()
                .map(|expanded| info!(expanded, "overlay menu")),
            "view" => service.notification_action(NotificationAction::ViewResult),
            "dismiss" => service.notification_action(NotificationAction::Dismiss),
            "attach" => service.host_attached(),
            "status" => service.snapshot().map(|snapshot| {
                info!(
                    state = ?snapshot.session_state,
                    phase = ?snapshot.notification.phase,
                    status = %snapshot.status.body,
                    delivered = snapshot.bridge.delivered,
                    dropped = snapshot.bridge.dropped,
                    "service status"
                );
            }),
            "quit" | "exit" => break,
            other => {
                warn!(command = other, "unknown command");
                Ok(())
            }
        };

        match outcome {
            Ok(()) => {}
            Err(AppError::Stopped) => return Err(AppError::Stopped),
            Err(error) => warn!(command, error = %error, "command rejected"),
        }
    }
    Ok(())
}
