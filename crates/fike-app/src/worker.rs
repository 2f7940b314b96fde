//! Upload worker thread: one job at a time, off the actor thread.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};

use fike_analysis_contract::normalize_body;
use fike_core::{AnalysisResult, FailureKind, SessionId};
use fike_upload::{ProgressSink, UploadClient, UploadProgress};
use tracing::{info, warn};

use crate::AppError;

/// Artifact waiting for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UploadJob {
    pub session_id: SessionId,
    pub artifact: PathBuf,
}

/// Upload failure translated into the shared taxonomy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct UploadFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Progress reported back to the actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum UploadEvent {
    Progress {
        session_id: SessionId,
        progress: UploadProgress,
    },
    Finished {
        session_id: SessionId,
        outcome: Result<AnalysisResult, UploadFailure>,
    },
}

pub(crate) type UploadEventSink = Arc<dyn Fn(UploadEvent) + Send + Sync>;

pub(crate) struct UploadWorker {
    job_tx: Option<Sender<UploadJob>>,
    join: Option<JoinHandle<()>>,
}

impl UploadWorker {
    pub(crate) fn spawn(client: UploadClient, events: UploadEventSink) -> Result<Self, AppError> {
        let (job_tx, job_rx) = mpsc::channel::<UploadJob>();

        let join = thread::Builder::new()
            .name("fike-upload-worker".to_string())
            .spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    let outcome = run_job(&client, &job, &events);
                    events(UploadEvent::Finished {
                        session_id: job.session_id,
                        outcome,
                    });
                }
            })
            .map_err(|error| AppError::Spawn(format!("failed to spawn upload worker: {error}")))?;

        Ok(Self {
            job_tx: Some(job_tx),
            join: Some(join),
        })
    }

    /// Queues a job. Returns `false` once the worker is gone.
    pub(crate) fn submit(&self, job: UploadJob) -> bool {
        self.job_tx
            .as_ref()
            .is_some_and(|job_tx| job_tx.send(job).is_ok())
    }

    /// Lets queued jobs finish, then joins the thread.
    pub(crate) fn shutdown(&mut self) {
        drop(self.job_tx.take());
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("upload worker panicked");
            }
        }
    }
}

impl Drop for UploadWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_job(
    client: &UploadClient,
    job: &UploadJob,
    events: &UploadEventSink,
) -> Result<AnalysisResult, UploadFailure> {
    let session_id = job.session_id;
    let progress_events = Arc::clone(events);
    let progress: ProgressSink = Arc::new(move |progress: UploadProgress| {
        progress_events(UploadEvent::Progress {
            session_id,
            progress,
        });
    });

    info!(session_id = %session_id, artifact = %job.artifact.display(), "upload started");
    let report = client.upload(&job.artifact, progress).map_err(|error| {
        warn!(session_id = %session_id, error = %error, "upload failed");
        UploadFailure {
            kind: error.kind(),
            message: error.to_string(),
        }
    })?;

    let result = normalize_body(&report.response.body).map_err(|error| {
        warn!(session_id = %session_id, error = %error, "analysis response rejected");
        UploadFailure {
            kind: FailureKind::UploadServerError,
            message: error.to_string(),
        }
    })?;

    info!(
        session_id = %session_id,
        attempts = report.attempts,
        percentage = result.percentage,
        label = result.label.as_str(),
        "analysis received"
    );
    Ok(result)
}
