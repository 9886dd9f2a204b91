//! Render job record and status sink.
//!
//! One job tracks one video from `queued` to a terminal state. The
//! record is mutated only by the orchestrator driving that job; external
//! observers poll it through whatever sink implementation is injected.
//! Terminal states are sticky: once a job is completed or failed, no
//! stage may resurrect it.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::warn;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Job lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One status-sink update. Fields left `None` keep their current value,
/// so the operation is idempotent and safe to send many times per job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_percent: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

impl StatusUpdate {
    /// A mid-flight progress update.
    pub fn processing(step: impl Into<String>, percent: u8) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            progress_percent: Some(percent.min(100)),
            current_step: Some(step.into()),
            ..Self::default()
        }
    }

    /// The successful terminal update.
    pub fn completed(video_url: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress_percent: Some(100),
            current_step: Some("Complete!".to_string()),
            video_url: Some(video_url.into()),
            duration_seconds: Some(duration_seconds),
            ..Self::default()
        }
    }

    /// The failed terminal update. The message is always non-empty.
    pub fn failed(error_message: impl Into<String>) -> Self {
        let mut message = error_message.into();
        if message.trim().is_empty() {
            message = "render failed".to_string();
        }
        Self {
            status: Some(JobStatus::Failed),
            error_message: Some(message),
            ..Self::default()
        }
    }
}

/// The mutable progress record one job carries through the pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct RenderJob {
    pub job_id: String,
    pub status: JobStatus,
    pub progress_percent: u8,
    pub current_step: String,
    pub error_message: Option<String>,
    pub video_url: Option<String>,
    pub duration_seconds: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RenderJob {
    pub fn new(job_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            job_id: job_id.into(),
            status: JobStatus::Queued,
            progress_percent: 0,
            current_step: String::new(),
            error_message: None,
            video_url: None,
            duration_seconds: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an update to the record. Returns `false` (and changes
    /// nothing) when the job is already terminal. A polling observer
    /// must see monotonically non-decreasing progress, so percentages
    /// never move backwards.
    pub fn apply(&mut self, update: &StatusUpdate) -> bool {
        if self.status.is_terminal() {
            warn!(
                "ignoring status update for terminal job {} ({:?})",
                self.job_id, self.status
            );
            return false;
        }

        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(percent) = update.progress_percent {
            self.progress_percent = self.progress_percent.max(percent.min(100));
        }
        if let Some(step) = &update.current_step {
            self.current_step = step.clone();
        }
        if let Some(message) = &update.error_message {
            self.error_message = Some(message.clone());
        }
        if let Some(url) = &update.video_url {
            self.video_url = Some(url.clone());
        }
        if let Some(duration) = update.duration_seconds {
            self.duration_seconds = Some(duration);
        }
        self.updated_at = Utc::now();
        true
    }
}

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("status sink rejected update: {0}")]
    Sink(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Where job progress goes. Implementations must be idempotent and safe
/// to call many times per job.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn update(&self, job_id: &str, update: StatusUpdate) -> Result<(), StatusError>;
}

/// In-process sink backed by a map of job records. Used by the worker
/// when no external sink is configured, and by tests.
#[derive(Default)]
pub struct MemoryStatusSink {
    jobs: Mutex<HashMap<String, RenderJob>>,
    history: Mutex<Vec<StatusUpdate>>,
}

impl MemoryStatusSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record for a job, if any update has been seen.
    pub fn snapshot(&self, job_id: &str) -> Option<RenderJob> {
        self.jobs.lock().unwrap().get(job_id).cloned()
    }

    /// Every update received, in arrival order.
    pub fn history(&self) -> Vec<StatusUpdate> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl StatusSink for MemoryStatusSink {
    async fn update(&self, job_id: &str, update: StatusUpdate) -> Result<(), StatusError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .entry(job_id.to_string())
            .or_insert_with(|| RenderJob::new(job_id));
        job.apply(&update);
        drop(jobs);
        self.history.lock().unwrap().push(update);
        Ok(())
    }
}

/// Sink that POSTs updates to an external status endpoint, keyed by job
/// id in the URL.
pub struct HttpStatusSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpStatusSink {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl StatusSink for HttpStatusSink {
    async fn update(&self, job_id: &str, update: StatusUpdate) -> Result<(), StatusError> {
        let url = format!("{}/{}", self.endpoint.trim_end_matches('/'), job_id);
        let response = self.client.post(&url).json(&update).send().await?;
        if !response.status().is_success() {
            return Err(StatusError::Sink(format!(
                "status {} from {}",
                response.status(),
                url
            )));
        }
        Ok(())
    }
}
