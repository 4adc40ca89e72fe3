// Domain types shared between the job store, the printer client and the web layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lifecycle state of a print job.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Uploaded,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Uploaded => "uploaded",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Uploaded)
    }

    /// Only `uploaded -> completed` and `uploaded -> failed` are legal.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Uploaded, JobStatus::Completed) | (JobStatus::Uploaded, JobStatus::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the upload handler knows about a job before it is stored.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_id: String,
    pub filename: String,
    pub file_path: PathBuf,
    pub size: usize,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct JobRecord {
    pub job_id: String,
    pub filename: String,
    pub file_path: PathBuf,
    pub size: usize,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(job: NewJob) -> Self {
        let now = Utc::now();
        Self {
            job_id: job.job_id,
            filename: job.filename,
            file_path: job.file_path,
            size: job.size,
            status: JobStatus::Uploaded,
            created_at: now,
            updated_at: now,
        }
    }

    /// Human-readable sentence reported by the status endpoint.
    pub fn status_message(&self) -> String {
        format!("Job is {}", self.status)
    }
}
