// Job bookkeeping behind a trait so handlers never touch the backing map directly.

use crate::models::{JobRecord, JobStatus, NewJob};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Job {0} not found")]
    NotFound(String),
    #[error("Job {job_id} cannot move from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: JobStatus,
        to: JobStatus,
    },
}

#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, job: NewJob) -> JobRecord;

    async fn get(&self, job_id: &str) -> Option<JobRecord>;

    /// Moves a job to `status` and bumps `updated_at`.
    async fn update_status(&self, job_id: &str, status: JobStatus)
    -> Result<JobRecord, StoreError>;
}

pub type SharedJobStore = Arc<dyn JobStore>;

/// Process-lifetime store. Nothing is evicted and nothing survives a restart.
#[derive(Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<String, JobRecord>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: NewJob) -> JobRecord {
        let record = JobRecord::new(job);
        debug!("Storing job {} ({})", record.job_id, record.filename);
        self.jobs
            .write()
            .await
            .insert(record.job_id.clone(), record.clone());
        record
    }

    async fn get(&self, job_id: &str) -> Option<JobRecord> {
        self.jobs.read().await.get(job_id).cloned()
    }

    async fn update_status(
        &self,
        job_id: &str,
        status: JobStatus,
    ) -> Result<JobRecord, StoreError> {
        let mut jobs = self.jobs.write().await;
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| StoreError::NotFound(job_id.to_string()))?;

        if !record.status.can_transition_to(status) {
            return Err(StoreError::InvalidTransition {
                job_id: job_id.to_string(),
                from: record.status,
                to: status,
            });
        }

        record.status = status;
        record.updated_at = Utc::now();
        debug!("Job {} is now {}", job_id, status);
        Ok(record.clone())
    }
}
