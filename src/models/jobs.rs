use crate::error::{DownloaderError, Result};
use crate::models::orchestrator::{DownloadOrchestrator, DownloadPlan, DownloadReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tokio::task::AbortHandle;

/// Lifecycle of a background download
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Snapshot of a background download
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DownloadJob {
    pub id: u64,
    pub model_names: Vec<String>,
    pub state: JobState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<DownloadReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

const DEFAULT_HISTORY: usize = 100;

/// Registry of background downloads
pub struct DownloadJobs {
    next_id: AtomicU64,
    jobs: Arc<RwLock<HashMap<u64, DownloadJob>>>,
    handles: Arc<Mutex<HashMap<u64, AbortHandle>>>,
    history: usize,
}

impl Default for DownloadJobs {
    fn default() -> Self {
        Self::with_history(DEFAULT_HISTORY)
    }
}

impl DownloadJobs {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `history` finished jobs; older ones are forgotten
    #[must_use]
    pub fn with_history(history: usize) -> Self {
        Self {
            next_id: AtomicU64::new(0),
            jobs: Arc::default(),
            handles: Arc::default(),
            history,
        }
    }

    /// Run `plan` in the background
    pub async fn spawn(
        &self,
        orchestrator: Arc<DownloadOrchestrator>,
        plan: DownloadPlan,
    ) -> DownloadJob {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let job = DownloadJob {
            id,
            model_names: plan.model_names(),
            state: JobState::Running,
            report: None,
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        };
        {
            let mut jobs = self.jobs.write().await;
            self.evict_finished(&mut jobs);
            jobs.insert(id, job.clone());
        }

        let jobs = Arc::clone(&self.jobs);
        let handles = Arc::clone(&self.handles);
        let handle = tokio::spawn(async move {
            let report = orchestrator.execute(plan).await;

            if let Some(job) = jobs.write().await.get_mut(&id) {
                if job.state == JobState::Running {
                    if report.all_ok() {
                        job.state = JobState::Completed;
                    } else {
                        job.state = JobState::Failed;
                        job.error = Some(report.status.clone());
                    }
                    job.report = Some(report);
                    job.finished_at = Some(Utc::now());
                }
            }
            if let Ok(mut handles) = handles.lock() {
                handles.remove(&id);
            }
            tracing::info!("Download job {} finished", id);
        });

        if let Ok(mut handles) = self.handles.lock() {
            if !handle.is_finished() {
                handles.insert(id, handle.abort_handle());
            }
        }

        tracing::info!("Started download job {} for {:?}", id, job.model_names);
        job
    }

    /// Drop the oldest finished jobs beyond the history limit
    fn evict_finished(&self, jobs: &mut HashMap<u64, DownloadJob>) {
        let mut finished: Vec<u64> = jobs
            .values()
            .filter(|job| job.state != JobState::Running)
            .map(|job| job.id)
            .collect();
        if finished.len() <= self.history {
            return;
        }

        finished.sort_unstable();
        let excess = finished.len() - self.history;
        for id in &finished[..excess] {
            jobs.remove(id);
        }
        tracing::debug!("Forgot {} finished download jobs", excess);
    }

    pub async fn get(&self, id: u64) -> Result<DownloadJob> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| DownloaderError::NotFound(format!("No download job {id}")))
    }

    /// Abort a running job; finished jobs are returned unchanged
    pub async fn cancel(&self, id: u64) -> Result<DownloadJob> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| DownloaderError::NotFound(format!("No download job {id}")))?;

        if job.state == JobState::Running {
            if let Some(handle) = self.handles.lock().ok().and_then(|mut h| h.remove(&id)) {
                handle.abort();
            }
            job.state = JobState::Cancelled;
            job.finished_at = Some(Utc::now());
            tracing::info!("Cancelled download job {}", id);
        }

        Ok(job.clone())
    }
}
