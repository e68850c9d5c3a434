use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::{
    jobs::{mark_job_failed, mark_job_succeeded, reserve_job, retry_job_after, Job, JobQueueError},
    state::AppState,
};

pub mod extract;
pub mod recognize;

#[derive(Debug)]
pub enum JobExecution {
    Success,
    Retry { delay: Duration, error: String },
    Failed { error: String },
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> &'static str;
    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution;
}

pub struct Worker {
    state: Arc<AppState>,
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        state: Arc<AppState>,
        handlers: Vec<Arc<dyn JobHandler>>,
        poll_interval: Duration,
    ) -> Self {
        let map = handlers
            .into_iter()
            .map(|handler| (handler.job_type(), handler))
            .collect();
        Self {
            state,
            handlers: map,
            poll_interval,
        }
    }

    pub async fn run(&self) {
        info!("worker started");
        loop {
            match self.tick().await {
                Ok(true) => {}
                Ok(false) => sleep(self.poll_interval).await,
                Err(err) => {
                    error!(error = %err, "worker tick failed");
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// Processes every currently runnable job and returns. Used by the test
    /// harness to flush the queue deterministically.
    pub async fn drain(&self) -> Result<(), JobQueueError> {
        while self.tick().await? {}
        Ok(())
    }

    async fn tick(&self) -> Result<bool, JobQueueError> {
        let job_types: Vec<&str> = self.handlers.keys().copied().collect();
        if job_types.is_empty() {
            return Ok(false);
        }

        let Some(job) = reserve_job(&self.state.store, &job_types).await else {
            return Ok(false);
        };

        if let Some(handler) = self.handlers.get(job.job_type.as_str()) {
            let result = handler.handle(self.state.clone(), job.clone()).await;
            match result {
                JobExecution::Success => {
                    mark_job_succeeded(&self.state.store, job.id).await?;
                    info!(job_id = %job.id, job_type = %job.job_type, "job completed successfully");
                }
                JobExecution::Retry { delay, error } => {
                    warn!(job_id = %job.id, job_type = %job.job_type, %error, "job will retry");
                    retry_job_after(&self.state.store, job.id, delay, &error).await?;
                }
                JobExecution::Failed { error } => {
                    error!(job_id = %job.id, job_type = %job.job_type, %error, "job failed");
                    mark_job_failed(&self.state.store, job.id, &error).await?;
                }
            }
        } else {
            error!(job_type = %job.job_type, "no handler registered for job type");
            mark_job_failed(&self.state.store, job.id, "no handler registered").await?;
        }

        Ok(true)
    }
}

pub fn default_handlers() -> Vec<Arc<dyn JobHandler>> {
    vec![
        Arc::new(recognize::RecognizePlateJob::new()),
        Arc::new(extract::ExtractDocumentJob::new()),
    ]
}
