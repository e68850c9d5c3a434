//! Simulated document extraction worker.
//!
//! Waits the configured delay, then writes demo field values into the
//! draft's extracted map for the uploaded document kind. See the
//! `extraction` module for what the values look like.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::thread_rng;
use serde::Deserialize;
use tokio::time::sleep;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    extraction,
    jobs::{Job, JOB_EXTRACT_DOCUMENT},
    state::AppState,
    wizard::DocumentKind,
};

use super::{JobExecution, JobHandler};

#[derive(Clone, Debug, Deserialize)]
struct ExtractPayload {
    draft_id: Uuid,
    kind: String,
}

pub struct ExtractDocumentJob;

impl ExtractDocumentJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for ExtractDocumentJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for ExtractDocumentJob {
    fn job_type(&self) -> &'static str {
        JOB_EXTRACT_DOCUMENT
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let payload: ExtractPayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid extract payload: {err}"),
                }
            }
        };
        let kind: DocumentKind = match payload.kind.parse() {
            Ok(kind) => kind,
            Err(err) => return JobExecution::Failed { error: err },
        };

        sleep(Duration::from_millis(state.config.extraction_delay_ms)).await;

        let applied = state
            .store
            .with_draft(payload.draft_id, |draft| {
                let fields =
                    extraction::demo_fields(&mut thread_rng(), kind, draft.plate.as_deref());
                match kind {
                    DocumentKind::TechnicalSheet => draft.extracted.technical_sheet = fields,
                    DocumentKind::Policy => draft.extracted.policy = fields,
                }
            })
            .await;

        match applied {
            Some(()) => {
                info!(job_id = %job.id, draft_id = %payload.draft_id, kind = %kind, "document fields extracted");
            }
            None => {
                debug!(job_id = %job.id, draft_id = %payload.draft_id, "draft gone; extraction dropped");
            }
        }

        JobExecution::Success
    }
}
