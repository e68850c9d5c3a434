//! Plate recognition worker.
//!
//! Each job is tagged with the draft and photo it was queued for. By the
//! time it runs the operator may have captured more photos or moved the
//! frontal selection, so the result is applied through the draft's stale
//! guard and silently discarded when it no longer matches.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use rand::thread_rng;
use serde::Deserialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    config::PlateFallback,
    jobs::{Job, JOB_RECOGNIZE_PLATE},
    plate,
    recognizer::RecognizerError,
    state::AppState,
    wizard::RecognitionOutcome,
};

use super::{JobExecution, JobHandler};

#[derive(Clone, Debug, Deserialize)]
struct RecognizePayload {
    draft_id: Uuid,
    photo_id: Uuid,
    media_key: String,
}

pub struct RecognizePlateJob;

impl RecognizePlateJob {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RecognizePlateJob {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobHandler for RecognizePlateJob {
    fn job_type(&self) -> &'static str {
        JOB_RECOGNIZE_PLATE
    }

    async fn handle(&self, state: Arc<AppState>, job: Job) -> JobExecution {
        let payload: RecognizePayload = match serde_json::from_value(job.payload.clone()) {
            Ok(payload) => payload,
            Err(err) => {
                return JobExecution::Failed {
                    error: format!("invalid recognize payload: {err}"),
                }
            }
        };

        let bytes = match state.media.get_object(&payload.media_key).await {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "failed to fetch photo for recognition");
                return JobExecution::Retry {
                    delay: Duration::from_secs(10),
                    error: err.to_string(),
                };
            }
        };

        let outcome = recognize_outcome(&state, &bytes).await;

        let applied = state
            .store
            .with_draft(payload.draft_id, |draft| {
                draft.apply_recognition(payload.photo_id, outcome.clone())
            })
            .await;

        match applied {
            Some(true) => {
                info!(job_id = %job.id, draft_id = %payload.draft_id, "recognition result applied");
            }
            Some(false) => {
                debug!(job_id = %job.id, draft_id = %payload.draft_id, "stale recognition result discarded");
            }
            None => {
                debug!(job_id = %job.id, draft_id = %payload.draft_id, "draft gone; recognition result dropped");
            }
        }

        JobExecution::Success
    }
}

/// Runs the configured recognizer and maps the raw text to an outcome,
/// applying the fallback policy when no plate can be read. Recognition
/// problems never fail the job; they degrade.
async fn recognize_outcome(state: &AppState, image: &[u8]) -> RecognitionOutcome {
    if let Some(recognizer) = state.recognizer.as_ref() {
        match recognizer.recognize(image).await {
            Ok(recognition) => {
                if let Some(plate) = plate::find_plate(&recognition.text) {
                    return RecognitionOutcome::Detected {
                        plate,
                        confidence: recognition.confidence,
                    };
                }
                debug!("no plate pattern in recognized text");
            }
            Err(RecognizerError::BinaryMissing) => {
                warn!("recognizer binary not installed; cannot read plates");
            }
            Err(err) => {
                warn!(error = %err, "plate recognition failed");
            }
        }
    }

    match state.config.plate_fallback {
        PlateFallback::Honest => RecognitionOutcome::NotDetected,
        PlateFallback::Synthesize => {
            let mut rng = thread_rng();
            RecognitionOutcome::Synthesized {
                plate: plate::synthesize_plate(&mut rng),
                confidence: plate::synthetic_confidence(&mut rng),
            }
        }
    }
}
