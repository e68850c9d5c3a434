//! In-memory record collection with wholesale JSON persistence.
//!
//! The collection is read once at startup and re-serialized in full after
//! each mutation; one JSON document is the whole database, which is plenty
//! at kiosk scale. Drafts and background jobs are memory-only; records are
//! the only thing that survives a restart.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::jobs::Job;
use crate::models::{seed_records, IntakeRecord, IntakeStatus};
use crate::wizard::{Draft, WizardError};

pub struct IntakeStore {
    path: PathBuf,
    records: RwLock<Vec<IntakeRecord>>,
    drafts: Mutex<HashMap<Uuid, Draft>>,
    pub(crate) jobs: Mutex<Vec<Job>>,
}

/// Why a finish attempt did not produce a record.
#[derive(Debug)]
pub enum FinishError {
    DraftNotFound,
    Wizard(WizardError),
}

impl IntakeStore {
    /// Loads the collection from `path`. A missing or unreadable file falls
    /// back to the seeded demo dataset; the service always starts.
    pub async fn open(path: PathBuf) -> Self {
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<Vec<IntakeRecord>>(&bytes) {
                Ok(records) => {
                    info!(count = records.len(), path = %path.display(), "loaded intake records");
                    records
                }
                Err(err) => {
                    error!(error = %err, path = %path.display(), "store file unreadable; starting from seed data");
                    seed_records()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no store file yet; starting from seed data");
                seed_records()
            }
            Err(err) => {
                error!(error = %err, path = %path.display(), "failed to read store file; starting from seed data");
                seed_records()
            }
        };

        Self {
            path,
            records: RwLock::new(records),
            drafts: Mutex::new(HashMap::new()),
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub async fn records(&self) -> Vec<IntakeRecord> {
        self.records.read().await.clone()
    }

    pub async fn record(&self, id: &str) -> Option<IntakeRecord> {
        self.records
            .read()
            .await
            .iter()
            .find(|record| record.id == id)
            .cloned()
    }

    pub async fn update_status(&self, id: &str, status: IntakeStatus) -> Option<IntakeRecord> {
        let snapshot = {
            let mut records = self.records.write().await;
            let record = records.iter_mut().find(|record| record.id == id)?;
            record.status = status;
            let updated = record.clone();
            (records.clone(), updated)
        };
        self.save(&snapshot.0).await;
        Some(snapshot.1)
    }

    pub async fn insert_draft(&self, draft: Draft) {
        self.drafts.lock().await.insert(draft.id, draft);
    }

    /// Runs `f` against the draft while the draft table is locked. Returns
    /// `None` when the draft does not exist (already finished or aborted).
    pub async fn with_draft<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Draft) -> T,
    ) -> Option<T> {
        let mut drafts = self.drafts.lock().await;
        drafts.get_mut(&id).map(f)
    }

    /// Removes the draft and hands it to the caller (abort path). Any open
    /// camera stream is still attached and must be stopped by the caller.
    pub async fn take_draft(&self, id: Uuid) -> Option<Draft> {
        self.drafts.lock().await.remove(&id)
    }

    /// Finalizes a draft: validates the finish preconditions, appends the
    /// resulting record and persists the collection. The draft survives
    /// untouched when a precondition fails.
    pub async fn finish_draft(
        &self,
        id: Uuid,
        require_policy: bool,
    ) -> Result<IntakeRecord, FinishError> {
        let mut draft = {
            let mut drafts = self.drafts.lock().await;
            let Some(draft) = drafts.get(&id) else {
                return Err(FinishError::DraftNotFound);
            };
            if let Err(err) = draft.check_finish(require_policy) {
                return Err(FinishError::Wizard(err));
            }
            match drafts.remove(&id) {
                Some(draft) => draft,
                None => return Err(FinishError::DraftNotFound),
            }
        };

        if let Some(mut stream) = draft.take_camera() {
            stream.stop();
        }

        let record = draft.into_record(Utc::now());
        let snapshot = {
            let mut records = self.records.write().await;
            records.push(record.clone());
            records.clone()
        };
        self.save(&snapshot).await;
        Ok(record)
    }

    /// Serializes the whole collection. Failures are logged and swallowed:
    /// the in-memory state stays authoritative and the next successful save
    /// catches up.
    async fn save(&self, records: &[IntakeRecord]) {
        let bytes = match serde_json::to_vec_pretty(records) {
            Ok(bytes) => bytes,
            Err(err) => {
                error!(error = %err, "failed to serialize intake records");
                return;
            }
        };

        if let Some(parent) = self.path.parent() {
            if let Err(err) = tokio::fs::create_dir_all(parent).await {
                warn!(error = %err, "failed to create data directory");
            }
        }

        // Write-then-rename keeps the store file whole if we crash mid-write.
        let tmp = self.path.with_extension("json.tmp");
        let result = async {
            tokio::fs::write(&tmp, &bytes).await?;
            tokio::fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(err) = result {
            error!(error = %err, path = %self.path.display(), "failed to persist intake records");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{seed_records, ShopCatalog};

    #[tokio::test]
    async fn missing_file_starts_from_seed_data() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntakeStore::open(dir.path().join("expedientes.json")).await;
        assert_eq!(store.records().await.len(), seed_records().len());
    }

    #[tokio::test]
    async fn corrupt_file_starts_from_seed_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expedientes.json");
        tokio::fs::write(&path, b"{ not json").await.unwrap();
        let store = IntakeStore::open(path).await;
        assert_eq!(store.records().await.len(), seed_records().len());
    }

    #[tokio::test]
    async fn finished_draft_survives_a_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("expedientes.json");
        tokio::fs::write(&path, b"[]").await.unwrap();

        let store = IntakeStore::open(path.clone()).await;
        let shop = ShopCatalog::default().shops[0].clone();
        let mut draft = Draft::new(shop);
        let draft_id = draft.id;
        draft.add_photo(crate::wizard::test_photo());
        draft.set_manual_plate("4821BCD").unwrap();
        draft.attach_document(crate::wizard::DocumentKind::TechnicalSheet, crate::wizard::test_document());
        draft.skip_policy(false).unwrap();
        store.insert_draft(draft).await;

        store.finish_draft(draft_id, false).await.expect("finish");

        let reloaded = IntakeStore::open(path).await;
        let records = reloaded.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "4821BCD");
        assert!(records[0].policy_skipped);
    }

    #[tokio::test]
    async fn failed_finish_keeps_the_draft() {
        let dir = tempfile::tempdir().unwrap();
        let store = IntakeStore::open(dir.path().join("expedientes.json")).await;
        let shop = ShopCatalog::default().shops[0].clone();
        let draft = Draft::new(shop);
        let draft_id = draft.id;
        store.insert_draft(draft).await;

        assert!(matches!(
            store.finish_draft(draft_id, true).await,
            Err(FinishError::Wizard(WizardError::PhotoRequired))
        ));
        assert!(store.with_draft(draft_id, |_| ()).await.is_some());
    }
}
