//! Registration wizard draft.
//!
//! A `Draft` holds everything the three-step registration flow accumulates
//! before anything is persisted: photos, the detected plate, the uploaded
//! documents and the customer/vehicle details. Nothing reaches the record
//! collection until `finish` passes all preconditions, so aborting a draft
//! never needs a rollback.
//!
//! All mutation goes through named actions that enforce the step gates and
//! photo invariants; handlers never poke fields directly.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::capture::CameraStream;
use crate::models::{
    Customer, DocumentRef, ExtractedData, IntakeRecord, IntakeStatus, PhotoRecord, Shop, Vehicle,
};
use crate::plate;

pub const FIRST_STEP: u8 = 1;
pub const LAST_STEP: u8 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WizardError {
    #[error("at least one photo is required before continuing")]
    PhotoRequired,
    #[error("the last remaining photo cannot be removed")]
    LastPhoto,
    #[error("photo not found on this draft")]
    PhotoNotFound,
    #[error("frontal photo index is out of range")]
    InvalidFrontal,
    #[error("customer name, phone and service are required before continuing")]
    DetailsIncomplete,
    #[error("already at the final step")]
    AtFinalStep,
    #[error("already at the first step")]
    AtFirstStep,
    #[error("'{0}' is not a valid Spanish plate")]
    InvalidPlate(String),
    #[error("a license plate must be detected or entered before finishing")]
    PlateRequired,
    #[error("the vehicle technical sheet must be uploaded before finishing")]
    TechnicalSheetRequired,
    #[error("the insurance policy must be uploaded or explicitly skipped before finishing")]
    PolicyRequired,
    #[error("skipping the insurance policy is not allowed at this center")]
    PolicySkipNotAllowed,
    #[error("the insurance policy is already attached")]
    PolicyAlreadyAttached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    TechnicalSheet,
    Policy,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            DocumentKind::TechnicalSheet => "technical-sheet",
            DocumentKind::Policy => "policy",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DocumentKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "technical-sheet" => Ok(DocumentKind::TechnicalSheet),
            "policy" => Ok(DocumentKind::Policy),
            other => Err(format!("unknown document kind '{other}'")),
        }
    }
}

/// How the draft's plate value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlateSource {
    Recognized,
    Manual,
    Synthesized,
}

/// Result of a recognition attempt, produced by the recognize-plate worker.
#[derive(Debug, Clone)]
pub enum RecognitionOutcome {
    Detected { plate: String, confidence: f32 },
    Synthesized { plate: String, confidence: f32 },
    NotDetected,
}

#[derive(Debug, Clone, Default)]
pub enum PolicyState {
    #[default]
    Missing,
    Attached(DocumentRef),
    Skipped,
}

pub struct Draft {
    pub id: Uuid,
    pub shop: Shop,
    pub step: u8,
    pub plate: Option<String>,
    pub plate_confidence: Option<f32>,
    pub plate_source: Option<PlateSource>,
    pub photos: Vec<PhotoRecord>,
    pub frontal_index: usize,
    pub technical_sheet: Option<DocumentRef>,
    pub policy: PolicyState,
    pub extracted: ExtractedData,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub vehicle_make: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_year: Option<i32>,
    pub vehicle_color: Option<String>,
    pub vehicle_chassis: Option<String>,
    pub service: Option<String>,
    pub opened_at: DateTime<Utc>,
    camera: Option<Box<dyn CameraStream>>,
}

impl Draft {
    pub fn new(shop: Shop) -> Self {
        Self {
            id: Uuid::new_v4(),
            shop,
            step: FIRST_STEP,
            plate: None,
            plate_confidence: None,
            plate_source: None,
            photos: Vec::new(),
            frontal_index: 0,
            technical_sheet: None,
            policy: PolicyState::Missing,
            extracted: ExtractedData::default(),
            customer_name: None,
            customer_phone: None,
            customer_email: None,
            vehicle_make: None,
            vehicle_model: None,
            vehicle_year: None,
            vehicle_color: None,
            vehicle_chassis: None,
            service: None,
            opened_at: Utc::now(),
            camera: None,
        }
    }

    /// Appends a photo. Returns the photo id to run recognition against when
    /// this photo became the frontal one (i.e. it is the first).
    pub fn add_photo(&mut self, photo: PhotoRecord) -> Option<Uuid> {
        let id = photo.id;
        self.photos.push(photo);
        (self.photos.len() == 1).then_some(id)
    }

    pub fn remove_photo(&mut self, photo_id: Uuid) -> Result<PhotoRecord, WizardError> {
        let index = self
            .photos
            .iter()
            .position(|photo| photo.id == photo_id)
            .ok_or(WizardError::PhotoNotFound)?;
        if self.photos.len() == 1 {
            return Err(WizardError::LastPhoto);
        }
        let removed = self.photos.remove(index);
        if index < self.frontal_index || self.frontal_index >= self.photos.len() {
            self.frontal_index = self.frontal_index.saturating_sub(1).min(self.photos.len() - 1);
        }
        Ok(removed)
    }

    /// Marks the photo at `index` as frontal and returns its id so the
    /// caller can queue a fresh recognition pass against it.
    pub fn set_frontal(&mut self, index: usize) -> Result<Uuid, WizardError> {
        let photo = self.photos.get(index).ok_or(WizardError::InvalidFrontal)?;
        let id = photo.id;
        self.frontal_index = index;
        Ok(id)
    }

    pub fn frontal_photo(&self) -> Option<&PhotoRecord> {
        self.photos.get(self.frontal_index)
    }

    /// Applies a recognition result. Results are tagged with the photo they
    /// were computed from; anything that no longer matches the current
    /// frontal photo is stale and gets discarded. Returns whether the result
    /// was applied.
    pub fn apply_recognition(&mut self, photo_id: Uuid, outcome: RecognitionOutcome) -> bool {
        let current = self.frontal_photo().map(|photo| photo.id);
        if current != Some(photo_id) {
            return false;
        }
        match outcome {
            RecognitionOutcome::Detected { plate, confidence } => {
                self.plate = Some(plate);
                self.plate_confidence = Some(confidence);
                self.plate_source = Some(PlateSource::Recognized);
            }
            RecognitionOutcome::Synthesized { plate, confidence } => {
                self.plate = Some(plate);
                self.plate_confidence = Some(confidence);
                self.plate_source = Some(PlateSource::Synthesized);
            }
            RecognitionOutcome::NotDetected => {
                // Keep a manually entered plate; only clear earlier automatic results.
                if self.plate_source != Some(PlateSource::Manual) {
                    self.plate = None;
                    self.plate_confidence = None;
                    self.plate_source = None;
                }
            }
        }
        true
    }

    pub fn set_manual_plate(&mut self, raw: &str) -> Result<(), WizardError> {
        let candidate: String = plate::normalize(raw).chars().filter(|c| *c != ' ').collect();
        if !plate::is_valid_plate(&candidate) {
            return Err(WizardError::InvalidPlate(raw.trim().to_string()));
        }
        self.plate = Some(candidate);
        self.plate_confidence = None;
        self.plate_source = Some(PlateSource::Manual);
        Ok(())
    }

    pub fn attach_document(&mut self, kind: DocumentKind, document: DocumentRef) {
        match kind {
            DocumentKind::TechnicalSheet => self.technical_sheet = Some(document),
            DocumentKind::Policy => self.policy = PolicyState::Attached(document),
        }
    }

    pub fn skip_policy(&mut self, require_policy: bool) -> Result<(), WizardError> {
        if require_policy {
            return Err(WizardError::PolicySkipNotAllowed);
        }
        if matches!(self.policy, PolicyState::Attached(_)) {
            return Err(WizardError::PolicyAlreadyAttached);
        }
        self.policy = PolicyState::Skipped;
        Ok(())
    }

    pub fn advance(&mut self) -> Result<u8, WizardError> {
        if self.step >= LAST_STEP {
            return Err(WizardError::AtFinalStep);
        }
        match self.step {
            FIRST_STEP => {
                if self.photos.is_empty() {
                    return Err(WizardError::PhotoRequired);
                }
            }
            2 => {
                let complete = self.customer_name.as_deref().is_some_and(has_text)
                    && self.customer_phone.as_deref().is_some_and(has_text)
                    && self.service.as_deref().is_some_and(has_text);
                if !complete {
                    return Err(WizardError::DetailsIncomplete);
                }
            }
            _ => {}
        }
        self.step += 1;
        Ok(self.step)
    }

    pub fn back(&mut self) -> Result<u8, WizardError> {
        if self.step <= FIRST_STEP {
            return Err(WizardError::AtFirstStep);
        }
        self.step -= 1;
        Ok(self.step)
    }

    /// Swaps in a freshly acquired camera stream, handing back the previous
    /// one (if any) so the caller can stop it.
    pub fn attach_camera(
        &mut self,
        stream: Box<dyn CameraStream>,
    ) -> Option<Box<dyn CameraStream>> {
        self.camera.replace(stream)
    }

    pub fn take_camera(&mut self) -> Option<Box<dyn CameraStream>> {
        self.camera.take()
    }

    pub fn camera_mut(&mut self) -> Option<&mut Box<dyn CameraStream>> {
        self.camera.as_mut()
    }

    pub fn check_finish(&self, require_policy: bool) -> Result<(), WizardError> {
        if self.photos.is_empty() {
            return Err(WizardError::PhotoRequired);
        }
        if self.plate.is_none() {
            return Err(WizardError::PlateRequired);
        }
        if self.technical_sheet.is_none() {
            return Err(WizardError::TechnicalSheetRequired);
        }
        match self.policy {
            PolicyState::Attached(_) => {}
            PolicyState::Skipped if !require_policy => {}
            _ => return Err(WizardError::PolicyRequired),
        }
        Ok(())
    }

    /// Builds the final record. Callers must run `check_finish` first; the
    /// record id is derived from the plate, falling back to a timestamp when
    /// somehow absent.
    pub fn into_record(self, registered_at: DateTime<Utc>) -> IntakeRecord {
        let id = self
            .plate
            .clone()
            .unwrap_or_else(|| format!("EXP{}", registered_at.timestamp_millis()));
        let (policy, policy_skipped) = match self.policy {
            PolicyState::Attached(document) => (Some(document), false),
            PolicyState::Skipped => (None, true),
            PolicyState::Missing => (None, false),
        };
        IntakeRecord {
            id,
            plate: self.plate,
            photos: self.photos,
            frontal_index: self.frontal_index,
            ocr_confidence: self.plate_confidence,
            technical_sheet: self.technical_sheet,
            policy,
            policy_skipped,
            extracted: self.extracted,
            customer: Customer {
                name: self.customer_name.unwrap_or_default(),
                phone: self.customer_phone.unwrap_or_default(),
                email: self.customer_email,
            },
            vehicle: Vehicle {
                make: self.vehicle_make.unwrap_or_default(),
                model: self.vehicle_model.unwrap_or_default(),
                year: self.vehicle_year,
                color: self.vehicle_color,
                chassis: self.vehicle_chassis,
            },
            service: self.service,
            status: IntakeStatus::Received,
            registered_at,
            shop: self.shop,
        }
    }

    pub fn view(&self) -> DraftView {
        let (policy, policy_skipped) = match &self.policy {
            PolicyState::Attached(document) => (Some(document.clone()), false),
            PolicyState::Skipped => (None, true),
            PolicyState::Missing => (None, false),
        };
        DraftView {
            id: self.id,
            shop: self.shop.clone(),
            step: self.step,
            plate: self.plate.clone(),
            plate_confidence: self.plate_confidence,
            plate_source: self.plate_source,
            photos: self.photos.clone(),
            frontal_index: self.frontal_index,
            technical_sheet: self.technical_sheet.clone(),
            policy,
            policy_skipped,
            extracted: self.extracted.clone(),
            customer_name: self.customer_name.clone(),
            customer_phone: self.customer_phone.clone(),
            customer_email: self.customer_email.clone(),
            vehicle_make: self.vehicle_make.clone(),
            vehicle_model: self.vehicle_model.clone(),
            vehicle_year: self.vehicle_year,
            vehicle_color: self.vehicle_color.clone(),
            vehicle_chassis: self.vehicle_chassis.clone(),
            service: self.service.clone(),
            opened_at: self.opened_at,
            camera_active: self.camera.is_some(),
        }
    }
}

fn has_text(value: &str) -> bool {
    !value.trim().is_empty()
}

#[cfg(test)]
pub fn test_photo() -> PhotoRecord {
    PhotoRecord {
        id: Uuid::new_v4(),
        media_key: format!("drafts/test/{}", Uuid::new_v4()),
        original_name: None,
        content_type: Some("image/jpeg".into()),
        size_bytes: 3,
        checksum: "abc".into(),
        width: None,
        height: None,
        captured_at: Utc::now(),
    }
}

#[cfg(test)]
pub fn test_document() -> DocumentRef {
    DocumentRef {
        media_key: format!("drafts/test/{}", Uuid::new_v4()),
        original_name: "doc.pdf".into(),
        content_type: Some("application/pdf".into()),
        size_bytes: 10,
        checksum: "def".into(),
        uploaded_at: Utc::now(),
    }
}

/// Serializable snapshot of a draft, returned by the wizard endpoints.
#[derive(Serialize)]
pub struct DraftView {
    pub id: Uuid,
    pub shop: Shop,
    pub step: u8,
    pub plate: Option<String>,
    pub plate_confidence: Option<f32>,
    pub plate_source: Option<PlateSource>,
    pub photos: Vec<PhotoRecord>,
    pub frontal_index: usize,
    pub technical_sheet: Option<DocumentRef>,
    pub policy: Option<DocumentRef>,
    pub policy_skipped: bool,
    pub extracted: ExtractedData,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub vehicle_make: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_year: Option<i32>,
    pub vehicle_color: Option<String>,
    pub vehicle_chassis: Option<String>,
    pub service: Option<String>,
    pub opened_at: DateTime<Utc>,
    pub camera_active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShopCatalog;

    fn shop() -> Shop {
        ShopCatalog::default().shops[0].clone()
    }

    fn photo() -> PhotoRecord {
        test_photo()
    }

    fn document() -> DocumentRef {
        test_document()
    }

    fn ready_draft() -> Draft {
        let mut draft = Draft::new(shop());
        draft.add_photo(photo());
        draft.set_manual_plate("4821BCD").unwrap();
        draft.attach_document(DocumentKind::TechnicalSheet, document());
        draft.attach_document(DocumentKind::Policy, document());
        draft
    }

    #[test]
    fn first_photo_triggers_recognition() {
        let mut draft = Draft::new(shop());
        let first = photo();
        let first_id = first.id;
        assert_eq!(draft.add_photo(first), Some(first_id));
        assert_eq!(draft.add_photo(photo()), None);
    }

    #[test]
    fn step_one_requires_a_photo() {
        let mut draft = Draft::new(shop());
        assert_eq!(draft.advance(), Err(WizardError::PhotoRequired));
        draft.add_photo(photo());
        assert_eq!(draft.advance(), Ok(2));
    }

    #[test]
    fn step_two_requires_customer_and_service() {
        let mut draft = Draft::new(shop());
        draft.add_photo(photo());
        draft.advance().unwrap();
        assert_eq!(draft.advance(), Err(WizardError::DetailsIncomplete));

        draft.customer_name = Some("Ana Soler".into());
        draft.customer_phone = Some("600111222".into());
        assert_eq!(draft.advance(), Err(WizardError::DetailsIncomplete));

        draft.service = Some("Reparación impacto".into());
        assert_eq!(draft.advance(), Ok(3));
        assert_eq!(draft.advance(), Err(WizardError::AtFinalStep));
    }

    #[test]
    fn step_is_bounded_below() {
        let mut draft = Draft::new(shop());
        assert_eq!(draft.back(), Err(WizardError::AtFirstStep));
    }

    #[test]
    fn last_photo_cannot_be_removed() {
        let mut draft = Draft::new(shop());
        let only = photo();
        let only_id = only.id;
        draft.add_photo(only);
        assert_eq!(draft.remove_photo(only_id), Err(WizardError::LastPhoto));
        assert_eq!(draft.photos.len(), 1);
    }

    #[test]
    fn removing_frontal_photo_resets_index() {
        let mut draft = Draft::new(shop());
        draft.add_photo(photo());
        let second = photo();
        let second_id = second.id;
        draft.add_photo(second);
        draft.set_frontal(1).unwrap();
        draft.remove_photo(second_id).unwrap();
        assert_eq!(draft.frontal_index, 0);
        assert!(draft.frontal_photo().is_some());
    }

    #[test]
    fn stale_recognition_is_discarded() {
        let mut draft = Draft::new(shop());
        let first = photo();
        let first_id = first.id;
        draft.add_photo(first);
        let second = photo();
        draft.add_photo(second);
        draft.set_frontal(1).unwrap();

        let applied = draft.apply_recognition(
            first_id,
            RecognitionOutcome::Detected {
                plate: "1111BBB".into(),
                confidence: 90.0,
            },
        );
        assert!(!applied);
        assert_eq!(draft.plate, None);
    }

    #[test]
    fn not_detected_keeps_manual_plate() {
        let mut draft = Draft::new(shop());
        let first = photo();
        let first_id = first.id;
        draft.add_photo(first);
        draft.set_manual_plate("4821BCD").unwrap();
        assert!(draft.apply_recognition(first_id, RecognitionOutcome::NotDetected));
        assert_eq!(draft.plate.as_deref(), Some("4821BCD"));
    }

    #[test]
    fn manual_plate_is_normalized_and_validated() {
        let mut draft = Draft::new(shop());
        draft.set_manual_plate(" 4821 bcd ").unwrap();
        assert_eq!(draft.plate.as_deref(), Some("4821BCD"));
        assert!(matches!(
            draft.set_manual_plate("1234ABC"),
            Err(WizardError::InvalidPlate(_))
        ));
    }

    #[test]
    fn finish_preconditions() {
        let mut draft = Draft::new(shop());
        assert_eq!(
            draft.check_finish(true),
            Err(WizardError::PhotoRequired)
        );
        draft.add_photo(photo());
        assert_eq!(draft.check_finish(true), Err(WizardError::PlateRequired));
        draft.set_manual_plate("4821BCD").unwrap();
        assert_eq!(
            draft.check_finish(true),
            Err(WizardError::TechnicalSheetRequired)
        );
        draft.attach_document(DocumentKind::TechnicalSheet, document());
        assert_eq!(draft.check_finish(true), Err(WizardError::PolicyRequired));
        draft.attach_document(DocumentKind::Policy, document());
        assert_eq!(draft.check_finish(true), Ok(()));
    }

    #[test]
    fn policy_skip_only_when_optional() {
        let mut draft = Draft::new(shop());
        assert_eq!(
            draft.skip_policy(true),
            Err(WizardError::PolicySkipNotAllowed)
        );
        draft.skip_policy(false).unwrap();
        assert_eq!(draft.check_finish(false).err(), Some(WizardError::PhotoRequired));

        draft.add_photo(photo());
        draft.set_manual_plate("4821BCD").unwrap();
        draft.attach_document(DocumentKind::TechnicalSheet, document());
        assert_eq!(draft.check_finish(false), Ok(()));
        // A skipped policy never satisfies a center that requires one.
        assert_eq!(draft.check_finish(true), Err(WizardError::PolicyRequired));
    }

    #[test]
    fn record_id_comes_from_plate() {
        let draft = ready_draft();
        let record = draft.into_record(Utc::now());
        assert_eq!(record.id, "4821BCD");
        assert_eq!(record.status, IntakeStatus::Received);
        assert!(!record.policy_skipped);
    }
}
