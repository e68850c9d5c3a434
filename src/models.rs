use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A physical GlassDrive service center ("taller").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shop {
    pub id: String,
    pub name: String,
    pub address: String,
}

/// Shop and service catalog, loaded from a JSON file so new centers can be
/// added without touching code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShopCatalog {
    pub shops: Vec<Shop>,
    pub services: Vec<String>,
}

impl ShopCatalog {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read shops file {}", path.display()))?;
        let catalog: ShopCatalog = serde_json::from_str(&raw)
            .with_context(|| format!("invalid shops file {}", path.display()))?;
        Ok(catalog)
    }

    pub fn shop(&self, id: &str) -> Option<&Shop> {
        self.shops.iter().find(|shop| shop.id == id)
    }
}

impl Default for ShopCatalog {
    fn default() -> Self {
        Self {
            shops: vec![
                Shop {
                    id: "monzon".into(),
                    name: "Monzón".into(),
                    address: "Av. Lérida, 45".into(),
                },
                Shop {
                    id: "barbastro".into(),
                    name: "Barbastro".into(),
                    address: "C/ Somontano, 23".into(),
                },
                Shop {
                    id: "lleida".into(),
                    name: "Lleida".into(),
                    address: "Av. Catalunya, 67".into(),
                },
                Shop {
                    id: "fraga".into(),
                    name: "Fraga".into(),
                    address: "C/ Zaragoza, 12".into(),
                },
            ],
            services: vec![
                "Sustitución parabrisas".into(),
                "Reparación impacto".into(),
                "Cambio luna lateral".into(),
                "Sustitución luneta trasera".into(),
                "Calibración sistemas ADAS".into(),
                "Tratamiento hidrofóbico".into(),
            ],
        }
    }
}

/// Workflow state of an intake record. Any status may be written at any
/// time; transitions are deliberately unvalidated so clerks can correct
/// mistakes freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStatus {
    Received,
    Diagnosis,
    Repair,
    Completed,
    Cancelled,
}

impl IntakeStatus {
    pub fn is_in_progress(self) -> bool {
        matches!(self, IntakeStatus::Diagnosis | IntakeStatus::Repair)
    }
}

impl fmt::Display for IntakeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IntakeStatus::Received => "received",
            IntakeStatus::Diagnosis => "diagnosis",
            IntakeStatus::Repair => "repair",
            IntakeStatus::Completed => "completed",
            IntakeStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// A captured or uploaded vehicle photo. The blob itself lives in media
/// storage under `media_key`; only metadata is kept on the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoRecord {
    pub id: Uuid,
    pub media_key: String,
    pub original_name: Option<String>,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    pub checksum: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub captured_at: DateTime<Utc>,
}

/// An uploaded supporting document (technical sheet or insurance policy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    pub media_key: String,
    pub original_name: String,
    pub content_type: Option<String>,
    pub size_bytes: u64,
    pub checksum: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vehicle {
    pub make: String,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chassis: Option<String>,
}

/// Field maps extracted (or simulated) from the uploaded documents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedData {
    #[serde(default)]
    pub technical_sheet: BTreeMap<String, String>,
    #[serde(default)]
    pub policy: BTreeMap<String, String>,
}

/// One finalized vehicle drop-off ("expediente"). This is the persisted
/// shape; the whole collection is serialized wholesale after each mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntakeRecord {
    pub id: String,
    pub plate: Option<String>,
    #[serde(default)]
    pub photos: Vec<PhotoRecord>,
    #[serde(default)]
    pub frontal_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technical_sheet: Option<DocumentRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<DocumentRef>,
    #[serde(default)]
    pub policy_skipped: bool,
    #[serde(default)]
    pub extracted: ExtractedData,
    pub customer: Customer,
    pub vehicle: Vehicle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    pub status: IntakeStatus,
    pub registered_at: DateTime<Utc>,
    pub shop: Shop,
}

/// Demo dataset used when the store file is missing or unreadable, so a
/// fresh installation starts with something on the dashboard.
pub fn seed_records() -> Vec<IntakeRecord> {
    let catalog = ShopCatalog::default();
    let shop = |id: &str| catalog.shop(id).cloned().expect("seed shop exists");

    vec![
        IntakeRecord {
            id: "MZ2025001".into(),
            plate: Some("1234BBC".into()),
            photos: Vec::new(),
            frontal_index: 0,
            ocr_confidence: Some(96.8),
            technical_sheet: None,
            policy: None,
            policy_skipped: false,
            extracted: ExtractedData::default(),
            customer: Customer {
                name: "Juan García López".into(),
                phone: "645123456".into(),
                email: None,
            },
            vehicle: Vehicle {
                make: "Seat".into(),
                model: "León".into(),
                year: Some(2020),
                color: Some("Blanco".into()),
                chassis: None,
            },
            service: Some("Sustitución parabrisas".into()),
            status: IntakeStatus::Diagnosis,
            registered_at: Utc.with_ymd_and_hms(2025, 10, 1, 9, 30, 0).unwrap(),
            shop: shop("monzon"),
        },
        IntakeRecord {
            id: "BB2025001".into(),
            plate: Some("5678DFF".into()),
            photos: Vec::new(),
            frontal_index: 0,
            ocr_confidence: Some(94.2),
            technical_sheet: None,
            policy: None,
            policy_skipped: false,
            extracted: ExtractedData::default(),
            customer: Customer {
                name: "María Pérez Ruiz".into(),
                phone: "634567890".into(),
                email: None,
            },
            vehicle: Vehicle {
                make: "Volkswagen".into(),
                model: "Polo".into(),
                year: Some(2019),
                color: Some("Azul".into()),
                chassis: None,
            },
            service: Some("Reparación impacto".into()),
            status: IntakeStatus::Completed,
            registered_at: Utc.with_ymd_and_hms(2025, 10, 2, 11, 15, 0).unwrap(),
            shop: shop("barbastro"),
        },
        IntakeRecord {
            id: "LL2025001".into(),
            plate: Some("9012GHJ".into()),
            photos: Vec::new(),
            frontal_index: 0,
            ocr_confidence: Some(98.1),
            technical_sheet: None,
            policy: None,
            policy_skipped: false,
            extracted: ExtractedData::default(),
            customer: Customer {
                name: "Carlos Martín Silva".into(),
                phone: "698765432".into(),
                email: None,
            },
            vehicle: Vehicle {
                make: "Ford".into(),
                model: "Focus".into(),
                year: Some(2021),
                color: Some("Gris".into()),
                chassis: None,
            },
            service: Some("Cambio luna lateral".into()),
            status: IntakeStatus::Repair,
            registered_at: Utc.with_ymd_and_hms(2025, 10, 1, 16, 45, 0).unwrap(),
            shop: shop("lleida"),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_has_four_centers() {
        let catalog = ShopCatalog::default();
        assert_eq!(catalog.shops.len(), 4);
        assert!(catalog.shop("monzon").is_some());
        assert!(catalog.shop("madrid").is_none());
    }

    #[test]
    fn status_round_trips_as_snake_case() {
        let json = serde_json::to_string(&IntakeStatus::Diagnosis).unwrap();
        assert_eq!(json, "\"diagnosis\"");
        let back: IntakeStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(back, IntakeStatus::Diagnosis);
    }

    #[test]
    fn seed_records_have_valid_plates() {
        for record in seed_records() {
            let plate = record.plate.expect("seeded plate");
            assert!(crate::plate::is_valid_plate(&plate), "bad plate {plate}");
        }
    }
}
