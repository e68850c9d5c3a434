//! Simulated document data extraction.
//!
//! No real parsing happens here: the extract-document worker waits a
//! configured delay and fills the draft's field map with plausible demo
//! values, exactly what the kiosk needs for training and show-floor use.
//! The plate field echoes the draft's detected plate when one exists.

use std::collections::BTreeMap;

use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::wizard::DocumentKind;

const MAKES_AND_MODELS: &[(&str, &str)] = &[
    ("Seat", "León"),
    ("Volkswagen", "Polo"),
    ("Ford", "Focus"),
    ("Renault", "Clio"),
    ("Peugeot", "308"),
    ("Toyota", "Corolla"),
];

const FUELS: &[&str] = &["Gasolina", "Diesel", "Híbrido"];

const INSURERS: &[&str] = &[
    "Mapfre",
    "AXA",
    "Zurich",
    "Línea Directa",
    "Mutua Madrileña",
    "Allianz",
    "Generali",
];

const COVERAGES: &[&str] = &["Terceros", "Terceros ampliado", "Todo riesgo"];

pub fn demo_fields<R: Rng>(
    rng: &mut R,
    kind: DocumentKind,
    plate: Option<&str>,
) -> BTreeMap<String, String> {
    match kind {
        DocumentKind::TechnicalSheet => technical_sheet_fields(rng, plate),
        DocumentKind::Policy => policy_fields(rng, plate),
    }
}

fn technical_sheet_fields<R: Rng>(rng: &mut R, plate: Option<&str>) -> BTreeMap<String, String> {
    let (make, model) = *MAKES_AND_MODELS.choose(rng).expect("non-empty");
    let year = rng.gen_range(2015..=2024);

    let mut fields = BTreeMap::new();
    fields.insert("make".into(), make.to_string());
    fields.insert("model".into(), model.to_string());
    fields.insert("plate".into(), plate.unwrap_or("").to_string());
    fields.insert("chassis".into(), demo_chassis(rng));
    fields.insert("power".into(), format!("{} CV", rng.gen_range(75..=150)));
    fields.insert(
        "displacement".into(),
        format!("{} cc", rng.gen_range(10..=20) * 100),
    );
    fields.insert(
        "fuel".into(),
        FUELS.choose(rng).expect("non-empty").to_string(),
    );
    fields.insert("year".into(), year.to_string());
    fields
}

fn policy_fields<R: Rng>(rng: &mut R, plate: Option<&str>) -> BTreeMap<String, String> {
    let insurer = *INSURERS.choose(rng).expect("non-empty");
    let valid_from = Utc::now().date_naive() - Duration::days(rng.gen_range(30..300));
    let valid_until = valid_from + Duration::days(365);

    let mut fields = BTreeMap::new();
    fields.insert("insurer".into(), insurer.to_string());
    fields.insert("policy_number".into(), demo_policy_number(rng, insurer));
    fields.insert("plate".into(), plate.unwrap_or("").to_string());
    fields.insert(
        "valid_from".into(),
        valid_from.format("%d/%m/%Y").to_string(),
    );
    fields.insert(
        "valid_until".into(),
        valid_until.format("%d/%m/%Y").to_string(),
    );
    fields.insert(
        "coverage".into(),
        COVERAGES.choose(rng).expect("non-empty").to_string(),
    );
    fields
}

/// VIN-shaped string: a Spanish manufacturer prefix plus random digits.
fn demo_chassis<R: Rng>(rng: &mut R) -> String {
    let mut chassis = String::from("VSSZZZ5FZ");
    for _ in 0..8 {
        chassis.push(char::from(b'0' + rng.gen_range(0..10)));
    }
    chassis
}

fn demo_policy_number<R: Rng>(rng: &mut R, insurer: &str) -> String {
    let prefix: String = insurer
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .take(3)
        .collect::<String>()
        .to_uppercase();
    let mut number = prefix;
    for _ in 0..9 {
        number.push(char::from(b'0' + rng.gen_range(0..10)));
    }
    number
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn technical_sheet_echoes_detected_plate() {
        let mut rng = StdRng::seed_from_u64(1);
        let fields = demo_fields(&mut rng, DocumentKind::TechnicalSheet, Some("4821BCD"));
        assert_eq!(fields.get("plate").map(String::as_str), Some("4821BCD"));
        assert!(fields.contains_key("make"));
        assert!(fields.contains_key("chassis"));
        assert_eq!(fields["chassis"].len(), 17);
    }

    #[test]
    fn policy_dates_span_one_year() {
        let mut rng = StdRng::seed_from_u64(2);
        let fields = demo_fields(&mut rng, DocumentKind::Policy, None);
        let from = chrono::NaiveDate::parse_from_str(&fields["valid_from"], "%d/%m/%Y").unwrap();
        let until = chrono::NaiveDate::parse_from_str(&fields["valid_until"], "%d/%m/%Y").unwrap();
        assert_eq!(until - from, chrono::Duration::days(365));
        assert!(INSURERS.contains(&fields["insurer"].as_str()));
    }

    #[test]
    fn policy_number_uses_insurer_prefix() {
        let mut rng = StdRng::seed_from_u64(3);
        let fields = demo_fields(&mut rng, DocumentKind::Policy, None);
        let number = &fields["policy_number"];
        assert_eq!(number.len(), 12);
        assert!(number[..3].chars().all(|c| c.is_ascii_uppercase()));
        assert!(number[3..].chars().all(|c| c.is_ascii_digit()));
    }
}
