//! Spanish license plate matching.
//!
//! Current-format plates are four digits followed by three consonants from a
//! fixed 20-letter alphabet. Vowels are excluded to avoid spelling words, and
//! Ñ/Q are excluded as too easy to misread.

use rand::Rng;

/// Letters allowed in the three-letter suffix.
pub const PLATE_LETTERS: &[u8; 20] = b"BCDFGHJKLMNPRSTVWXYZ";

const PLATE_LEN: usize = 7;

/// Whether `candidate` is exactly one well-formed plate (`DDDDLLL`).
pub fn is_valid_plate(candidate: &str) -> bool {
    let bytes = candidate.as_bytes();
    if bytes.len() != PLATE_LEN {
        return false;
    }
    bytes[..4].iter().all(u8::is_ascii_digit)
        && bytes[4..].iter().all(|b| PLATE_LETTERS.contains(b))
}

/// Uppercases and collapses whitespace, the same cleanup the OCR text gets
/// before matching.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Scans recognized text for the first embedded plate. Whitespace inside the
/// candidate is ignored so "1234 BCD" still matches.
pub fn find_plate(text: &str) -> Option<String> {
    let compact: Vec<u8> = normalize(text).bytes().filter(|b| *b != b' ').collect();
    if compact.len() < PLATE_LEN {
        return None;
    }
    for window in compact.windows(PLATE_LEN) {
        if window[..4].iter().all(u8::is_ascii_digit)
            && window[4..].iter().all(|b| PLATE_LETTERS.contains(b))
        {
            return Some(String::from_utf8(window.to_vec()).expect("ascii plate"));
        }
    }
    None
}

/// Builds a random valid plate, used only under the `synthesize` fallback
/// policy for demo installations.
pub fn synthesize_plate<R: Rng>(rng: &mut R) -> String {
    let mut plate = String::with_capacity(PLATE_LEN);
    for _ in 0..4 {
        plate.push(char::from(b'0' + rng.gen_range(0..10)));
    }
    for _ in 0..3 {
        plate.push(char::from(PLATE_LETTERS[rng.gen_range(0..PLATE_LETTERS.len())]));
    }
    plate
}

/// Confidence reported alongside a synthesized plate, in [85, 95).
pub fn synthetic_confidence<R: Rng>(rng: &mut R) -> f32 {
    rng.gen_range(85.0..95.0)
}
