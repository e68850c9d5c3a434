//! Optional external text recognition.
//!
//! The service does not bundle an OCR engine; when a recognizer command is
//! configured it is invoked as a subprocess per frontal photo, and when it
//! is absent or failing the wizard degrades according to the configured
//! plate fallback policy. Nothing here ever surfaces an error to the user.

use std::io::{ErrorKind, Write};
use std::process::Command;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use thiserror::Error;
use tokio::task;

/// Raw result of one recognition pass: the text read from the image and a
/// confidence percentage in [0, 100].
#[derive(Debug, Clone)]
pub struct Recognition {
    pub text: String,
    pub confidence: f32,
}

#[derive(Debug, Error)]
pub enum RecognizerError {
    #[error("recognizer binary not found")]
    BinaryMissing,
    #[error("recognition failed: {0}")]
    Failed(String),
}

#[async_trait]
pub trait PlateRecognizer: Send + Sync + 'static {
    async fn recognize(&self, image: &[u8]) -> Result<Recognition, RecognizerError>;
}

/// Runs a tesseract-compatible CLI over a tempfile and parses its TSV
/// output for word text and per-word confidence.
pub struct CliRecognizer {
    command: String,
}

impl CliRecognizer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl PlateRecognizer for CliRecognizer {
    async fn recognize(&self, image: &[u8]) -> Result<Recognition, RecognizerError> {
        let command = self.command.clone();
        let image = image.to_vec();
        task::spawn_blocking(move || run_cli(&command, &image))
            .await
            .map_err(|err| RecognizerError::Failed(format!("recognizer task panicked: {err}")))?
    }
}

fn run_cli(command: &str, image: &[u8]) -> Result<Recognition, RecognizerError> {
    let mut input = NamedTempFile::new().map_err(|err| RecognizerError::Failed(err.to_string()))?;
    input
        .write_all(image)
        .map_err(|err| RecognizerError::Failed(err.to_string()))?;
    input
        .flush()
        .map_err(|err| RecognizerError::Failed(err.to_string()))?;

    let output = Command::new(command)
        .arg(input.path())
        .arg("stdout")
        .arg("--psm")
        .arg("8")
        .arg("tsv")
        .output();

    match output {
        Ok(output) => {
            if !output.status.success() {
                return Err(RecognizerError::Failed(format!(
                    "recognizer exited with {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr)
                )));
            }
            Ok(parse_tsv(&String::from_utf8_lossy(&output.stdout)))
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Err(RecognizerError::BinaryMissing),
        Err(err) => Err(RecognizerError::Failed(err.to_string())),
    }
}

/// Extracts word text and mean word confidence from tesseract TSV output.
/// Rows with a negative confidence are layout markers, not words.
fn parse_tsv(raw: &str) -> Recognition {
    let mut words: Vec<&str> = Vec::new();
    let mut confidences: Vec<f32> = Vec::new();

    for line in raw.lines().skip(1) {
        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < 12 {
            continue;
        }
        let Ok(conf) = columns[10].parse::<f32>() else {
            continue;
        };
        let text = columns[11].trim();
        if conf >= 0.0 && !text.is_empty() {
            words.push(text);
            confidences.push(conf);
        }
    }

    let confidence = if confidences.is_empty() {
        0.0
    } else {
        confidences.iter().sum::<f32>() / confidences.len() as f32
    };

    Recognition {
        text: words.join(" "),
        confidence,
    }
}
