//! Request and result types for the extraction pipeline.

use std::path::Path;
use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

use super::backend::{clamp_confidence, BackendError, OcrBackendType, Recognition};
use super::validator::ValidationError;

/// Raw image bytes as received from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    bytes: Vec<u8>,
    filename: Option<String>,
}

impl ImageBlob {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Read an image file, keeping its file name for format checks.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let blob = Self::new(bytes);
        Ok(match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => blob.with_filename(name),
            None => blob,
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Metadata decoded from a valid image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// Detected container format (e.g. "PNG").
    pub format: String,
    /// Decoded color mode (e.g. "Rgb8").
    pub color_mode: String,
    pub byte_len: usize,
}

impl ImageInfo {
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Outcome of one backend invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    LogicFailure,
}

/// Record of one backend invocation within an extraction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Attempt {
    pub backend: OcrBackendType,
    pub outcome: AttemptOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub confidence: f32,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub message: String,
}

impl Attempt {
    pub fn succeeded(backend: OcrBackendType, recognition: &Recognition, duration: Duration) -> Self {
        Self {
            backend,
            outcome: AttemptOutcome::Success,
            text: Some(recognition.text.clone()),
            confidence: clamp_confidence(recognition.confidence),
            duration,
            message: format!("extracted {} characters", recognition.text.chars().count()),
        }
    }

    pub fn failed(backend: OcrBackendType, error: &BackendError, duration: Duration) -> Self {
        let outcome = match error.kind() {
            super::backend::FailureKind::Transient => AttemptOutcome::TransientFailure,
            super::backend::FailureKind::Logic => AttemptOutcome::LogicFailure,
        };
        Self {
            backend,
            outcome,
            text: None,
            confidence: 0.0,
            duration,
            message: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}

/// Why an extraction produced no text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExtractError {
    /// The input was rejected before any backend ran.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Every backend in the chain failed.
    #[error("all OCR backends failed: {diagnostics}")]
    Exhausted { diagnostics: String },
}

impl ExtractError {
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractError::Validation(_) => "validation",
            ExtractError::Exhausted { .. } => "exhausted",
        }
    }
}

impl Serialize for ExtractError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("ExtractError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Final result of one extraction call.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionResult {
    Success {
        #[serde(rename = "extracted_text")]
        text: String,
        confidence: f32,
        method: OcrBackendType,
        #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
        duration: Duration,
        language: String,
        query: String,
        attempts: Vec<Attempt>,
    },
    Failure {
        error: ExtractError,
        #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
        duration: Duration,
        attempts: Vec<Attempt>,
    },
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Success { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            ExtractionResult::Success { text, .. } => Some(text),
            ExtractionResult::Failure { .. } => None,
        }
    }

    /// Confidence of the winning backend; zero on failure.
    pub fn confidence(&self) -> f32 {
        match self {
            ExtractionResult::Success { confidence, .. } => clamp_confidence(*confidence),
            ExtractionResult::Failure { .. } => 0.0,
        }
    }

    pub fn method(&self) -> Option<OcrBackendType> {
        match self {
            ExtractionResult::Success { method, .. } => Some(*method),
            ExtractionResult::Failure { .. } => None,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            ExtractionResult::Success { duration, .. } | ExtractionResult::Failure { duration, .. } => {
                *duration
            }
        }
    }

    pub fn attempts(&self) -> &[Attempt] {
        match self {
            ExtractionResult::Success { attempts, .. } | ExtractionResult::Failure { attempts, .. } => {
                attempts
            }
        }
    }

    pub fn error(&self) -> Option<&ExtractError> {
        match self {
            ExtractionResult::Success { .. } => None,
            ExtractionResult::Failure { error, .. } => Some(error),
        }
    }

    /// Human-readable failure reason, if this result failed.
    pub fn diagnostics(&self) -> Option<String> {
        self.error().map(|e| e.to_string())
    }
}

/// Join failed attempts into one message: `backend: reason; backend: reason`.
pub fn aggregate_diagnostics(attempts: &[Attempt]) -> String {
    let failures: Vec<String> = attempts
        .iter()
        .filter(|a| !a.is_success())
        .map(|a| format!("{}: {}", a.backend, a.message))
        .collect();

    if failures.is_empty() {
        "no OCR backends configured".to_string()
    } else {
        failures.join("; ")
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failed(backend: OcrBackendType, error: BackendError) -> Attempt {
        Attempt::failed(backend, &error, Duration::from_millis(5))
    }

    #[test]
    fn test_attempt_outcome_follows_error_kind() {
        let transient = failed(
            OcrBackendType::OcrSpace,
            BackendError::Transient("HTTP 503".into()),
        );
        assert_eq!(transient.outcome, AttemptOutcome::TransientFailure);

        let logic = failed(
            OcrBackendType::Tesseract,
            BackendError::Unavailable("missing".into()),
        );
        assert_eq!(logic.outcome, AttemptOutcome::LogicFailure);
        assert_eq!(logic.confidence, 0.0);
        assert!(logic.text.is_none());
    }

    #[test]
    fn test_aggregate_diagnostics() {
        let attempts = vec![
            failed(
                OcrBackendType::OcrSpace,
                BackendError::Transient("connection refused".into()),
            ),
            failed(
                OcrBackendType::Tesseract,
                BackendError::Logic("empty output".into()),
            ),
        ];
        assert_eq!(
            aggregate_diagnostics(&attempts),
            "ocr.space: connection refused; tesseract: empty output"
        );
        assert_eq!(aggregate_diagnostics(&[]), "no OCR backends configured");
    }

    #[test]
    fn test_failure_json_has_no_extracted_text() {
        let result = ExtractionResult::Failure {
            error: ExtractError::Exhausted {
                diagnostics: "ocr.space: down".into(),
            },
            duration: Duration::from_millis(42),
            attempts: vec![],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "failure");
        assert_eq!(json["error"]["kind"], "exhausted");
        assert_eq!(json["duration_ms"], 42);
        assert!(json.get("extracted_text").is_none());
        assert_eq!(result.confidence(), 0.0);
    }

    #[test]
    fn test_success_json_shape() {
        let recognition = Recognition::new("HELLO", 0.85);
        let result = ExtractionResult::Success {
            text: recognition.text.clone(),
            confidence: recognition.confidence,
            method: OcrBackendType::OcrSpace,
            duration: Duration::from_millis(7),
            language: "eng".into(),
            query: "extract".into(),
            attempts: vec![Attempt::succeeded(
                OcrBackendType::OcrSpace,
                &recognition,
                Duration::from_millis(7),
            )],
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["extracted_text"], "HELLO");
        assert_eq!(json["method"], "ocr.space");
        assert_eq!(json["attempts"][0]["outcome"], "success");
        assert!(result.diagnostics().is_none());
    }

    #[test]
    fn test_blob_accessors() {
        let blob = ImageBlob::new(vec![1u8, 2, 3]).with_filename("a.png");
        assert_eq!(blob.len(), 3);
        assert!(!blob.is_empty());
        assert_eq!(blob.filename(), Some("a.png"));
        assert!(ImageBlob::new(Vec::new()).is_empty());
    }
}
