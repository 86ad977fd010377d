//! Fallback pipeline that tries OCR backends in sequence.
//!
//! The default chain calls OCR.space first and falls back to a local
//! Tesseract when the remote call fails for any reason (rate limit,
//! timeout, API error, empty text). Backends are never raced: the remote
//! API is metered and concurrent subprocess spawns buy nothing.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::backend::{clamp_confidence, BackendError, OcrBackend, OcrBackendType};
use super::ocr_space::OcrSpaceBackend;
use super::tesseract::TesseractBackend;
use super::types::{aggregate_diagnostics, Attempt, ExtractError, ExtractionResult, ImageBlob};
use super::validator::ImageValidator;
use crate::config::Config;

/// Query recorded when the caller supplies none.
pub const DEFAULT_QUERY: &str = "Extract text from image";

/// Availability report for one backend in the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatus {
    pub backend: OcrBackendType,
    pub available: bool,
    pub hint: String,
}

/// A validated, ordered fallback chain of OCR backends.
pub struct FallbackPipeline {
    validator: ImageValidator,
    /// Ordered list of backends to try.
    backends: Vec<Arc<dyn OcrBackend>>,
}

impl FallbackPipeline {
    pub fn new(validator: ImageValidator, backends: Vec<Arc<dyn OcrBackend>>) -> Self {
        Self {
            validator,
            backends,
        }
    }

    /// Build the standard OCR.space -> Tesseract chain from configuration.
    pub fn from_config(config: &Config) -> Result<Self, BackendError> {
        let timeout = config.timeout();
        let remote = OcrSpaceBackend::new(config.remote.clone(), timeout)?;
        let local = TesseractBackend::new(config.local.clone(), timeout);

        info!(
            "OCR fallback chain initialized: {} -> {}",
            remote.backend_type(),
            local.backend_type()
        );

        Ok(Self::new(
            ImageValidator::new(config.validation.clone()),
            vec![Arc::new(remote) as Arc<dyn OcrBackend>, Arc::new(local)],
        ))
    }

    pub fn validator(&self) -> &ImageValidator {
        &self.validator
    }

    /// Backend types in the order they are tried.
    pub fn backends(&self) -> Vec<OcrBackendType> {
        self.backends.iter().map(|b| b.backend_type()).collect()
    }

    /// Probe every backend. This may install the local engine.
    pub async fn availability(&self) -> Vec<BackendStatus> {
        let mut statuses = Vec::with_capacity(self.backends.len());
        for backend in &self.backends {
            let available = backend.is_available().await;
            statuses.push(BackendStatus {
                backend: backend.backend_type(),
                available,
                hint: backend.availability_hint(),
            });
        }
        statuses
    }

    /// Validate the image, then run the chain until a backend returns text.
    pub async fn extract(&self, image: &ImageBlob, query: Option<&str>) -> ExtractionResult {
        let start = Instant::now();
        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(DEFAULT_QUERY);

        let info = match self.validator.validate(image) {
            Ok(info) => info,
            Err(e) => {
                warn!("Rejected image {:?}: {}", image.filename(), e);
                return ExtractionResult::Failure {
                    error: ExtractError::Validation(e),
                    duration: start.elapsed(),
                    attempts: Vec::new(),
                };
            }
        };
        debug!(
            "Extracting from {}x{} {} image ({} bytes), query: {}",
            info.width, info.height, info.format, info.byte_len, query
        );

        let mut attempts = Vec::with_capacity(self.backends.len());

        for backend in &self.backends {
            let backend_type = backend.backend_type();
            let attempt_start = Instant::now();

            let error = match backend.recognize(image.bytes()).await {
                Ok(recognition) if !recognition.text.trim().is_empty() => {
                    let attempt =
                        Attempt::succeeded(backend_type, &recognition, attempt_start.elapsed());
                    info!(
                        "OCR succeeded with {} backend ({} chars in {:?})",
                        backend_type,
                        recognition.text.chars().count(),
                        attempt.duration
                    );
                    attempts.push(attempt);

                    return ExtractionResult::Success {
                        text: recognition.text.trim().to_string(),
                        confidence: clamp_confidence(recognition.confidence),
                        method: backend_type,
                        duration: start.elapsed(),
                        language: backend.language().to_string(),
                        query: query.to_string(),
                        attempts,
                    };
                }
                Ok(_) => BackendError::Logic("no text extracted".to_string()),
                Err(e) => e,
            };

            warn!(
                "OCR backend {} failed ({:?}): {}, trying next",
                backend_type,
                error.kind(),
                error
            );
            attempts.push(Attempt::failed(
                backend_type,
                &error,
                attempt_start.elapsed(),
            ));
        }

        let diagnostics = aggregate_diagnostics(&attempts);
        warn!("All OCR backends failed: {}", diagnostics);

        ExtractionResult::Failure {
            error: ExtractError::Exhausted { diagnostics },
            duration: start.elapsed(),
            attempts,
        }
    }
}
