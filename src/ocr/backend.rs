//! OCR backend abstraction for the fallback chain.
//!
//! Two backend kinds exist:
//! - OCR.space: hosted OCR API called over HTTPS (remote, metered)
//! - Tesseract: local command-line engine, installed on first use if missing
//!
//! Backends never panic on bad input and never retry internally. A failed
//! call is reported as a [`BackendError`] so the pipeline can move on to the
//! next backend.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// How a backend failure should be classified in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Timeout, connection failure or non-200 HTTP status.
    Transient,
    /// The engine ran but reported an error or produced no text.
    Logic,
}

/// Errors from OCR backends.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Logic(String),

    #[error("not available: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Classify this error. An unavailable backend counts as a logic failure:
    /// nothing transient about a missing binary or API key.
    pub fn kind(&self) -> FailureKind {
        match self {
            BackendError::Transient(_) => FailureKind::Transient,
            BackendError::Logic(_) | BackendError::Unavailable(_) => FailureKind::Logic,
        }
    }
}

/// Text recognized by a single backend call.
#[derive(Debug, Clone, PartialEq)]
pub struct Recognition {
    /// Trimmed text content.
    pub text: String,
    /// Heuristic confidence (0.0 - 1.0).
    pub confidence: f32,
}

impl Recognition {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into().trim().to_string(),
            confidence: clamp_confidence(confidence),
        }
    }
}

/// Clamp a confidence value into `[0, 1]`, mapping NaN to zero.
pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Available OCR backend types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcrBackendType {
    /// OCR.space hosted API.
    OcrSpace,
    /// Tesseract OCR via command-line.
    Tesseract,
}

impl OcrBackendType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OcrBackendType::OcrSpace => "ocr.space",
            OcrBackendType::Tesseract => "tesseract",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "ocr.space" | "ocrspace" | "remote" => Some(OcrBackendType::OcrSpace),
            "tesseract" | "local" => Some(OcrBackendType::Tesseract),
            _ => None,
        }
    }

    /// Whether this backend runs on a remote service.
    pub fn is_remote(&self) -> bool {
        matches!(self, OcrBackendType::OcrSpace)
    }
}

impl std::fmt::Display for OcrBackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

impl Serialize for OcrBackendType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Trait for OCR backends.
#[async_trait]
pub trait OcrBackend: Send + Sync {
    /// Get the backend type.
    fn backend_type(&self) -> OcrBackendType;

    /// Language tag passed to the engine (e.g. "eng").
    fn language(&self) -> &str;

    /// Check if this backend can run. May trigger one-time setup.
    async fn is_available(&self) -> bool;

    /// Get a description of what's needed to make this backend available.
    fn availability_hint(&self) -> String;

    /// Run OCR on raw image bytes.
    async fn recognize(&self, image: &[u8]) -> Result<Recognition, BackendError>;
}
