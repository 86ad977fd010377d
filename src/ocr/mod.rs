//! Image-to-text extraction.
//!
//! Validates raw image bytes, then extracts text through a fallback chain:
//! - OCR.space: hosted OCR API (tried first)
//! - Tesseract: local command-line engine, installed on first use
//!
//! The first backend that returns non-empty text wins; later backends are
//! not invoked. Use [`report::format_result`] to render the outcome.

mod backend;
mod fallback;
mod install;
mod ocr_space;
pub mod report;
mod tesseract;
mod types;
mod validator;

pub use backend::{BackendError, FailureKind, OcrBackend, OcrBackendType, Recognition};
pub use fallback::{BackendStatus, FallbackPipeline, DEFAULT_QUERY};
pub use install::{InstallError, LocalBackendState};
pub use ocr_space::OcrSpaceBackend;
pub use tesseract::TesseractBackend;
pub use types::{
    Attempt, AttemptOutcome, ExtractError, ExtractionResult, ImageBlob, ImageInfo,
};
pub use validator::{validate, ImageValidator, ValidationError, ValidationResult};
