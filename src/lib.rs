//! Image-to-text extraction with a remote OCR service and a self-installing
//! local Tesseract fallback.

pub mod config;
pub mod ocr;

pub use config::Config;
pub use ocr::report::format_result;
pub use ocr::{ExtractionResult, FallbackPipeline, ImageBlob};
