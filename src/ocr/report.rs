//! Human-readable rendering of extraction results.

use std::fmt::Write;

use super::types::ExtractionResult;
use crate::config::ValidationConfig;

/// Texts shorter than this many characters are `Short`.
pub const SHORT_TEXT_CHARS: usize = 50;

/// Texts shorter than this many characters (and not short) are `Medium`.
pub const LONG_TEXT_CHARS: usize = 300;

/// Coarse quality label derived from the amount of recognized text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QualityTier {
    Short,
    Medium,
    Long,
}

impl QualityTier {
    pub fn from_char_count(chars: usize) -> Self {
        if chars < SHORT_TEXT_CHARS {
            QualityTier::Short
        } else if chars < LONG_TEXT_CHARS {
            QualityTier::Medium
        } else {
            QualityTier::Long
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            QualityTier::Short => "short",
            QualityTier::Medium => "medium",
            QualityTier::Long => "long",
        }
    }
}

/// Counts shown under the extracted text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextStats {
    pub characters: usize,
    pub words: usize,
    pub quality: QualityTier,
}

impl TextStats {
    pub fn of(text: &str) -> Self {
        let characters = text.chars().count();
        Self {
            characters,
            words: text.split_whitespace().count(),
            quality: QualityTier::from_char_count(characters),
        }
    }
}

/// Render a result for display. Failures become a single error line.
pub fn format_result(result: &ExtractionResult) -> String {
    match result {
        ExtractionResult::Failure { error, .. } => format!("Error: {}", error),
        ExtractionResult::Success {
            text,
            confidence,
            method,
            duration,
            language,
            ..
        } => {
            let stats = TextStats::of(text);
            let mut out = String::new();

            // Writing to a String cannot fail
            let _ = writeln!(out, "Text extracted from image\n");
            let _ = writeln!(out, "Extracted text:\n{}\n", text);
            let _ = writeln!(out, "Characters: {}", stats.characters);
            let _ = writeln!(out, "Words: {}", stats.words);
            let _ = writeln!(out, "Quality: {}", stats.quality.label());
            let _ = writeln!(out, "Confidence: {:.1}%", result_confidence(*confidence));
            let _ = writeln!(out, "Processing time: {:.1}s", duration.as_secs_f64());
            let _ = writeln!(out, "Method: {}", method);
            let _ = write!(out, "Language: {}", language);
            out
        }
    }
}

fn result_confidence(confidence: f32) -> f32 {
    super::backend::clamp_confidence(confidence) * 100.0
}

/// List of accepted formats, one per line.
pub fn supported_formats(config: &ValidationConfig) -> String {
    let mut out = String::from("Supported formats:");
    for ext in &config.supported_extensions {
        let _ = write!(out, "\n  - {}", ext.trim_start_matches('.').to_uppercase());
    }
    out
}

/// Usage notes including the configured limits.
pub fn usage_info(config: &ValidationConfig) -> String {
    let formats = config
        .supported_extensions
        .iter()
        .map(|ext| ext.trim_start_matches('.').to_uppercase())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Extract text from images\n\
         \n\
         How to use:\n  \
         1. Send or pass the image file\n  \
         2. Text is extracted with OCR.space, falling back to local Tesseract\n  \
         3. The result is shown with quality statistics\n\
         \n\
         Limits:\n  \
         - Maximum size: {} MB\n  \
         - Maximum dimensions: {} pixels\n  \
         - Formats: {}\n\
         \n\
         Tips:\n  \
         - Sharp, well-lit images give more accurate results\n  \
         - Blurry or dark photos produce lower quality text",
        config.max_file_size_mb(),
        config.max_pixels,
        formats
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::backend::OcrBackendType;
    use crate::ocr::types::ExtractError;
    use crate::ocr::validator::ValidationError;
    use std::time::Duration;

    fn success(text: &str) -> ExtractionResult {
        ExtractionResult::Success {
            text: text.to_string(),
            confidence: 0.85,
            method: OcrBackendType::OcrSpace,
            duration: Duration::from_millis(1250),
            language: "eng".to_string(),
            query: "q".to_string(),
            attempts: vec![],
        }
    }

    #[test]
    fn test_quality_tiers() {
        assert_eq!(QualityTier::from_char_count(0), QualityTier::Short);
        assert_eq!(QualityTier::from_char_count(49), QualityTier::Short);
        assert_eq!(QualityTier::from_char_count(50), QualityTier::Medium);
        assert_eq!(QualityTier::from_char_count(299), QualityTier::Medium);
        assert_eq!(QualityTier::from_char_count(300), QualityTier::Long);
    }

    #[test]
    fn test_stats_count_unicode_chars() {
        let stats = TextStats::of("سلام دنیا");
        assert_eq!(stats.characters, 9);
        assert_eq!(stats.words, 2);
    }

    #[test]
    fn test_format_success() {
        let out = format_result(&success("HELLO WORLD"));
        assert!(out.contains("HELLO WORLD"));
        assert!(out.contains("Characters: 11"));
        assert!(out.contains("Words: 2"));
        assert!(out.contains("Quality: short"));
        assert!(out.contains("Confidence: 85.0%"));
        assert!(out.contains("Processing time: 1.2s") || out.contains("Processing time: 1.3s"));
        assert!(out.contains("Method: ocr.space"));
    }

    #[test]
    fn test_format_failure_is_single_line() {
        let result = ExtractionResult::Failure {
            error: ExtractError::Exhausted {
                diagnostics: "ocr.space: HTTP 503; tesseract: not available: missing".into(),
            },
            duration: Duration::ZERO,
            attempts: vec![],
        };
        let out = format_result(&result);
        assert_eq!(
            out,
            "Error: all OCR backends failed: ocr.space: HTTP 503; tesseract: not available: missing"
        );
        assert!(!out.contains("extracted_text"));
        assert!(!out.contains('\n'));
    }

    #[test]
    fn test_format_validation_failure() {
        let result = ExtractionResult::Failure {
            error: ValidationError::Corrupt("empty input".into()).into(),
            duration: Duration::ZERO,
            attempts: vec![],
        };
        assert_eq!(format_result(&result), "Error: not a valid image: empty input");
    }

    #[test]
    fn test_help_texts_use_config() {
        let config = ValidationConfig::default();
        let formats = supported_formats(&config);
        assert!(formats.contains("- JPEG"));
        assert!(formats.contains("- WEBP"));

        let usage = usage_info(&config);
        assert!(usage.contains("Maximum size: 10 MB"));
        assert!(usage.contains("50000000 pixels"));
    }
}
