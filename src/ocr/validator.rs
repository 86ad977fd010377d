//! Input validation run before any OCR backend is invoked.
//!
//! Checks, in order: byte size, filename extension, that the bytes decode
//! as an image, and the decoded pixel count. Only the image header is read;
//! no pixels are decoded and nothing touches the filesystem or network.

use std::io::Cursor;

use image::{ImageDecoder, ImageReader};
use thiserror::Error;

use super::types::{ImageBlob, ImageInfo};
use crate::config::ValidationConfig;

/// Why an image was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("file too large: {size} bytes, maximum is {limit_mb} MB")]
    TooLarge { size: usize, limit_mb: usize },

    #[error("unsupported file format '{extension}'; supported formats: {supported}")]
    UnsupportedFormat {
        extension: String,
        supported: String,
    },

    #[error("not a valid image: {0}")]
    Corrupt(String),

    #[error("image dimensions too large: {width}x{height} exceeds {max_pixels} pixels")]
    DimensionsTooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },
}

pub type ValidationResult = Result<ImageInfo, ValidationError>;

/// Validate bytes against the default limits.
pub fn validate(bytes: &[u8], filename: Option<&str>) -> ValidationResult {
    ImageValidator::default().validate_bytes(bytes, filename)
}

/// Validator holding the configured limits.
#[derive(Debug, Clone, Default)]
pub struct ImageValidator {
    config: ValidationConfig,
}

impl ImageValidator {
    pub fn new(config: ValidationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    pub fn validate(&self, image: &ImageBlob) -> ValidationResult {
        self.validate_bytes(image.bytes(), image.filename())
    }

    pub fn validate_bytes(&self, bytes: &[u8], filename: Option<&str>) -> ValidationResult {
        if bytes.len() > self.config.max_file_size {
            return Err(ValidationError::TooLarge {
                size: bytes.len(),
                limit_mb: self.config.max_file_size_mb(),
            });
        }

        if let Some(name) = filename.filter(|n| !n.is_empty()) {
            self.check_extension(name)?;
        }

        let info = decode_header(bytes)?;

        if info.pixel_count() > self.config.max_pixels {
            return Err(ValidationError::DimensionsTooLarge {
                width: info.width,
                height: info.height,
                max_pixels: self.config.max_pixels,
            });
        }

        Ok(info)
    }

    fn check_extension(&self, filename: &str) -> Result<(), ValidationError> {
        let lower = filename.to_lowercase();
        let supported = self
            .config
            .supported_extensions
            .iter()
            .any(|ext| lower.ends_with(&format!(".{}", ext.trim_start_matches('.'))));

        if supported {
            return Ok(());
        }

        let extension = lower
            .rsplit_once('.')
            .map(|(_, ext)| format!(".{}", ext))
            .unwrap_or_else(|| "(none)".to_string());

        Err(ValidationError::UnsupportedFormat {
            extension,
            supported: self.supported_list(),
        })
    }

    /// Supported extensions formatted as ".jpg, .png, ...".
    pub fn supported_list(&self) -> String {
        self.config
            .supported_extensions
            .iter()
            .map(|ext| format!(".{}", ext.trim_start_matches('.')))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Read format, dimensions and color type from the image header.
fn decode_header(bytes: &[u8]) -> ValidationResult {
    if bytes.is_empty() {
        return Err(ValidationError::Corrupt("empty input".to_string()));
    }

    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| ValidationError::Corrupt(e.to_string()))?;

    let format = reader
        .format()
        .ok_or_else(|| ValidationError::Corrupt("unrecognized image format".to_string()))?;

    let decoder = reader
        .into_decoder()
        .map_err(|e| ValidationError::Corrupt(e.to_string()))?;
    let (width, height) = decoder.dimensions();

    if width == 0 || height == 0 {
        return Err(ValidationError::Corrupt(format!(
            "image has zero size ({}x{})",
            width, height
        )));
    }

    Ok(ImageInfo {
        width,
        height,
        format: format!("{:?}", format).to_uppercase(),
        color_mode: format!("{:?}", decoder.color_type()),
        byte_len: bytes.len(),
    })
}
