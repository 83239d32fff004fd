//! Error Types
//!
//! Typed failures for the stages that report to the user. Orchestration code
//! wraps these in `anyhow` with added context.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Failures while accepting an uploaded image.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("file is {size} bytes, larger than the {limit} byte upload limit")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("unsupported image format (expected JPEG or PNG)")]
    UnsupportedFormat,

    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("failed to read image: {0}")]
    Io(#[from] io::Error),
}

/// Failures raised by an OCR backend.
///
/// An image with no recognizable text is not an error: backends return an
/// empty [`crate::ocr::ExtractedText`] instead.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("OCR backend did not finish within {0:?}")]
    Timeout(Duration),

    #[error("OCR recognition failed: {0}")]
    Recognition(String),

    #[error("failed to prepare image for OCR: {0}")]
    Image(#[from] image::ImageError),
}

impl OcrError {
    /// Whether the failure means the backend could not run at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, OcrError::BackendUnavailable(_))
    }
}
