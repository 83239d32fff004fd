//! OCR Module
//!
//! Defines the text extraction capability shared by the OCR backends, the
//! recognized-text types, and a content-addressed cache in front of the
//! backend.

use crate::error::OcrError;
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Bounding box of a recognized line: (x, y, width, height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// A single recognized line with whatever metadata the backend provides.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecognizedLine {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bbox: Option<BoundingBox>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

/// Text recognized in one image, in the order the backend produced it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedText {
    text: String,
    lines: Vec<RecognizedLine>,
}

impl ExtractedText {
    /// Wraps a single text block, as returned by Tesseract.
    pub fn from_block(block: &str) -> Self {
        let text = block.trim_end_matches(|c: char| c.is_whitespace() || c == '\x0c');
        let lines = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| RecognizedLine {
                text: line.to_string(),
                bbox: None,
                confidence: None,
            })
            .collect();
        ExtractedText {
            text: text.to_string(),
            lines,
        }
    }

    /// Joins per-line results with newlines, keeping the given order.
    pub fn from_lines(lines: Vec<RecognizedLine>) -> Self {
        let text = lines
            .iter()
            .map(|line| line.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        ExtractedText { text, lines }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn lines(&self) -> &[RecognizedLine] {
        &self.lines
    }

    /// True when the backend ran but found nothing readable.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Recognition model families that ship with PP-OCRv5.
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ModelLanguage {
    English,
    Latin,
    Devanagari,
}

impl ModelLanguage {
    /// Recognition model and charset file names for this language.
    pub fn model_files(self) -> (&'static str, &'static str) {
        match self {
            ModelLanguage::English => ("en_PP-OCRv5_mobile_rec_infer.mnn", "ppocr_keys_en.txt"),
            ModelLanguage::Latin => ("latin_PP-OCRv5_mobile_rec_infer.mnn", "ppocr_keys_latin.txt"),
            ModelLanguage::Devanagari => (
                "devanagari_PP-OCRv5_mobile_rec_infer.mnn",
                "ppocr_keys_devanagari.txt",
            ),
        }
    }
}

/// The capability every OCR backend provides. Backends are shared between
/// sessions, possibly on different threads.
pub trait TextExtractor: Send + Sync {
    /// Short backend name used in logs and reports.
    fn name(&self) -> &str;

    fn extract(&self, image: &DynamicImage) -> Result<ExtractedText, OcrError>;
}

/// Content hash of an extraction input: dimensions plus RGB8 pixels.
pub fn content_key(image: &DynamicImage) -> String {
    let rgb = image.to_rgb8();
    let mut hasher = Sha256::new();
    hasher.update(rgb.width().to_le_bytes());
    hasher.update(rgb.height().to_le_bytes());
    hasher.update(rgb.as_raw());
    hex::encode(hasher.finalize())
}

/// Memoizes a backend by image content for the lifetime of the process.
///
/// Failures are not cached, so an unavailable backend is retried on the next
/// request.
pub struct CachedExtractor {
    inner: Box<dyn TextExtractor>,
    cache: Mutex<HashMap<String, ExtractedText>>,
    backend_calls: AtomicUsize,
}

impl CachedExtractor {
    pub fn new(inner: Box<dyn TextExtractor>) -> Self {
        CachedExtractor {
            inner,
            cache: Mutex::new(HashMap::new()),
            backend_calls: AtomicUsize::new(0),
        }
    }

    /// Number of times the wrapped backend actually ran.
    pub fn backend_calls(&self) -> usize {
        self.backend_calls.load(Ordering::Relaxed)
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().len()
    }

    /// Memoizes under a caller-supplied `key` describing the input, so a hit
    /// skips `prepare` and the hashing of its pixels.
    pub fn extract_keyed<F>(&self, key: &str, prepare: F) -> Result<ExtractedText, OcrError>
    where
        F: FnOnce() -> DynamicImage,
    {
        if let Some(hit) = self.lookup(key) {
            return Ok(hit);
        }
        self.run_and_store(key.to_string(), &prepare())
    }

    fn lookup(&self, key: &str) -> Option<ExtractedText> {
        let hit = self.cache.lock().get(key).cloned();
        if hit.is_some() {
            debug!("OCR cache hit for {}", key.get(..12).unwrap_or(key));
        }
        hit
    }

    fn run_and_store(&self, key: String, image: &DynamicImage) -> Result<ExtractedText, OcrError> {
        self.backend_calls.fetch_add(1, Ordering::Relaxed);
        let extracted = run_with_spinner(self.inner.as_ref(), image)?;
        self.cache.lock().insert(key, extracted.clone());
        Ok(extracted)
    }
}

impl TextExtractor for CachedExtractor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn extract(&self, image: &DynamicImage) -> Result<ExtractedText, OcrError> {
        let key = content_key(image);
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }
        self.run_and_store(key, image)
    }
}

/// Runs a backend while showing a spinner on stderr.
fn run_with_spinner(
    extractor: &dyn TextExtractor,
    image: &DynamicImage,
) -> Result<ExtractedText, OcrError> {
    info!(
        "Running OCR with the {} backend on a {}x{} image...",
        extractor.name(),
        image.width(),
        image.height()
    );

    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner()
        .template("{spinner:.green} Recognizing text... [{elapsed_precise}]")
    {
        pb.set_style(style);
    }
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = extractor.extract(image);
    pb.finish_and_clear();

    if let Ok(text) = &result {
        info!(
            "OCR produced {} line(s), {} characters.",
            text.lines().len(),
            text.text().chars().count()
        );
    }
    result
}
