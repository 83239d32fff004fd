//! Paddle Backend
//!
//! In-process recognition with PP-OCR models through `ocr-rs`. The model is
//! loaded on first use and kept for the lifetime of the extractor; the lock
//! around it serializes both the load and recognition between threads.

use crate::error::OcrError;
use crate::ocr::{BoundingBox, ExtractedText, ModelLanguage, RecognizedLine, TextExtractor};
use image::DynamicImage;
use log::info;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};

/// Detection model shared by every recognition language.
const DETECTION_MODEL: &str = "PP-OCRv5_mobile_det.mnn";

pub struct PaddleExtractor {
    model_dir: PathBuf,
    language: ModelLanguage,
    engine: Mutex<Option<ocr_rs::OcrEngine>>,
}

impl PaddleExtractor {
    pub fn new(model_dir: impl Into<PathBuf>, language: ModelLanguage) -> Self {
        PaddleExtractor {
            model_dir: model_dir.into(),
            language,
            engine: Mutex::new(None),
        }
    }

    fn model_paths(&self) -> Result<(PathBuf, PathBuf, PathBuf), OcrError> {
        let (rec, charset) = self.language.model_files();
        let paths = (
            self.model_dir.join(DETECTION_MODEL),
            self.model_dir.join(rec),
            self.model_dir.join(charset),
        );
        for path in [&paths.0, &paths.1, &paths.2] {
            if !path.exists() {
                return Err(OcrError::BackendUnavailable(format!(
                    "model file missing: {}",
                    path.display()
                )));
            }
        }
        Ok(paths)
    }

    fn load_engine(&self) -> Result<ocr_rs::OcrEngine, OcrError> {
        let (det, rec, charset) = self.model_paths()?;
        info!("Loading {:?} OCR models from {:?}", self.language, self.model_dir);
        ocr_rs::OcrEngine::new(&det, &rec, &charset, None)
            .map_err(|e| OcrError::BackendUnavailable(format!("failed to load OCR models: {}", e)))
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }
}

impl TextExtractor for PaddleExtractor {
    fn name(&self) -> &str {
        "paddle"
    }

    fn extract(&self, image: &DynamicImage) -> Result<ExtractedText, OcrError> {
        let mut guard = self.engine.lock();
        // Loaded once; a failed load leaves the slot empty and is retried.
        if guard.is_none() {
            *guard = Some(self.load_engine()?);
        }
        let Some(engine) = guard.as_ref() else {
            return Err(OcrError::BackendUnavailable("OCR engine not loaded".into()));
        };
        let results = engine
            .recognize(image)
            .map_err(|e| OcrError::Recognition(e.to_string()))?;

        // Detection order is kept; lines are not re-sorted by position.
        let lines = results
            .into_iter()
            .filter(|r| !r.text.trim().is_empty())
            .map(|r| RecognizedLine {
                text: r.text,
                bbox: Some(BoundingBox {
                    x: r.bbox.rect.left() as i32,
                    y: r.bbox.rect.top() as i32,
                    width: r.bbox.rect.width() as i32,
                    height: r.bbox.rect.height() as i32,
                }),
                confidence: Some(r.confidence),
            })
            .collect();

        Ok(ExtractedText::from_lines(lines))
    }
}
