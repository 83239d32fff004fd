//! Session Module
//!
//! A [`Workbench`] owns the process-wide resources (the OCR backend and the
//! lookup caches). A [`Session`] owns one user's state: the current upload,
//! the selected region and the extracted text with its editable copy.

use crate::dictionary::{CachedDictionary, DefinitionResult, DefinitionSource};
use crate::error::OcrError;
use crate::highlight::{self, KeywordQuery, MatchMode, SearchOutcome};
use crate::image_loader::{self, UploadedImage};
use crate::ocr::{CachedExtractor, ExtractedText, TextExtractor};
use crate::region::{self, PreviewCanvas, SelectionRectangle, SourceRectangle};
use log::{info, warn};

/// Shared, memoized services. One workbench serves any number of sessions,
/// on any thread.
pub struct Workbench {
    extractor: CachedExtractor,
    dictionary: CachedDictionary,
}

impl Workbench {
    pub fn new(extractor: Box<dyn TextExtractor>, dictionary: Box<dyn DefinitionSource>) -> Self {
        Workbench {
            extractor: CachedExtractor::new(extractor),
            dictionary: CachedDictionary::new(dictionary),
        }
    }

    pub fn extractor(&self) -> &CachedExtractor {
        &self.extractor
    }

    pub fn dictionary(&self) -> &CachedDictionary {
        &self.dictionary
    }
}

/// One user's working state.
pub struct Session {
    preview_cap: u32,
    image: Option<UploadedImage>,
    selection: Option<SelectionRectangle>,
    extracted: Option<ExtractedText>,
    edited: Option<String>,
}

impl Session {
    pub fn new(preview_cap: u32) -> Self {
        Session {
            preview_cap,
            image: None,
            selection: None,
            extracted: None,
            edited: None,
        }
    }

    /// Replaces the current upload and discards everything derived from it.
    pub fn upload(&mut self, image: UploadedImage) {
        self.image = Some(image);
        self.selection = None;
        self.extracted = None;
        self.edited = None;
    }

    pub fn image(&self) -> Option<&UploadedImage> {
        self.image.as_ref()
    }

    pub fn preview(&self) -> Option<PreviewCanvas> {
        self.image
            .as_ref()
            .map(|img| PreviewCanvas::fit(img.width(), img.height(), self.preview_cap))
    }

    /// Sets or clears the drawn selection. Extracted text is kept until the
    /// next extraction.
    pub fn select(&mut self, selection: Option<SelectionRectangle>) {
        self.selection = selection;
    }

    /// The selection mapped to source pixels; `None` means the full image.
    pub fn source_region(&self) -> Option<SourceRectangle> {
        let canvas = self.preview()?;
        region::resolve_selection(&canvas, self.selection)
    }

    /// Runs OCR over the selected region.
    ///
    /// On failure the session holds no text and the error is returned for
    /// display.
    pub fn extract(&mut self, workbench: &Workbench, max_side: Option<u32>) -> Result<&ExtractedText, OcrError> {
        let Some(image) = self.image.as_ref() else {
            return Ok(&*self.extracted.insert(ExtractedText::default()));
        };
        let region = self.source_region();
        if let Some(r) = region {
            info!("Cropping to source region {}", r);
        }
        let key = request_key(image, region, max_side);

        self.edited = None;
        let prepare = || image_loader::prepare_for_ocr(region::crop(image.bitmap(), region), max_side);
        match workbench.extractor.extract_keyed(&key, prepare) {
            Ok(text) => {
                if text.is_empty() {
                    info!("No text was recognized in the selected region.");
                }
                Ok(&*self.extracted.insert(text))
            }
            Err(e) => {
                warn!("Text extraction failed: {}", e);
                self.extracted = Some(ExtractedText::default());
                Err(e)
            }
        }
    }

    pub fn extracted(&self) -> Option<&ExtractedText> {
        self.extracted.as_ref()
    }

    /// Stores an edited copy of the text; the extracted original is kept.
    pub fn edit_text(&mut self, text: String) {
        self.edited = Some(text);
    }

    /// The text searches run against: the edited copy if any.
    pub fn working_text(&self) -> &str {
        match (&self.edited, &self.extracted) {
            (Some(edited), _) => edited,
            (None, Some(extracted)) => extracted.text(),
            (None, None) => "",
        }
    }

    pub fn search(&self, raw_keyword: &str, mode: MatchMode) -> SearchOutcome {
        highlight::search(self.working_text(), raw_keyword, mode)
    }

    pub fn define(&self, workbench: &Workbench, query: &KeywordQuery) -> DefinitionResult {
        workbench.dictionary.define(&query.normalized())
    }
}

/// Identifies an extraction request by upload content, region and downscale
/// limit.
fn request_key(image: &UploadedImage, region: Option<SourceRectangle>, max_side: Option<u32>) -> String {
    let region = match region {
        Some(r) => format!("{},{},{},{}", r.x, r.y, r.width, r.height),
        None => "full".to_string(),
    };
    let max_side = max_side.map_or_else(|| "-".to_string(), |side| side.to_string());
    format!("upload:{}:{}:{}", image.digest(), region, max_side)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GenericImageView, ImageFormat, RgbImage};
    use parking_lot::Mutex;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::thread;

    /// Records the size of every image it is asked to read.
    struct Recorder {
        seen: Arc<Mutex<Vec<(u32, u32)>>>,
        text: &'static str,
    }

    impl TextExtractor for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn extract(&self, image: &DynamicImage) -> Result<ExtractedText, OcrError> {
            self.seen.lock().push(image.dimensions());
            Ok(ExtractedText::from_block(self.text))
        }
    }

    struct Offline;

    impl DefinitionSource for Offline {
        fn define(&self, _word: &str) -> DefinitionResult {
            DefinitionResult::Unavailable
        }
    }

    fn upload(width: u32, height: u32) -> UploadedImage {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        UploadedImage::from_bytes(buf, image_loader::DEFAULT_MAX_UPLOAD_BYTES).unwrap()
    }

    fn workbench(text: &'static str) -> (Workbench, Arc<Mutex<Vec<(u32, u32)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let wb = Workbench::new(Box::new(Recorder { seen: seen.clone(), text }), Box::new(Offline));
        (wb, seen)
    }

    #[test]
    fn extracts_from_selected_region() {
        let (wb, seen) = workbench("The data shows database growth");
        let mut session = Session::new(600);
        session.upload(upload(1200, 800));
        session.select(Some(SelectionRectangle::new(100.0, 50.0, 200.0, 100.0)));

        let text = session.extract(&wb, None).unwrap();
        assert_eq!(text.text(), "The data shows database growth");
        assert_eq!(seen.lock().as_slice(), &[(400, 200)]);
    }

    #[test]
    fn without_selection_uses_full_image_and_downscales() {
        let (wb, seen) = workbench("x");
        let mut session = Session::new(600);
        session.upload(upload(1200, 800));
        session.extract(&wb, Some(600)).unwrap();
        assert_eq!(seen.lock().as_slice(), &[(600, 400)]);
    }

    #[test]
    fn re_extraction_hits_the_cache() {
        let (wb, seen) = workbench("x");
        let mut session = Session::new(600);
        session.upload(upload(300, 200));
        session.extract(&wb, None).unwrap();
        session.extract(&wb, None).unwrap();
        assert_eq!(seen.lock().len(), 1);
        assert_eq!(wb.extractor().backend_calls(), 1);
    }

    #[test]
    fn repeat_upload_reuses_extraction_without_image_work() {
        let (wb, seen) = workbench("x");
        let mut first = Session::new(600);
        first.upload(upload(1200, 800));
        first.extract(&wb, Some(600)).unwrap();

        let mut second = Session::new(600);
        second.upload(upload(1200, 800));
        second.extract(&wb, Some(600)).unwrap();
        assert_eq!(wb.extractor().backend_calls(), 1);

        second.extract(&wb, None).unwrap();
        second.select(Some(SelectionRectangle::new(0.0, 0.0, 100.0, 100.0)));
        second.extract(&wb, Some(600)).unwrap();
        assert_eq!(wb.extractor().backend_calls(), 3);
        assert_eq!(seen.lock().as_slice(), &[(600, 400), (1200, 800), (200, 200)]);
    }

    #[test]
    fn workbench_is_shared_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Workbench>();

        let (wb, _) = workbench("The data shows database growth");
        let image = upload(300, 200);
        thread::scope(|scope| {
            for _ in 0..2 {
                let image = image.clone();
                let wb = &wb;
                scope.spawn(move || {
                    let mut session = Session::new(600);
                    session.upload(image);
                    session.extract(wb, None).unwrap();
                    let query = KeywordQuery::parse("data").unwrap();
                    assert!(matches!(session.search("data", MatchMode::WholeWord), SearchOutcome::Matches { .. }));
                    assert_eq!(session.define(wb, &query), DefinitionResult::Unavailable);
                });
            }
        });
        assert!(wb.extractor().backend_calls() >= 1);
        assert_eq!(wb.extractor().cached_entries(), 1);
    }

    #[test]
    fn edits_do_not_touch_the_extracted_original() {
        let (wb, _) = workbench("The data shows database growth");
        let mut session = Session::new(600);
        session.upload(upload(300, 200));
        session.extract(&wb, None).unwrap();

        session.edit_text("no keyword here".into());
        assert!(matches!(session.search("data", MatchMode::WholeWord), SearchOutcome::NoMatches { .. }));
        assert_eq!(session.extracted().unwrap().text(), "The data shows database growth");
    }

    #[test]
    fn new_upload_resets_state() {
        let (wb, _) = workbench("text");
        let mut session = Session::new(600);
        session.upload(upload(300, 200));
        session.select(Some(SelectionRectangle::new(0.0, 0.0, 10.0, 10.0)));
        session.extract(&wb, None).unwrap();

        session.upload(upload(100, 100));
        assert!(session.extracted().is_none());
        assert!(session.source_region().is_none());
        assert_eq!(session.working_text(), "");
    }

    #[test]
    fn failed_extraction_leaves_empty_text() {
        struct Missing;
        impl TextExtractor for Missing {
            fn name(&self) -> &str {
                "missing"
            }
            fn extract(&self, _image: &DynamicImage) -> Result<ExtractedText, OcrError> {
                Err(OcrError::BackendUnavailable("not installed".into()))
            }
        }

        let wb = Workbench::new(Box::new(Missing), Box::new(Offline));
        let mut session = Session::new(600);
        session.upload(upload(50, 50));
        assert!(session.extract(&wb, None).unwrap_err().is_unavailable());
        assert!(session.extracted().unwrap().is_empty());
        assert_eq!(session.search("anything", MatchMode::WholeWord), SearchOutcome::NoMatches {
            query: KeywordQuery::parse("anything").unwrap()
        });
    }

    #[test]
    fn define_uses_lower_cased_keyword() {
        struct Echo;
        impl DefinitionSource for Echo {
            fn define(&self, word: &str) -> DefinitionResult {
                DefinitionResult::Found(crate::dictionary::Definition {
                    text: word.to_string(),
                    part_of_speech: None,
                })
            }
        }
        let wb = Workbench::new(Box::new(Recorder { seen: Default::default(), text: "" }), Box::new(Echo));
        let session = Session::new(600);
        let query = KeywordQuery::parse(" DATA ").unwrap();
        assert_eq!(session.define(&wb, &query).to_string(), "data");
    }
}
