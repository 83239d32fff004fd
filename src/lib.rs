//! OcrLookup - Core Library
//!
//! This file contains the primary logic for the application, orchestrating
//! image acquisition, region selection, OCR, keyword search and dictionary
//! lookup into a single report.

use anyhow::{Context, Result};
use log::{error, info, warn};
use std::fs::{self, File};
use std::io::{self, BufRead, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

// Define modules for different functionalities
pub mod dictionary;
pub mod document_builder;
pub mod error;
pub mod highlight;
pub mod image_loader;
pub mod ocr;
#[cfg(feature = "paddle")]
pub mod paddle;
pub mod region;
pub mod session;
pub mod tesseract;

use dictionary::DictionaryClient;
use document_builder::{KeywordReport, OutputFormat, Report, SourceInfo};
use highlight::{MatchMode, SearchOutcome};
use image_loader::UploadedImage;
use ocr::{ModelLanguage, TextExtractor};
use region::SelectionRectangle;
use session::{Session, Workbench};
use tesseract::TesseractExtractor;

/// Which OCR backend to run.
#[derive(clap::ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OcrBackend {
    /// The external `tesseract` binary.
    #[default]
    Tesseract,
    /// Bundled PP-OCR models (requires the `paddle` feature).
    Paddle,
}

/// Application configuration structure.
#[derive(Debug, Clone)]
pub struct Config {
    pub input_file: PathBuf,
    pub output_file: Option<PathBuf>,
    pub output_format: OutputFormat,
    pub selection: Option<SelectionRectangle>,
    pub preview_width: u32,
    pub backend: OcrBackend,
    pub lang: String,
    pub tesseract_cmd: PathBuf,
    pub psm: Option<u8>,
    pub model_dir: PathBuf,
    pub model_language: ModelLanguage,
    pub max_upload_bytes: u64,
    pub max_ocr_side: Option<u32>,
    pub ocr_timeout: Duration,
    pub keyword: Option<String>,
    pub match_mode: MatchMode,
    pub lookup: bool,
    pub dictionary_url: String,
    pub request_timeout: Duration,
    pub edited_text: Option<PathBuf>,
    pub interactive: bool,
}

impl Config {
    /// Configuration with defaults for everything but the input.
    pub fn new(input_file: impl Into<PathBuf>) -> Self {
        Config {
            input_file: input_file.into(),
            output_file: None,
            output_format: OutputFormat::default(),
            selection: None,
            preview_width: region::DEFAULT_PREVIEW_CAP,
            backend: OcrBackend::default(),
            lang: tesseract::DEFAULT_LANGUAGES.to_string(),
            tesseract_cmd: PathBuf::from("tesseract"),
            psm: None,
            model_dir: PathBuf::from("models"),
            model_language: ModelLanguage::English,
            max_upload_bytes: image_loader::DEFAULT_MAX_UPLOAD_BYTES,
            max_ocr_side: None,
            ocr_timeout: Duration::from_secs(120),
            keyword: None,
            match_mode: MatchMode::default(),
            lookup: true,
            dictionary_url: dictionary::DEFAULT_ENDPOINT.to_string(),
            request_timeout: dictionary::DEFAULT_TIMEOUT,
            edited_text: None,
            interactive: false,
        }
    }
}

/// Stands in for a backend this binary was built without.
#[cfg(not(feature = "paddle"))]
struct MissingBackend(&'static str);

#[cfg(not(feature = "paddle"))]
impl TextExtractor for MissingBackend {
    fn name(&self) -> &str {
        self.0
    }

    fn extract(&self, _image: &image::DynamicImage) -> Result<ocr::ExtractedText, error::OcrError> {
        Err(error::OcrError::BackendUnavailable(format!(
            "this build of ocrlookup does not include the '{}' backend",
            self.0
        )))
    }
}

fn build_extractor(config: &Config) -> Box<dyn TextExtractor> {
    match config.backend {
        OcrBackend::Tesseract => Box::new(
            TesseractExtractor::new(&config.tesseract_cmd, &config.lang, config.ocr_timeout)
                .with_psm(config.psm),
        ),
        #[cfg(feature = "paddle")]
        OcrBackend::Paddle => Box::new(paddle::PaddleExtractor::new(
            &config.model_dir,
            config.model_language,
        )),
        #[cfg(not(feature = "paddle"))]
        OcrBackend::Paddle => Box::new(MissingBackend("paddle")),
    }
}

/// Creates the shared services described by `config`.
pub fn build_workbench(config: &Config) -> Result<Workbench> {
    let dictionary = DictionaryClient::new(&config.dictionary_url, config.request_timeout)
        .context("Failed to set up the dictionary client")?;
    Ok(Workbench::new(build_extractor(config), Box::new(dictionary)))
}

/// The main function that orchestrates a run.
pub fn run(config: Config) -> Result<()> {
    info!("Initializing processing with config: {:?}", config);
    let workbench = build_workbench(&config)?;

    let mut out: Box<dyn Write> = match &config.output_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).context("Failed to create output directory")?;
            }
            Box::new(BufWriter::new(
                File::create(path).with_context(|| format!("Failed to create {:?}", path))?,
            ))
        }
        None => Box::new(io::stdout().lock()),
    };

    let stdin = io::stdin();
    process(&config, &workbench, stdin.lock(), &mut out)?;
    out.flush().context("Failed to flush output")?;

    if let Some(path) = &config.output_file {
        info!("Wrote {:?}", path);
    }
    Ok(())
}

/// Runs the pipeline for one image, writing the rendered report to `out`.
///
/// In interactive mode keywords are then read from `keywords`, one per line,
/// until an empty line or end of input.
pub fn process<R: BufRead, W: Write>(
    config: &Config,
    workbench: &Workbench,
    keywords: R,
    mut out: W,
) -> Result<Report> {
    // 1. Acquire the image
    let image = UploadedImage::from_path(&config.input_file, config.max_upload_bytes)
        .with_context(|| format!("Cannot accept {:?}", config.input_file))?;
    let source = SourceInfo {
        path: config.input_file.display().to_string(),
        width: image.width(),
        height: image.height(),
        format: format!("{:?}", image.format()),
    };

    let mut session = Session::new(config.preview_width);
    session.upload(image);
    session.select(config.selection);
    let region = session.source_region();

    // 2. Extract text; a backend failure is reported, not fatal
    let extraction_error = match session.extract(workbench, config.max_ocr_side) {
        Ok(text) if text.is_empty() => {
            warn!("No text found in the image.");
            None
        }
        Ok(_) => None,
        Err(e) => {
            error!("{}", e);
            Some(e.to_string())
        }
    };

    if let Some(path) = &config.edited_text {
        let edited = fs::read_to_string(path)
            .with_context(|| format!("Failed to read edited text from {:?}", path))?;
        session.edit_text(edited);
    }

    // 3. Search the keyword given on the command line
    let searches = config
        .keyword
        .as_deref()
        .and_then(|keyword| search_keyword(config, workbench, &session, keyword))
        .into_iter()
        .collect();

    let extracted = session.extracted().cloned().unwrap_or_default();
    let report = Report {
        source,
        region,
        backend: workbench.extractor().name().to_string(),
        extraction_error,
        text: session.working_text().to_string(),
        lines: extracted.lines().to_vec(),
        searches,
    };

    // 4. Render
    let rendered = document_builder::render_report(&report, config.output_format)?;
    out.write_all(rendered.as_bytes()).context("Failed to write report")?;

    // 5. Further keywords, one per line
    if config.interactive {
        info!("Enter a keyword per line; an empty line ends the session.");
        for line in keywords.lines() {
            let line = line.context("Failed to read keyword")?;
            if line.trim().is_empty() {
                break;
            }
            if let Some(search) = search_keyword(config, workbench, &session, &line) {
                let rendered = document_builder::render_keyword(&search, config.output_format)?;
                out.write_all(rendered.as_bytes()).context("Failed to write result")?;
                out.flush().context("Failed to flush output")?;
            }
        }
    }

    Ok(report)
}

/// Searches one keyword and, when it occurs, looks up its meaning.
fn search_keyword(config: &Config, workbench: &Workbench, session: &Session, raw: &str) -> Option<KeywordReport> {
    let outcome = session.search(raw, config.match_mode);
    let definition = match (&outcome, config.lookup) {
        (SearchOutcome::Matches { query, highlighted }, true) => {
            info!("Found {} match(es) for '{}'.", highlighted.match_count(), query.as_str());
            Some(session.define(workbench, query))
        }
        (SearchOutcome::NoMatches { query }, _) => {
            info!("No matches for '{}'.", query.as_str());
            None
        }
        _ => None,
    };
    KeywordReport::from_outcome(outcome, config.match_mode, definition)
}
