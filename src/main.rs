//! OcrLookup - Main Application Entrypoint
//!
//! This file is responsible for parsing command-line arguments, initializing
//! the application environment (like logging), and dispatching the core
//! processing logic.

use clap::Parser;
use log::{error, info};
use ocrlookup::document_builder::OutputFormat;
use ocrlookup::highlight::MatchMode;
use ocrlookup::ocr::ModelLanguage;
use ocrlookup::region::SelectionRectangle;
use ocrlookup::{OcrBackend, run};
use std::path::PathBuf;
use std::time::Duration;

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

/// Extracts text from an image, highlights a keyword and looks up its meaning.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input image (JPEG or PNG)
    #[arg(short, long)]
    input: PathBuf,

    /// Keyword to search for in the extracted text
    #[arg(short, long)]
    keyword: Option<String>,

    /// Region to read, drawn on the preview: LEFT,TOP,WIDTH,HEIGHT
    #[arg(long, allow_hyphen_values = true)]
    select: Option<SelectionRectangle>,

    /// Maximum width of the preview the selection is drawn on
    #[arg(long, default_value_t = ocrlookup::region::DEFAULT_PREVIEW_CAP)]
    preview_width: u32,

    /// OCR backend
    #[arg(long, value_enum, default_value_t = OcrBackend::Tesseract)]
    engine: OcrBackend,

    /// Tesseract languages (e.g., "eng+hin")
    #[arg(short, long, default_value_t = String::from(ocrlookup::tesseract::DEFAULT_LANGUAGES))]
    lang: String,

    /// Path to the tesseract binary
    #[arg(long, env = "OCRLOOKUP_TESSERACT_CMD", default_value = "tesseract")]
    tesseract_cmd: PathBuf,

    /// Tesseract page segmentation mode
    #[arg(long)]
    psm: Option<u8>,

    /// Directory holding the PP-OCR model files
    #[arg(long, default_value = "models")]
    model_dir: PathBuf,

    /// Recognition model family for the paddle backend
    #[arg(long, value_enum, default_value_t = ModelLanguage::English)]
    model_language: ModelLanguage,

    /// Largest accepted upload, in megabytes
    #[arg(long, default_value_t = 10)]
    max_upload_mb: u64,

    /// Downscale the OCR input so its longer side is at most this many pixels
    #[arg(long)]
    max_ocr_side: Option<u32>,

    /// Keyword matching policy
    #[arg(long, value_enum, default_value_t = MatchMode::WholeWord)]
    match_mode: MatchMode,

    /// Skip the dictionary lookup
    #[arg(long)]
    no_lookup: bool,

    /// Dictionary API endpoint; the keyword is appended to it
    #[arg(long, env = "OCRLOOKUP_DICTIONARY_URL", default_value = ocrlookup::dictionary::DEFAULT_ENDPOINT)]
    dictionary_url: String,

    /// Dictionary request timeout, in seconds
    #[arg(long, default_value_t = 10)]
    timeout: u64,

    /// OCR timeout, in seconds
    #[arg(long, default_value_t = 120)]
    ocr_timeout: u64,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Html)]
    format: OutputFormat,

    /// Write the report to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Search this edited copy of the text instead of the OCR output
    #[arg(long)]
    edited_text: Option<PathBuf>,

    /// Read further keywords from stdin, one per line
    #[arg(long)]
    interactive: bool,

    /// Logging verbosity level
    #[arg(long, value_enum, default_value_t = LogLevel::Info)]
    log_level: LogLevel,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum LogLevel {
    Error,
    Info,
    Debug,
}

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    let args = Args::parse();

    // 1. Initialize Logger
    let log_level = match args.log_level {
        LogLevel::Error => "error",
        LogLevel::Info => "info",
        LogLevel::Debug => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    info!("Starting OcrLookup...");

    // 2. Validate input path
    if !args.input.exists() {
        error!("Input file does not exist: {:?}", args.input);
        std::process::exit(1);
    }

    // 3. Create a configuration object from arguments
    let mut config = ocrlookup::Config::new(args.input);
    config.output_file = args.output;
    config.output_format = args.format;
    config.selection = args.select;
    config.preview_width = args.preview_width;
    config.backend = args.engine;
    config.lang = args.lang;
    config.tesseract_cmd = args.tesseract_cmd;
    config.psm = args.psm;
    config.model_dir = args.model_dir;
    config.model_language = args.model_language;
    config.max_upload_bytes = args.max_upload_mb.saturating_mul(1024 * 1024);
    config.max_ocr_side = args.max_ocr_side;
    config.ocr_timeout = Duration::from_secs(args.ocr_timeout);
    config.keyword = args.keyword;
    config.match_mode = args.match_mode;
    config.lookup = !args.no_lookup;
    config.dictionary_url = args.dictionary_url;
    config.request_timeout = Duration::from_secs(args.timeout);
    config.edited_text = args.edited_text;
    config.interactive = args.interactive;

    // 4. Run the main application logic
    if let Err(e) = run(config) {
        error!("Application failed: {:#}", e);
        std::process::exit(2);
    }

    info!("Processing completed successfully.");
}
