//! Tesseract Backend
//!
//! Runs the external `tesseract` binary on a temporary PNG and reads back the
//! recognized text block.

use crate::error::OcrError;
use crate::ocr::{ExtractedText, TextExtractor};
use image::{DynamicImage, ImageFormat};
use log::{debug, warn};
use std::fs::{self, File};
use std::io;
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Languages used when none are configured: English plus Hindi.
pub const DEFAULT_LANGUAGES: &str = "eng+hin";

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Settings for the Tesseract command-line backend.
#[derive(Debug, Clone)]
pub struct TesseractExtractor {
    command: PathBuf,
    languages: String,
    psm: Option<u8>,
    timeout: Duration,
}

impl TesseractExtractor {
    pub fn new(command: impl Into<PathBuf>, languages: impl Into<String>, timeout: Duration) -> Self {
        TesseractExtractor {
            command: command.into(),
            languages: languages.into(),
            psm: None,
            timeout,
        }
    }

    /// Sets Tesseract's page segmentation mode.
    pub fn with_psm(mut self, psm: Option<u8>) -> Self {
        self.psm = psm;
        self
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }

    fn spawn(&self, input: &std::path::Path, output_base: &std::path::Path, stderr: File) -> Result<Child, OcrError> {
        let mut cmd = Command::new(&self.command);
        cmd.arg(input)
            .arg(output_base)
            .arg("-l")
            .arg(&self.languages)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr));
        if let Some(psm) = self.psm {
            cmd.arg("--psm").arg(psm.to_string());
        }
        debug!("Spawning {:?}", cmd);

        cmd.spawn().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => OcrError::BackendUnavailable(
                format!("cannot run '{}': {}", self.command.display(), e),
            ),
            _ => OcrError::Recognition(format!("failed to start tesseract: {}", e)),
        })
    }

    /// Waits for the child, killing it once the timeout elapses.
    fn wait(&self, child: &mut Child) -> Result<ExitStatus, OcrError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) if Instant::now() >= deadline => {
                    warn!("Tesseract exceeded {:?}; killing it.", self.timeout);
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(OcrError::Timeout(self.timeout));
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(OcrError::Recognition(format!("failed to wait for tesseract: {}", e))),
            }
        }
    }
}

impl TextExtractor for TesseractExtractor {
    fn name(&self) -> &str {
        "tesseract"
    }

    fn extract(&self, image: &DynamicImage) -> Result<ExtractedText, OcrError> {
        let workdir = tempfile::Builder::new()
            .prefix("ocrlookup-")
            .tempdir()
            .map_err(|e| OcrError::Recognition(format!("failed to create temp dir: {}", e)))?;
        let input = workdir.path().join("input.png");
        let output_base = workdir.path().join("output");
        let stderr_path = workdir.path().join("stderr.log");

        image.save_with_format(&input, ImageFormat::Png)?;
        let stderr = File::create(&stderr_path)
            .map_err(|e| OcrError::Recognition(format!("failed to create log file: {}", e)))?;

        let mut child = self.spawn(&input, &output_base, stderr)?;
        let status = self.wait(&mut child)?;

        if !status.success() {
            let stderr = fs::read_to_string(&stderr_path).unwrap_or_default();
            return Err(classify_failure(status, stderr.trim()));
        }

        let text = fs::read_to_string(output_base.with_extension("txt"))
            .map_err(|e| OcrError::Recognition(format!("tesseract produced no output: {}", e)))?;
        Ok(ExtractedText::from_block(&text))
    }
}

/// Maps a failed run to an error, separating missing language data from
/// recognition problems.
fn classify_failure(status: ExitStatus, stderr: &str) -> OcrError {
    if stderr.contains("Failed loading language") || stderr.contains("Could not initialize tesseract") {
        OcrError::BackendUnavailable(format!("language data not installed: {}", stderr))
    } else {
        OcrError::Recognition(format!("tesseract exited with {}: {}", status, stderr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    #[test]
    fn missing_binary_is_backend_unavailable() {
        let extractor = TesseractExtractor::new(
            "/nonexistent/ocrlookup/tesseract",
            DEFAULT_LANGUAGES,
            Duration::from_secs(5),
        );
        let img = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        let err = extractor.extract(&img).unwrap_err();
        assert!(err.is_unavailable(), "unexpected error: {err}");
    }

    #[cfg(unix)]
    #[test]
    fn missing_language_pack_is_backend_unavailable() {
        use std::os::unix::process::ExitStatusExt;
        let err = classify_failure(
            ExitStatus::from_raw(1 << 8),
            "Error opening data file hin.traineddata\nFailed loading language 'hin'",
        );
        assert!(err.is_unavailable());
        let err = classify_failure(ExitStatus::from_raw(1 << 8), "Error in pixReadStream");
        assert!(matches!(err, OcrError::Recognition(_)));
    }

    #[cfg(unix)]
    #[test]
    fn reads_text_written_by_backend() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-tesseract");
        fs::write(&script, "#!/bin/sh\nprintf 'The data shows\\ndatabase growth\\n\\f' > \"$2.txt\"\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let extractor = TesseractExtractor::new(&script, "eng", Duration::from_secs(10));
        let img = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        let text = extractor.extract(&img).unwrap();
        assert_eq!(text.text(), "The data shows\ndatabase growth");
    }

    #[cfg(unix)]
    #[test]
    fn slow_backend_times_out() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-tesseract");
        fs::write(&script, "#!/bin/sh\nsleep 5\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let extractor = TesseractExtractor::new(&script, "eng", Duration::from_millis(200));
        let img = DynamicImage::ImageRgb8(RgbImage::new(10, 10));
        assert!(matches!(extractor.extract(&img), Err(OcrError::Timeout(_))));
    }
}
