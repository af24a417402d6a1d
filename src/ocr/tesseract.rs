//! Tesseract backend
//!
//! Runs the `tesseract` executable on a temporary PNG and reads the text
//! from stdout. The process is killed if it outlives the configured timeout.

use async_trait::async_trait;
use image::GrayImage;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::debug;

use super::{RecognitionResult, Recognizer, SegmentationHint};
use crate::config::RecognizerConfig;
use crate::error::{Result, ScanError};

/// Recognizer that shells out to the Tesseract CLI
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    executable: PathBuf,
    language: String,
    timeout: Duration,
}

impl TesseractRecognizer {
    pub fn new(config: &RecognizerConfig) -> Self {
        Self {
            executable: config.tesseract_path.clone(),
            language: config.language.clone(),
            timeout: config.timeout(),
        }
    }

    /// Command-line arguments for one call, input and output excluded
    fn engine_args(&self, whitelist: &str, hint: SegmentationHint) -> Vec<String> {
        let mut args = vec![
            "-l".to_string(),
            self.language.clone(),
            "--psm".to_string(),
            hint.as_psm().to_string(),
        ];
        if !whitelist.is_empty() {
            args.push("-c".to_string());
            args.push(format!("tessedit_char_whitelist={}", whitelist));
        }
        args
    }
}

#[async_trait]
impl Recognizer for TesseractRecognizer {
    async fn recognize(
        &self,
        image: &GrayImage,
        whitelist: &str,
        hint: SegmentationHint,
    ) -> Result<RecognitionResult> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(RecognitionResult::default());
        }

        // Removed when dropped, on every exit path
        let input = tempfile::Builder::new().suffix(".png").tempfile()?;
        image
            .save(input.path())
            .map_err(|e| ScanError::recognizer_with_source("failed to write OCR input image", e))?;

        let start = Instant::now();
        let mut command = Command::new(&self.executable);
        command
            .arg(input.path())
            .arg("stdout")
            .args(self.engine_args(whitelist, hint))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(ScanError::recognizer_with_source(
                    format!("failed to run {:?}", self.executable),
                    e,
                ))
            }
            Err(_) => return Err(ScanError::RecognizerTimeout(self.timeout.as_millis() as u64)),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ScanError::recognizer(format!(
                "tesseract exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(
            "Tesseract ({}x{}, psm {}) returned {} chars in {:?}",
            image.width(),
            image.height(),
            hint.as_psm(),
            text.len(),
            start.elapsed()
        );

        Ok(RecognitionResult::new(text))
    }
}
