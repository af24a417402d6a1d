//! OCR (Optical Character Recognition) module
//!
//! The [`Recognizer`] trait is the seam to the OCR engine. The orchestrator
//! drives it over a whole frame or over ranked candidate regions.

pub mod orchestrator;
pub mod tesseract;

pub use orchestrator::{AttemptOutcome, OcrOrchestrator};
pub use tesseract::TesseractRecognizer;

use async_trait::async_trait;
use image::GrayImage;

use crate::error::Result;

/// Page segmentation hint passed to the OCR engine
///
/// Values follow Tesseract's page segmentation modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentationHint {
    /// A single uniform block of text (whole frame)
    SingleBlock = 6,
    /// A single text line (cropped candidate region)
    SingleLine = 7,
}

impl SegmentationHint {
    pub fn as_psm(self) -> u8 {
        self as u8
    }
}

/// Single OCR result
#[derive(Debug, Clone, Default)]
pub struct RecognitionResult {
    /// Recognized text as returned by the engine
    pub text: String,
    /// Engine confidence (0.0 - 1.0) when the engine reports one
    pub confidence: Option<f32>,
}

impl RecognitionResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            confidence: None,
        }
    }
}

/// OCR engine used by the scan pipeline
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognize the text in `image`, restricted to the characters in `whitelist`
    async fn recognize(
        &self,
        image: &GrayImage,
        whitelist: &str,
        hint: SegmentationHint,
    ) -> Result<RecognitionResult>;
}
