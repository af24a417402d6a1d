//! Error types for the scan pipeline
//!
//! Only conditions that a caller may want to react to are errors. A frame
//! with no usable candidate region or OCR text that does not match the code
//! grammar is a normal "not found" outcome and never shows up here.

use thiserror::Error;

/// Result type alias using [`ScanError`].
pub type Result<T> = std::result::Result<T, ScanError>;

/// Errors raised by the scan pipeline and its collaborators
#[derive(Debug, Error)]
pub enum ScanError {
    /// The frame source has nothing to deliver yet; retry after a short delay
    #[error("capture not ready")]
    CaptureNotReady,

    /// A pixel buffer whose size does not match its declared dimensions
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The OCR engine reported an error for one recognition call
    #[error("recognizer failure: {message}")]
    RecognizerFailure {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The OCR engine did not answer within the configured time
    #[error("recognizer timed out after {0} ms")]
    RecognizerTimeout(u64),

    /// The configured code grammar cannot be compiled
    #[error("invalid code grammar: {0}")]
    InvalidGrammar(String),

    /// A vision stage was asked to run with parameters it cannot honour
    #[error("invalid parameter for {stage}: {message}")]
    InvalidParameter { stage: &'static str, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScanError {
    pub fn recognizer(message: impl Into<String>) -> Self {
        Self::RecognizerFailure {
            message: message.into(),
            source: None,
        }
    }

    pub fn recognizer_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::RecognizerFailure {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn invalid_parameter(stage: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            stage,
            message: message.into(),
        }
    }

    /// Whether this error only affects a single recognition call
    pub fn is_recognizer_error(&self) -> bool {
        matches!(
            self,
            Self::RecognizerFailure { .. } | Self::RecognizerTimeout(_)
        )
    }
}
