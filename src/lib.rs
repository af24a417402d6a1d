//! Code Scanner
//!
//! Reads a printed alphanumeric code (e.g. `SGRO1234567890`) from camera or
//! image frames: preprocessing, optional candidate region selection, OCR
//! through a pluggable recognizer and grammar validation, driven by a
//! cancellable scan session.

pub mod analysis;
pub mod capture;
pub mod config;
pub mod error;
pub mod ocr;
pub mod scan;
pub mod vision;

pub use analysis::{CodeValidator, ExtractedCode};
pub use capture::{Frame, FrameSource, ImageFileSource, PixelLayout};
pub use config::AppConfig;
pub use error::{Result, ScanError};
pub use ocr::{Recognizer, TesseractRecognizer};
pub use scan::{ScanController, ScanHooks, ScanOutcome, SessionState};
