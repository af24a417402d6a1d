//! Vision Layer
//!
//! Pixel-level work of a scan attempt: preprocessing a captured frame into
//! an OCR-ready binary buffer and proposing regions that may hold a code.

pub mod debug;
pub mod preprocess;
pub mod regions;

pub use preprocess::{FramePreprocessor, PreprocessedFrame, Stage};
pub use regions::{select_candidates, CandidateSet, Region};
