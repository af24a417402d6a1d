//! Frame Capture Layer
//!
//! The scan pipeline pulls frames on demand from a [`FrameSource`]. Camera
//! access lives outside this crate; [`ImageFileSource`] serves still images
//! from disk for the command line tool and for tests.

pub mod files;
pub mod frame;

pub use files::ImageFileSource;
pub use frame::{Frame, PixelLayout};

use crate::error::Result;

/// Supplies the most recent frame when asked
pub trait FrameSource: Send + Sync {
    /// Return the current frame, or [`ScanError::CaptureNotReady`] when none is available yet
    ///
    /// [`ScanError::CaptureNotReady`]: crate::error::ScanError::CaptureNotReady
    fn current_frame(&self) -> Result<Frame>;
}
