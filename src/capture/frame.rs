//! Frame data structures for captured video content

use std::time::Instant;

use crate::error::{Result, ScanError};

/// Channel layout of a raw pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    Rgba8,
    Bgra8,
    Rgb8,
    Gray8,
}

impl PixelLayout {
    /// Bytes per pixel
    pub fn channels(self) -> usize {
        match self {
            PixelLayout::Rgba8 | PixelLayout::Bgra8 => 4,
            PixelLayout::Rgb8 => 3,
            PixelLayout::Gray8 => 1,
        }
    }

    /// Red, green and blue of the pixel starting at `px`
    #[inline]
    pub(crate) fn rgb(self, px: &[u8]) -> (u8, u8, u8) {
        match self {
            PixelLayout::Rgba8 | PixelLayout::Rgb8 => (px[0], px[1], px[2]),
            PixelLayout::Bgra8 => (px[2], px[1], px[0]),
            PixelLayout::Gray8 => (px[0], px[0], px[0]),
        }
    }
}

/// A captured frame from the video source
#[derive(Debug)]
pub struct Frame {
    /// Raw pixel data in `layout` order
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    pub layout: PixelLayout,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
}

impl Frame {
    /// Create a new frame, checking the buffer against its dimensions
    pub fn new(data: Vec<u8>, width: u32, height: u32, layout: PixelLayout) -> Result<Self> {
        let expected = width as usize * height as usize * layout.channels();
        if width == 0 || height == 0 {
            return Err(ScanError::InvalidFrame(format!(
                "empty frame {}x{}",
                width, height
            )));
        }
        if data.len() != expected {
            return Err(ScanError::InvalidFrame(format!(
                "{}x{} {:?} frame needs {} bytes, got {}",
                width,
                height,
                layout,
                expected,
                data.len()
            )));
        }

        Ok(Self {
            data,
            width,
            height,
            layout,
            timestamp: Instant::now(),
        })
    }

    /// Wrap a decoded RGBA image
    pub fn from_rgba_image(image: image::RgbaImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, PixelLayout::Rgba8)
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
