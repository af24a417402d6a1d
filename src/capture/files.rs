//! Frame source backed by still images on disk

use anyhow::{Context, Result};
use image::imageops::FilterType;
use image::RgbaImage;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

use super::frame::Frame;
use super::FrameSource;
use crate::error::ScanError;

/// Serves a fixed list of decoded images round-robin, one per request
pub struct ImageFileSource {
    images: Vec<RgbaImage>,
    next: AtomicUsize,
}

impl ImageFileSource {
    /// Decode every image in `paths`, shrinking any that exceed `resolution_hint`
    pub fn open<P: AsRef<Path>>(paths: &[P], resolution_hint: Option<(u32, u32)>) -> Result<Self> {
        let mut images = Vec::with_capacity(paths.len());

        for path in paths {
            let path = path.as_ref();
            let img = image::open(path)
                .with_context(|| format!("Failed to load image: {:?}", path))?
                .to_rgba8();
            let img = match resolution_hint {
                Some(hint) => fit_within(img, hint),
                None => img,
            };
            debug!("Loaded {:?} as {}x{} frame", path, img.width(), img.height());
            images.push(img);
        }

        info!("Image frame source ready with {} frame(s)", images.len());
        Ok(Self::from_images(images))
    }

    /// Build a source from already decoded images
    pub fn from_images(images: Vec<RgbaImage>) -> Self {
        Self {
            images,
            next: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl FrameSource for ImageFileSource {
    fn current_frame(&self) -> crate::error::Result<Frame> {
        if self.images.is_empty() {
            return Err(ScanError::CaptureNotReady);
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.images.len();
        Frame::from_rgba_image(self.images[index].clone())
    }
}

/// Downscale to fit inside `(max_w, max_h)` keeping the aspect ratio
fn fit_within(img: RgbaImage, (max_w, max_h): (u32, u32)) -> RgbaImage {
    let (w, h) = img.dimensions();
    if max_w == 0 || max_h == 0 || (w <= max_w && h <= max_h) {
        return img;
    }

    let scale = (max_w as f32 / w as f32).min(max_h as f32 / h as f32);
    let new_w = ((w as f32 * scale) as u32).max(1);
    let new_h = ((h as f32 * scale) as u32).max(1);
    image::imageops::resize(&img, new_w, new_h, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_empty_source_is_not_ready() {
        let source = ImageFileSource::from_images(vec![]);
        assert!(matches!(
            source.current_frame(),
            Err(ScanError::CaptureNotReady)
        ));
    }

    #[test]
    fn test_round_robin() {
        let a = RgbaImage::from_pixel(2, 2, Rgba([1, 1, 1, 255]));
        let b = RgbaImage::from_pixel(4, 2, Rgba([2, 2, 2, 255]));
        let source = ImageFileSource::from_images(vec![a, b]);

        assert_eq!(source.current_frame().unwrap().dimensions(), (2, 2));
        assert_eq!(source.current_frame().unwrap().dimensions(), (4, 2));
        assert_eq!(source.current_frame().unwrap().dimensions(), (2, 2));
    }

    #[test]
    fn test_fit_within_keeps_aspect() {
        let img = RgbaImage::new(1280, 720);
        let fitted = fit_within(img, (640, 480));
        assert_eq!(fitted.dimensions(), (640, 360));

        let small = RgbaImage::new(320, 240);
        assert_eq!(fit_within(small, (640, 480)).dimensions(), (320, 240));
    }

    #[test]
    fn test_open_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        RgbaImage::from_pixel(8, 4, Rgba([200, 10, 10, 255]))
            .save(&path)
            .unwrap();

        let source = ImageFileSource::open(&[&path], None).unwrap();
        assert_eq!(source.len(), 1);
        assert_eq!(source.current_frame().unwrap().dimensions(), (8, 4));

        assert!(ImageFileSource::open(&[dir.path().join("missing.png")], None).is_err());
    }
}
