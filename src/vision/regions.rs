//! Candidate region selection
//!
//! Proposes sub-rectangles of a binarized frame that plausibly hold a single
//! printed line. Outer contours of the glyph blobs are boxed, ranked by area,
//! cut down to the top K and only then filtered by shape, which bounds the
//! number of OCR calls per attempt no matter how noisy the frame is.

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::filter::box_filter;
use serde::Serialize;
use tracing::debug;

use crate::config::CandidateConfig;

/// Axis-aligned rectangle inside a preprocessed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width over height; zero-height regions report zero
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Copy the region out of `image`, clamped to its bounds
    pub fn crop(&self, image: &GrayImage) -> GrayImage {
        let (w, h) = image.dimensions();
        let x = self.x.min(w);
        let y = self.y.min(h);
        let width = self.width.min(w - x);
        let height = self.height.min(h - y);
        image::imageops::crop_imm(image, x, y, width, height).to_image()
    }
}

/// Ranked, filtered regions for one preprocessed frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateSet {
    regions: Vec<Region>,
    traced: usize,
}

impl CandidateSet {
    /// Rank by descending area, keep the top K, then apply the shape filter
    pub fn from_regions(regions: Vec<Region>, config: &CandidateConfig) -> Self {
        let traced = regions.len();
        let regions = rank_regions(regions, config.top_k)
            .into_iter()
            .filter(|r| passes_filter(r, config))
            .collect();
        Self { regions, traced }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Number of contours found before ranking and filtering
    pub fn traced(&self) -> usize {
        self.traced
    }
}

/// Find candidate regions in a binarized frame (dark glyphs on white)
pub fn select_candidates(binary: &GrayImage, config: &CandidateConfig) -> CandidateSet {
    let regions = trace_regions(binary, config.merge_radius);
    let candidates = CandidateSet::from_regions(regions, config);
    debug!(
        "Candidate selection: {} contours, {} candidates after top-{} and shape filter",
        candidates.traced(),
        candidates.len(),
        config.top_k
    );
    candidates
}

/// Bounding boxes of the outermost ink blobs, in contour order
///
/// Pixels darker than mid-gray are ink, so an unbinarized frame still traces
/// glyphs rather than one frame-sized blob. Merged blobs are boxed around the
/// ink they contain, never around the dilation.
pub fn trace_regions(binary: &GrayImage, merge_radius: u32) -> Vec<Region> {
    let ink = ink_mask(binary);
    let merged = (merge_radius > 0).then(|| merge_horizontally(&ink, merge_radius));
    let traced = merged.as_ref().unwrap_or(&ink);

    find_contours::<u32>(traced)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .filter_map(|c| {
            let min_x = c.points.iter().map(|p| p.x).min()?;
            let min_y = c.points.iter().map(|p| p.y).min()?;
            let max_x = c.points.iter().map(|p| p.x).max()?;
            let max_y = c.points.iter().map(|p| p.y).max()?;
            let bounds = Region::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1);
            if merged.is_some() {
                shrink_to_ink(&ink, bounds)
            } else {
                Some(bounds)
            }
        })
        .collect()
}

/// Stable sort by descending area, then truncate to `top_k`
///
/// Equal areas keep their incoming (contour) order.
pub fn rank_regions(mut regions: Vec<Region>, top_k: usize) -> Vec<Region> {
    regions.sort_by(|a, b| b.area().cmp(&a.area()));
    regions.truncate(top_k);
    regions
}

/// Shape heuristics for a single printed line
pub fn passes_filter(region: &Region, config: &CandidateConfig) -> bool {
    let aspect = region.aspect_ratio();
    region.width >= config.min_width && aspect >= config.min_aspect && aspect <= config.max_aspect
}

/// Pixels below this level count as ink
const INK_THRESHOLD: u8 = 128;

/// Ink becomes foreground (non-zero) for contour tracing
fn ink_mask(image: &GrayImage) -> GrayImage {
    GrayImage::from_fn(image.width(), image.height(), |x, y| {
        if image.get_pixel(x, y)[0] < INK_THRESHOLD {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Horizontal dilation so the glyphs of one line join into one blob
fn merge_horizontally(foreground: &GrayImage, radius: u32) -> GrayImage {
    let spread = box_filter(foreground, radius, 0);
    let mut out = GrayImage::new(foreground.width(), foreground.height());
    for (x, y, pixel) in spread.enumerate_pixels() {
        if pixel[0] > 0 {
            out.put_pixel(x, y, Luma([255]));
        }
    }
    out
}

/// Narrow a dilated box to the columns that hold ink
///
/// The merge only spreads horizontally, so rows are already exact.
fn shrink_to_ink(ink: &GrayImage, bounds: Region) -> Option<Region> {
    let mut min_x = u32::MAX;
    let mut max_x = 0;
    for y in bounds.y..bounds.y + bounds.height {
        for x in bounds.x..bounds.x + bounds.width {
            if ink.get_pixel(x, y)[0] > 0 {
                min_x = min_x.min(x);
                max_x = max_x.max(x);
            }
        }
    }
    (min_x <= max_x).then(|| Region::new(min_x, bounds.y, max_x - min_x + 1, bounds.height))
}
