//! Frame preprocessing for OCR
//!
//! Turns a raw color frame into a binarized grayscale buffer with strong
//! glyph/background contrast. Stages run in a fixed order:
//!
//! 1. grayscale reduction (always)
//! 2. tiled adaptive histogram equalization
//! 3. small-kernel Gaussian smoothing
//! 4. adaptive threshold against a local Gaussian-weighted mean
//! 5. morphological close then open with a 3x3 element
//!
//! Preprocessing never fails. A stage that cannot run is skipped with a
//! warning and recorded in [`PreprocessedFrame::skipped`]; the next stage
//! works on the previous stage's output.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::filter::gaussian_blur_f32;
use imageproc::morphology::{close, open};
use std::time::Instant;
use tracing::{debug, warn};

use crate::capture::Frame;
use crate::config::{GrayscaleMethod, PreprocessConfig};
use crate::error::{Result, ScanError};

/// Optional preprocessing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ContrastEnhancement,
    Smoothing,
    Binarization,
    Morphology,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::ContrastEnhancement => write!(f, "contrast enhancement"),
            Stage::Smoothing => write!(f, "smoothing"),
            Stage::Binarization => write!(f, "binarization"),
            Stage::Morphology => write!(f, "morphology"),
        }
    }
}

type StageFn = fn(&GrayImage, &PreprocessConfig) -> Result<GrayImage>;

/// Output of one preprocessing pass
#[derive(Debug)]
pub struct PreprocessedFrame {
    /// Single-channel buffer with the source frame's dimensions
    pub image: GrayImage,
    /// Capture time of the source frame
    pub timestamp: Instant,
    /// Stages that ran, in order
    pub applied: Vec<Stage>,
    /// Stages that were enabled but fell back to their input
    pub skipped: Vec<Stage>,
}

impl PreprocessedFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Runs the preprocessing stages configured in [`PreprocessConfig`]
#[derive(Debug, Clone, Default)]
pub struct FramePreprocessor {
    config: PreprocessConfig,
}

impl FramePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Consume a raw frame and produce the OCR-ready buffer
    pub fn process(&self, frame: Frame) -> PreprocessedFrame {
        let start = Instant::now();
        let timestamp = frame.timestamp;
        let mut current = to_grayscale(frame, self.config.grayscale);

        let stages: [(Stage, bool, StageFn); 4] = [
            (
                Stage::ContrastEnhancement,
                self.config.contrast_enhancement,
                run_clahe,
            ),
            (Stage::Smoothing, self.config.blur_kernel > 1, run_blur),
            (Stage::Binarization, self.config.binarize, run_threshold),
            (Stage::Morphology, self.config.morphology, run_morphology),
        ];

        let mut applied = Vec::new();
        let mut skipped = Vec::new();

        for (stage, enabled, run) in stages {
            if !enabled {
                continue;
            }
            match run(&current, &self.config) {
                Ok(next) => {
                    current = next;
                    applied.push(stage);
                }
                Err(e) => {
                    warn!("Skipping {} stage, keeping previous buffer: {}", stage, e);
                    skipped.push(stage);
                }
            }
        }

        debug!(
            "Preprocessed {}x{} frame in {:?} (applied: {:?}, skipped: {:?})",
            current.width(),
            current.height(),
            start.elapsed(),
            applied,
            skipped
        );

        PreprocessedFrame {
            image: current,
            timestamp,
            applied,
            skipped,
        }
    }
}

/// Reduce a color frame to one channel
pub fn to_grayscale(frame: Frame, method: GrayscaleMethod) -> GrayImage {
    let channels = frame.layout.channels();
    let layout = frame.layout;
    let data: Vec<u8> = frame
        .data
        .chunks_exact(channels)
        .map(|px| {
            let (r, g, b) = layout.rgb(px);
            match method {
                GrayscaleMethod::Luminance => {
                    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32).round() as u8
                }
                GrayscaleMethod::Average => ((r as u16 + g as u16 + b as u16) / 3) as u8,
            }
        })
        .collect();

    // Frame::new guarantees the buffer length
    GrayImage::from_raw(frame.width, frame.height, data)
        .unwrap_or_else(|| GrayImage::new(frame.width, frame.height))
}

/// Gaussian sigma matching a square kernel of `size` pixels
pub fn kernel_sigma(size: u32) -> f32 {
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

fn run_clahe(image: &GrayImage, config: &PreprocessConfig) -> Result<GrayImage> {
    clahe(image, config.clahe_clip_limit, config.clahe_tile_grid)
}

fn run_blur(image: &GrayImage, config: &PreprocessConfig) -> Result<GrayImage> {
    let kernel = config.blur_kernel;
    if kernel % 2 == 0 {
        return Err(ScanError::invalid_parameter(
            "smoothing",
            format!("kernel size must be odd, got {}", kernel),
        ));
    }
    Ok(gaussian_blur_f32(image, kernel_sigma(kernel)))
}

fn run_threshold(image: &GrayImage, config: &PreprocessConfig) -> Result<GrayImage> {
    adaptive_threshold(image, config.threshold_window, config.threshold_offset)
}

fn run_morphology(image: &GrayImage, _config: &PreprocessConfig) -> Result<GrayImage> {
    let closed = close(image, Norm::LInf, 1);
    Ok(open(&closed, Norm::LInf, 1))
}

/// Binarize against the Gaussian-weighted mean of a `window` x `window` neighbourhood
///
/// A pixel becomes white when it is brighter than the local mean minus
/// `offset`, black otherwise, so dark glyphs end up black on white.
pub fn adaptive_threshold(image: &GrayImage, window: u32, offset: i32) -> Result<GrayImage> {
    if window < 3 || window % 2 == 0 {
        return Err(ScanError::invalid_parameter(
            "binarization",
            format!("window must be odd and at least 3, got {}", window),
        ));
    }

    let local_mean = gaussian_blur_f32(image, kernel_sigma(window));
    let mut output = GrayImage::new(image.width(), image.height());

    for (x, y, pixel) in image.enumerate_pixels() {
        let threshold = local_mean.get_pixel(x, y)[0] as i32 - offset;
        let value = if pixel[0] as i32 > threshold { 255 } else { 0 };
        output.put_pixel(x, y, Luma([value]));
    }

    Ok(output)
}

/// Contrast-limited adaptive histogram equalization over a `grid` x `grid` tiling
pub fn clahe(image: &GrayImage, clip_limit: f32, grid: u32) -> Result<GrayImage> {
    let (width, height) = image.dimensions();
    if grid == 0 {
        return Err(ScanError::invalid_parameter(
            "contrast enhancement",
            "tile grid must be at least 1",
        ));
    }
    if !(clip_limit > 0.0) {
        return Err(ScanError::invalid_parameter(
            "contrast enhancement",
            format!("clip limit must be positive, got {}", clip_limit),
        ));
    }
    let tile_w = width / grid;
    let tile_h = height / grid;
    if tile_w == 0 || tile_h == 0 {
        return Err(ScanError::invalid_parameter(
            "contrast enhancement",
            format!("{}x{} frame is smaller than a {}x{} tile grid", width, height, grid, grid),
        ));
    }

    let grid = grid as usize;
    let mut luts = vec![[0u8; 256]; grid * grid];

    for ty in 0..grid {
        for tx in 0..grid {
            // Last row/column absorbs the remainder
            let x0 = tx as u32 * tile_w;
            let y0 = ty as u32 * tile_h;
            let x1 = if tx + 1 == grid { width } else { x0 + tile_w };
            let y1 = if ty + 1 == grid { height } else { y0 + tile_h };

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y)[0] as usize] += 1;
                }
            }

            let area = (x1 - x0) * (y1 - y0);
            luts[ty * grid + tx] = clipped_equalization(&mut hist, area, clip_limit);
        }
    }

    let mut output = GrayImage::new(width, height);
    let last = (grid - 1) as f32;

    for (x, y, pixel) in image.enumerate_pixels() {
        let fx = ((x as f32 + 0.5) / tile_w as f32 - 0.5).clamp(0.0, last);
        let fy = ((y as f32 + 0.5) / tile_h as f32 - 0.5).clamp(0.0, last);
        let tx0 = fx.floor() as usize;
        let ty0 = fy.floor() as usize;
        let tx1 = (tx0 + 1).min(grid - 1);
        let ty1 = (ty0 + 1).min(grid - 1);
        let ax = fx - tx0 as f32;
        let ay = fy - ty0 as f32;

        let v = pixel[0] as usize;
        let v00 = luts[ty0 * grid + tx0][v] as f32;
        let v01 = luts[ty0 * grid + tx1][v] as f32;
        let v10 = luts[ty1 * grid + tx0][v] as f32;
        let v11 = luts[ty1 * grid + tx1][v] as f32;

        let top = v00 * (1.0 - ax) + v01 * ax;
        let bottom = v10 * (1.0 - ax) + v11 * ax;
        let value = top * (1.0 - ay) + bottom * ay;

        output.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
    }

    Ok(output)
}

/// Clip a tile histogram, spread the excess evenly and build its equalization table
fn clipped_equalization(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);

    let mut excess = 0u32;
    for count in hist.iter_mut() {
        if *count > limit {
            excess += *count - limit;
            *count = limit;
        }
    }

    let bonus = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, count) in hist.iter_mut().enumerate() {
        *count += bonus + u32::from(i < remainder);
    }

    let mut lut = [0u8; 256];
    let mut cdf = 0u32;
    for (i, count) in hist.iter().enumerate() {
        cdf += count;
        lut[i] = ((cdf as f32 * 255.0 / area as f32).round()).min(255.0) as u8;
    }
    lut
}
