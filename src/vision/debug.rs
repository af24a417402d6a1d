//! Debug rendering of candidate regions
//!
//! Presentation only: outline colors come from the candidate's rank and are
//! never read back by selection or OCR.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

use super::regions::CandidateSet;

const PALETTE: [Rgb<u8>; 6] = [
    Rgb([230, 25, 75]),
    Rgb([60, 180, 75]),
    Rgb([0, 130, 200]),
    Rgb([245, 130, 48]),
    Rgb([145, 30, 180]),
    Rgb([70, 240, 240]),
];

/// Outline color for the candidate at `rank`
pub fn outline_color(rank: usize) -> Rgb<u8> {
    PALETTE[rank % PALETTE.len()]
}

/// Draw each candidate's outline on a color copy of the preprocessed frame
pub fn render_candidates(image: &GrayImage, candidates: &CandidateSet) -> RgbImage {
    let mut canvas = RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let v = image.get_pixel(x, y)[0];
        Rgb([v, v, v])
    });

    for (rank, region) in candidates.regions().iter().enumerate() {
        if region.width == 0 || region.height == 0 {
            continue;
        }
        let rect = Rect::at(region.x as i32, region.y as i32).of_size(region.width, region.height);
        draw_hollow_rect_mut(&mut canvas, rect, outline_color(rank));
    }

    canvas
}
