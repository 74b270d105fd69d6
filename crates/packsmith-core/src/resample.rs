//! Separate-channel downsampling with alpha bleed.
//!
//! Colour is resampled with a smooth filter after bleeding edge colour into
//! transparent neighbours; alpha is resampled with nearest-neighbour so no new
//! semi-transparent gradients appear.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use tracing::trace;

/// Dilation passes applied before resampling.
pub const DEFAULT_BLEED: u32 = 16;
/// Colour left in transparent pixels the bleed never reaches.
pub const BACKGROUND: [u8; 3] = [0, 0, 0];

/// Bleed colour outward from covered pixels (alpha > 0) into transparent ones.
///
/// Each pass grows the covered mask by a 3x3 kernel; a newly covered pixel
/// takes the colour of its first covered neighbour in row-major order. Pixels
/// still uncovered after `distance` passes get `background`. Alpha is untouched.
pub fn bleed_alpha(img: &RgbaImage, distance: u32, background: [u8; 3]) -> RgbaImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }
    let mut covered: Vec<bool> = img.pixels().map(|p| p[3] > 0).collect();
    let mut colour: Vec<[u8; 3]> = img.pixels().map(|p| [p[0], p[1], p[2]]).collect();
    let idx = |x: u32, y: u32| (y * w + x) as usize;

    for pass in 0..distance {
        let mut grown = covered.clone();
        let mut changed = false;
        for y in 0..h {
            for x in 0..w {
                if covered[idx(x, y)] {
                    continue;
                }
                'search: for ny in y.saturating_sub(1)..=(y + 1).min(h - 1) {
                    for nx in x.saturating_sub(1)..=(x + 1).min(w - 1) {
                        if covered[idx(nx, ny)] {
                            colour[idx(x, y)] = colour[idx(nx, ny)];
                            grown[idx(x, y)] = true;
                            changed = true;
                            break 'search;
                        }
                    }
                }
            }
        }
        covered = grown;
        if !changed {
            trace!(pass, "bleed converged");
            break;
        }
    }

    RgbaImage::from_fn(w, h, |x, y| {
        let i = idx(x, y);
        let [r, g, b] = if covered[i] { colour[i] } else { background };
        Rgba([r, g, b, img.get_pixel(x, y)[3]])
    })
}

/// Target size for `factor`, rounded, never below 1x1.
pub fn scaled_dimensions(w: u32, h: u32, factor: f64) -> (u32, u32) {
    let s = |v: u32| ((v as f64 * factor).round() as u32).max(1);
    (s(w), s(h))
}

/// Resize colour (Lanczos3, after bleeding) and alpha (nearest) independently.
pub fn downsample_separate_channels(img: &RgbaImage, factor: f64, bleed: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    let (tw, th) = scaled_dimensions(w, h, factor);
    if (tw, th) == (w, h) {
        return img.clone();
    }
    let bled = bleed_alpha(img, bleed, BACKGROUND);
    let rgb = RgbImage::from_fn(w, h, |x, y| {
        let p = bled.get_pixel(x, y);
        Rgb([p[0], p[1], p[2]])
    });
    let alpha = GrayImage::from_fn(w, h, |x, y| Luma([img.get_pixel(x, y)[3]]));

    let rgb = imageops::resize(&rgb, tw, th, FilterType::Lanczos3);
    let alpha = imageops::resize(&alpha, tw, th, FilterType::Nearest);
    RgbaImage::from_fn(tw, th, |x, y| {
        let c = rgb.get_pixel(x, y);
        Rgba([c[0], c[1], c[2], alpha.get_pixel(x, y)[0]])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bleed_stops_at_distance() {
        let mut img = RgbaImage::new(5, 1);
        img.put_pixel(0, 0, Rgba([10, 200, 30, 255]));
        let out = bleed_alpha(&img, 2, BACKGROUND);
        assert_eq!(out.get_pixel(1, 0).0, [10, 200, 30, 0]);
        assert_eq!(out.get_pixel(2, 0).0, [10, 200, 30, 0]);
        assert_eq!(out.get_pixel(3, 0).0, [0, 0, 0, 0]);
    }

    #[test]
    fn alpha_stays_hard() {
        let mut img = RgbaImage::new(8, 8);
        for y in 0..8 {
            for x in 0..4 {
                img.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        let out = downsample_separate_channels(&img, 0.5, DEFAULT_BLEED);
        assert_eq!(out.dimensions(), (4, 4));
        assert!(out.pixels().all(|p| p[3] == 0 || p[3] == 255));
    }
}
