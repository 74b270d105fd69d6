use crate::model::Flip;
use image::imageops::{self, FilterType};
use image::{GrayImage, Rgba, RgbaImage};

/// Crop `(x, y, w, h)` out of `src`; areas outside `src` come back transparent.
pub fn crop_padded(src: &RgbaImage, x: i64, y: i64, w: u32, h: u32) -> RgbaImage {
    let (sw, sh) = src.dimensions();
    let mut out = RgbaImage::new(w, h);
    for yy in 0..h {
        let sy = y + yy as i64;
        if sy < 0 || sy >= sh as i64 {
            continue;
        }
        for xx in 0..w {
            let sx = x + xx as i64;
            if sx < 0 || sx >= sw as i64 {
                continue;
            }
            out.put_pixel(xx, yy, *src.get_pixel(sx as u32, sy as u32));
        }
    }
    out
}

/// Copy `src` into `canvas` at (dx, dy), replacing every channel. Clipped to the canvas.
pub fn blit(src: &RgbaImage, canvas: &mut RgbaImage, dx: i64, dy: i64) {
    let (cw, ch) = canvas.dimensions();
    for (x, y, px) in src.enumerate_pixels() {
        let tx = dx + x as i64;
        let ty = dy + y as i64;
        if tx >= 0 && ty >= 0 && tx < cw as i64 && ty < ch as i64 {
            canvas.put_pixel(tx as u32, ty as u32, *px);
        }
    }
}

/// Paste `src` using its own alpha as the mask.
///
/// All four channels are interpolated, `out = src * a + dst * (1 - a)`, so a
/// half-transparent pixel over an opaque one yields a half-way alpha too.
pub fn blit_masked(src: &RgbaImage, canvas: &mut RgbaImage, dx: i64, dy: i64) {
    let (cw, ch) = canvas.dimensions();
    for (x, y, px) in src.enumerate_pixels() {
        let a = px[3] as u32;
        if a == 0 {
            continue;
        }
        let tx = dx + x as i64;
        let ty = dy + y as i64;
        if tx < 0 || ty < 0 || tx >= cw as i64 || ty >= ch as i64 {
            continue;
        }
        let dst = canvas.get_pixel_mut(tx as u32, ty as u32);
        if a == 255 {
            *dst = *px;
            continue;
        }
        for c in 0..4 {
            let v = px[c] as u32 * a + dst[c] as u32 * (255 - a);
            dst[c] = ((v + 127) / 255) as u8;
        }
    }
}

/// Rotate clockwise by a multiple of 90 degrees.
///
/// Quarter and three-quarter turns go through a square of the longer side and
/// are resized back to the swapped aspect, so no corner gets clipped.
pub fn rotate_quarters(img: &RgbaImage, quarter_turns_cw: i32) -> RgbaImage {
    let (w, h) = img.dimensions();
    match quarter_turns_cw.rem_euclid(4) {
        0 => img.clone(),
        2 => imageops::rotate180(img),
        turns => {
            let side = w.max(h);
            let squared = if w == h {
                img.clone()
            } else {
                imageops::resize(img, side, side, FilterType::Nearest)
            };
            let rotated = if turns == 1 {
                imageops::rotate90(&squared)
            } else {
                imageops::rotate270(&squared)
            };
            if w == h {
                rotated
            } else {
                imageops::resize(&rotated, h, w, FilterType::Nearest)
            }
        }
    }
}

/// Rotate clockwise by an arbitrary angle about the centre, keeping the canvas size.
/// Uncovered pixels stay transparent.
pub fn rotate_in_place(img: &RgbaImage, degrees_cw: f32) -> RgbaImage {
    let (w, h) = img.dimensions();
    let mut out = RgbaImage::new(w, h);
    let theta = (degrees_cw as f64).to_radians();
    let (sin, cos) = theta.sin_cos();
    let cx = w as f64 / 2.0;
    let cy = h as f64 / 2.0;
    for y in 0..h {
        for x in 0..w {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            let sx = (cos * dx + sin * dy + cx).floor();
            let sy = (-sin * dx + cos * dy + cy).floor();
            if sx >= 0.0 && sy >= 0.0 && sx < w as f64 && sy < h as f64 {
                out.put_pixel(x, y, *img.get_pixel(sx as u32, sy as u32));
            }
        }
    }
    out
}

/// Rotate clockwise by `degrees`, picking the exact path for right angles.
pub fn rotate(img: &RgbaImage, degrees_cw: f32) -> RgbaImage {
    let r = degrees_cw.round();
    if (degrees_cw - r).abs() <= f32::EPSILON && (r as i32) % 90 == 0 {
        rotate_quarters(img, r as i32 / 90)
    } else {
        rotate_in_place(img, degrees_cw)
    }
}

pub fn flip(img: &RgbaImage, f: Flip) -> RgbaImage {
    match f {
        Flip::NoFlip => img.clone(),
        Flip::Horizontal => imageops::flip_horizontal(img),
        Flip::Vertical => imageops::flip_vertical(img),
    }
}

/// Forward layer transform: rotate, then mirror.
pub fn transform(img: &RgbaImage, degrees_cw: f32, f: Flip) -> RgbaImage {
    flip(&rotate(img, degrees_cw), f)
}

/// Exact inverse of [`transform`]: mirror, then rotate back.
pub fn inverse_transform(img: &RgbaImage, degrees_cw: f32, f: Flip) -> RgbaImage {
    rotate(&flip(img, f), -degrees_cw)
}

/// Write `layer`'s alpha (times `opacity`) into `running` at (dx, dy).
///
/// With `add` the value is summed and saturates at 255; otherwise it replaces.
pub fn place_alpha(
    running: &mut GrayImage,
    layer: &RgbaImage,
    dx: i64,
    dy: i64,
    opacity: f32,
    add: bool,
) {
    let (cw, ch) = running.dimensions();
    for (x, y, px) in layer.enumerate_pixels() {
        let tx = dx + x as i64;
        let ty = dy + y as i64;
        if tx < 0 || ty < 0 || tx >= cw as i64 || ty >= ch as i64 {
            continue;
        }
        let v = (px[3] as f32 * opacity).clamp(0.0, 255.0) as u8;
        let dst = running.get_pixel_mut(tx as u32, ty as u32);
        dst[0] = if add { dst[0].saturating_add(v) } else { v };
    }
}

/// Overwrite the alpha channel of `canvas` with `alpha` (same size).
pub fn put_alpha(canvas: &mut RgbaImage, alpha: &GrayImage) {
    for (x, y, px) in canvas.enumerate_pixels_mut() {
        if x < alpha.width() && y < alpha.height() {
            px[3] = alpha.get_pixel(x, y)[0];
        }
    }
}

pub fn filled(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
    RgbaImage::from_pixel(w, h, Rgba(rgba))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marked(w: u32, h: u32) -> RgbaImage {
        let mut img = RgbaImage::new(w, h);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        img
    }

    #[test]
    fn quarter_turn_swaps_dimensions() {
        let img = marked(6, 2);
        let r = rotate_quarters(&img, 1);
        assert_eq!(r.dimensions(), (2, 6));
        let back = rotate_quarters(&r, -1);
        assert_eq!(back.dimensions(), (6, 2));
    }

    #[test]
    fn square_rotation_is_exact() {
        let img = marked(4, 4);
        let r = rotate(&img, 90.0);
        // top-left corner moves to top-right on a clockwise turn
        assert_eq!(r.get_pixel(3, 0)[0], 255);
        let back = inverse_transform(&transform(&img, 90.0, Flip::Horizontal), 90.0, Flip::Horizontal);
        assert_eq!(back, img);
    }

    #[test]
    fn masked_blit_blends_all_channels() {
        let mut canvas = filled(1, 1, [0, 0, 255, 255]);
        let src = filled(1, 1, [255, 0, 0, 128]);
        blit_masked(&src, &mut canvas, 0, 0);
        let p = canvas.get_pixel(0, 0);
        assert_eq!(p[0], 128);
        assert_eq!(p[2], 127);
        assert_eq!(p[3], 191);
    }

    #[test]
    fn crop_pads_outside() {
        let src = filled(2, 2, [9, 9, 9, 255]);
        let c = crop_padded(&src, 1, 1, 3, 3);
        assert_eq!(c.get_pixel(0, 0)[3], 255);
        assert_eq!(c.get_pixel(2, 2)[3], 0);
    }
}
