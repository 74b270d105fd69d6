//! Atlas codec: compose per-texture images into grid or stamp/tga atlases and
//! split supplied atlases back into per-texture images.
//!
//! Grid atlases are lenient (a missing member leaves a transparent hole);
//! stamp/tga atlases are strict (a missing layer source fails that atlas).
//! Stamp layers compose in declaration order, so later entries draw on top,
//! and are decomposed in reverse order so the topmost layer lands last on
//! its identifier's canvas.

use crate::compositing::{
    blit, blit_masked, crop_padded, filled, inverse_transform, place_alpha, put_alpha,
    transform,
};
use crate::error::{PackError, Result};
use crate::mapping::ResolvedIdentifiers;
use crate::model::{AtlasLayout, AtlasRule, Rect, StampKind, StampLayer};
use crate::report::RunReport;
use crate::scale::{ScaleFactor, median_layer_scale, nominal_size};
use image::{GrayImage, ImageReader, RgbaImage};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Decode any supported image file to RGBA8.
pub fn load_rgba(path: &Path) -> Result<RgbaImage> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(img.to_rgba8())
}

/// Save `img`, creating parent directories; the codec follows the extension (`.tga`, `.png`, ...).
pub fn save_image(img: &RgbaImage, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    img.save(path)?;
    Ok(())
}

/// Compose the atlas described by `rule` from textures under `source_dir`.
#[instrument(skip_all, fields(destination = %rule.destination, kind = rule.type_name()))]
pub fn compile(
    rule: &AtlasRule,
    source_dir: &Path,
    ids: &ResolvedIdentifiers,
    report: &mut RunReport,
) -> Result<RgbaImage> {
    match &rule.layout {
        AtlasLayout::Grid { grid_size, members } => {
            compile_grid(&rule.destination, *grid_size, members, source_dir, ids, report)
        }
        AtlasLayout::Stamp {
            kind,
            canvas_size,
            layers,
        } => compile_stamp(*kind, *canvas_size, layers, source_dir, ids),
    }
}

/// [`compile`] and write the result to `out_dir/<destination>`.
pub fn compile_to(
    rule: &AtlasRule,
    source_dir: &Path,
    ids: &ResolvedIdentifiers,
    out_dir: &Path,
    report: &mut RunReport,
) -> Result<PathBuf> {
    let atlas = compile(rule, source_dir, ids, report)?;
    let out_path = out_dir.join(&rule.destination);
    save_image(&atlas, &out_path)?;
    info!(?out_path, w = atlas.width(), h = atlas.height(), "atlas written");
    Ok(out_path)
}

fn compile_grid(
    destination: &str,
    grid_size: (u32, u32),
    members: &[String],
    source_dir: &Path,
    ids: &ResolvedIdentifiers,
    report: &mut RunReport,
) -> Result<RgbaImage> {
    let mut loaded: Vec<Option<RgbaImage>> = Vec::with_capacity(members.len());
    for uid in members {
        let Some(path) = ids.path_of(uid) else {
            warn!(uid = %uid, "grid member has no mapping");
            report.missing_identifier(uid);
            loaded.push(None);
            continue;
        };
        let full = source_dir.join(path);
        debug!(uid = %uid, ?full, "opening grid member");
        if full.is_file() {
            loaded.push(Some(load_rgba(&full)?));
        } else {
            warn!(uid = %uid, ?full, "grid member missing, leaving a hole");
            report.missing_file(full);
            loaded.push(None);
        }
    }

    let (max_w, max_h) = loaded
        .iter()
        .flatten()
        .fold((0, 0), |(w, h), img| (w.max(img.width()), h.max(img.height())));
    if max_w == 0 || max_h == 0 {
        return Err(PackError::EmptyAtlas(destination.to_string()));
    }

    let (cols, rows) = grid_size;
    let mut canvas = RgbaImage::new(cols * max_w, rows * max_h);
    let (mut x, mut y) = (0i64, 0i64);
    for (i, img) in loaded.iter().enumerate() {
        // each cell advances by its own size; holes advance by the largest cell
        let (w, h) = img
            .as_ref()
            .map(|im| im.dimensions())
            .unwrap_or((max_w, max_h));
        if let Some(img) = img {
            blit(img, &mut canvas, x, y);
        }
        x += w as i64;
        if (i as u32 + 1) % cols == 0 {
            x = 0;
            y += h as i64;
        }
    }
    Ok(canvas)
}

fn compile_stamp(
    kind: StampKind,
    canvas_size: (u32, u32),
    layers: &[StampLayer],
    source_dir: &Path,
    ids: &ResolvedIdentifiers,
) -> Result<RgbaImage> {
    let (sx, sy) = median_layer_scale(layers, source_dir, ids);
    let cw = (canvas_size.0 as f64 * sx) as u32;
    let ch = (canvas_size.1 as f64 * sy) as u32;
    debug!(sx, sy, cw, ch, "stamp canvas");
    let mut canvas = filled(cw, ch, kind.background());
    let mut alpha: Option<GrayImage> = None;

    for layer in layers {
        let path = ids
            .path_of(&layer.uid)
            .ok_or_else(|| PackError::MissingMapping(layer.uid.clone()))?;
        let full = source_dir.join(path);
        if !full.is_file() {
            warn!(uid = %layer.uid, ?full, "stamp layer source missing");
            return Err(PackError::MissingSource {
                uid: layer.uid.clone(),
                path: full,
            });
        }
        let src = load_rgba(&full)?;
        let crop = layer
            .copy_rect()
            .map(|r| r.scaled(sx, sy))
            .unwrap_or_else(|| Rect::new(0, 0, src.width(), src.height()));
        let cropped = crop_padded(&src, crop.x as i64, crop.y as i64, crop.w, crop.h);
        let placed = transform(&cropped, layer.rotate, layer.flip);
        let (px, py) = layer.position();
        let dx = (px as f64 * sx) as i64;
        let dy = (py as f64 * sy) as i64;

        if layer.use_for_alpha {
            let mut a = GrayImage::new(cw, ch);
            place_alpha(&mut a, &placed, dx, dy, 1.0, false);
            alpha = Some(a);
        } else if let Some(opacity) = layer.alpha_add {
            let a = alpha.get_or_insert_with(|| GrayImage::new(cw, ch));
            place_alpha(a, &placed, dx, dy, opacity, true);
        } else {
            blit_masked(&placed, &mut canvas, dx, dy);
        }
    }

    if let Some(a) = alpha {
        put_alpha(&mut canvas, &a);
    }
    Ok(canvas)
}

/// Split `atlas` into per-identifier images under `dest_dir`, overwriting.
///
/// `scale` maps the rule's nominal rectangles into atlas pixels (see
/// [`crate::scale::atlas_scale_factor`]); grid slicing uses the atlas size directly.
#[instrument(skip_all, fields(destination = %rule.destination, kind = rule.type_name()))]
pub fn deconstruct(
    rule: &AtlasRule,
    atlas: &RgbaImage,
    ids: &ResolvedIdentifiers,
    scale: ScaleFactor,
    dest_dir: &Path,
    report: &mut RunReport,
) -> Result<BTreeMap<String, RgbaImage>> {
    match &rule.layout {
        AtlasLayout::Grid { grid_size, members } => {
            deconstruct_grid(*grid_size, members, atlas, ids, dest_dir, report)
        }
        AtlasLayout::Stamp { layers, .. } => {
            let nominal = nominal_size(rule, ids);
            deconstruct_stamp(layers, nominal, atlas, ids, scale, dest_dir, report)
        }
    }
}

fn deconstruct_grid(
    grid_size: (u32, u32),
    members: &[String],
    atlas: &RgbaImage,
    ids: &ResolvedIdentifiers,
    dest_dir: &Path,
    report: &mut RunReport,
) -> Result<BTreeMap<String, RgbaImage>> {
    let (cols, rows) = grid_size;
    let cell_w = atlas.width() / cols;
    let cell_h = atlas.height() / rows;
    let mut out = BTreeMap::new();
    for (i, uid) in members.iter().enumerate() {
        let (row, col) = (i as u32 / cols, i as u32 % cols);
        if row >= rows {
            report.warn(format!("{uid}: grid index {i} is outside the {cols}x{rows} grid"));
            continue;
        }
        let Some(path) = ids.path_of(uid) else {
            report.missing_identifier(uid);
            continue;
        };
        let cell = crop_padded(
            atlas,
            (col * cell_w) as i64,
            (row * cell_h) as i64,
            cell_w,
            cell_h,
        );
        save_image(&cell, &dest_dir.join(path))?;
        out.insert(uid.clone(), cell);
    }
    Ok(out)
}

fn deconstruct_stamp(
    layers: &[StampLayer],
    nominal: (u32, u32),
    atlas: &RgbaImage,
    ids: &ResolvedIdentifiers,
    scale: ScaleFactor,
    dest_dir: &Path,
    report: &mut RunReport,
) -> Result<BTreeMap<String, RgbaImage>> {
    let (fx, fy) = (scale.x as i64, scale.y as i64);
    let mut out: BTreeMap<String, RgbaImage> = BTreeMap::new();

    for layer in layers.iter().rev() {
        let Some(rec) = ids.get(&layer.uid) else {
            report.missing_identifier(&layer.uid);
            continue;
        };
        let Some(path) = ids.path_of(&layer.uid) else {
            report.missing_identifier(&layer.uid);
            continue;
        };
        let out_path = dest_dir.join(path);

        let mut canvas = match out.remove(&layer.uid) {
            Some(c) => c,
            None if out_path.is_file() => load_rgba(&out_path)?,
            None => match rec.resolution {
                Some((w, h)) => RgbaImage::new(w * scale.x, h * scale.y),
                None => RgbaImage::new(atlas.width(), atlas.height()),
            },
        };

        let native = rec.resolution.unwrap_or(nominal);
        let copy = layer
            .copy_rect()
            .unwrap_or_else(|| Rect::new(0, 0, native.0, native.1));
        // footprint of the layer inside the atlas, after its forward rotation
        let (fw, fh) = match layer.quarter_turns() {
            Some(1) | Some(3) => (copy.h, copy.w),
            _ => (copy.w, copy.h),
        };
        let (px, py) = layer.position();
        let region = crop_padded(
            atlas,
            px as i64 * fx,
            py as i64 * fy,
            fw * scale.x,
            fh * scale.y,
        );
        let restored = inverse_transform(&region, layer.rotate, layer.flip);
        blit_masked(
            &restored,
            &mut canvas,
            copy.x as i64 * fx,
            copy.y as i64 * fy,
        );

        save_image(&canvas, &out_path)?;
        debug!(uid = %layer.uid, ?out_path, "layer restored");
        out.insert(layer.uid.clone(), canvas);
    }
    Ok(out)
}
