use crate::mapping::ResolvedIdentifiers;
use crate::model::{AtlasLayout, AtlasRule, StampLayer};
use std::path::Path;
use tracing::{debug, warn};

/// Grid cells assume this native size when the first member declares none.
pub const DEFAULT_CELL: (u32, u32) = (16, 16);

/// Integer per-axis factor between a supplied atlas and its nominal size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleFactor {
    pub x: u32,
    pub y: u32,
}

impl ScaleFactor {
    pub const ONE: ScaleFactor = ScaleFactor { x: 1, y: 1 };
}

/// Median of `values` (mean of the two middle values for even counts).
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    Some(if v.len() % 2 == 1 {
        v[mid]
    } else {
        (v[mid - 1] + v[mid]) / 2.0
    })
}

/// Per-axis median of `actual / declared` over `(declared, actual)` sizes.
///
/// A mis-declared layer cannot drag the result while it is outnumbered.
/// Returns `(1.0, 1.0)` when nothing declares a resolution.
pub fn median_ratio(samples: &[((u32, u32), (u32, u32))]) -> (f64, f64) {
    let xs: Vec<f64> = samples
        .iter()
        .filter(|(d, _)| d.0 > 0)
        .map(|(d, a)| a.0 as f64 / d.0 as f64)
        .collect();
    let ys: Vec<f64> = samples
        .iter()
        .filter(|(d, _)| d.1 > 0)
        .map(|(d, a)| a.1 as f64 / d.1 as f64)
        .collect();
    (median(&xs).unwrap_or(1.0), median(&ys).unwrap_or(1.0))
}

/// Median scale of the source textures feeding a stamp atlas.
///
/// Only layers whose identifier declares a native resolution and whose file
/// exists under `source_dir` contribute.
pub fn median_layer_scale(
    layers: &[StampLayer],
    source_dir: &Path,
    ids: &ResolvedIdentifiers,
) -> (f64, f64) {
    let mut samples = Vec::new();
    for layer in layers {
        let Some(rec) = ids.get(&layer.uid) else {
            continue;
        };
        let (Some(path), Some(declared)) = (rec.path.as_deref(), rec.resolution) else {
            continue;
        };
        let full = source_dir.join(path);
        match image::image_dimensions(&full) {
            Ok(actual) => samples.push((declared, actual)),
            Err(e) => debug!(?full, error = %e, "no size sample"),
        }
    }
    median_ratio(&samples)
}

/// Size an atlas would have at scale 1 according to its rule.
pub fn nominal_size(rule: &AtlasRule, ids: &ResolvedIdentifiers) -> (u32, u32) {
    match &rule.layout {
        AtlasLayout::Grid { grid_size, members } => {
            let cell = members
                .first()
                .and_then(|uid| ids.get(uid))
                .and_then(|r| r.resolution)
                .unwrap_or(DEFAULT_CELL);
            (cell.0 * grid_size.0, cell.1 * grid_size.1)
        }
        AtlasLayout::Stamp { canvas_size, .. } => *canvas_size,
    }
}

/// `floor(actual / nominal)` per axis.
///
/// Non-integer ratios are accepted as-is; an atlas smaller than nominal is
/// treated as scale 1 so rectangles stay non-empty.
pub fn scale_factor(actual: (u32, u32), nominal: (u32, u32)) -> ScaleFactor {
    let axis = |a: u32, n: u32| -> u32 {
        if n == 0 {
            return 1;
        }
        let f = a / n;
        if f == 0 {
            warn!(actual = a, nominal = n, "atlas smaller than its nominal size");
            1
        } else {
            f
        }
    };
    ScaleFactor {
        x: axis(actual.0, nominal.0),
        y: axis(actual.1, nominal.1),
    }
}

/// Scale factor of a supplied atlas image against its rule's geometry.
pub fn atlas_scale_factor(
    atlas: &image::RgbaImage,
    rule: &AtlasRule,
    ids: &ResolvedIdentifiers,
) -> ScaleFactor {
    scale_factor(atlas.dimensions(), nominal_size(rule, ids))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_odd_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[1.0, 2.0, 3.0, 4.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn truncates_ratio() {
        assert_eq!(scale_factor((48, 33), (16, 16)), ScaleFactor { x: 3, y: 2 });
        assert_eq!(scale_factor((8, 8), (16, 16)), ScaleFactor::ONE);
    }
}
