//! Resolution pipeline: bring every source texture a rule set touches to one
//! output scale inside a scratch directory.

use crate::atlas::{load_rgba, save_image};
use crate::error::Result;
use crate::mapping::{EffectiveRecord, ResolvedIdentifiers};
use crate::model::MappingRule;
use crate::report::RunReport;
use crate::resample::{DEFAULT_BLEED, downsample_separate_channels};
use crate::template::inject_file;
use indexmap::{IndexMap, IndexSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Extensions treated as images; everything else is copied byte-for-byte.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "tga"];

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// `textures/stone.png` at height 8 -> `textures/stone_8px.png`.
pub fn override_path(rel_path: &str, target_height: u32) -> PathBuf {
    let p = Path::new(rel_path);
    let stem = p.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let name = match p.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}_{target_height}px.{ext}"),
        None => format!("{stem}_{target_height}px"),
    };
    p.with_file_name(name)
}

/// Scale, options and variables for one matrix cell.
#[derive(Debug, Clone)]
pub struct ResolveOptions<'a> {
    pub factor: f64,
    pub bleed: u32,
    pub variables: &'a IndexMap<String, String>,
}

impl<'a> ResolveOptions<'a> {
    pub fn new(factor: f64, variables: &'a IndexMap<String, String>) -> Self {
        Self {
            factor,
            bleed: DEFAULT_BLEED,
            variables,
        }
    }
}

fn copy_verbatim(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::copy(from, to)?;
    Ok(())
}

/// Process one texture from `source_dir/rel_path` into `dest_dir/rel_path`.
///
/// Returns `Ok(false)` when the source file does not exist (recorded in `report`).
pub fn process_file(
    source_dir: &Path,
    dest_dir: &Path,
    rel_path: &str,
    record: &EffectiveRecord,
    opts: &ResolveOptions<'_>,
    report: &mut RunReport,
) -> Result<bool> {
    let src = source_dir.join(rel_path);
    let dest = dest_dir.join(rel_path);
    if !src.is_file() {
        warn!(?src, "source file not found");
        report.missing_file(src);
        return Ok(false);
    }

    if !record.downsample_enabled() {
        debug!(rel_path, "downsample disabled, copying");
        copy_verbatim(&src, &dest)?;
    } else if is_image(&src) {
        let (_, height) = image::image_dimensions(&src)?;
        let target_height = ((height as f64) * opts.factor).round() as u32;
        let over = source_dir.join(override_path(rel_path, target_height));
        if over.is_file() {
            debug!(?over, target_height, "using resolution override");
            copy_verbatim(&over, &dest)?;
        } else if opts.factor == 1.0 {
            copy_verbatim(&src, &dest)?;
        } else {
            let img = load_rgba(&src)?;
            let scaled = downsample_separate_channels(&img, opts.factor, opts.bleed);
            save_image(&scaled, &dest)?;
        }
    } else {
        copy_verbatim(&src, &dest)?;
    }

    if record.inject_enabled() {
        inject_file(&dest, opts.variables)?;
    }
    Ok(true)
}

/// Run [`process_file`] for every identifier referenced by `rules`, once each.
///
/// Returns the number of files written.
#[instrument(skip_all, fields(factor = opts.factor))]
pub fn resolve_cell(
    source_dir: &Path,
    dest_dir: &Path,
    rules: &[MappingRule],
    ids: &ResolvedIdentifiers,
    opts: &ResolveOptions<'_>,
    report: &mut RunReport,
) -> Result<usize> {
    std::fs::create_dir_all(dest_dir)?;
    let uids: IndexSet<&str> = rules.iter().flat_map(|r| r.uids()).collect();
    let mut written = 0;
    for uid in uids {
        let Some(record) = ids.get(uid) else {
            warn!(uid, "identifier not in mapping table");
            report.missing_identifier(uid);
            continue;
        };
        let Some(path) = ids.path_of(uid) else {
            continue;
        };
        if process_file(source_dir, dest_dir, path, record, opts, report)? {
            written += 1;
        }
    }
    info!(written, ?dest_dir, "cell resolved");
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_name_keeps_directory_and_extension() {
        assert_eq!(
            override_path("textures/blocks/stone.png", 8),
            PathBuf::from("textures/blocks/stone_8px.png")
        );
        assert!(is_image(Path::new("a/B.TGA")));
        assert!(!is_image(Path::new("pack.mcmeta")));
    }
}
