use crate::config::{BuildConfig, PackConfig};
use crate::error::Result;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Identifier whose default path is the pack's icon.
pub const ICON_UID: &str = "TEXTURE_PACK";

/// A pack found in a workspace directory.
#[derive(Debug, Clone, Serialize)]
pub struct PackEntry {
    pub config_file: PathBuf,
    pub build: BuildConfig,
    pub name: Option<String>,
    pub pack_config: Option<PackConfigSummary>,
    pub icon: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PackConfigSummary {
    pub version: Option<String>,
    pub resolutions: Vec<String>,
}

impl PackConfigSummary {
    fn from_config(pack: &PackConfig) -> Self {
        Self {
            version: pack.version_number().ok(),
            resolutions: pack
                .resolutions()
                .map(|r| r.into_iter().map(|r| r.label).collect())
                .unwrap_or_default(),
        }
    }
}

fn icon_path(build: &BuildConfig) -> Option<PathBuf> {
    let text = std::fs::read_to_string(&build.source_mapping_file).ok()?;
    let table: Value = serde_json::from_str(&text).ok()?;
    let rel = table.get(ICON_UID)?.get("path")?.as_str()?;
    Some(build.source_dir.join(rel))
}

/// Every `*.config` build configuration directly under `dir`, in file-name order.
///
/// Files that do not parse as a build configuration are skipped.
pub fn discover_packs(dir: &Path) -> Result<Vec<PackEntry>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("config"))
        .collect();
    files.sort();

    let mut packs = Vec::new();
    for config_file in files {
        let build = match BuildConfig::load(&config_file) {
            Ok(b) => b,
            Err(e) => {
                debug!(?config_file, error = %e, "not a build configuration");
                continue;
            }
        };
        let pack = match PackConfig::load(&build.pack_config_file) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(file = ?build.pack_config_file, error = %e, "pack config unreadable");
                None
            }
        };
        packs.push(PackEntry {
            name: pack.as_ref().and_then(|p| p.name().ok()),
            pack_config: pack.as_ref().map(PackConfigSummary::from_config),
            icon: icon_path(&build),
            build,
            config_file,
        });
    }
    Ok(packs)
}
