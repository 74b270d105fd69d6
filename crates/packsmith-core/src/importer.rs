//! Reverse pipeline: turn a foreign pack (directory or archive) back into a
//! per-texture source tree with its own build and pack configuration.

use crate::archive::{Extracted, extract_archive, is_zip};
use crate::atlas::{self, load_rgba};
use crate::config::{BuildConfig, PackConfig};
use crate::error::{PackError, Result};
use crate::formats::{BEDROCK, FormatTable, JAVA};
use crate::mapping::{IdentifierTable, ResolvedIdentifiers};
use crate::model::MappingRule;
use crate::report::RunReport;
use crate::rules::load_rules;
use crate::scale::atlas_scale_factor;
use crate::template::{extract_placeholders, template_keys};
use crate::version::SchemaVersion;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Extracted placeholder values, kept next to the imported sources.
pub const IMPORTED_VARIABLES: &str = "imported_variables.json";

/// Where the importer finds its templates and writes the new pack.
#[derive(Debug, Clone)]
pub struct ImportConfig {
    pub pack_name: String,
    pub template_source_mapping: PathBuf,
    pub template_pack_config: PathBuf,
    pub template_build_config: PathBuf,
    pub mappings_dir: PathBuf,
    pub version_mappings_file: PathBuf,
    /// Directory receiving `<slug>/` and `<slug>.config`.
    pub workspace_dir: PathBuf,
}

impl ImportConfig {
    /// Conventional layout: `source_mapping.json`, `pack.config` and
    /// `build.config` in `templates_dir`; `Version_Mappings/` in the workspace.
    pub fn with_templates(pack_name: &str, templates_dir: &Path, workspace_dir: &Path) -> Self {
        let mappings_dir = workspace_dir.join("Version_Mappings");
        Self {
            pack_name: pack_name.to_string(),
            template_source_mapping: templates_dir.join("source_mapping.json"),
            template_pack_config: templates_dir.join("pack.config"),
            template_build_config: templates_dir.join("build.config"),
            version_mappings_file: mappings_dir.join("version_mappings.json"),
            mappings_dir,
            workspace_dir: workspace_dir.to_path_buf(),
        }
    }
}

/// Platform and version recovered from a pack's metadata file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackMetadata {
    pub platform: String,
    pub version: String,
    pub pack_format: i64,
    pub metadata_file: PathBuf,
}

/// Metadata files probed in order: file name, platform, JSON pointer to the format code.
const METADATA_PROBES: [(&str, &str, &str); 3] = [
    ("pack.mcmeta", JAVA, "/pack/pack_format"),
    ("version.json", JAVA, "/pack_version/resource"),
    ("manifest.json", BEDROCK, "/format_version"),
];

/// Detect platform and version from the first metadata file present in `pack_root`.
pub fn detect_platform_version(pack_root: &Path, formats: &FormatTable) -> Result<PackMetadata> {
    for (file, platform, pointer) in METADATA_PROBES {
        let path = pack_root.join(file);
        if !path.is_file() {
            continue;
        }
        let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path)?)
            .map_err(|_| PackError::MalformedMetadata(path.clone()))?;
        let code = doc
            .pointer(pointer)
            .and_then(Value::as_i64)
            .ok_or_else(|| PackError::MalformedMetadata(path.clone()))?;
        let version = formats
            .invert(platform)
            .remove(&code)
            .ok_or_else(|| PackError::MalformedMetadata(path.clone()))?;
        info!(platform, %version, pack_format = code, "pack metadata detected");
        return Ok(PackMetadata {
            platform: platform.to_string(),
            version,
            pack_format: code,
            metadata_file: path,
        });
    }
    Err(PackError::MalformedMetadata(pack_root.to_path_buf()))
}

/// Directory name for a new pack: lower-cased, spaces to `_`, dots dropped.
pub fn source_dir_name(pack_name: &str) -> String {
    pack_name.to_lowercase().replace(' ', "_").replace('.', "")
}

/// Files created for a freshly imported pack.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Scaffold {
    pub source_dir: PathBuf,
    pub source_mapping_file: PathBuf,
    pub pack_config_file: PathBuf,
    pub build_config_file: PathBuf,
}

/// Create the source directory and its configuration files from the templates.
pub fn scaffold(cfg: &ImportConfig) -> Result<Scaffold> {
    let slug = source_dir_name(&cfg.pack_name);
    let source_dir = cfg.workspace_dir.join(&slug);
    std::fs::create_dir_all(&source_dir)?;

    let table: Value = serde_json::from_str(&std::fs::read_to_string(&cfg.template_source_mapping)?)?;
    let source_mapping_file = source_dir.join("source_mapping.json");
    std::fs::write(&source_mapping_file, serde_json::to_string_pretty(&table)?)?;

    let mut pack = PackConfig::load(&cfg.template_pack_config)?;
    pack.set("name", cfg.pack_name.clone().into());
    pack.set("description", "".into());
    pack.set("pack_version_number", serde_yaml::to_value([0, 0, 0])?);
    let mut resolutions = serde_yaml::Mapping::new();
    resolutions.insert("0".into(), "16x".into());
    pack.set("resolutions", resolutions.into());
    pack.set("pack_uuid", "".into());
    pack.set("module_uuid", "".into());
    let pack_config_file = source_dir.join("pack.config");
    pack.save(&pack_config_file)?;

    let mut build = BuildConfig::load(&cfg.template_build_config)?;
    build.source_dir = source_dir.clone();
    build.source_mapping_file = source_mapping_file.clone();
    build.pack_config_file = pack_config_file.clone();
    let build_config_file = cfg.workspace_dir.join(format!("{slug}.config"));
    build.save(&build_config_file)?;

    info!(?source_dir, "pack scaffolded");
    Ok(Scaffold {
        source_dir,
        source_mapping_file,
        pack_config_file,
        build_config_file,
    })
}

/// Run every rule backwards from `pack_root` into `source_dir`.
///
/// `placeholders` are extracted from injected documents; `format_keys` are
/// only templated. Returns the extracted values (later files win).
#[instrument(skip_all, fields(rules = rules.len()))]
pub fn import_rules(
    pack_root: &Path,
    source_dir: &Path,
    rules: &[MappingRule],
    ids: &ResolvedIdentifiers,
    placeholders: &[String],
    format_keys: &[String],
    report: &mut RunReport,
) -> Result<IndexMap<String, Value>> {
    let mut extracted = IndexMap::new();
    for rule in rules {
        match rule {
            MappingRule::Atlas(a) => {
                let atlas_path = pack_root.join(&a.destination);
                if !atlas_path.is_file() {
                    warn!(?atlas_path, "atlas not in pack");
                    report.missing_file(atlas_path);
                    continue;
                }
                let result = load_rgba(&atlas_path).and_then(|img| {
                    let scale = atlas_scale_factor(&img, a, ids);
                    debug!(destination = %a.destination, ?scale, "deconstructing");
                    atlas::deconstruct(a, &img, ids, scale, source_dir, report)
                });
                if let Err(e) = result {
                    warn!(destination = %a.destination, error = %e, "atlas not deconstructed");
                    report.rule_failed(&a.destination, e);
                }
            }
            MappingRule::Direct(d) => {
                let Some(record) = ids.get(&d.source) else {
                    warn!(uid = %d.source, "identifier not in mapping table");
                    report.missing_identifier(&d.source);
                    continue;
                };
                let Some(path) = ids.path_of(&d.source) else {
                    report.missing_identifier(&d.source);
                    continue;
                };
                let from = pack_root.join(&d.destination);
                if !from.is_file() {
                    report.missing_file(from);
                    continue;
                }
                let to = source_dir.join(path);
                if let Some(parent) = to.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                if record.inject_enabled() {
                    let text = std::fs::read_to_string(&from)?;
                    match serde_json::from_str::<Value>(&text) {
                        Ok(doc) => {
                            let (found, mut doc) = extract_placeholders(&doc, placeholders);
                            extracted.extend(found);
                            template_keys(&mut doc, format_keys);
                            std::fs::write(&to, serde_json::to_string_pretty(&doc)?)?;
                            continue;
                        }
                        Err(e) => {
                            warn!(?from, error = %e, "inject file is not JSON, copied as-is");
                            report.warn(format!("{}: not JSON, no values extracted", from.display()));
                        }
                    }
                }
                std::fs::copy(&from, &to)?;
            }
        }
    }
    Ok(extracted)
}

/// Outcome of [`import_pack`].
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub metadata: PackMetadata,
    pub scaffold: Scaffold,
    /// Effective pack configuration after merging extracted values.
    pub pack_config: IndexMap<String, serde_yaml::Value>,
    pub extracted: IndexMap<String, Value>,
    pub report: RunReport,
}

/// Import the pack at `pack_path` (a directory or any zip-signature archive).
#[instrument(skip_all, fields(pack = %pack_path.display(), name = %cfg.pack_name))]
pub fn import_pack(pack_path: &Path, cfg: &ImportConfig) -> Result<ImportReport> {
    let extracted_archive: Option<Extracted> = if pack_path.is_file() && is_zip(pack_path) {
        Some(extract_archive(pack_path)?)
    } else {
        None
    };
    let pack_root = extracted_archive
        .as_ref()
        .map(|e| e.root().to_path_buf())
        .unwrap_or_else(|| pack_path.to_path_buf());

    let formats = FormatTable::load(&cfg.version_mappings_file)?;
    let metadata = detect_platform_version(&pack_root, &formats)?;
    let table = IdentifierTable::load(&cfg.template_source_mapping)?;
    let ids = table.resolve(&SchemaVersion::parse(&metadata.version)?);
    let rules = load_rules(&cfg.mappings_dir, &metadata.platform, &metadata.version)?
        .filter(|set| !set.is_empty())
        .ok_or_else(|| PackError::NoRuleSet {
            platform: metadata.platform.clone(),
            version: metadata.version.clone(),
        })?;

    let mut report = RunReport::default();
    for w in ids.warnings() {
        report.warn(w.clone());
    }
    for (file, reason) in &rules.rejected {
        report.rule_failed(&file.display().to_string(), reason);
    }

    let scaffold = scaffold(cfg)?;
    let placeholders: Vec<String> = PackConfig::load(&cfg.template_pack_config)?
        .keys()
        .map(str::to_string)
        .collect();
    let format_keys = formats.all_keys();

    let extracted = import_rules(
        &pack_root,
        &scaffold.source_dir,
        &rules.rules,
        &ids,
        &placeholders,
        &format_keys,
        &mut report,
    )?;

    std::fs::write(
        scaffold.source_dir.join(IMPORTED_VARIABLES),
        serde_json::to_string_pretty(&extracted)?,
    )?;
    let mut pack = PackConfig::load(&scaffold.pack_config_file)?;
    pack.merge(&extracted)?;
    pack.save(&scaffold.pack_config_file)?;

    info!(
        missing = report.missing_files.len(),
        extracted = extracted.len(),
        "import finished"
    );
    Ok(ImportReport {
        metadata,
        scaffold,
        pack_config: pack.values().clone(),
        extracted,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_drops_dots_and_spaces() {
        assert_eq!(source_dir_name("My Pack v1.2"), "my_pack_v12");
    }
}
