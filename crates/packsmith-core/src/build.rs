//! Build orchestrator: platform x version x resolution matrix.
//!
//! Each cell runs `Resolve -> Downsample -> Compose -> Package -> Cleanup`.
//! Scratch directories are owned by a guard, so cleanup happens on every exit
//! path including errors and cancellation.

use crate::archive::zip_dir;
use crate::atlas;
use crate::config::{BuildConfig, PackConfig, Resolution};
use crate::error::{PackError, Result};
use crate::formats::FormatTable;
use crate::mapping::{IdentifierTable, ResolvedIdentifiers};
use crate::model::MappingRule;
use crate::pipeline::{ResolveOptions, resolve_cell};
use crate::report::RunReport;
use crate::rules::{load_rules, rule_dir};
use crate::version::SchemaVersion;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, instrument, warn};

pub const LOCK_FILE: &str = ".packsmith.lock";

/// Shared cancellation flag, checked before each matrix cell and between stages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
    fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PackError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// One (platform, version, resolution) unit of packaging work.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildCell {
    pub platform: String,
    pub version: String,
    pub pack_format: i64,
    pub scale_key: u32,
    pub label: String,
    pub extension: String,
}

impl BuildCell {
    pub fn factor(&self) -> f64 {
        Resolution {
            key: self.scale_key,
            label: self.label.clone(),
        }
        .factor()
    }

    /// `[platform][version][label]{name}_{major.minor.patch}{extension}`
    pub fn artifact_name(&self, pack_name: &str, pack_version: &str) -> String {
        format!(
            "[{}][{}][{}]{}_{}{}",
            self.platform, self.version, self.label, pack_name, pack_version, self.extension
        )
    }

    fn scratch_stem(&self) -> String {
        format!("{}_{}_{}", self.platform, self.version, self.label)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
    pub artifacts: Vec<PathBuf>,
    /// Cells that failed outright, with the error text.
    pub failed: Vec<(BuildCell, String)>,
    pub skipped_versions: Vec<(String, String)>,
    pub report: RunReport,
    pub cancelled: bool,
}

#[derive(Debug, Clone)]
pub enum BuildEvent {
    Started { cells: usize },
    VersionSkipped { platform: String, version: String },
    CellStarted { index: usize, cell: BuildCell },
    CellFinished { index: usize, artifact: PathBuf, report: RunReport },
    CellFailed { index: usize, cell: BuildCell, error: String },
    Cancelled,
    Finished(BuildSummary),
}

/// Exclusive claim on an output directory, released on drop.
#[derive(Debug)]
pub struct OutputLock {
    path: PathBuf,
}

impl OutputLock {
    pub fn acquire(output_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(output_dir)?;
        let path = output_dir.join(LOCK_FILE);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => Ok(Self { path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(PackError::OutputLocked(output_dir.to_path_buf()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl Drop for OutputLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = ?self.path, error = %e, "could not release output lock");
        }
    }
}

/// Scratch directories of one cell, removed on drop.
#[derive(Debug)]
struct ScratchGuard {
    resolved: PathBuf,
    packed: PathBuf,
}

impl ScratchGuard {
    fn create(tempfile_dir: &Path, stem: &str) -> Result<Self> {
        let guard = Self {
            resolved: tempfile_dir.join(format!("{stem}.resolved")),
            packed: tempfile_dir.join(format!("{stem}.packed")),
        };
        // leftovers from a killed run
        guard.remove();
        std::fs::create_dir_all(&guard.resolved)?;
        std::fs::create_dir_all(&guard.packed)?;
        Ok(guard)
    }

    fn remove(&self) {
        for dir in [&self.resolved, &self.packed] {
            if dir.exists() {
                if let Err(e) = std::fs::remove_dir_all(dir) {
                    warn!(?dir, error = %e, "scratch cleanup failed");
                }
            }
        }
    }
}

impl Drop for ScratchGuard {
    fn drop(&mut self) {
        self.remove();
    }
}

/// Compose stage: atlases and direct copies from `resolved_dir` into `packed_dir`.
///
/// A failing rule is recorded in `report` and the remaining rules still run.
#[instrument(skip_all)]
pub fn compose(
    resolved_dir: &Path,
    packed_dir: &Path,
    rules: &[MappingRule],
    ids: &ResolvedIdentifiers,
    report: &mut RunReport,
) -> Result<()> {
    for rule in rules {
        match rule {
            MappingRule::Atlas(a) => {
                if let Err(e) = atlas::compile_to(a, resolved_dir, ids, packed_dir, report) {
                    warn!(destination = %a.destination, error = %e, "atlas skipped");
                    report.rule_failed(&a.destination, e);
                }
            }
            MappingRule::Direct(d) => {
                let Some(path) = ids.path_of(&d.source) else {
                    report.missing_identifier(&d.source);
                    continue;
                };
                let src = resolved_dir.join(path);
                if !src.is_file() {
                    debug!(uid = %d.source, ?src, "nothing resolved for direct rule");
                    continue;
                }
                let dest = packed_dir.join(&d.destination);
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(&src, &dest)?;
            }
        }
    }
    Ok(())
}

/// Everything a build run needs, loaded once from a [`BuildConfig`].
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub config: BuildConfig,
    pub pack: PackConfig,
    pub formats: FormatTable,
    pub table: IdentifierTable,
    pub pack_name: String,
    pub pack_version: String,
    pub resolutions: Vec<Resolution>,
}

impl BuildPlan {
    pub fn load(config: BuildConfig) -> Result<Self> {
        let pack = PackConfig::load(&config.pack_config_file)?;
        let formats = FormatTable::load(&config.version_mappings_file)?;
        let table = IdentifierTable::load(&config.source_mapping_file)?;
        let pack_name = pack.name()?;
        let pack_version = pack.version_number()?;
        let resolutions = pack.resolutions()?;
        Ok(Self {
            config,
            pack,
            formats,
            table,
            pack_name,
            pack_version,
            resolutions,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        Self::load(BuildConfig::load(path)?)
    }

    /// Matrix cells in build order, plus the (platform, version) pairs without a rule directory.
    pub fn cells(&self) -> (Vec<BuildCell>, Vec<(String, String)>) {
        let mut cells = Vec::new();
        let mut skipped = Vec::new();
        for (platform, versions) in self.formats.platforms() {
            for (version, info) in versions {
                if !rule_dir(&self.config.mappings_dir, platform, version).is_dir() {
                    skipped.push((platform.to_string(), version.clone()));
                    continue;
                }
                for res in &self.resolutions {
                    cells.push(BuildCell {
                        platform: platform.to_string(),
                        version: version.clone(),
                        pack_format: info.pack_format,
                        scale_key: res.key,
                        label: res.label.clone(),
                        extension: info.extension().to_string(),
                    });
                }
            }
        }
        (cells, skipped)
    }

    pub fn artifact_path(&self, cell: &BuildCell) -> PathBuf {
        self.config
            .output_dir
            .join(cell.artifact_name(&self.pack_name, &self.pack_version))
    }

    /// Run the whole matrix, reporting progress through `on_event`.
    ///
    /// Cell failures are collected in the summary; only setup problems (such
    /// as a locked output directory) end the run with `Err`.
    #[instrument(skip_all, fields(pack = %self.pack_name))]
    pub fn run(
        &self,
        cancel: &CancelToken,
        on_event: &mut dyn FnMut(BuildEvent),
    ) -> Result<BuildSummary> {
        let _lock = OutputLock::acquire(&self.config.output_dir)?;
        let (cells, skipped) = self.cells();
        let mut summary = BuildSummary::default();

        for (platform, version) in skipped {
            warn!(%platform, %version, "no mapping directory, version not built");
            summary
                .report
                .warn(format!("{platform} {version}: no mapping directory"));
            on_event(BuildEvent::VersionSkipped {
                platform: platform.clone(),
                version: version.clone(),
            });
            summary.skipped_versions.push((platform, version));
        }

        info!(cells = cells.len(), "build started");
        on_event(BuildEvent::Started { cells: cells.len() });

        for (index, cell) in cells.into_iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            on_event(BuildEvent::CellStarted {
                index,
                cell: cell.clone(),
            });
            match self.run_cell(&cell, cancel) {
                Ok((artifact, report)) => {
                    summary.artifacts.push(artifact.clone());
                    summary.report.merge(report.clone());
                    on_event(BuildEvent::CellFinished {
                        index,
                        artifact,
                        report,
                    });
                }
                Err(PackError::Cancelled) => {
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!(platform = %cell.platform, version = %cell.version, label = %cell.label, error = %e, "cell failed");
                    on_event(BuildEvent::CellFailed {
                        index,
                        cell: cell.clone(),
                        error: e.to_string(),
                    });
                    summary.failed.push((cell, e.to_string()));
                }
            }
        }

        if summary.cancelled {
            info!("build cancelled");
            on_event(BuildEvent::Cancelled);
        }
        on_event(BuildEvent::Finished(summary.clone()));
        Ok(summary)
    }

    /// Build one cell and return the artifact path with the cell's report.
    #[instrument(skip_all, fields(platform = %cell.platform, version = %cell.version, label = %cell.label))]
    pub fn run_cell(&self, cell: &BuildCell, cancel: &CancelToken) -> Result<(PathBuf, RunReport)> {
        cancel.check()?;
        let mut report = RunReport::default();

        // Resolve
        let version = SchemaVersion::parse(&cell.version)?;
        let ids = self.table.resolve(&version);
        for w in ids.warnings() {
            report.warn(w.clone());
        }
        let rules = load_rules(&self.config.mappings_dir, &cell.platform, &cell.version)?
            .ok_or_else(|| PackError::NoRuleSet {
                platform: cell.platform.clone(),
                version: cell.version.clone(),
            })?;
        for (file, reason) in &rules.rejected {
            report.rule_failed(&file.display().to_string(), reason);
        }

        let mut vars = self.pack.template_variables();
        vars.insert("pack_format".into(), cell.pack_format.to_string());
        vars.insert("version".into(), cell.version.clone());
        vars.insert("resolution".into(), cell.label.clone());

        let scratch = ScratchGuard::create(&self.config.tempfile_dir, &cell.scratch_stem())?;

        // Downsample
        let opts = ResolveOptions::new(cell.factor(), &vars);
        resolve_cell(
            &self.config.source_dir,
            &scratch.resolved,
            &rules.rules,
            &ids,
            &opts,
            &mut report,
        )?;
        cancel.check()?;

        // Compose
        compose(&scratch.resolved, &scratch.packed, &rules.rules, &ids, &mut report)?;
        cancel.check()?;

        // Package
        let artifact = self.artifact_path(cell);
        zip_dir(&scratch.packed, &artifact)?;
        info!(?artifact, "cell packaged");

        // Cleanup runs when `scratch` drops
        Ok((artifact, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artifact_name_layout() {
        let cell = BuildCell {
            platform: "Java".into(),
            version: "1.20.4".into(),
            pack_format: 22,
            scale_key: 1,
            label: "8x".into(),
            extension: ".zip".into(),
        };
        assert_eq!(
            cell.artifact_name("Faithful", "1.2.3"),
            "[Java][1.20.4][8x]Faithful_1.2.3.zip"
        );
        assert_eq!(cell.factor(), 0.5);
    }

    #[test]
    fn lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let first = OutputLock::acquire(dir.path()).unwrap();
        assert!(matches!(
            OutputLock::acquire(dir.path()),
            Err(PackError::OutputLocked(_))
        ));
        drop(first);
        assert!(OutputLock::acquire(dir.path()).is_ok());
    }
}
