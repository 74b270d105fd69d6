use crate::error::Result;
use chrono::Local;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CURRENT_LOG: &str = "current_log.txt";

/// Start a fresh run log in `log_dir`.
///
/// An existing `current_log.txt` is moved to `backup/log_<YYYYMMDD_HHMMSS>.txt`
/// first. Returns the new, empty log file.
pub fn rotate(log_dir: &Path) -> Result<File> {
    let backup_dir = log_dir.join("backup");
    std::fs::create_dir_all(&backup_dir)?;
    let current = log_dir.join(CURRENT_LOG);
    if current.exists() {
        let stamp = Local::now().format("%Y%m%d_%H%M%S");
        let backup = unique(backup_dir.join(format!("log_{stamp}.txt")));
        std::fs::rename(&current, &backup)?;
        debug!(?backup, "previous run log archived");
    }
    Ok(File::create(&current)?)
}

// two runs inside the same second must not clobber each other's backup
fn unique(path: PathBuf) -> PathBuf {
    if !path.exists() {
        return path;
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut n = 1;
    loop {
        let candidate = path.with_file_name(format!("{stem}_{n}.txt"));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
