//! Zip packaging and extraction.

use crate::error::{PackError, Result};
use std::fs::File;
use std::io::{BufWriter, Read};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

const ZIP_MAGIC: [u8; 4] = *b"PK\x03\x04";

/// `name.zip` -> `name.zip.partial`.
pub fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}

/// Zip every file under `src_dir` into `dest`, entries relative to `src_dir`.
///
/// Entries follow a sorted depth-first walk and carry a fixed timestamp, so
/// the same tree always yields the same bytes. The archive only appears at
/// `dest` once it is complete.
#[instrument(skip_all, fields(dest = %dest.display()))]
pub fn zip_dir(src_dir: &Path, dest: &Path) -> Result<usize> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let partial = partial_path(dest);
    match write_zip(src_dir, &partial) {
        Ok(count) => {
            std::fs::rename(&partial, dest)?;
            info!(count, "archive written");
            Ok(count)
        }
        Err(e) => {
            if partial.exists() {
                let _ = std::fs::remove_file(&partial);
            }
            Err(e)
        }
    }
}

fn write_zip(src_dir: &Path, out: &Path) -> Result<usize> {
    let mut writer = ZipWriter::new(BufWriter::new(File::create(out)?));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default())
        .unix_permissions(0o644);
    let mut count = 0;
    for entry in WalkDir::new(src_dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(src_dir)
            .map_err(std::io::Error::other)?;
        let name = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        debug!(%name, "adding entry");
        writer.start_file(name, options)?;
        let mut f = File::open(entry.path())?;
        std::io::copy(&mut f, &mut writer)?;
        count += 1;
    }
    writer.finish()?;
    Ok(count)
}

/// True when the file starts with a local-file-header signature (`.zip`, `.mcpack`, ...).
pub fn is_zip(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map(|_| magic == ZIP_MAGIC)
        .unwrap_or(false)
}

/// An archive unpacked into a temporary directory, removed on drop.
#[derive(Debug)]
pub struct Extracted {
    _dir: TempDir,
    root: PathBuf,
}

impl Extracted {
    /// Pack root: the single top-level directory when the archive has one.
    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[instrument(skip_all, fields(archive = %path.display()))]
pub fn extract_archive(path: &Path) -> Result<Extracted> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| PackError::MalformedArchive {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let dir = tempfile::Builder::new().prefix("packsmith-import").tempdir()?;
    archive.extract(dir.path())?;

    let mut top: Vec<PathBuf> = std::fs::read_dir(dir.path())?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<_>>()?;
    let root = if top.len() == 1 && top[0].is_dir() {
        top.remove(0)
    } else {
        dir.path().to_path_buf()
    };
    if top.is_empty() && root == dir.path() {
        warn!("archive is empty");
    }
    info!(entries = archive.len(), ?root, "archive extracted");
    Ok(Extracted { _dir: dir, root })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip_is_deterministic_and_extracts_flat() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("pack");
        std::fs::create_dir_all(src.join("b/c")).unwrap();
        std::fs::write(src.join("z.txt"), "z").unwrap();
        std::fs::write(src.join("b/c/a.txt"), "a").unwrap();

        let one = tmp.path().join("one.zip");
        let two = tmp.path().join("two.zip");
        assert_eq!(zip_dir(&src, &one).unwrap(), 2);
        zip_dir(&src, &two).unwrap();
        assert_eq!(std::fs::read(&one).unwrap(), std::fs::read(&two).unwrap());
        assert!(!partial_path(&one).exists());
        assert!(is_zip(&one));

        let out = extract_archive(&one).unwrap();
        assert_eq!(std::fs::read_to_string(out.root().join("b/c/a.txt")).unwrap(), "a");
    }
}
