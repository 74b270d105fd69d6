use crate::error::Result;
use crate::model::MappingRule;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Rules of one (platform, version) pair plus the entries that failed to parse.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    pub rules: Vec<MappingRule>,
    /// `(file, reason)` for each rejected entry or unreadable category file;
    /// rejection only drops that entry or file.
    pub rejected: Vec<(PathBuf, String)>,
}

impl RuleSet {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// `<mappings_dir>/<platform>/<version>`.
pub fn rule_dir(mappings_dir: &Path, platform: &str, version: &str) -> PathBuf {
    mappings_dir.join(platform).join(version)
}

/// Loads every `*.json` category file directly under `dir`, in file-name order.
///
/// Returns `Ok(None)` when the directory does not exist.
pub fn load_rule_dir(dir: &Path) -> Result<Option<RuleSet>> {
    if !dir.is_dir() {
        warn!(?dir, "no mappings for this version");
        return Ok(None);
    }
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let p = entry?.path();
        if !p.is_file() {
            continue;
        }
        if p.extension().and_then(|e| e.to_str()) == Some("json") {
            files.push(p);
        } else {
            warn!(?p, "ignoring non-JSON file in mapping directory");
        }
    }
    files.sort();

    let mut set = RuleSet::default();
    for file in files {
        let text = std::fs::read_to_string(&file)?;
        let entries: Vec<Value> = match serde_json::from_str(&text) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(?file, error = %e, "skipping malformed category file");
                set.rejected.push((file.clone(), e.to_string()));
                continue;
            }
        };
        debug!(?file, count = entries.len(), "loaded category file");
        for entry in entries {
            match MappingRule::from_value(entry) {
                Ok(rule) => set.rules.push(rule),
                Err(e) => {
                    warn!(?file, error = %e, "skipping rule");
                    set.rejected.push((file.clone(), e.to_string()));
                }
            }
        }
    }
    info!(?dir, rules = set.rules.len(), "rule set loaded");
    Ok(Some(set))
}

pub fn load_rules(mappings_dir: &Path, platform: &str, version: &str) -> Result<Option<RuleSet>> {
    load_rule_dir(&rule_dir(mappings_dir, platform, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_category_file_is_rejected_not_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = rule_dir(tmp.path(), "Java", "1.20");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("a_broken.json"), "[{\"source\": ").unwrap();
        std::fs::write(
            dir.join("b_blocks.json"),
            r#"[{"source": "STONE", "destination": "stone.png"}, {"type": "cube"}]"#,
        )
        .unwrap();

        let set = load_rules(tmp.path(), "Java", "1.20").unwrap().unwrap();
        assert_eq!(set.rules.len(), 1);
        assert_eq!(set.rejected.len(), 2);
        assert_eq!(set.rejected[0].0, dir.join("a_broken.json"));
        assert_eq!(set.rejected[1].0, dir.join("b_blocks.json"));
    }
}
