//! Identifier table and the version-aware resolver.
//!
//! Each identifier carries a default record plus version-keyed override
//! blocks. Resolving for version `V` applies, in ascending version order,
//! every block whose key is **greater than or equal to** `V`; later (larger)
//! keys win on conflicting fields. Requesting a version above every key
//! therefore yields the untouched default record.

use crate::error::Result;
use crate::model::Toggle;
use crate::version::SchemaVersion;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{instrument, warn};

/// Fields shared by the default record and every override block.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecordFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<[u32; 2]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downsample: Option<Toggle>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inject: Option<Toggle>,
}

impl RecordFields {
    fn apply(&mut self, over: &RecordFields) {
        if over.path.is_some() {
            self.path = over.path.clone();
        }
        if over.resolution.is_some() {
            self.resolution = over.resolution;
        }
        if over.downsample.is_some() {
            self.downsample = over.downsample;
        }
        if over.inject.is_some() {
            self.inject = over.inject;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentifierEntry {
    #[serde(flatten)]
    pub defaults: RecordFields,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub versions: IndexMap<String, RecordFields>,
}

/// Effective attributes of one identifier for one schema version.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EffectiveRecord {
    pub path: Option<String>,
    pub resolution: Option<(u32, u32)>,
    pub downsample: Option<Toggle>,
    pub inject: Option<Toggle>,
}

impl EffectiveRecord {
    /// Downsampling is on unless explicitly disabled.
    pub fn downsample_enabled(&self) -> bool {
        self.downsample != Some(Toggle::False)
    }
    pub fn inject_enabled(&self) -> bool {
        self.inject == Some(Toggle::True)
    }
}

impl From<RecordFields> for EffectiveRecord {
    fn from(f: RecordFields) -> Self {
        Self {
            path: f.path,
            resolution: f.resolution.map(|r| (r[0], r[1])),
            downsample: f.downsample,
            inject: f.inject,
        }
    }
}

/// Parsed identifier table with override keys pre-parsed and sorted.
#[derive(Debug, Clone)]
pub struct IdentifierTable {
    entries: IndexMap<String, (RecordFields, Vec<(SchemaVersion, RecordFields)>)>,
}

impl IdentifierTable {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: IndexMap<String, IdentifierEntry> = serde_json::from_str(text)?;
        Self::from_entries(raw)
    }

    pub fn from_entries(raw: IndexMap<String, IdentifierEntry>) -> Result<Self> {
        let mut entries = IndexMap::with_capacity(raw.len());
        for (uid, entry) in raw {
            let mut overrides = entry
                .versions
                .into_iter()
                .map(|(k, v)| Ok((SchemaVersion::parse(&k)?, v)))
                .collect::<Result<Vec<_>>>()?;
            overrides.sort_by(|a, b| a.0.cmp(&b.0));
            entries.insert(uid, (entry.defaults, overrides));
        }
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.entries.contains_key(uid)
    }

    /// Computes the effective record of every identifier for `version`.
    ///
    /// Pure: the same table and version always give the same map. Identifiers
    /// without a path are kept but reported as soft warnings.
    #[instrument(skip_all, fields(version = %version))]
    pub fn resolve(&self, version: &SchemaVersion) -> ResolvedIdentifiers {
        let mut records = BTreeMap::new();
        let mut warnings = Vec::new();
        for (uid, (defaults, overrides)) in &self.entries {
            let mut merged = defaults.clone();
            for (key, block) in overrides {
                if version <= key {
                    merged.apply(block);
                }
            }
            if merged.path.as_deref().is_none_or(str::is_empty) {
                warn!(uid = %uid, "identifier has no path for this version");
                warnings.push(format!("{uid}: no path for version {version}"));
            }
            records.insert(uid.clone(), EffectiveRecord::from(merged));
        }
        ResolvedIdentifiers {
            version: version.clone(),
            records,
            warnings,
        }
    }
}

/// Output of [`IdentifierTable::resolve`].
#[derive(Debug, Clone)]
pub struct ResolvedIdentifiers {
    version: SchemaVersion,
    records: BTreeMap<String, EffectiveRecord>,
    warnings: Vec<String>,
}

impl ResolvedIdentifiers {
    pub fn version(&self) -> &SchemaVersion {
        &self.version
    }
    pub fn get(&self, uid: &str) -> Option<&EffectiveRecord> {
        self.records.get(uid)
    }
    /// Non-empty effective path of `uid`, if any.
    pub fn path_of(&self, uid: &str) -> Option<&str> {
        self.records
            .get(uid)
            .and_then(|r| r.path.as_deref())
            .filter(|p| !p.is_empty())
    }
    pub fn records(&self) -> &BTreeMap<String, EffectiveRecord> {
        &self.records
    }
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}
