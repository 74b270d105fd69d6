use crate::error::Result;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

pub const JAVA: &str = "Java";
pub const BEDROCK: &str = "Bedrock";

/// Per-version packaging info for one platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VersionFormat {
    pub pack_format: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip_extension: Option<String>,
}

impl VersionFormat {
    pub fn extension(&self) -> &str {
        self.zip_extension.as_deref().unwrap_or(".zip")
    }
}

/// Ordered `platform -> version -> format` table (`version_mappings.json`).
#[derive(Debug, Clone, Default)]
pub struct FormatTable {
    platforms: IndexMap<String, IndexMap<String, VersionFormat>>,
    raw: Value,
}

impl FormatTable {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: Value = serde_json::from_str(text)?;
        let platforms = serde_json::from_value(raw.clone())?;
        Ok(Self { platforms, raw })
    }

    pub fn platforms(&self) -> impl Iterator<Item = (&str, &IndexMap<String, VersionFormat>)> {
        self.platforms.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, platform: &str, version: &str) -> Option<&VersionFormat> {
        self.platforms.get(platform)?.get(version)
    }

    /// `format code -> version` for one platform; on duplicate codes the later version wins.
    pub fn invert(&self, platform: &str) -> HashMap<i64, String> {
        self.platforms
            .get(platform)
            .map(|versions| {
                versions
                    .iter()
                    .map(|(v, info)| (info.pack_format, v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every key at every nesting level, first-seen order, deduplicated.
    pub fn all_keys(&self) -> Vec<String> {
        fn walk(v: &Value, out: &mut Vec<String>) {
            if let Value::Object(map) = v {
                for (k, child) in map {
                    if !out.iter().any(|x| x == k) {
                        out.push(k.clone());
                    }
                    walk(child, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.raw, &mut out);
        out
    }
}
