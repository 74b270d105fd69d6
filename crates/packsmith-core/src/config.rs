use crate::error::{PackError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_yaml::Value as YamlValue;
use std::path::{Path, PathBuf};

/// Paths driving one build run (`*.config`, YAML or JSON).
///
/// Relative paths are used as written, i.e. against the working directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BuildConfig {
    pub source_dir: PathBuf,
    pub mappings_dir: PathBuf,
    pub output_dir: PathBuf,
    pub tempfile_dir: PathBuf,
    pub log_output_dir: PathBuf,
    pub source_mapping_file: PathBuf,
    pub version_mappings_file: PathBuf,
    pub pack_config_file: PathBuf,
}

impl BuildConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// One configured output resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub key: u32,
    pub label: String,
}

impl Resolution {
    /// Key `k` halves the texture size `k` times; key 0 keeps it.
    pub fn factor(&self) -> f64 {
        if self.key > 0 {
            0.5f64.powi(self.key as i32)
        } else {
            1.0
        }
    }
}

/// Pack configuration: build metadata plus template variables, insertion-ordered.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackConfig {
    values: IndexMap<String, YamlValue>,
}

impl PackConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let values: Option<IndexMap<String, YamlValue>> = serde_yaml::from_str(text)?;
        Ok(Self {
            values: values.unwrap_or_default(),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, serde_yaml::to_string(&self.values)?)?;
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&YamlValue> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: &str, value: YamlValue) {
        self.values.insert(key.to_string(), value);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn values(&self) -> &IndexMap<String, YamlValue> {
        &self.values
    }

    pub fn name(&self) -> Result<String> {
        self.values
            .get("name")
            .map(value_to_string)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PackError::InvalidConfig("pack config has no 'name'".into()))
    }

    /// `pack_version_number: [major, minor, patch]` rendered as `major.minor.patch`.
    pub fn version_number(&self) -> Result<String> {
        let parts = self
            .values
            .get("pack_version_number")
            .and_then(YamlValue::as_sequence)
            .filter(|s| s.len() >= 3)
            .ok_or_else(|| {
                PackError::InvalidConfig("pack_version_number must list major, minor, patch".into())
            })?;
        Ok(parts[..3]
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join("."))
    }

    /// Configured resolutions in declaration order.
    pub fn resolutions(&self) -> Result<Vec<Resolution>> {
        let map = self
            .values
            .get("resolutions")
            .and_then(YamlValue::as_mapping)
            .ok_or_else(|| PackError::InvalidConfig("pack config has no 'resolutions' map".into()))?;
        map.iter()
            .map(|(k, v)| {
                let key_text = value_to_string(k);
                let key = key_text.trim().parse::<u32>().map_err(|_| {
                    PackError::InvalidConfig(format!("resolution key {key_text:?} is not an integer"))
                })?;
                Ok(Resolution {
                    key,
                    label: value_to_string(v),
                })
            })
            .collect()
    }

    /// Flat `key -> text` view used for `%key%` substitution.
    pub fn template_variables(&self) -> IndexMap<String, String> {
        self.values
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect()
    }

    /// Inserts or overwrites values, keeping existing key order.
    pub fn merge(&mut self, updates: &IndexMap<String, serde_json::Value>) -> Result<()> {
        for (k, v) in updates {
            self.values.insert(k.clone(), serde_yaml::to_value(v)?);
        }
        Ok(())
    }
}

/// Scalars render as plain text; sequences and maps as compact JSON.
pub fn value_to_string(v: &YamlValue) -> String {
    match v {
        YamlValue::Null => String::new(),
        YamlValue::Bool(b) => b.to_string(),
        YamlValue::Number(n) => n.to_string(),
        YamlValue::String(s) => s.clone(),
        YamlValue::Tagged(t) => value_to_string(&t.value),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
