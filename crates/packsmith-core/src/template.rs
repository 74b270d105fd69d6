//! `%key%` placeholders: substitution on build, extraction on import.

use crate::error::Result;
use indexmap::IndexMap;
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

/// Replace every `%key%` in `text` with its value.
pub fn substitute(text: &str, vars: &IndexMap<String, String>) -> String {
    let mut out = text.to_string();
    for (key, value) in vars {
        let token = format!("%{key}%");
        if out.contains(&token) {
            out = out.replace(&token, value);
        }
    }
    out
}

/// Substitute placeholders in a file in place.
///
/// Returns `false` (and leaves the file alone) when it is not UTF-8 text.
pub fn inject_file(path: &Path, vars: &IndexMap<String, String>) -> Result<bool> {
    let bytes = std::fs::read(path)?;
    let Ok(text) = String::from_utf8(bytes) else {
        warn!(?path, "inject target is not text, left as-is");
        return Ok(false);
    };
    let replaced = substitute(&text, vars);
    if replaced != text {
        std::fs::write(path, replaced)?;
        debug!(?path, "placeholders substituted");
    }
    Ok(true)
}

/// First non-null value stored under `key`, searching objects depth-first.
pub fn find_first<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    let Value::Object(map) = doc else {
        return None;
    };
    if let Some(v) = map.get(key).filter(|v| !v.is_null()) {
        return Some(v);
    }
    map.values().find_map(|child| find_first(child, key))
}

/// Replace `key` with `%key%` where it sits in an object; objects that lack
/// the key are searched in every child object.
pub fn template_key(doc: &mut Value, key: &str) {
    let Value::Object(map) = doc else {
        return;
    };
    if let Some(slot) = map.get_mut(key) {
        *slot = Value::String(format!("%{key}%"));
        return;
    }
    for child in map.values_mut() {
        template_key(child, key);
    }
}

/// Pull the value of each `key` out of `doc`.
///
/// Returns the found values in `keys` order (keys not present are skipped)
/// and a copy of `doc` with each found key templated. `doc` is untouched.
pub fn extract_placeholders(doc: &Value, keys: &[String]) -> (IndexMap<String, Value>, Value) {
    let mut found = IndexMap::new();
    let mut rewritten = doc.clone();
    for key in keys {
        if let Some(v) = find_first(&rewritten, key).cloned() {
            template_key(&mut rewritten, key);
            found.insert(key.clone(), v);
        }
    }
    (found, rewritten)
}

/// Template each `key` in `doc` without recording what was replaced.
pub fn template_keys(doc: &mut Value, keys: &[String]) {
    for key in keys {
        template_key(doc, key);
    }
}
