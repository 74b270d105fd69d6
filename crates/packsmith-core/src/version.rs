use crate::error::{PackError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Dotted-integer schema version (`1.20.4`), ordered component-wise.
///
/// Comparison follows tuple semantics: a shorter version that is a prefix of a
/// longer one sorts first (`1.20 < 1.20.1`), and `1.9 < 1.10`.
#[derive(Debug, Clone)]
pub struct SchemaVersion {
    raw: String,
    parts: Vec<u32>,
}

impl SchemaVersion {
    pub fn parse(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(PackError::InvalidVersion(s.to_string()));
        }
        let parts = trimmed
            .split('.')
            .map(|p| p.parse::<u32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|_| PackError::InvalidVersion(s.to_string()))?;
        Ok(Self {
            raw: trimmed.to_string(),
            parts,
        })
    }

    /// The version as originally written (used in directory and artifact names).
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for SchemaVersion {
    type Err = PackError;
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.parts == other.parts
    }
}

impl Eq for SchemaVersion {}

impl std::hash::Hash for SchemaVersion {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.parts.hash(state);
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.parts.cmp(&other.parts)
    }
}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_not_lexical() {
        let a = SchemaVersion::parse("1.9").unwrap();
        let b = SchemaVersion::parse("1.10").unwrap();
        assert!(a < b);
    }

    #[test]
    fn prefix_sorts_first() {
        let a = SchemaVersion::parse("1.20").unwrap();
        let b = SchemaVersion::parse("1.20.1").unwrap();
        assert!(a < b);
        assert_eq!(a.as_str(), "1.20");
    }

    #[test]
    fn rejects_garbage() {
        assert!(SchemaVersion::parse("").is_err());
        assert!(SchemaVersion::parse("1.x").is_err());
        assert!(SchemaVersion::parse("1..2").is_err());
    }
}
