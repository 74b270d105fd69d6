use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// A rule whose output was abandoned; the run itself carried on.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RuleFailure {
    pub destination: String,
    pub reason: String,
}

/// Recoverable problems gathered over a build cell or an import.
///
/// Always handed back to the caller, even when the run succeeds.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct RunReport {
    /// Files referenced by rules that were not found.
    pub missing_files: Vec<PathBuf>,
    /// Identifiers referenced by rules but absent from the resolved table.
    pub missing_identifiers: Vec<String>,
    pub rule_failures: Vec<RuleFailure>,
    pub warnings: Vec<String>,
}

impl RunReport {
    pub fn missing_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.missing_files.contains(&path) {
            self.missing_files.push(path);
        }
    }

    pub fn missing_identifier(&mut self, uid: &str) {
        if !self.missing_identifiers.iter().any(|u| u == uid) {
            self.missing_identifiers.push(uid.to_string());
        }
    }

    pub fn rule_failed(&mut self, destination: &str, reason: impl ToString) {
        self.rule_failures.push(RuleFailure {
            destination: destination.to_string(),
            reason: reason.to_string(),
        });
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn merge(&mut self, other: RunReport) {
        for p in other.missing_files {
            self.missing_file(p);
        }
        for u in other.missing_identifiers {
            self.missing_identifier(&u);
        }
        self.rule_failures.extend(other.rule_failures);
        self.warnings.extend(other.warnings);
    }

    pub fn is_clean(&self) -> bool {
        self.missing_files.is_empty()
            && self.missing_identifiers.is_empty()
            && self.rule_failures.is_empty()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_clean() {
            writeln!(f, "No missing textures.")?;
        }
        if !self.missing_files.is_empty() {
            writeln!(f, "Missing textures:")?;
            for p in &self.missing_files {
                writeln!(f, "  {}", p.display())?;
            }
        }
        if !self.missing_identifiers.is_empty() {
            writeln!(f, "Unknown identifiers:")?;
            for u in &self.missing_identifiers {
                writeln!(f, "  {u}")?;
            }
        }
        if !self.rule_failures.is_empty() {
            writeln!(f, "Failed rules:")?;
            for r in &self.rule_failures {
                writeln!(f, "  {}: {}", r.destination, r.reason)?;
            }
        }
        if !self.warnings.is_empty() {
            writeln!(f, "Warnings:")?;
            for w in &self.warnings {
                writeln!(f, "  {w}")?;
            }
        }
        Ok(())
    }
}
