//! Version schemas, bump actions, and commit classification.
//!
//! A branch declares its version schema as a string. Two families are
//! recognized:
//!
//! - numeric (`semver`, `major.minor.patch`, `major.minor.micro`): ordered
//!   numeric positions, bumped per [`BumpAction`];
//! - calendar (`yyyy.0m.micro`): year and zero-padded month from the current
//!   date, with a micro counter that resets on month rollover.
//!
//! Anything else is unrecognized and rejects allocation.

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Minimal semantic increment required to reflect a change.
///
/// Variant order is severity order: `Bump < BumpPatch < BumpMinor <
/// BumpMajor`. Comparisons throughout the engine rely on it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum BumpAction {
    /// Increment the least-significant position.
    Bump,
    BumpPatch,
    BumpMinor,
    BumpMajor,
}

/// Recognized version schema families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSchema {
    /// `major.minor.patch` numeric positions.
    Semver,
    /// `year.month.micro` with the date parts taken from the clock.
    CalVer,
}

impl VersionSchema {
    /// Parse a branch/component schema string. `None` for unrecognized.
    pub fn recognize(schema: &str) -> Option<VersionSchema> {
        match schema.trim().to_ascii_lowercase().as_str() {
            "semver" | "major.minor.patch" | "major.minor.micro" => Some(VersionSchema::Semver),
            "yyyy.0m.micro" => Some(VersionSchema::CalVer),
            _ => None,
        }
    }

    /// Whether the schema orders versions by numeric positions, making them
    /// position-comparable for bump calculation.
    pub fn is_numeric(schema: &str) -> bool {
        matches!(Self::recognize(schema), Some(VersionSchema::Semver))
    }
}

/// Parse a version string into ordered numeric positions. `None` when any
/// dot-separated part is non-numeric.
pub fn parse_numeric(version: &str) -> Option<Vec<u64>> {
    version
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Compute the next version string for a schema.
///
/// `last` is the most recently assigned version on the branch; `None` seeds
/// the line (`0.1.0` for semver, current month with micro 0 for calver).
pub fn next_version(
    schema: &str,
    last: Option<&str>,
    action: BumpAction,
    now: DateTime<Utc>,
) -> Result<String> {
    match VersionSchema::recognize(schema) {
        Some(VersionSchema::Semver) => next_semver(last, action),
        Some(VersionSchema::CalVer) => next_calver(last, now),
        None => Err(EngineError::Validation(format!(
            "unrecognized version schema: {schema}"
        ))),
    }
}

fn next_semver(last: Option<&str>, action: BumpAction) -> Result<String> {
    let last = match last {
        Some(v) => v,
        None => return Ok("0.1.0".to_string()),
    };
    let mut parts = parse_numeric(last).ok_or_else(|| {
        EngineError::Validation(format!("version {last} does not match its numeric schema"))
    })?;
    while parts.len() < 3 {
        parts.push(0);
    }
    // Bumping a position zeroes everything after it.
    let position = match action {
        BumpAction::BumpMajor => 0,
        BumpAction::BumpMinor => 1,
        BumpAction::BumpPatch => 2,
        BumpAction::Bump => parts.len() - 1,
    };
    parts[position] += 1;
    for later in parts.iter_mut().skip(position + 1) {
        *later = 0;
    }
    Ok(parts
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join("."))
}

fn next_calver(last: Option<&str>, now: DateTime<Utc>) -> Result<String> {
    let year = now.year();
    let month = now.month();
    // Micro continues within the same month and resets on rollover. The bump
    // action never changes the rendered date parts.
    let micro = match last.and_then(parse_numeric) {
        Some(parts) if parts.len() == 3 && parts[0] == year as u64 && parts[1] == month as u64 => {
            parts[2] + 1
        }
        _ => 0,
    };
    Ok(format!("{year}.{month:02}.{micro}"))
}

// ---------------------------------------------------------------------------
// Commit classification
// ---------------------------------------------------------------------------

/// Classifies one commit message into the bump action it warrants.
pub trait CommitActionClassifier: Send + Sync {
    fn classify(&self, message: &str) -> BumpAction;
}

/// Conventional-commit prefix parser.
///
/// `feat` maps to minor, `fix`/`perf` to patch, a `!` marker or a
/// `BREAKING CHANGE` footer to major; everything else is the plain bump.
pub struct ConventionalCommitClassifier {
    header: Regex,
}

impl Default for ConventionalCommitClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ConventionalCommitClassifier {
    pub fn new() -> Self {
        // Static pattern, compiles by construction.
        let header = Regex::new(r"(?i)^([a-z]+)(\([^)]*\))?(!)?:").expect("static pattern");
        Self { header }
    }
}

impl CommitActionClassifier for ConventionalCommitClassifier {
    fn classify(&self, message: &str) -> BumpAction {
        if message.contains("BREAKING CHANGE") || message.contains("BREAKING-CHANGE") {
            return BumpAction::BumpMajor;
        }
        let Some(caps) = self.header.captures(message.trim_start()) else {
            return BumpAction::Bump;
        };
        if caps.get(3).is_some() {
            return BumpAction::BumpMajor;
        }
        match caps[1].to_ascii_lowercase().as_str() {
            "feat" => BumpAction::BumpMinor,
            "fix" | "perf" => BumpAction::BumpPatch,
            _ => BumpAction::Bump,
        }
    }
}
