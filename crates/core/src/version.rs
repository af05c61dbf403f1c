//! Version extraction and comparison without a version-format dependency.
//!
//! Tool version strings in the wild are only loosely numeric ("1.2.3A",
//! "2.something"), so comparison works on raw dot-separated strings:
//! each segment is split into a numeric prefix and a lexical suffix, the
//! prefix compares numerically (an absent prefix sorts below any number,
//! so "A" sorts below "0"), the suffix compares byte-wise.
//!
//! A missing trailing segment sorts below a present one, including "0":
//! `"1.2" < "1.2.0"`. That asymmetry is intentional and pinned by tests;
//! downstream range configurations rely on it.

use std::cmp::Ordering;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Compare two version strings. Total ordering; `None` sorts lowest.
#[must_use]
pub fn compare_versions(a: Option<&str>, b: Option<&str>) -> Ordering {
    let segments_a: Vec<&str> = a.map(|s| s.split('.').collect()).unwrap_or_default();
    let segments_b: Vec<&str> = b.map(|s| s.split('.').collect()).unwrap_or_default();
    let longest = segments_a.len().max(segments_b.len());
    for i in 0..longest {
        let result = match (segments_a.get(i), segments_b.get(i)) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(sa), Some(sb)) => compare_segments(sa, sb),
        };
        if result != Ordering::Equal {
            return result;
        }
    }
    Ordering::Equal
}

/// Compare one dot-segment: numeric prefix first, then lexical suffix.
fn compare_segments(a: &str, b: &str) -> Ordering {
    let (number_a, suffix_a) = split_numeric_prefix(a);
    let (number_b, suffix_b) = split_numeric_prefix(b);
    number_a
        .cmp(&number_b)
        .then_with(|| suffix_a.cmp(suffix_b))
}

/// Split a segment into its leading digit run and the remainder.
///
/// `None` (no digits at all) sorts below every parsed number. A digit
/// run too long for u128 saturates; real versions never get there.
fn split_numeric_prefix(segment: &str) -> (Option<u128>, &str) {
    let end = segment
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(segment.len());
    let (digits, suffix) = segment.split_at(end);
    if digits.is_empty() {
        (None, suffix)
    } else {
        (Some(digits.parse::<u128>().unwrap_or(u128::MAX)), suffix)
    }
}

/// Extract a version from command output.
///
/// Scans the output line by line and returns, for the first line the
/// pattern matches in whole, the concatenation of all capture groups.
/// Returns `None` when no line matches. The match must cover the entire
/// line; compile patterns through [`VersionSpec`] to get that anchoring.
#[must_use]
pub fn parse_version_output(pattern: &Regex, output: &str) -> Option<String> {
    for line in output.lines() {
        if let Some(caps) = pattern.captures(line) {
            let whole = caps.get(0)?;
            if whole.start() != 0 || whole.end() != line.len() {
                continue;
            }
            let version: String = caps
                .iter()
                .skip(1)
                .flatten()
                .map(|group| group.as_str())
                .collect();
            return Some(version);
        }
    }
    None
}

/// Check a version against optional inclusive bounds.
///
/// Returns `Ordering::Less` when below the minimum, `Ordering::Greater`
/// when above the maximum, `Ordering::Equal` when acceptable. Empty
/// bounds count as unset. An unparseable (`None`) actual version sorts
/// lowest, so it is below any configured minimum. Never errors.
#[must_use]
pub fn check_version_in_range(
    min: Option<&str>,
    max: Option<&str>,
    actual: Option<&str>,
) -> Ordering {
    if let Some(min) = min.filter(|s| !s.is_empty())
        && compare_versions(actual, Some(min)) == Ordering::Less
    {
        return Ordering::Less;
    }
    if let Some(max) = max.filter(|s| !s.is_empty())
        && compare_versions(actual, Some(max)) == Ordering::Greater
    {
        return Ordering::Greater;
    }
    Ordering::Equal
}

/// How to determine an installed tool's version and which versions pass.
///
/// Holds the command to run, the pattern to extract the version from its
/// output, and the inclusive `[min, max]` bounds. All validation happens
/// at construction: the pattern must compile, at least one bound must be
/// set, and `min` must not sort above `max`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "VersionSpecConfig", into = "VersionSpecConfig")]
pub struct VersionSpec {
    command: Vec<String>,
    pattern: String,
    matcher: Regex,
    min: Option<String>,
    max: Option<String>,
}

impl VersionSpec {
    /// Create a validated version spec.
    pub fn new(
        command: Vec<String>,
        pattern: &str,
        min: Option<String>,
        max: Option<String>,
    ) -> Result<Self> {
        if command.is_empty() || command.iter().all(|part| part.trim().is_empty()) {
            return Err(Error::configuration("version command is empty"));
        }
        let min = min.filter(|s| !s.is_empty());
        let max = max.filter(|s| !s.is_empty());
        if min.is_none() && max.is_none() {
            return Err(Error::configuration(
                "at least one of the minimum and maximum versions must be set",
            ));
        }
        if let (Some(min), Some(max)) = (&min, &max)
            && compare_versions(Some(min.as_str()), Some(max.as_str())) == Ordering::Greater
        {
            return Err(Error::configuration(format!(
                "maximum version \"{max}\" must not be lower than minimum version \"{min}\""
            )));
        }
        let matcher = Regex::new(&format!("^(?:{pattern})$")).map_err(|e| {
            Error::configuration(format!("invalid version pattern '{pattern}': {e}"))
        })?;
        Ok(Self {
            command,
            pattern: pattern.to_string(),
            matcher,
            min,
            max,
        })
    }

    /// The command line that prints the version.
    #[must_use]
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// The configured pattern source.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Minimum acceptable version, if set.
    #[must_use]
    pub fn min(&self) -> Option<&str> {
        self.min.as_deref()
    }

    /// Maximum acceptable version, if set.
    #[must_use]
    pub fn max(&self) -> Option<&str> {
        self.max.as_deref()
    }

    /// Extract the version from command output.
    #[must_use]
    pub fn parse(&self, output: &str) -> Option<String> {
        parse_version_output(&self.matcher, output)
    }

    /// Check an extracted version against the configured bounds.
    #[must_use]
    pub fn check(&self, actual: Option<&str>) -> Ordering {
        check_version_in_range(self.min(), self.max(), actual)
    }
}

/// Serde mirror of [`VersionSpec`]; validation runs on deserialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct VersionSpecConfig {
    command: Vec<String>,
    pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    max: Option<String>,
}

impl TryFrom<VersionSpecConfig> for VersionSpec {
    type Error = Error;

    fn try_from(config: VersionSpecConfig) -> Result<Self> {
        VersionSpec::new(config.command, &config.pattern, config.min, config.max)
    }
}

impl From<VersionSpec> for VersionSpecConfig {
    fn from(spec: VersionSpec) -> Self {
        Self {
            command: spec.command,
            pattern: spec.pattern,
            min: spec.min,
            max: spec.max,
        }
    }
}
