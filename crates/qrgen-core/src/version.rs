use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseVersionError {
    #[error("version string is empty")]
    Empty,
    #[error("version '{input}' has an empty segment at position {position}")]
    EmptySegment { input: String, position: usize },
    #[error("version '{input}' has a non-numeric segment '{segment}'")]
    InvalidSegment { input: String, segment: String },
}

/// Dotted numeric release identifier such as `1.0.2`.
///
/// Equality and ordering treat missing trailing segments as zero, so `1.2`
/// and `1.2.0` are the same version.
#[derive(Debug, Clone)]
pub struct VersionIdentifier {
    segments: Vec<u64>,
}

impl VersionIdentifier {
    /// Parse a dotted version string. Surrounding whitespace is ignored.
    ///
    /// # Errors
    /// Returns an error for empty input, empty segments (including leading or
    /// trailing dots) and segments that are not plain ASCII digits.
    pub fn parse(input: &str) -> Result<Self, ParseVersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ParseVersionError::Empty);
        }

        let segments = trimmed
            .split('.')
            .enumerate()
            .map(|(position, segment)| parse_segment(trimmed, position, segment))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { segments })
    }

    #[must_use]
    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    fn significant(&self) -> &[u64] {
        let len = self
            .segments
            .iter()
            .rposition(|&segment| segment != 0)
            .map_or(0, |index| index + 1);
        &self.segments[..len]
    }
}

fn parse_segment(input: &str, position: usize, segment: &str) -> Result<u64, ParseVersionError> {
    if segment.is_empty() {
        return Err(ParseVersionError::EmptySegment {
            input: input.to_string(),
            position,
        });
    }

    if !segment.bytes().all(|byte| byte.is_ascii_digit()) {
        return Err(ParseVersionError::InvalidSegment {
            input: input.to_string(),
            segment: segment.to_string(),
        });
    }

    segment
        .parse::<u64>()
        .map_err(|_| ParseVersionError::InvalidSegment {
            input: input.to_string(),
            segment: segment.to_string(),
        })
}

impl FromStr for VersionIdentifier {
    type Err = ParseVersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, segment) in self.segments.iter().enumerate() {
            if index > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl Ord for VersionIdentifier {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        (0..len)
            .map(|index| {
                let left = self.segments.get(index).copied().unwrap_or(0);
                let right = other.segments.get(index).copied().unwrap_or(0);
                left.cmp(&right)
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for VersionIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for VersionIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VersionIdentifier {}

impl Hash for VersionIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    UpToDate,
    Newer,
}

/// Decide whether `latest` is an update over `current`.
///
/// Only a strictly greater `latest` counts as newer; a local build that is
/// ahead of the published marker is reported as up to date.
#[must_use]
pub fn compare(current: &VersionIdentifier, latest: &VersionIdentifier) -> Comparison {
    if latest > current {
        Comparison::Newer
    } else {
        Comparison::UpToDate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(input: &str) -> VersionIdentifier {
        VersionIdentifier::parse(input).expect("test version should parse")
    }

    fn padded(version: &VersionIdentifier, len: usize) -> Vec<u64> {
        let mut segments = version.segments().to_vec();
        segments.resize(len, 0);
        segments
    }

    #[test]
    fn test_version_comparison() {
        assert_eq!(compare(&v("1.0.1"), &v("1.0.2")), Comparison::Newer);
        assert_eq!(compare(&v("1.0.0"), &v("1.1.0")), Comparison::Newer);
        assert_eq!(compare(&v("1.9.9"), &v("2.0.0")), Comparison::Newer);
        assert_eq!(compare(&v("1.1.9"), &v("1.2")), Comparison::Newer);
        assert_eq!(compare(&v("1.0.9"), &v("1.0.10")), Comparison::Newer);
        assert_eq!(compare(&v("1.0.0"), &v("1.0.0")), Comparison::UpToDate);
        assert_eq!(compare(&v("1.2.0"), &v("1.2")), Comparison::UpToDate);
        assert_eq!(compare(&v("1.1.0"), &v("1.0.9")), Comparison::UpToDate);
        assert_eq!(compare(&v("2.0"), &v("1.99.99")), Comparison::UpToDate);
    }

    #[test]
    fn compare_matches_zero_padded_lexicographic_order() {
        let versions = [
            "0", "0.0.1", "0.1", "1", "1.0", "1.0.0", "1.0.1", "1.0.2", "1.0.10", "1.1", "1.1.0.1",
            "2", "10.0",
        ]
        .map(v);

        for current in &versions {
            for latest in &versions {
                let len = current.segments().len().max(latest.segments().len());
                let expected = if padded(latest, len) > padded(current, len) {
                    Comparison::Newer
                } else {
                    Comparison::UpToDate
                };
                assert_eq!(
                    compare(current, latest),
                    expected,
                    "compare({current}, {latest})"
                );
            }
        }
    }

    #[test]
    fn compare_is_reflexive() {
        for input in ["0", "1.0.2", "3.14.159", "1.0.0.0"] {
            let version = v(input);
            assert_eq!(compare(&version, &version), Comparison::UpToDate);
        }
    }

    #[test]
    fn trailing_zeros_are_equal_and_hash_alike() {
        use std::collections::HashSet;

        assert_eq!(v("1.2"), v("1.2.0"));
        assert_eq!(v("1.2"), v("1.2.0.0"));
        assert_ne!(v("1.2"), v("1.2.1"));

        let set: HashSet<_> = [v("1.2"), v("1.2.0"), v("1.2.0.0")].into_iter().collect();
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn parse_trims_surrounding_whitespace() {
        let version = v("  1.0.2\n");
        assert_eq!(version.segments(), &[1, 0, 2]);
        assert_eq!(version.to_string(), "1.0.2");
    }

    #[test]
    fn parse_rejects_malformed_versions() {
        assert_eq!(VersionIdentifier::parse(""), Err(ParseVersionError::Empty));
        assert_eq!(VersionIdentifier::parse("  \n"), Err(ParseVersionError::Empty));

        for input in [".1.0", "1.0.", "1..0", "."] {
            assert!(
                matches!(
                    VersionIdentifier::parse(input),
                    Err(ParseVersionError::EmptySegment { .. })
                ),
                "{input} should be rejected as having an empty segment"
            );
        }

        for input in [
            "1.a.0",
            "v1.0.2",
            "1.0-beta",
            "+1.0",
            "1.-2",
            "1 .0",
            "99999999999999999999",
        ] {
            assert!(
                matches!(
                    VersionIdentifier::parse(input),
                    Err(ParseVersionError::InvalidSegment { .. })
                ),
                "{input} should be rejected as non-numeric"
            );
        }
    }

    #[test]
    fn parse_error_messages_name_the_offending_input() {
        let error = VersionIdentifier::parse("1.x").expect_err("non-numeric should fail");
        assert_eq!(error.to_string(), "version '1.x' has a non-numeric segment 'x'");

        let error = VersionIdentifier::parse("1..2").expect_err("empty segment should fail");
        assert_eq!(
            error.to_string(),
            "version '1..2' has an empty segment at position 1"
        );
    }
}
