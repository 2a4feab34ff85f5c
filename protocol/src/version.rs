//! Dotted-triplet version parsing and comparison for the source channel's
//! version policy (spec §4.1). Deliberately narrower than a full semver
//! implementation: the wire only ever carries plain `major.minor.patch`.

use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().splitn(3, '.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().unwrap_or("0").parse().ok()?;
        // Trailing pre-release/build metadata after the patch number is ignored.
        let patch_raw = parts.next().unwrap_or("0");
        let patch_digits: String = patch_raw.chars().take_while(|c| c.is_ascii_digit()).collect();
        let patch = if patch_digits.is_empty() {
            0
        } else {
            patch_digits.parse().ok()?
        };
        Some(Self { major, minor, patch })
    }

    pub fn satisfies_minimum(&self, minimum: &Self) -> bool {
        self >= minimum
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_triplet() {
        let v = Version::parse("2.0.0").unwrap();
        assert_eq!(v, Version { major: 2, minor: 0, patch: 0 });
    }

    #[test]
    fn parses_partial_versions() {
        assert_eq!(Version::parse("2").unwrap(), Version { major: 2, minor: 0, patch: 0 });
        assert_eq!(Version::parse("2.5").unwrap(), Version { major: 2, minor: 5, patch: 0 });
    }

    #[test]
    fn ignores_prerelease_suffix_on_patch() {
        let v = Version::parse("2.0.0-beta.1").unwrap();
        assert_eq!(v.patch, 0);
    }

    #[test]
    fn compares_lexicographically_by_component() {
        assert!(Version::parse("1.9.0").unwrap() < Version::parse("2.0.0").unwrap());
        assert!(Version::parse("2.1.0").unwrap() > Version::parse("2.0.9").unwrap());
    }

    #[test]
    fn satisfies_minimum_is_inclusive() {
        let min = Version::parse("2.0.0").unwrap();
        assert!(Version::parse("2.0.0").unwrap().satisfies_minimum(&min));
        assert!(Version::parse("2.1.0").unwrap().satisfies_minimum(&min));
        assert!(!Version::parse("1.9.0").unwrap().satisfies_minimum(&min));
    }

    #[test]
    fn rejects_non_numeric_major() {
        assert!(Version::parse("vNext").is_none());
    }
}
