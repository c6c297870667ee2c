//! Stemcell version parsing.
//!
//! The feed publishes versions such as `1.682`, `45.6` or `1.682.0`. Every
//! comparison and gallery lookup uses the normalized `major.minor.patch`
//! form, never the raw feed string.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::VersionError;

/// A normalized `(major, minor, patch)` stemcell version.
///
/// Field order matters: the derived `Ord` compares major, then minor, then
/// patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StemcellVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl StemcellVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse a feed version string permissively.
    ///
    /// Minor and patch default to `0` when omitted. A trailing
    /// `-prerelease` or `+build` suffix is accepted and dropped.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let invalid = |reason: &'static str| VersionError {
            raw: raw.to_owned(),
            reason,
        };

        let trimmed = raw.trim();
        let core = trimmed
            .split_once(['-', '+'])
            .map_or(trimmed, |(core, _)| core);
        if core.is_empty() {
            return Err(invalid("empty version"));
        }

        let mut parts = [0u64; 3];
        let mut count = 0;
        for segment in core.split('.') {
            if count == parts.len() {
                return Err(invalid("more than three numeric components"));
            }
            parts[count] = parse_component(segment).map_err(invalid)?;
            count += 1;
        }

        Ok(Self::new(parts[0], parts[1], parts[2]))
    }
}

fn parse_component(segment: &str) -> Result<u64, &'static str> {
    if segment.is_empty() {
        return Err("empty numeric component");
    }
    if !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err("non-numeric component");
    }
    if segment.len() > 1 && segment.starts_with('0') {
        return Err("leading zero in numeric component");
    }
    segment.parse().map_err(|_| "numeric component out of range")
}

impl fmt::Display for StemcellVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for StemcellVersion {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for StemcellVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for StemcellVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("1.682.0", (1, 682, 0), "1.682.0")]
    #[case("45.6", (45, 6, 0), "45.6.0")]
    #[case("621", (621, 0, 0), "621.0.0")]
    #[case("1.2.3-rc.1", (1, 2, 3), "1.2.3")]
    #[case("1.2+build.7", (1, 2, 0), "1.2.0")]
    #[case(" 0.0.1 ", (0, 0, 1), "0.0.1")]
    fn parses_and_normalizes(
        #[case] raw: &str,
        #[case] triple: (u64, u64, u64),
        #[case] formatted: &str,
    ) {
        let version = StemcellVersion::parse(raw).expect("parse");
        assert_eq!((version.major, version.minor, version.patch), triple);
        assert_eq!(version.to_string(), formatted);
    }

    #[rstest]
    #[case("")]
    #[case("latest")]
    #[case("1..2")]
    #[case("1.2.3.4")]
    #[case("01.2")]
    #[case("1.x")]
    #[case("99999999999999999999")]
    fn rejects_malformed(#[case] raw: &str) {
        let err = StemcellVersion::parse(raw).unwrap_err();
        assert_eq!(err.raw, raw);
    }

    #[test]
    fn ordering_is_numeric_not_lexical() {
        let older = StemcellVersion::parse("1.99").unwrap();
        let newer = StemcellVersion::parse("1.682.0").unwrap();
        assert!(newer > older);
        assert_eq!(
            StemcellVersion::parse("45.6").unwrap(),
            StemcellVersion::parse("45.6.0").unwrap()
        );
    }

    #[test]
    fn serde_uses_normalized_string() {
        let version = StemcellVersion::new(1, 682, 0);
        let json = serde_json::to_string(&version).unwrap();
        assert_eq!(json, "\"1.682.0\"");
        let back: StemcellVersion = serde_json::from_str("\"1.682\"").unwrap();
        assert_eq!(back, version);
    }
}
