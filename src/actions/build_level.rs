//! Release channel of a build.

use chrono::NaiveDate;
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// How far along the release track a build is.
///
/// Ordered: `Alpha < Beta < Release`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum BuildLevel {
    /// Nightly/development build. Never notarized or uploaded.
    #[default]
    Alpha,
    /// Public beta
    Beta,
    /// Final release
    Release,
}

impl BuildLevel {
    /// Numeric value passed to CMake (`0`, `1`, `2`).
    pub fn value(&self) -> u8 {
        match self {
            BuildLevel::Alpha => 0,
            BuildLevel::Beta => 1,
            BuildLevel::Release => 2,
        }
    }

    /// Channel name used in artifact names; empty for releases.
    pub fn suffix(&self) -> &'static str {
        match self {
            BuildLevel::Alpha => "alpha",
            BuildLevel::Beta => "beta",
            BuildLevel::Release => "",
        }
    }

    /// Whether this is a development build.
    pub fn is_alpha(&self) -> bool {
        *self == BuildLevel::Alpha
    }
}

/// Parsing never fails: anything other than `beta` or `release` is alpha.
impl FromStr for BuildLevel {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim() {
            "beta" => BuildLevel::Beta,
            "release" => BuildLevel::Release,
            _ => BuildLevel::Alpha,
        })
    }
}

impl fmt::Display for BuildLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildLevel::Release => f.write_str("release"),
            other => f.write_str(other.suffix()),
        }
    }
}

/// Suffix appended to pre-release artifact versions.
///
/// `-<alpha|beta>-YYYYMMDD+<revision>`, or empty for releases.
pub fn build_suffix(level: BuildLevel, date: NaiveDate, revision: &str) -> String {
    match level {
        BuildLevel::Release => String::new(),
        _ => format!("-{}-{}+{}", level.suffix(), date.format("%Y%m%d"), revision.trim()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults_to_alpha() {
        assert_eq!("beta".parse::<BuildLevel>(), Ok(BuildLevel::Beta));
        assert_eq!("release".parse::<BuildLevel>(), Ok(BuildLevel::Release));
        assert_eq!("alpha".parse::<BuildLevel>(), Ok(BuildLevel::Alpha));
        assert_eq!("nightly".parse::<BuildLevel>(), Ok(BuildLevel::Alpha));
        assert_eq!("".parse::<BuildLevel>(), Ok(BuildLevel::Alpha));
    }

    #[test]
    fn test_values_and_suffixes() {
        assert_eq!(BuildLevel::Alpha.value(), 0);
        assert_eq!(BuildLevel::Beta.value(), 1);
        assert_eq!(BuildLevel::Release.value(), 2);
        assert_eq!(BuildLevel::Release.suffix(), "");
        assert!(BuildLevel::Alpha < BuildLevel::Release);
    }

    #[test]
    fn test_build_suffix() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        assert_eq!(build_suffix(BuildLevel::Beta, date, "abc1234\n"), "-beta-20240307+abc1234");
        assert_eq!(build_suffix(BuildLevel::Alpha, date, "f00"), "-alpha-20240307+f00");
        assert_eq!(build_suffix(BuildLevel::Release, date, "f00"), "");
    }
}
