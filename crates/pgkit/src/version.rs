//! PostgreSQL version strings as found under the configuration root.
//!
//! Debian-style layouts name version directories `9.4`, `9.6`, `10`, `14`.
//! Comparison is numeric and component-wise, so `9.10 > 9.4` and `10 > 9.6`.

use crate::error::{Error, Result};
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A `major[.minor]` PostgreSQL version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PgVersion {
    /// Major component
    pub major: u32,
    /// Minor component (0 when the directory has none)
    pub minor: u32,
}

impl PgVersion {
    /// Create a version from its components.
    pub fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Extract the version from `psql --version` output.
    ///
    /// Accepts `psql (PostgreSQL) 9.4.26` and
    /// `psql (PostgreSQL) 14.9 (Ubuntu 14.9-0ubuntu0.22.04.1)`.
    pub fn from_client_output(output: &str) -> Result<Self> {
        let token = output
            .split_whitespace()
            .find(|t| t.chars().next().is_some_and(|c| c.is_ascii_digit()))
            .ok_or_else(|| Error::InvalidVersion(output.trim().to_string()))?;

        let mut parts = token.split('.');
        let major = parse_component(parts.next(), output)?;
        let minor = match parts.next() {
            Some(p) => parse_component(Some(p), output)?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

fn parse_component(part: Option<&str>, original: &str) -> Result<u32> {
    let digits: String = part
        .unwrap_or_default()
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits
        .parse()
        .map_err(|_| Error::InvalidVersion(original.trim().to_string()))
}

impl FromStr for PgVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidVersion(s.to_string());

        let (major, minor) = match s.split_once('.') {
            Some((major, minor)) => (major, Some(minor)),
            None => (s, None),
        };

        let major: u32 = major.parse().map_err(|_| invalid())?;
        let minor: u32 = match minor {
            Some(m) => m.parse().map_err(|_| invalid())?,
            None => 0,
        };

        Ok(Self { major, minor })
    }
}

impl Ord for PgVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.major
            .cmp(&other.major)
            .then(self.minor.cmp(&other.minor))
    }
}

impl PartialOrd for PgVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PgVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.major >= 10 && self.minor == 0 {
            write!(f, "{}", self.major)
        } else {
            write!(f, "{}.{}", self.major, self.minor)
        }
    }
}

/// Keep the entries of `versions` that are at least `minimum`, in their
/// original order. Entries that do not parse as versions are dropped.
pub fn filter_compatible(versions: &[String], minimum: PgVersion) -> Vec<String> {
    versions
        .iter()
        .filter(|v| v.parse::<PgVersion>().is_ok_and(|parsed| parsed >= minimum))
        .cloned()
        .collect()
}
