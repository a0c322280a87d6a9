//! Platform identifiers (`jakartaee-10.0`, `microProfile-6.1`).

use super::version::{Version, VersionError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A named specification release that versionless features resolve against
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Platform {
    /// Platform family, compared case-insensitively
    pub name: String,
    pub version: Version,
}

impl Platform {
    /// Create a new platform
    pub fn new(name: impl Into<String>, version: Version) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }

    /// Lowercased family name used for matching
    pub fn family(&self) -> String {
        self.name.to_ascii_lowercase()
    }

    /// Check if two platforms denote the same release
    pub fn same_release(&self, other: &Platform) -> bool {
        self.name.eq_ignore_ascii_case(&other.name) && self.version == other.version
    }
}

impl FromStr for Platform {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let (name, version) = input
            .rsplit_once('-')
            .filter(|(name, version)| !name.is_empty() && Version::looks_like_version(version))
            .ok_or_else(|| VersionError::InvalidFormat {
                input: input.to_string(),
            })?;
        Ok(Platform::new(name, version.parse()?))
    }
}

impl TryFrom<String> for Platform {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Platform> for String {
    fn from(platform: Platform) -> Self {
        platform.to_string()
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.name, self.version)
    }
}

impl PartialEq for Platform {
    fn eq(&self, other: &Self) -> bool {
        self.same_release(other)
    }
}

impl Eq for Platform {}

impl Hash for Platform {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.family().hash(state);
        self.version.hash(state);
    }
}

impl PartialOrd for Platform {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Platforms order by version first, then by family name
impl Ord for Platform {
    fn cmp(&self, other: &Self) -> Ordering {
        self.version
            .cmp(&other.version)
            .then_with(|| self.family().cmp(&other.family()))
    }
}
