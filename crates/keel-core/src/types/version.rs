//! Feature and platform version type.
//!
//! Feature manifests carry OSGi style versions (`1.0.0.qualifier`) while
//! short names and platform identifiers carry two-component versions
//! (`servlet-4.0`, `jakartaee-10.0`). Both parse into the same [`Version`],
//! which remembers how many numeric components it was written with so that
//! it renders back the way it was declared.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use thiserror::Error;

/// Version (major[.minor[.patch]][.qualifier])
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub qualifier: Option<String>,
    /// Number of numeric components in the declared form (1..=3)
    precision: u8,
}

/// Version parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("Invalid version format: {input}")]
    InvalidFormat { input: String },

    #[error("Invalid number in version: {component}")]
    InvalidNumber { component: String },
}

impl Version {
    /// Create a new three-component version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            qualifier: None,
            precision: 3,
        }
    }

    /// Create a two-component version such as a platform version (`10.0`)
    pub fn major_minor(major: u64, minor: u64) -> Self {
        Self {
            major,
            minor,
            patch: 0,
            qualifier: None,
            precision: 2,
        }
    }

    /// Check whether the text looks like a version (starts with a digit)
    pub fn looks_like_version(text: &str) -> bool {
        text.chars().next().is_some_and(|c| c.is_ascii_digit())
    }

    fn numeric_cmp(&self, other: &Self) -> Ordering {
        match (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch)) {
            Ordering::Equal => match (&self.qualifier, &other.qualifier) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less, // empty qualifier sorts first
                (Some(_), None) => Ordering::Greater,
                (Some(a), Some(b)) => a.cmp(b),
            },
            other => other,
        }
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
            });
        }

        let parts: Vec<&str> = input.splitn(4, '.').collect();
        let mut numbers = [0u64; 3];
        let mut precision = 0u8;
        let mut qualifier = None;

        for (index, part) in parts.iter().enumerate() {
            if index == 3 || (index > 0 && !Version::looks_like_version(part)) {
                // OSGi qualifier: everything after the numeric components
                qualifier = Some(parts[index..].join("."));
                break;
            }
            numbers[index] = part.parse().map_err(|_| VersionError::InvalidNumber {
                component: part.to_string(),
            })?;
            precision += 1;
        }

        if qualifier.as_deref() == Some("") {
            return Err(VersionError::InvalidFormat {
                input: input.to_string(),
            });
        }

        Ok(Version {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            qualifier,
            precision,
        })
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.major)?;
        if self.precision >= 2 {
            write!(f, ".{}", self.minor)?;
        }
        if self.precision >= 3 {
            write!(f, ".{}", self.patch)?;
        }
        if let Some(ref qualifier) = self.qualifier {
            write!(f, ".{}", qualifier)?;
        }
        Ok(())
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.numeric_cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.major, self.minor, self.patch).hash(state);
        self.qualifier.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.numeric_cmp(other)
    }
}
