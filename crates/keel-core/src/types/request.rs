//! Resolution request built once per invocation by the caller.

use super::{FeatureToken, Platform};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Everything the engine needs to know about what to install and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    /// Requested tokens, in declaration order
    pub tokens: Vec<FeatureToken>,
    /// Declared platforms, in declaration order
    #[serde(default)]
    pub platforms: Vec<Platform>,
    #[serde(default)]
    pub target: InstallTarget,
    #[serde(default)]
    pub accept_license: bool,
    #[serde(default)]
    pub verification: VerificationPolicy,
}

/// Where user features are installed
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum InstallTarget {
    /// `usr/extension`
    #[default]
    Usr,
    /// A named product extension location
    Extension(String),
}

/// Signature enforcement level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifyLevel {
    #[default]
    None,
    Warn,
    Enforce,
}

/// Verification policy with its trusted keys
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationPolicy {
    #[serde(default)]
    pub level: VerifyLevel,
    #[serde(default)]
    pub keys: Vec<TrustedKey>,
}

/// A public key the user trusts, fetched from `url`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedKey {
    #[serde(default)]
    pub id: Option<String>,
    pub url: String,
}

impl ResolutionRequest {
    /// Create a request for the given tokens with default options
    pub fn new<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FeatureToken>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            platforms: Vec::new(),
            target: InstallTarget::Usr,
            accept_license: false,
            verification: VerificationPolicy::default(),
        }
    }

    /// Declare a platform
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platforms.push(platform);
        self
    }

    pub fn with_target(mut self, target: InstallTarget) -> Self {
        self.target = target;
        self
    }

    pub fn with_verification(mut self, verification: VerificationPolicy) -> Self {
        self.verification = verification;
        self
    }

    pub fn accepting_license(mut self) -> Self {
        self.accept_license = true;
        self
    }
}

impl VerificationPolicy {
    /// Create a policy at the given level with no keys
    pub fn new(level: VerifyLevel) -> Self {
        Self {
            level,
            keys: Vec::new(),
        }
    }

    /// Trust a key
    pub fn with_key(mut self, id: Option<&str>, url: impl Into<String>) -> Self {
        self.keys.push(TrustedKey {
            id: id.map(str::to_string),
            url: url.into(),
        });
        self
    }

    /// Configured key ids, in declaration order
    pub fn key_ids(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().filter_map(|key| key.id.as_deref())
    }

    /// Find the trusted key with the given id (case-insensitive)
    pub fn key(&self, id: &str) -> Option<&TrustedKey> {
        self.keys
            .iter()
            .find(|key| key.id.as_deref().is_some_and(|k| k.eq_ignore_ascii_case(id)))
    }
}

impl FromStr for VerifyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(VerifyLevel::None),
            "warn" => Ok(VerifyLevel::Warn),
            "enforce" | "all" => Ok(VerifyLevel::Enforce),
            other => Err(format!("expected none, warn or enforce, got '{}'", other)),
        }
    }
}

impl fmt::Display for VerifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            VerifyLevel::None => "none",
            VerifyLevel::Warn => "warn",
            VerifyLevel::Enforce => "enforce",
        };
        f.write_str(text)
    }
}

impl FromStr for InstallTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("usr") || s.is_empty() {
            return Ok(InstallTarget::Usr);
        }
        let name = s.strip_prefix("extension:").unwrap_or(s).trim();
        if name.is_empty() || name.contains(['/', '\\']) || name == ".." {
            return Err(format!("invalid extension name '{}'", name));
        }
        Ok(InstallTarget::Extension(name.to_string()))
    }
}

impl TryFrom<String> for InstallTarget {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<InstallTarget> for String {
    fn from(target: InstallTarget) -> Self {
        target.to_string()
    }
}

impl fmt::Display for InstallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallTarget::Usr => f.write_str("usr"),
            InstallTarget::Extension(name) => write!(f, "extension:{}", name),
        }
    }
}
