//! Feature request tokens.

use super::manifest::versionless_name;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A requested feature, as written in configuration or a manifest.
///
/// Exact tokens name a symbolic name or a version-qualified short name
/// (`com.example.a-1.0`, `servlet-4.0`). Versionless tokens name only the
/// base of a short name (`servlet`) and need a platform to resolve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FeatureToken {
    Exact(String),
    Versionless(String),
}

impl FeatureToken {
    /// Classify a raw token
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.contains('.') || versionless_name(raw) != raw {
            FeatureToken::Exact(raw.to_string())
        } else {
            FeatureToken::Versionless(raw.to_string())
        }
    }

    /// The token text as written
    pub fn as_str(&self) -> &str {
        match self {
            FeatureToken::Exact(name) | FeatureToken::Versionless(name) => name,
        }
    }

    pub fn is_versionless(&self) -> bool {
        matches!(self, FeatureToken::Versionless(_))
    }

    /// Lowercased key used for catalog lookups
    pub fn key(&self) -> String {
        self.as_str().to_ascii_lowercase()
    }
}

impl From<String> for FeatureToken {
    fn from(value: String) -> Self {
        FeatureToken::parse(&value)
    }
}

impl From<&str> for FeatureToken {
    fn from(value: &str) -> Self {
        FeatureToken::parse(value)
    }
}

impl From<FeatureToken> for String {
    fn from(token: FeatureToken) -> Self {
        token.as_str().to_string()
    }
}

impl fmt::Display for FeatureToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
