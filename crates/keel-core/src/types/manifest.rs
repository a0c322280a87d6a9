//! Feature manifest types.
//!
//! A [`FeatureManifest`] is the parsed, immutable metadata of one feature
//! artifact. Parsing the header text lives in `keel-catalog`; this module
//! only defines the data and the naming rules shared by every crate.

use super::{FeatureToken, Platform, Version};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Parsed metadata for one feature artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureManifest {
    /// Globally unique per version (`com.example.feature.servlet-4.0`)
    pub symbolic_name: String,
    /// Human-facing, version-qualified name (`servlet-4.0`)
    pub short_name: String,
    pub version: Version,
    /// Platforms this feature satisfies when referenced versionlessly
    #[serde(default)]
    pub platforms: BTreeSet<Platform>,
    /// Declared dependency tokens, in manifest order
    #[serde(default)]
    pub dependencies: Vec<FeatureToken>,
    #[serde(default)]
    pub content: Vec<ContentEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key_id: Option<String>,
    /// Detached signature locator, relative to the artifact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// License identifier that must be accepted before installation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    /// Original header text, in declaration order
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

/// One file shipped by a feature
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentEntry {
    /// Install path relative to the target root
    pub path: String,
    /// Source locator inside the artifact
    pub locator: String,
}

/// Lightweight identity of a feature used in reports
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId {
    pub symbolic_name: String,
    pub short_name: String,
    pub version: Version,
}

impl FeatureManifest {
    /// Create a manifest with required fields only
    pub fn new(symbolic_name: impl Into<String>, short_name: impl Into<String>, version: Version) -> Self {
        Self {
            symbolic_name: symbolic_name.into(),
            short_name: short_name.into(),
            version,
            platforms: BTreeSet::new(),
            dependencies: Vec::new(),
            content: Vec::new(),
            signing_key_id: None,
            signature: None,
            license: None,
            headers: IndexMap::new(),
        }
    }

    /// Identity used in reports
    pub fn id(&self) -> FeatureId {
        FeatureId {
            symbolic_name: self.symbolic_name.clone(),
            short_name: self.short_name.clone(),
            version: self.version.clone(),
        }
    }

    /// Versionless alias (`servlet` for `servlet-4.0`), lowercased
    pub fn base_name(&self) -> String {
        versionless_name(&self.short_name).to_ascii_lowercase()
    }

    /// A feature is reachable versionlessly only when it carries platform tags
    pub fn has_versionless_alias(&self) -> bool {
        !self.platforms.is_empty()
    }

    /// Check whether any of the given platforms is one this feature satisfies
    pub fn satisfies_platform(&self, platform: &Platform) -> bool {
        self.platforms.iter().any(|p| p.same_release(platform))
    }

    /// Check whether the manifest carries any signing metadata
    pub fn is_signed(&self) -> bool {
        self.signing_key_id.is_some() || self.signature.is_some()
    }

    /// File name of the manifest inside `lib/features`.
    ///
    /// The name always ends with `.<shortName>.mf` so listing-based checks
    /// on the short name succeed.
    pub fn manifest_file_name(&self) -> String {
        let suffix = format!(".{}", self.short_name);
        if self.symbolic_name == self.short_name
            || self.symbolic_name.to_ascii_lowercase().ends_with(&suffix.to_ascii_lowercase())
        {
            format!("{}.mf", self.symbolic_name)
        } else {
            format!("{}.{}.mf", self.symbolic_name, self.short_name)
        }
    }

    /// Add a platform tag
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platforms.insert(platform);
        self
    }

    /// Add a dependency token
    pub fn with_dependency(mut self, token: impl Into<FeatureToken>) -> Self {
        self.dependencies.push(token.into());
        self
    }

    /// Add a content entry whose locator equals its install path
    pub fn with_content(mut self, path: impl Into<String>) -> Self {
        let path = path.into();
        self.content.push(ContentEntry {
            locator: path.clone(),
            path,
        });
        self
    }

    /// Require a signature from the given key
    pub fn signed_by(mut self, key_id: impl Into<String>) -> Self {
        self.signing_key_id = Some(key_id.into());
        self
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.short_name, self.version)
    }
}

/// Strip a trailing `-<version>` from a short name (`servlet-4.0` -> `servlet`)
pub fn versionless_name(short_name: &str) -> &str {
    match short_name.rsplit_once('-') {
        Some((base, version)) if !base.is_empty() && Version::looks_like_version(version) => base,
        _ => short_name,
    }
}

/// Default short name: last `.`-segment of the symbolic name
pub fn default_short_name(symbolic_name: &str) -> &str {
    // Versions contain dots, so take the segment after the last dot that
    // is not followed by a version component.
    let mut short = symbolic_name;
    for (index, _) in symbolic_name.match_indices('.') {
        let rest = &symbolic_name[index + 1..];
        if !Version::looks_like_version(rest) {
            short = rest;
        }
    }
    short
}
