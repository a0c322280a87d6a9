//! Persisted installation records.

use super::{FeatureId, FeatureManifest, InstallTarget, Platform, Version};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One feature installed by keel, persisted across invocations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledFeatureRecord {
    pub symbolic_name: String,
    pub short_name: String,
    pub version: Version,
    pub target: InstallTarget,
    /// Installed files, relative to the install directory
    pub files: Vec<InstalledFile>,
    #[serde(default)]
    pub signing_key_id: Option<String>,
    #[serde(default)]
    pub platforms: Vec<Platform>,
    pub installed_at: DateTime<Utc>,
}

/// A file written during installation and its blake3 digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledFile {
    pub path: String,
    pub digest: String,
}

impl InstalledFeatureRecord {
    /// Build a record for a manifest installed into `target`
    pub fn new(manifest: &FeatureManifest, target: InstallTarget, files: Vec<InstalledFile>) -> Self {
        Self {
            symbolic_name: manifest.symbolic_name.clone(),
            short_name: manifest.short_name.clone(),
            version: manifest.version.clone(),
            target,
            files,
            signing_key_id: manifest.signing_key_id.clone(),
            platforms: manifest.platforms.iter().cloned().collect(),
            installed_at: Utc::now(),
        }
    }

    pub fn id(&self) -> FeatureId {
        FeatureId {
            symbolic_name: self.symbolic_name.clone(),
            short_name: self.short_name.clone(),
            version: self.version.clone(),
        }
    }

    /// Check if this record describes the given manifest
    pub fn matches(&self, manifest: &FeatureManifest) -> bool {
        self.symbolic_name.eq_ignore_ascii_case(&manifest.symbolic_name)
            && self.version == manifest.version
    }
}
