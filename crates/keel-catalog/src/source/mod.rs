//! Feature sources and catalog entries

use std::path::PathBuf;

use keel_core::types::{FeatureManifest, InstallTarget, InstalledFeatureRecord, Version};

use crate::client::RepositoryClient;

/// Where manifests come from, listed in priority order by the caller
#[derive(Debug, Clone)]
pub enum FeatureSource {
    /// Features already present in the runtime installation
    Installed(InstalledFeatures),
    /// Explicit local ESA files
    EsaFiles(Vec<PathBuf>),
    /// A directory repository (`from`)
    Directory {
        root: PathBuf,
        runtime_version: Option<String>,
    },
    /// The default remote repository
    Remote {
        client: RepositoryClient,
        runtime_version: String,
    },
}

/// Snapshot of what the runtime installation already has
#[derive(Debug, Clone, Default)]
pub struct InstalledFeatures {
    /// Core product manifests (`<install>/lib/features`)
    pub product_dir: Option<PathBuf>,
    /// Manifest directories of user targets, with the target they belong to
    pub user_dirs: Vec<(InstallTarget, PathBuf)>,
    /// Persisted records of features keel installed
    pub records: Vec<InstalledFeatureRecord>,
    /// Short names (and versions, when known) reported by `productInfo`
    pub product_info: Vec<(String, Option<Version>)>,
}

/// How an installed entry got onto disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstalledKind {
    /// Shipped with the runtime; never recorded or modified
    Product,
    /// Present in a user target's features directory or recorded by keel
    User(InstallTarget),
}

/// Where the artifact for an entry can be fetched
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOrigin {
    /// Already on disk, nothing to fetch
    Installed(InstalledKind),
    EsaFile(PathBuf),
    /// Artifact path relative to a directory repository root
    Directory { root: PathBuf, artifact: String },
    /// Artifact path relative to the remote repository root
    Remote { artifact: String },
}

/// One manifest in the catalog with its provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub manifest: FeatureManifest,
    pub origin: ArtifactOrigin,
}

impl CatalogEntry {
    pub fn new(manifest: FeatureManifest, origin: ArtifactOrigin) -> Self {
        Self { manifest, origin }
    }

    /// Entry for a feature already present on disk
    pub fn installed(manifest: FeatureManifest, kind: InstalledKind) -> Self {
        Self::new(manifest, ArtifactOrigin::Installed(kind))
    }

    pub fn is_installed(&self) -> bool {
        matches!(self.origin, ArtifactOrigin::Installed(_))
    }

    /// Key used for first-seen-wins deduplication
    pub(crate) fn identity(&self) -> (String, Version) {
        (
            self.manifest.symbolic_name.to_ascii_lowercase(),
            self.manifest.version.clone(),
        )
    }
}

impl FeatureSource {
    /// Short description used in logs and warnings
    pub fn describe(&self) -> String {
        match self {
            FeatureSource::Installed(_) => "installed features".to_string(),
            FeatureSource::EsaFiles(files) => format!("{} local ESA file(s)", files.len()),
            FeatureSource::Directory { root, .. } => format!("directory repository {}", root.display()),
            FeatureSource::Remote { client, .. } => format!("remote repository {}", client.base_url()),
        }
    }
}

/// Manifest reconstructed from a record when its `.mf` file is gone
pub(crate) fn manifest_from_record(record: &InstalledFeatureRecord) -> FeatureManifest {
    let mut manifest = FeatureManifest::new(
        record.symbolic_name.clone(),
        record.short_name.clone(),
        record.version.clone(),
    );
    manifest.platforms = record.platforms.iter().cloned().collect();
    manifest.signing_key_id = record.signing_key_id.clone();
    manifest
}
