//! The merged, indexed feature catalog

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use keel_core::error::{CatalogError, KeelError};
use keel_core::types::{FeatureManifest, FeatureToken, Version};
use keel_core::utils::path::{is_safe_path, safe_join, to_slash};
use serde_json::Value;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::api::{decode_index, index_path, IndexEntry};
use crate::client::RepositoryClient;
use crate::esa::{signature_path, EsaArchive};
use crate::manifest::parse_manifest;
use crate::source::{
    manifest_from_record, ArtifactOrigin, CatalogEntry, FeatureSource, InstalledFeatures, InstalledKind,
};
use crate::CatalogResult;

/// Artifact bytes and the detached signature found next to them
#[derive(Debug, Clone)]
pub struct FetchedArtifact {
    pub esa: EsaArchive,
    /// Where the signature was looked up, for diagnostics
    pub signature_locator: String,
    pub signature: Option<Vec<u8>>,
}

/// Manifests from every source, merged in priority order.
///
/// Entries are never replaced: the first source to provide a given
/// symbolic name and version owns it.
#[derive(Debug, Default)]
pub struct FeatureCatalog {
    entries: Vec<CatalogEntry>,
    seen: HashSet<(String, Version)>,
    by_symbolic: HashMap<String, Vec<usize>>,
    by_short: HashMap<String, Vec<usize>>,
    by_base: HashMap<String, Vec<usize>>,
    product_info: Vec<(String, Option<Version>)>,
    remote: Option<RepositoryClient>,
    warnings: Vec<String>,
}

impl FeatureCatalog {
    /// Build a catalog from already parsed entries
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = CatalogEntry>,
    {
        let mut catalog = Self::default();
        for entry in entries {
            catalog.insert(entry);
        }
        catalog
    }

    /// Index every source, highest priority first.
    ///
    /// Bad entries and unreachable sources become warnings. The call only
    /// fails when sources other than the installation were configured and
    /// none of them could be read.
    pub async fn index(sources: Vec<FeatureSource>) -> CatalogResult<Self> {
        let mut catalog = Self::default();
        let mut external = 0;
        let mut failures = Vec::new();

        for source in sources {
            let description = source.describe();
            let before = catalog.entries.len();
            let result = match source {
                FeatureSource::Installed(installed) => {
                    catalog.index_installed(installed);
                    Ok(())
                },
                FeatureSource::EsaFiles(files) => {
                    external += 1;
                    catalog.index_esa_files(&files)
                },
                FeatureSource::Directory { root, runtime_version } => {
                    external += 1;
                    catalog.index_directory(&root, runtime_version.as_deref())
                },
                FeatureSource::Remote { client, runtime_version } => {
                    external += 1;
                    catalog.index_remote(client, &runtime_version).await
                },
            };

            match result {
                Ok(()) => info!(
                    source = %description,
                    features = catalog.entries.len() - before,
                    "indexed feature source"
                ),
                Err(error) => {
                    warn!(source = %description, %error, "feature source skipped");
                    catalog.warnings.push(error.to_string());
                    failures.push(error.to_string());
                },
            }
        }

        if external > 0 && failures.len() == external {
            return Err(KeelError::CatalogUnavailable {
                message: failures.join("; "),
            });
        }
        Ok(catalog)
    }

    /// Add an entry; returns false when the symbolic name and version are
    /// already present
    pub fn insert(&mut self, entry: CatalogEntry) -> bool {
        if !self.seen.insert(entry.identity()) {
            debug!(feature = %entry.manifest.symbolic_name, "duplicate manifest ignored");
            return false;
        }

        let index = self.entries.len();
        let manifest = &entry.manifest;
        self.by_symbolic
            .entry(manifest.symbolic_name.to_ascii_lowercase())
            .or_default()
            .push(index);
        self.by_short
            .entry(manifest.short_name.to_ascii_lowercase())
            .or_default()
            .push(index);
        if manifest.has_versionless_alias() {
            self.by_base.entry(manifest.base_name()).or_default().push(index);
        }
        self.entries.push(entry);
        true
    }

    /// Find a feature by symbolic name.
    ///
    /// When several versions share the name, an installed one wins, then
    /// the highest version.
    pub fn lookup(&self, symbolic_name: &str) -> Option<&CatalogEntry> {
        self.preferred(self.indexed(&self.by_symbolic, symbolic_name))
    }

    /// Every entry with the given version-qualified short name
    pub fn lookup_by_short_name(&self, short_name: &str) -> Vec<&CatalogEntry> {
        self.indexed(&self.by_short, short_name)
    }

    /// Entries reachable through the versionless alias `base_name`
    pub fn lookup_versionless(&self, base_name: &str) -> Vec<&CatalogEntry> {
        self.indexed(&self.by_base, base_name)
    }

    /// Resolve an exact token: symbolic name first, then short name
    pub fn lookup_exact(&self, name: &str) -> Option<&CatalogEntry> {
        self.lookup(name)
            .or_else(|| self.preferred(self.lookup_by_short_name(name)))
    }

    /// Declared dependency tokens of a manifest, in manifest order
    pub fn dependencies_of<'a>(&self, manifest: &'a FeatureManifest) -> &'a [FeatureToken] {
        &manifest.dependencies
    }

    /// Check whether this exact feature is present in the installation
    pub fn is_installed(&self, manifest: &FeatureManifest) -> bool {
        let installed_entry = self
            .indexed(&self.by_symbolic, &manifest.symbolic_name)
            .into_iter()
            .any(|entry| entry.is_installed() && entry.manifest.version == manifest.version);

        installed_entry
            || self.product_info.iter().any(|(short, version)| {
                short.eq_ignore_ascii_case(&manifest.short_name)
                    && version.as_ref().map_or(true, |v| *v == manifest.version)
            })
    }

    /// Entries already present in the installation
    pub fn installed(&self) -> impl Iterator<Item = &CatalogEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.is_installed() || self.is_installed(&entry.manifest))
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Recoverable problems met while indexing
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Fetch an entry's artifact and its detached signature, if any
    pub async fn fetch_artifact(&self, entry: &CatalogEntry) -> CatalogResult<FetchedArtifact> {
        let manifest = &entry.manifest;
        match &entry.origin {
            ArtifactOrigin::Installed(_) => Err(KeelError::CatalogUnavailable {
                message: format!("{} is installed and has no artifact to fetch", manifest.symbolic_name),
            }),
            ArtifactOrigin::EsaFile(path) => fetch_local(path, manifest),
            ArtifactOrigin::Directory { root, artifact } => {
                let path = safe_join(root, Path::new(artifact))?;
                fetch_local(&path, manifest)
            },
            ArtifactOrigin::Remote { artifact } => {
                let client = self.remote.as_ref().ok_or_else(|| KeelError::CatalogUnavailable {
                    message: format!("no remote repository configured for {}", artifact),
                })?;
                let bytes = client.download(artifact).await?;
                let esa = EsaArchive::from_bytes(bytes, client.url_for(artifact)?.to_string());
                let Some(locator) = remote_signature_locator(artifact, manifest) else {
                    let locator = manifest.signature.clone().unwrap_or_default();
                    warn!(feature = %manifest.short_name, %locator, "signature locator leaves the repository, ignored");
                    return Ok(FetchedArtifact {
                        esa,
                        signature_locator: locator,
                        signature: None,
                    });
                };
                let signature = client.download_optional(&locator).await?;
                Ok(FetchedArtifact {
                    esa,
                    signature_locator: locator,
                    signature,
                })
            },
        }
    }

    fn indexed(&self, index: &HashMap<String, Vec<usize>>, key: &str) -> Vec<&CatalogEntry> {
        index
            .get(&key.to_ascii_lowercase())
            .map(|positions| positions.iter().map(|&i| &self.entries[i]).collect())
            .unwrap_or_default()
    }

    fn preferred<'a>(&self, candidates: Vec<&'a CatalogEntry>) -> Option<&'a CatalogEntry> {
        candidates.into_iter().max_by(|a, b| {
            self.is_installed(&a.manifest)
                .cmp(&self.is_installed(&b.manifest))
                .then_with(|| a.manifest.version.cmp(&b.manifest.version))
        })
    }

    fn index_installed(&mut self, installed: InstalledFeatures) {
        let InstalledFeatures {
            product_dir,
            user_dirs,
            records,
            product_info,
        } = installed;

        if let Some(dir) = product_dir {
            for manifest in self.read_manifest_dir(&dir) {
                self.insert(CatalogEntry::installed(manifest, InstalledKind::Product));
            }
        }

        for (target, dir) in user_dirs {
            for manifest in self.read_manifest_dir(&dir) {
                self.insert(CatalogEntry::installed(manifest, InstalledKind::User(target.clone())));
            }
        }

        // Records whose manifest file disappeared still count as installed
        for record in &records {
            let entry = CatalogEntry::installed(
                manifest_from_record(record),
                InstalledKind::User(record.target.clone()),
            );
            self.insert(entry);
        }

        self.product_info = product_info
            .into_iter()
            .map(|(short, version)| (short.to_ascii_lowercase(), version))
            .collect();
    }

    fn read_manifest_dir(&mut self, dir: &Path) -> Vec<FeatureManifest> {
        let Ok(listing) = fs::read_dir(dir) else {
            return Vec::new();
        };

        let mut paths: Vec<PathBuf> = listing
            .filter_map(Result::ok)
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "mf"))
            .collect();
        paths.sort();

        let mut manifests = Vec::new();
        for path in paths {
            let origin = path.display().to_string();
            let parsed = fs::read_to_string(&path)
                .map_err(|e| CatalogError::Unreachable {
                    origin: origin.clone(),
                    reason: e.to_string(),
                })
                .and_then(|text| parse_manifest(&text, &origin));
            match parsed {
                Ok(manifest) => manifests.push(manifest),
                Err(error) => self.skip(error),
            }
        }
        manifests
    }

    fn index_esa_files(&mut self, files: &[PathBuf]) -> Result<(), CatalogError> {
        let mut readable = 0;
        for path in files {
            let archive = match EsaArchive::open(path) {
                Ok(archive) => archive,
                Err(error) => {
                    self.skip(CatalogError::Unreachable {
                        origin: path.display().to_string(),
                        reason: error.to_string(),
                    });
                    continue;
                },
            };
            readable += 1;
            match archive.manifest() {
                Ok(manifest) => {
                    self.insert(CatalogEntry::new(manifest, ArtifactOrigin::EsaFile(path.clone())));
                },
                Err(error) => self.skip(error),
            }
        }

        if readable == 0 && !files.is_empty() {
            return Err(CatalogError::Unreachable {
                origin: "local ESA files".to_string(),
                reason: "none of the files could be read".to_string(),
            });
        }
        Ok(())
    }

    fn index_directory(&mut self, root: &Path, runtime_version: Option<&str>) -> Result<(), CatalogError> {
        let unreachable = |reason: String| CatalogError::Unreachable {
            origin: root.display().to_string(),
            reason,
        };
        if !root.is_dir() {
            return Err(unreachable("not a directory".to_string()));
        }

        if let Some(version) = runtime_version {
            let index_file = root.join(index_path(version));
            if index_file.is_file() {
                let text = fs::read_to_string(&index_file).map_err(|e| unreachable(e.to_string()))?;
                let raw: Vec<Value> = serde_json::from_str(&text)
                    .map_err(|e| unreachable(format!("{}: {}", index_file.display(), e)))?;
                for IndexEntry { manifest, artifact } in self.decode(raw, &index_file.display().to_string()) {
                    let origin = ArtifactOrigin::Directory {
                        root: root.to_path_buf(),
                        artifact,
                    };
                    self.insert(CatalogEntry::new(manifest, origin));
                }
                return Ok(());
            }
        }

        // No index: every ESA under the root is a candidate
        let mut archives: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "esa"))
            .collect();
        archives.sort();

        for path in archives {
            let parsed = EsaArchive::open(&path)
                .map_err(|e| CatalogError::malformed(path.display().to_string(), e.to_string()))
                .and_then(|archive| archive.manifest());
            match parsed {
                Ok(manifest) => {
                    let artifact = to_slash(path.strip_prefix(root).unwrap_or(&path));
                    let origin = ArtifactOrigin::Directory {
                        root: root.to_path_buf(),
                        artifact,
                    };
                    self.insert(CatalogEntry::new(manifest, origin));
                },
                Err(error) => self.skip(error),
            }
        }
        Ok(())
    }

    async fn index_remote(&mut self, client: RepositoryClient, runtime_version: &str) -> Result<(), CatalogError> {
        let raw = client
            .fetch_index(runtime_version)
            .await
            .map_err(|e| CatalogError::Unreachable {
                origin: client.base_url().to_string(),
                reason: e.to_string(),
            })?;

        let origin = format!("{}{}", client.base_url(), index_path(runtime_version));
        for IndexEntry { manifest, artifact } in self.decode(raw, &origin) {
            self.insert(CatalogEntry::new(manifest, ArtifactOrigin::Remote { artifact }));
        }
        self.remote = Some(client);
        Ok(())
    }

    /// Keep the index entries that decode; each bad one becomes a warning
    fn decode(&mut self, raw: Vec<Value>, origin: &str) -> Vec<IndexEntry> {
        let (entries, errors) = decode_index(raw, origin);
        for error in errors {
            self.skip(error);
        }
        entries
    }

    fn skip(&mut self, error: CatalogError) {
        warn!(%error, "catalog entry skipped");
        self.warnings.push(error.to_string());
    }
}

fn fetch_local(path: &Path, manifest: &FeatureManifest) -> CatalogResult<FetchedArtifact> {
    let esa = EsaArchive::open(path)?;
    let Some(signature_file) = signature_path(path, manifest) else {
        let locator = manifest.signature.clone().unwrap_or_default();
        warn!(feature = %manifest.short_name, %locator, "signature locator leaves the repository, ignored");
        return Ok(FetchedArtifact {
            esa,
            signature_locator: locator,
            signature: None,
        });
    };
    let signature = match fs::read(&signature_file) {
        Ok(bytes) => Some(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => {
            return Err(KeelError::io(
                format!("Failed to read signature {}", signature_file.display()),
                e,
            ))
        },
    };
    Ok(FetchedArtifact {
        esa,
        signature_locator: signature_file.display().to_string(),
        signature,
    })
}

/// Repository-relative signature path; `None` when a `WLP-Signature`
/// locator leaves the artifact's directory
fn remote_signature_locator(artifact: &str, manifest: &FeatureManifest) -> Option<String> {
    match &manifest.signature {
        Some(locator) if !is_safe_path(Path::new(locator)) => None,
        Some(locator) => Some(match artifact.rsplit_once('/') {
            Some((dir, _)) => format!("{}/{}", dir, locator),
            None => locator.clone(),
        }),
        None => Some(format!("{}.sig", artifact)),
    }
}

#[cfg(test)]
mod tests;
