//! Prepare mode: write resolved features into a directory repository
//!
//! Prepared repositories use the same layout the catalog reads, so a later
//! run can install from them with `from` pointing at the repository root.

use std::fs;
use std::path::{Path, PathBuf};

use keel_catalog::{artifact_path, index_path, FetchedArtifact, IndexEntry};
use keel_core::error::KeelError;
use keel_core::types::FeatureManifest;
use keel_core::utils::path::safe_join;
use tracing::{debug, info};

use crate::InstallResult;

/// Collects artifacts for one repository and writes its index at the end
#[derive(Debug)]
pub struct Preparer {
    repo_root: PathBuf,
    runtime_version: String,
    entries: Vec<IndexEntry>,
}

impl Preparer {
    pub fn new(repo_root: impl Into<PathBuf>, runtime_version: impl Into<String>) -> Self {
        Self {
            repo_root: repo_root.into(),
            runtime_version: runtime_version.into(),
            entries: Vec::new(),
        }
    }

    pub fn repo_root(&self) -> &Path {
        &self.repo_root
    }

    /// Copy one artifact, and its signature when present, into the repository
    pub fn add(&mut self, manifest: &FeatureManifest, artifact: &FetchedArtifact) -> InstallResult<()> {
        let relative = artifact_path(&manifest.symbolic_name, &manifest.version);
        let dest = safe_join(&self.repo_root, Path::new(&relative))?;
        write_file(&dest, artifact.esa.bytes())?;

        if let Some(signature) = &artifact.signature {
            let signature_dest = match &manifest.signature {
                Some(locator) => {
                    let dir = dest.parent().unwrap_or(&self.repo_root);
                    safe_join(dir, Path::new(locator))?
                },
                None => dest.with_extension("esa.sig"),
            };
            write_file(&signature_dest, signature)?;
        }

        debug!(feature = %manifest.short_name, artifact = %relative, "feature prepared");
        self.entries.push(IndexEntry {
            manifest: manifest.clone(),
            artifact: relative,
        });
        Ok(())
    }

    /// Merge the prepared entries into the repository index.
    ///
    /// Existing entries are kept unless the same symbolic name and version
    /// was prepared again.
    pub fn finish(self) -> InstallResult<PathBuf> {
        let index = safe_join(&self.repo_root, Path::new(&index_path(&self.runtime_version)))?;

        let mut merged: Vec<IndexEntry> = if index.is_file() {
            let text = fs::read_to_string(&index)
                .map_err(|e| KeelError::io(format!("Failed to read {}", index.display()), e))?;
            serde_json::from_str(&text).map_err(|e| KeelError::CatalogUnavailable {
                message: format!("{} is not a valid repository index: {}", index.display(), e),
            })?
        } else {
            Vec::new()
        };

        merged.retain(|existing| {
            !self.entries.iter().any(|new| {
                new.manifest
                    .symbolic_name
                    .eq_ignore_ascii_case(&existing.manifest.symbolic_name)
                    && new.manifest.version == existing.manifest.version
            })
        });
        let added = self.entries.len();
        merged.extend(self.entries);

        let content = serde_json::to_string_pretty(&merged).map_err(|e| {
            KeelError::io(
                format!("Failed to serialize {}", index.display()),
                std::io::Error::new(std::io::ErrorKind::Other, e),
            )
        })?;
        let temp = index.with_extension("json.tmp");
        write_file(&temp, content.as_bytes())?;
        fs::rename(&temp, &index)
            .map_err(|e| KeelError::io(format!("Failed to replace {}", index.display()), e))?;

        info!(index = %index.display(), added, total = merged.len(), "repository index written");
        Ok(index)
    }
}

fn write_file(path: &Path, contents: &[u8]) -> InstallResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| KeelError::io(format!("Failed to create {}", parent.display()), e))?;
    }
    fs::write(path, contents).map_err(|e| KeelError::io(format!("Failed to write {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_catalog::EsaArchive;
    use keel_core::types::Version;
    use tempfile::tempdir;

    fn artifact(signature: Option<&[u8]>) -> FetchedArtifact {
        FetchedArtifact {
            esa: EsaArchive::from_bytes(b"esa".to_vec(), "a.esa"),
            signature_locator: "a.esa.sig".to_string(),
            signature: signature.map(<[u8]>::to_vec),
        }
    }

    fn manifest(version: Version) -> FeatureManifest {
        FeatureManifest::new("com.example.a-1.0", "a-1.0", version)
    }

    #[test]
    fn test_prepare_writes_artifacts_and_index() {
        let dir = tempdir().unwrap();
        let mut preparer = Preparer::new(dir.path(), "24.0.0.9");
        preparer.add(&manifest(Version::new(1, 0, 0)), &artifact(Some(b"sig"))).unwrap();
        let index = preparer.finish().unwrap();

        let esa = dir.path().join("com/example/a-1.0/1.0.0/a-1.0-1.0.0.esa");
        assert_eq!(fs::read(&esa).unwrap(), b"esa");
        assert_eq!(fs::read(esa.with_extension("esa.sig")).unwrap(), b"sig");

        let entries: Vec<IndexEntry> = serde_json::from_str(&fs::read_to_string(index).unwrap()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].artifact, "com/example/a-1.0/1.0.0/a-1.0-1.0.0.esa");
    }

    #[test]
    fn test_signature_locator_is_honoured() {
        let dir = tempdir().unwrap();
        let mut manifest = manifest(Version::new(1, 0, 0));
        manifest.signature = Some("a.sig".to_string());

        let mut preparer = Preparer::new(dir.path(), "24.0.0.9");
        preparer.add(&manifest, &artifact(Some(b"sig"))).unwrap();
        preparer.finish().unwrap();

        assert!(dir.path().join("com/example/a-1.0/1.0.0/a.sig").is_file());
    }

    #[test]
    fn test_index_merges_with_existing() {
        let dir = tempdir().unwrap();

        let mut first = Preparer::new(dir.path(), "24.0.0.9");
        first.add(&manifest(Version::new(1, 0, 0)), &artifact(None)).unwrap();
        first.finish().unwrap();

        let mut second = Preparer::new(dir.path(), "24.0.0.9");
        second.add(&manifest(Version::new(1, 0, 0)), &artifact(None)).unwrap();
        second.add(&manifest(Version::new(1, 0, 1)), &artifact(None)).unwrap();
        let index = second.finish().unwrap();

        let entries: Vec<IndexEntry> = serde_json::from_str(&fs::read_to_string(index).unwrap()).unwrap();
        assert_eq!(entries.len(), 2);
    }
}
