//! Feature content installation and removal
//!
//! One feature is installed at a time. Every file is written through
//! [`safe_join`] under the target root, and a failure part way through
//! restores exactly the files this feature touched.

use std::fs;
use std::path::{Path, PathBuf};

use keel_catalog::{render_manifest, EsaArchive};
use keel_core::error::KeelError;
use keel_core::types::{FeatureManifest, InstallFailure, InstallTarget, InstalledFeatureRecord, InstalledFile};
use keel_core::utils::hash::{blake3_hash, file_matches_digest};
use keel_core::utils::path::{safe_join, to_slash};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::layout::InstallLayout;
use crate::InstallResult;

/// Result of removing one feature
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UninstallReport {
    pub symbolic_name: String,
    pub removed: Vec<String>,
    /// Files changed since installation, left in place
    pub modified: Vec<String>,
}

/// Writes feature content into an installation
#[derive(Debug, Clone)]
pub struct Installer {
    layout: InstallLayout,
}

/// A write that rollback has to undo
enum Written {
    Created(PathBuf),
    Replaced { path: PathBuf, previous: Vec<u8> },
}

impl Installer {
    pub fn new(layout: InstallLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &InstallLayout {
        &self.layout
    }

    /// Install one feature's content and manifest into `target`
    pub fn install(
        &self,
        manifest: &FeatureManifest,
        esa: &EsaArchive,
        target: &InstallTarget,
    ) -> Result<InstalledFeatureRecord, InstallFailure> {
        let mut written = Vec::new();
        match self.write_feature(manifest, esa, target, &mut written) {
            Ok(files) => {
                info!(feature = %manifest.short_name, %target, files = files.len(), "feature installed");
                Ok(InstalledFeatureRecord::new(manifest, target.clone(), files))
            },
            Err(error) => {
                warn!(feature = %manifest.short_name, %error, "install failed, rolling back");
                rollback(written);
                Err(InstallFailure::Partial(error.to_string()))
            },
        }
    }

    fn write_feature(
        &self,
        manifest: &FeatureManifest,
        esa: &EsaArchive,
        target: &InstallTarget,
        written: &mut Vec<Written>,
    ) -> InstallResult<Vec<InstalledFile>> {
        let root = self.layout.ensure_target(target)?;
        let mut files = Vec::with_capacity(manifest.content.len() + 1);

        for entry in &manifest.content {
            let dest = safe_join(&root, Path::new(&entry.path))?;
            let contents = esa.read_entry(&entry.locator)?;
            files.push(self.write_file(&dest, &contents, written)?);
        }

        let manifest_path = root.join("lib").join("features").join(manifest.manifest_file_name());
        files.push(self.write_file(&manifest_path, render_manifest(manifest).as_bytes(), written)?);
        Ok(files)
    }

    fn write_file(&self, dest: &Path, contents: &[u8], written: &mut Vec<Written>) -> InstallResult<InstalledFile> {
        let digest = blake3_hash(contents);
        let record = InstalledFile {
            path: self.record_path(dest),
            digest: digest.clone(),
        };

        if dest.is_file() {
            if file_matches_digest(dest, &digest)? {
                debug!(path = %dest.display(), "identical file already present");
                return Ok(record);
            }
            let previous = fs::read(dest)
                .map_err(|e| KeelError::io(format!("Failed to read {}", dest.display()), e))?;
            fs::write(dest, contents)
                .map_err(|e| KeelError::io(format!("Failed to write {}", dest.display()), e))?;
            written.push(Written::Replaced {
                path: dest.to_path_buf(),
                previous,
            });
            return Ok(record);
        }

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| KeelError::io(format!("Failed to create {}", parent.display()), e))?;
        }
        fs::write(dest, contents).map_err(|e| KeelError::io(format!("Failed to write {}", dest.display()), e))?;
        written.push(Written::Created(dest.to_path_buf()));
        Ok(record)
    }

    /// Remove a recorded feature's files.
    ///
    /// Files whose digest no longer matches were changed after install and
    /// are kept.
    pub fn uninstall(&self, record: &InstalledFeatureRecord) -> InstallResult<UninstallReport> {
        let mut report = UninstallReport {
            symbolic_name: record.symbolic_name.clone(),
            ..UninstallReport::default()
        };

        for file in &record.files {
            let path = self.resolve_record_path(&file.path)?;
            if !path.exists() {
                continue;
            }
            if file_matches_digest(&path, &file.digest)? {
                fs::remove_file(&path)
                    .map_err(|e| KeelError::io(format!("Failed to remove {}", path.display()), e))?;
                report.removed.push(file.path.clone());
            } else {
                warn!(path = %path.display(), "file modified since install, keeping it");
                report.modified.push(file.path.clone());
            }
        }

        info!(
            feature = %record.short_name,
            removed = report.removed.len(),
            kept = report.modified.len(),
            "feature uninstalled"
        );
        Ok(report)
    }

    /// Install-dir relative slash path, or the absolute path for targets
    /// outside the installation
    fn record_path(&self, path: &Path) -> String {
        match path.strip_prefix(self.layout.install_dir()) {
            Ok(relative) => to_slash(relative),
            Err(_) => path.display().to_string(),
        }
    }

    fn resolve_record_path(&self, recorded: &str) -> InstallResult<PathBuf> {
        let path = Path::new(recorded);
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            safe_join(self.layout.install_dir(), path)
        }
    }
}

fn rollback(written: Vec<Written>) {
    for write in written.into_iter().rev() {
        let result = match &write {
            Written::Created(path) => fs::remove_file(path),
            Written::Replaced { path, previous } => fs::write(path, previous),
        };
        if let Err(error) = result {
            let path = match &write {
                Written::Created(path) | Written::Replaced { path, .. } => path,
            };
            warn!(path = %path.display(), %error, "rollback could not restore file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_catalog::write_esa;
    use keel_core::types::{ContentEntry, Version};
    use tempfile::tempdir;

    fn manifest() -> FeatureManifest {
        FeatureManifest::new("com.example.a-1.0", "a-1.0", Version::new(1, 0, 0))
            .with_content("lib/a.jar")
            .with_content("lib/nested/b.jar")
    }

    fn archive(manifest: &FeatureManifest) -> EsaArchive {
        let bytes = write_esa(manifest, &[("lib/a.jar", b"a"), ("lib/nested/b.jar", b"b")]).unwrap();
        EsaArchive::from_bytes(bytes, "a.esa")
    }

    #[test]
    fn test_install_writes_content_and_manifest() {
        let dir = tempdir().unwrap();
        let installer = Installer::new(InstallLayout::new(dir.path()));
        let manifest = manifest();

        let record = installer
            .install(&manifest, &archive(&manifest), &InstallTarget::Usr)
            .unwrap();

        let root = dir.path().join("usr/extension");
        assert_eq!(fs::read(root.join("lib/a.jar")).unwrap(), b"a");
        assert_eq!(fs::read(root.join("lib/nested/b.jar")).unwrap(), b"b");
        assert!(root.join("lib/features/com.example.a-1.0.mf").is_file());

        let paths: Vec<&str> = record.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "usr/extension/lib/a.jar",
                "usr/extension/lib/nested/b.jar",
                "usr/extension/lib/features/com.example.a-1.0.mf"
            ]
        );
        assert_eq!(record.files[0].digest, blake3_hash(b"a"));
    }

    #[test]
    fn test_failed_install_rolls_back() {
        let dir = tempdir().unwrap();
        let installer = Installer::new(InstallLayout::new(dir.path()));
        let mut manifest = manifest();
        manifest.content.push(ContentEntry {
            path: "lib/missing.jar".to_string(),
            locator: "lib/missing.jar".to_string(),
        });

        let root = dir.path().join("usr/extension");
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("lib/a.jar"), b"previous").unwrap();

        let failure = installer
            .install(&manifest, &archive(&manifest), &InstallTarget::Usr)
            .unwrap_err();
        assert!(matches!(failure, InstallFailure::Partial(_)));
        assert_eq!(fs::read(root.join("lib/a.jar")).unwrap(), b"previous");
        assert!(!root.join("lib/nested/b.jar").exists());
        assert!(!root.join("lib/features/com.example.a-1.0.mf").exists());
    }

    #[test]
    fn test_traversal_is_refused() {
        let dir = tempdir().unwrap();
        let installer = Installer::new(InstallLayout::new(dir.path().join("wlp")));
        let mut manifest = FeatureManifest::new("com.example.evil-1.0", "evil-1.0", Version::new(1, 0, 0));
        manifest.content.push(ContentEntry {
            path: "../../../escaped.txt".to_string(),
            locator: "x".to_string(),
        });
        let esa = EsaArchive::from_bytes(write_esa(&manifest, &[("x", b"x")]).unwrap(), "evil.esa");

        assert!(installer.install(&manifest, &esa, &InstallTarget::Usr).is_err());
        assert!(!dir.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_uninstall_keeps_modified_files() {
        let dir = tempdir().unwrap();
        let installer = Installer::new(InstallLayout::new(dir.path()));
        let manifest = manifest();
        let record = installer
            .install(&manifest, &archive(&manifest), &InstallTarget::Usr)
            .unwrap();

        let edited = dir.path().join("usr/extension/lib/a.jar");
        fs::write(&edited, b"edited").unwrap();

        let report = installer.uninstall(&record).unwrap();
        assert_eq!(report.modified, vec!["usr/extension/lib/a.jar".to_string()]);
        assert_eq!(report.removed.len(), 2);
        assert!(edited.exists());
        assert!(!dir.path().join("usr/extension/lib/nested/b.jar").exists());
    }
}
