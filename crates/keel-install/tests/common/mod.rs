//! Shared fixtures for engine tests

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ed25519_dalek::{Signer, SigningKey};
use keel_catalog::write_esa;
use keel_core::types::{FeatureManifest, Platform};
use keel_install::{Engine, EngineOptions};
use tempfile::TempDir;

pub struct Fixture {
    _dir: TempDir,
    pub install_dir: PathBuf,
    pub repo: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let install_dir = dir.path().join("wlp");
        let repo = dir.path().join("repo");
        fs::create_dir_all(install_dir.join("lib/features")).unwrap();
        fs::create_dir_all(&repo).unwrap();
        Self {
            _dir: dir,
            install_dir,
            repo,
        }
    }

    /// Scratch directory next to the installation
    pub fn path(&self, name: &str) -> PathBuf {
        self.install_dir.parent().unwrap().join(name)
    }

    /// Options reading from the fixture repository with productInfo off
    pub fn options(&self) -> EngineOptions {
        let mut options = EngineOptions::new(&self.install_dir);
        options.from = Some(self.repo.clone());
        options.product_info.enabled = false;
        options
    }

    pub fn engine(&self) -> Engine {
        Engine::new(self.options())
    }

    /// Write a feature's ESA into the repository, with one content file
    /// per content entry
    pub fn publish(&self, manifest: &FeatureManifest) -> PathBuf {
        let contents: Vec<(String, Vec<u8>)> = manifest
            .content
            .iter()
            .map(|entry| (entry.locator.clone(), format!("{} payload", entry.locator).into_bytes()))
            .collect();
        let entries: Vec<(&str, &[u8])> = contents
            .iter()
            .map(|(locator, bytes)| (locator.as_str(), bytes.as_slice()))
            .collect();
        self.publish_with(manifest, &entries)
    }

    pub fn publish_with(&self, manifest: &FeatureManifest, entries: &[(&str, &[u8])]) -> PathBuf {
        let path = self.repo.join(format!("{}.esa", manifest.short_name));
        fs::write(&path, write_esa(manifest, entries).unwrap()).unwrap();
        path
    }

    /// Write `<esa>.sig` holding a base64 signature over the ESA bytes
    pub fn sign(&self, esa: &Path, key: &SigningKey) {
        let signature = key.sign(&fs::read(esa).unwrap()).to_bytes();
        let mut name = esa.as_os_str().to_os_string();
        name.push(".sig");
        fs::write(PathBuf::from(name), BASE64.encode(signature)).unwrap();
    }

    /// Write a trusted key file and return its path
    pub fn trust(&self, key: &SigningKey) -> String {
        let path = self.path("trusted.pub");
        fs::write(&path, BASE64.encode(key.verifying_key().to_bytes())).unwrap();
        path.display().to_string()
    }

    /// Manifest file names in `usr/extension/lib/features`
    pub fn installed_manifests(&self) -> Vec<String> {
        let dir = self.install_dir.join("usr/extension/lib/features");
        let Ok(listing) = fs::read_dir(dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = listing
            .filter_map(Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    /// Every file under the installation with its contents
    pub fn snapshot(&self) -> BTreeMap<PathBuf, Vec<u8>> {
        let mut files = BTreeMap::new();
        collect(&self.install_dir, &mut files);
        files
    }
}

fn collect(dir: &Path, files: &mut BTreeMap<PathBuf, Vec<u8>>) {
    for entry in fs::read_dir(dir).unwrap().filter_map(Result::ok) {
        let path = entry.path();
        if path.is_dir() {
            collect(&path, files);
        } else {
            files.insert(path.clone(), fs::read(&path).unwrap());
        }
    }
}

pub fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[7; 32])
}

pub fn platform(text: &str) -> Platform {
    text.parse().unwrap()
}

/// `com.example.<short>` shipping `lib/<short>.jar`, versioned by its
/// short name, depending on the given exact short names
pub fn feature(short: &str, dependencies: &[&str]) -> FeatureManifest {
    let version = short
        .rsplit_once('-')
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or_else(|| keel_core::types::Version::new(1, 0, 0));
    dependencies.iter().fold(
        FeatureManifest::new(format!("com.example.{}", short), short, version)
            .with_content(format!("lib/{}.jar", short)),
        |manifest, dependency| manifest.with_dependency(*dependency),
    )
}
