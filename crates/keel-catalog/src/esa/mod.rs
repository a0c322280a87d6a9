//! ESA (feature archive) reading and writing
//!
//! An ESA is a zip file carrying `OSGI-INF/SUBSYSTEM.MF` plus the feature's
//! content entries. Archives are held in memory since they are small and
//! often come straight from the network.

use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

use keel_core::error::{CatalogError, KeelError};
use keel_core::types::FeatureManifest;
use keel_core::utils::path::safe_join;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::manifest::{parse_manifest, render_manifest};
use crate::CatalogResult;

/// Location of the manifest inside an ESA
pub const MANIFEST_ENTRY: &str = "OSGI-INF/SUBSYSTEM.MF";

/// An in-memory feature archive
#[derive(Debug, Clone)]
pub struct EsaArchive {
    origin: String,
    bytes: Vec<u8>,
}

impl EsaArchive {
    /// Wrap archive bytes; `origin` names the archive in diagnostics
    pub fn from_bytes(bytes: Vec<u8>, origin: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            bytes,
        }
    }

    /// Read an archive from disk
    pub fn open(path: &Path) -> CatalogResult<Self> {
        let bytes = fs::read(path)
            .map_err(|e| KeelError::io(format!("Failed to read {}", path.display()), e))?;
        Ok(Self::from_bytes(bytes, path.display().to_string()))
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Raw archive bytes, as covered by the detached signature
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Parse the archive's manifest
    pub fn manifest(&self) -> Result<FeatureManifest, CatalogError> {
        let raw = self
            .read_entry(MANIFEST_ENTRY)
            .map_err(|e| CatalogError::malformed(&self.origin, e.to_string()))?;
        let text = String::from_utf8(raw)
            .map_err(|_| CatalogError::malformed(&self.origin, "manifest is not valid UTF-8"))?;
        parse_manifest(&text, &self.origin)
    }

    /// Read one entry by its locator
    pub fn read_entry(&self, locator: &str) -> CatalogResult<Vec<u8>> {
        let mut archive = self.archive()?;
        let name = locator.trim_start_matches('/');
        let mut file = archive.by_name(name).map_err(|e| match e {
            ZipError::FileNotFound => KeelError::io(
                format!("{} has no entry {}", self.origin, name),
                std::io::Error::new(std::io::ErrorKind::NotFound, "entry not found"),
            ),
            other => self.zip_error(other),
        })?;

        let mut contents = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut contents)
            .map_err(|e| KeelError::io(format!("Failed to read {} from {}", name, self.origin), e))?;
        Ok(contents)
    }

    /// Names of every file entry
    pub fn entry_names(&self) -> CatalogResult<Vec<String>> {
        let archive = self.archive()?;
        Ok(archive.file_names().map(str::to_string).collect())
    }

    fn archive(&self) -> CatalogResult<ZipArchive<Cursor<&[u8]>>> {
        ZipArchive::new(Cursor::new(self.bytes.as_slice())).map_err(|e| self.zip_error(e))
    }

    fn zip_error(&self, error: ZipError) -> KeelError {
        KeelError::io(
            format!("{} is not a readable ESA archive", self.origin),
            std::io::Error::new(std::io::ErrorKind::InvalidData, error),
        )
    }
}

/// Default detached signature location for an ESA on disk.
///
/// A `WLP-Signature` locator is resolved against the archive's directory;
/// without one the signature sits beside the archive as `<file>.sig`.
/// Locators that leave the archive's directory give `None`.
pub fn signature_path(esa_path: &Path, manifest: &FeatureManifest) -> Option<PathBuf> {
    match &manifest.signature {
        Some(locator) => {
            let dir = esa_path.parent().unwrap_or_else(|| Path::new(""));
            safe_join(dir, Path::new(locator)).ok()
        },
        None => {
            let mut name = esa_path.as_os_str().to_os_string();
            name.push(".sig");
            Some(PathBuf::from(name))
        },
    }
}

/// Build an ESA from a manifest and its content entries
pub fn write_esa(manifest: &FeatureManifest, entries: &[(&str, &[u8])]) -> CatalogResult<Vec<u8>> {
    let wrap = |e: ZipError| {
        KeelError::io(
            format!("Failed to write ESA for {}", manifest.symbolic_name),
            std::io::Error::new(std::io::ErrorKind::Other, e),
        )
    };
    let io = |e: std::io::Error| KeelError::io(format!("Failed to write ESA for {}", manifest.symbolic_name), e);

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    writer.start_file(MANIFEST_ENTRY, options).map_err(wrap)?;
    writer.write_all(render_manifest(manifest).as_bytes()).map_err(io)?;

    for (locator, contents) in entries {
        writer.start_file(locator.trim_start_matches('/'), options).map_err(wrap)?;
        writer.write_all(contents).map_err(io)?;
    }

    Ok(writer.finish().map_err(wrap)?.into_inner())
}
