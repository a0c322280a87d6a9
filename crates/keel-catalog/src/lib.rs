//! Feature catalog for keel
//!
//! This crate reads feature manifests from every configured source (the
//! runtime installation, local ESA files, directory repositories and a remote
//! repository) and merges them into one [`FeatureCatalog`] in priority order.

pub mod api;
pub mod cache;
pub mod catalog;
pub mod client;
pub mod esa;
pub mod manifest;
pub mod source;

// Re-export main types
pub use api::{artifact_path, decode_index, index_path, IndexEntry};
pub use cache::IndexCache;
pub use catalog::{FeatureCatalog, FetchedArtifact};
pub use client::{RepositoryClient, RetryConfig};
pub use esa::{write_esa, EsaArchive};
pub use manifest::{parse_manifest, render_manifest};
pub use source::{ArtifactOrigin, CatalogEntry, FeatureSource, InstalledFeatures, InstalledKind};

use keel_core::error::KeelError;

/// Result type for catalog operations
pub type CatalogResult<T> = Result<T, KeelError>;
