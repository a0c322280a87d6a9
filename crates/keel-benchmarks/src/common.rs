//! Common utilities for benchmarks

use std::path::PathBuf;

use criterion::Criterion;
use keel_catalog::{ArtifactOrigin, CatalogEntry, FeatureCatalog};
use keel_core::types::{FeatureManifest, Platform, Version};

/// Shared criterion settings
pub fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(3))
        .measurement_time(std::time::Duration::from_secs(10))
        .sample_size(50)
}

/// Feature `n` of a layered graph, depending on up to `fan_out` features of
/// the next layer
pub fn layered_manifest(n: usize, size: usize, fan_out: usize) -> FeatureManifest {
    let short = format!("f{}-1.0", n);
    let mut manifest = FeatureManifest::new(format!("com.example.{}", short), short, Version::major_minor(1, 0))
        .with_content(format!("lib/f{}.jar", n));
    for k in 1..=fan_out {
        let dependency = n * fan_out + k;
        if dependency < size {
            manifest = manifest.with_dependency(format!("f{}-1.0", dependency));
        }
    }
    manifest
}

/// Catalog of `size` available features forming a tree rooted at `f0-1.0`
pub fn layered_catalog(size: usize, fan_out: usize) -> FeatureCatalog {
    FeatureCatalog::from_entries((0..size).map(|n| {
        CatalogEntry::new(
            layered_manifest(n, size, fan_out),
            ArtifactOrigin::EsaFile(PathBuf::from(format!("f{}.esa", n))),
        )
    }))
}

/// `versions` releases of a versionless `servlet`, one per platform
pub fn servlet_catalog(versions: u64) -> FeatureCatalog {
    FeatureCatalog::from_entries((0..versions).map(|v| {
        let short = format!("servlet-{}.0", v + 1);
        let manifest = FeatureManifest::new(format!("com.example.{}", short), short, Version::major_minor(v + 1, 0))
            .with_platform(Platform::new("jakartaee", Version::major_minor(v + 8, 0)));
        CatalogEntry::new(manifest, ArtifactOrigin::EsaFile(PathBuf::from(format!("servlet-{}.esa", v))))
    }))
}
