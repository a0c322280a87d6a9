//! Repository index types and layout conventions

use keel_core::error::CatalogError;
use keel_core::types::{default_short_name, FeatureManifest, Version};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of a repository's `features-<version>.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub manifest: FeatureManifest,
    /// Artifact path relative to the repository root
    pub artifact: String,
}

/// Decode a fetched index entry by entry.
///
/// Entries that do not decode come back as malformed-manifest errors named
/// after their position and symbolic name; the rest are kept.
pub fn decode_index(raw: Vec<Value>, origin: &str) -> (Vec<IndexEntry>, Vec<CatalogError>) {
    let mut entries = Vec::with_capacity(raw.len());
    let mut errors = Vec::new();

    for (position, value) in raw.into_iter().enumerate() {
        let name = value
            .pointer("/manifest/symbolic_name")
            .and_then(Value::as_str)
            .map(str::to_string);
        match serde_json::from_value::<IndexEntry>(value) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                let location = match name {
                    Some(name) => format!("{} entry {} ({})", origin, position, name),
                    None => format!("{} entry {}", origin, position),
                };
                errors.push(CatalogError::malformed(location, e.to_string()));
            },
        }
    }
    (entries, errors)
}

/// Index location relative to the repository root
pub fn index_path(runtime_version: &str) -> String {
    format!("features/{0}/features-{0}.json", runtime_version)
}

/// Maven-like artifact location for a feature
/// (`com/example/feature/servlet-6.0/1.0.0/servlet-6.0-1.0.0.esa`)
pub fn artifact_path(symbolic_name: &str, version: &Version) -> String {
    let artifact_id = default_short_name(symbolic_name);
    let group = symbolic_name
        .strip_suffix(artifact_id)
        .unwrap_or("")
        .trim_end_matches('.');

    let mut path = String::new();
    if !group.is_empty() {
        path.push_str(&group.replace('.', "/"));
        path.push('/');
    }
    path.push_str(&format!("{0}/{1}/{0}-{1}.esa", artifact_id, version));
    path
}
