//! Active platform determination

use std::collections::{BTreeMap, BTreeSet};

use keel_catalog::FeatureCatalog;
use keel_core::types::{Platform, ResolutionRequest, Version};
use tracing::{debug, info};

/// Chooses the platforms versionless tokens resolve against.
///
/// Declared platforms come first, in declaration order. Every family that
/// was not declared may add platforms implied by installed features: the
/// versions that all installed features of that family agree on, highest
/// first. An empty result means the platform is undetermined.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformResolver;

impl PlatformResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, request: &ResolutionRequest, catalog: &FeatureCatalog) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = Vec::new();
        for declared in &request.platforms {
            if !platforms.iter().any(|p| p.same_release(declared)) {
                platforms.push(declared.clone());
            }
        }

        let declared_families: BTreeSet<String> = platforms.iter().map(Platform::family).collect();
        let mut implied = implied_platforms(catalog)
            .into_iter()
            .filter(|p| !declared_families.contains(&p.family()))
            .collect::<Vec<_>>();
        implied.sort_by(|a, b| b.version.cmp(&a.version).then_with(|| a.family().cmp(&b.family())));

        if !implied.is_empty() {
            debug!(?implied, "platforms implied by installed features");
        }
        platforms.extend(implied);

        if platforms.is_empty() {
            info!("no platform declared or implied; versionless features cannot be resolved");
        } else {
            let names: Vec<String> = platforms.iter().map(ToString::to_string).collect();
            info!(platforms = %names.join(", "), "active platforms");
        }
        platforms
    }
}

/// Platforms every installed, platform-tagged feature of a family agrees on
fn implied_platforms(catalog: &FeatureCatalog) -> Vec<Platform> {
    // family -> (display name, intersection of versions)
    let mut families: BTreeMap<String, (String, BTreeSet<Version>)> = BTreeMap::new();

    for entry in catalog.installed() {
        let mut per_family: BTreeMap<String, (String, BTreeSet<Version>)> = BTreeMap::new();
        for platform in &entry.manifest.platforms {
            per_family
                .entry(platform.family())
                .or_insert_with(|| (platform.name.clone(), BTreeSet::new()))
                .1
                .insert(platform.version.clone());
        }

        for (family, (name, versions)) in per_family {
            match families.get_mut(&family) {
                Some((_, agreed)) => agreed.retain(|v| versions.contains(v)),
                None => {
                    families.insert(family, (name, versions));
                },
            }
        }
    }

    families
        .into_values()
        .flat_map(|(name, versions)| {
            versions
                .into_iter()
                .map(move |version| Platform::new(name.clone(), version))
        })
        .collect()
}
