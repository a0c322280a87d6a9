//! Transitive closure computation
//!
//! A breadth-first worklist over tokens. Every symbolic name is expanded at
//! most once, which makes diamonds and cycles terminate. Failures for one
//! token are recorded in the report and traversal continues.

use std::collections::{HashMap, HashSet, VecDeque};

use keel_catalog::{CatalogEntry, FeatureCatalog};
use keel_core::types::{
    FeatureState, FeatureToken, Platform, ResolutionReport, ResolutionRequest, UnresolvedToken,
    VersionConflict,
};
use tracing::{debug, info, warn};

use crate::graph::FeatureGraph;
use crate::platform::PlatformResolver;
use crate::versionless::VersionlessResolver;

/// A closure member
#[derive(Debug, Clone)]
pub struct ResolvedFeature {
    pub entry: CatalogEntry,
    /// Already present in the installation before this run
    pub installed: bool,
}

/// Outcome of closure computation
#[derive(Debug)]
pub struct Resolution {
    pub report: ResolutionReport,
    /// Closure members keyed by lowercased symbolic name, in discovery order
    pub closure: Vec<ResolvedFeature>,
    pub graph: FeatureGraph,
}

impl Resolution {
    /// Features to install, dependencies first
    pub fn to_install(&self) -> Vec<&ResolvedFeature> {
        let by_key: HashMap<String, &ResolvedFeature> = self
            .closure
            .iter()
            .map(|feature| (feature.entry.manifest.symbolic_name.to_ascii_lowercase(), feature))
            .collect();

        self.graph
            .install_order()
            .into_iter()
            .filter_map(|node| by_key.get(&node.key).copied())
            .filter(|feature| !feature.installed)
            .collect()
    }
}

/// Run platform determination and closure computation for a request
pub fn resolve(request: &ResolutionRequest, catalog: &FeatureCatalog) -> Resolution {
    let platforms = PlatformResolver::new().resolve(request, catalog);
    let mut resolution = DependencyResolver::new(catalog, &platforms).resolve(&request.tokens);
    resolution.report.warnings.extend(catalog.warnings().iter().cloned());
    resolution
}

/// Computes the closure of a token list over one catalog
#[derive(Debug)]
pub struct DependencyResolver<'c> {
    catalog: &'c FeatureCatalog,
    platforms: &'c [Platform],
    tokens: VersionlessResolver<'c>,
}

impl<'c> DependencyResolver<'c> {
    pub fn new(catalog: &'c FeatureCatalog, platforms: &'c [Platform]) -> Self {
        Self {
            catalog,
            platforms,
            tokens: VersionlessResolver::new(catalog, platforms),
        }
    }

    pub fn resolve(&self, requested: &[FeatureToken]) -> Resolution {
        let mut report = ResolutionReport {
            platforms: self.platforms.to_vec(),
            ..ResolutionReport::default()
        };
        let mut graph = FeatureGraph::new();
        let mut closure: Vec<(&'c CatalogEntry, bool)> = Vec::new();
        let mut members: HashSet<String> = HashSet::new();
        // versionless base name -> closure index
        let mut by_base: HashMap<String, usize> = HashMap::new();
        let mut reported: HashSet<(String, String)> = HashSet::new();

        // Installed features own their base name; nothing may replace them
        let mut installed_by_base: HashMap<String, &'c CatalogEntry> = HashMap::new();
        for entry in self.catalog.installed() {
            installed_by_base.entry(entry.manifest.base_name()).or_insert(entry);
        }

        let mut queue: VecDeque<(FeatureToken, Option<String>)> = VecDeque::new();
        let mut seeded: HashSet<String> = HashSet::new();
        for token in requested {
            if seeded.insert(token.key()) {
                queue.push_back((token.clone(), None));
            }
        }

        while let Some((token, parent)) = queue.pop_front() {
            let resolved = match self.tokens.resolve(&token) {
                Ok(entry) => entry,
                Err(reason) => {
                    warn!(%token, ?reason, "token not resolved");
                    report.unresolved.push(UnresolvedToken {
                        token,
                        required_by: parent,
                        reason,
                    });
                    continue;
                },
            };

            let base = resolved.manifest.base_name();
            let mut entry = resolved;
            let key = resolved.manifest.symbolic_name.to_ascii_lowercase();

            if !members.contains(&key) {
                let holder = by_base
                    .get(&base)
                    .map(|&i| closure[i].0)
                    .or_else(|| {
                        installed_by_base
                            .get(&base)
                            .copied()
                            .filter(|_| !self.catalog.is_installed(&resolved.manifest))
                    })
                    .filter(|holder| !same_feature(holder, resolved));

                if let Some(kept) = holder {
                    let pair = (
                        kept.manifest.symbolic_name.to_ascii_lowercase(),
                        format!("{}@{}", key, resolved.manifest.version),
                    );
                    if reported.insert(pair) {
                        let conflict = VersionConflict {
                            name: base.clone(),
                            kept: kept.manifest.id(),
                            rejected: resolved.manifest.id(),
                        };
                        warn!(%conflict, "version conflict");
                        report.conflicts.push(conflict);
                    }
                    // The kept feature satisfies this requirement instead
                    entry = kept;
                }
            }

            let key = entry.manifest.symbolic_name.to_ascii_lowercase();
            if members.insert(key.clone()) {
                let installed = self.catalog.is_installed(&entry.manifest);
                debug!(
                    %token,
                    feature = %entry.manifest.short_name,
                    installed,
                    "feature added to closure"
                );

                graph.add_feature(entry.manifest.id());
                report.add_feature(
                    entry.manifest.id(),
                    if installed {
                        FeatureState::AlreadyInstalled
                    } else {
                        FeatureState::ToInstall
                    },
                );
                by_base
                    .entry(entry.manifest.base_name())
                    .or_insert(closure.len());
                closure.push((entry, installed));

                for dependency in self.catalog.dependencies_of(&entry.manifest) {
                    queue.push_back((dependency.clone(), Some(key.clone())));
                }
            }

            if let Some(parent) = &parent {
                graph.add_dependency(parent, &key);
            }
        }

        for cycle in graph.cycles() {
            debug!(cycle = %FeatureGraph::format_cycle(&cycle), "dependency cycle");
        }
        info!(
            features = closure.len(),
            to_install = report.to_install().len(),
            unresolved = report.unresolved.len(),
            conflicts = report.conflicts.len(),
            "closure computed"
        );

        Resolution {
            report,
            closure: closure
                .into_iter()
                .map(|(entry, installed)| ResolvedFeature {
                    entry: entry.clone(),
                    installed,
                })
                .collect(),
            graph,
        }
    }
}

fn same_feature(a: &CatalogEntry, b: &CatalogEntry) -> bool {
    a.manifest.symbolic_name.eq_ignore_ascii_case(&b.manifest.symbolic_name)
        && a.manifest.version == b.manifest.version
}
