//! Token to concrete feature resolution

use keel_catalog::{CatalogEntry, FeatureCatalog};
use keel_core::types::{FeatureToken, Platform, UnresolvedReason};
use tracing::debug;

/// Maps a requested token to one catalog entry using the active platforms
#[derive(Debug, Clone, Copy)]
pub struct VersionlessResolver<'c> {
    catalog: &'c FeatureCatalog,
    platforms: &'c [Platform],
}

impl<'c> VersionlessResolver<'c> {
    pub fn new(catalog: &'c FeatureCatalog, platforms: &'c [Platform]) -> Self {
        Self { catalog, platforms }
    }

    /// Resolve one token.
    ///
    /// Exact tokens ignore the platforms. A versionless token first matches
    /// a feature whose short name is literally the token; otherwise it
    /// needs at least one active platform. Among candidates for an active
    /// platform an installed one wins, then the highest version of the
    /// first platform, in order, that has any candidate.
    pub fn resolve(&self, token: &FeatureToken) -> Result<&'c CatalogEntry, UnresolvedReason> {
        let name = match token {
            FeatureToken::Exact(name) => {
                return self.catalog.lookup_exact(name).ok_or(UnresolvedReason::NotFound);
            },
            FeatureToken::Versionless(name) => name,
        };

        if let Some(entry) = self
            .catalog
            .lookup_exact(name)
            .filter(|entry| entry.manifest.short_name.eq_ignore_ascii_case(name))
        {
            return Ok(entry);
        }

        if self.platforms.is_empty() {
            debug!(%token, "versionless token with undetermined platform");
            return Err(UnresolvedReason::PlatformUndetermined);
        }

        let candidates: Vec<&'c CatalogEntry> = self
            .catalog
            .lookup_versionless(name)
            .into_iter()
            .filter(|entry| {
                self.platforms
                    .iter()
                    .any(|platform| entry.manifest.satisfies_platform(platform))
            })
            .collect();

        let installed = candidates
            .iter()
            .copied()
            .filter(|entry| self.catalog.is_installed(&entry.manifest))
            .max_by(|a, b| a.manifest.version.cmp(&b.manifest.version));
        if let Some(entry) = installed {
            debug!(%token, feature = %entry.manifest.short_name, "versionless token matched installed feature");
            return Ok(entry);
        }

        for platform in self.platforms {
            let best = candidates
                .iter()
                .copied()
                .filter(|entry| entry.manifest.satisfies_platform(platform))
                .max_by(|a, b| a.manifest.version.cmp(&b.manifest.version));
            if let Some(entry) = best {
                debug!(%token, %platform, feature = %entry.manifest.short_name, "versionless token resolved");
                return Ok(entry);
            }
        }

        Err(UnresolvedReason::NoMatch {
            platforms: self.platforms.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{available, feature, installed, platform};

    fn servlet_catalog() -> FeatureCatalog {
        FeatureCatalog::from_entries([
            available(feature("servlet-5.0").with_platform(platform("jakartaee-10.0"))),
            available(feature("servlet-6.0").with_platform(platform("jakartaee-11.0"))),
            available(feature("servlet-4.0").with_platform(platform("javaee-8.0"))),
        ])
    }

    #[test]
    fn test_versionless_resolves_for_declared_platform() {
        let catalog = servlet_catalog();
        let platforms = vec![platform("jakartaee-10.0")];
        let resolver = VersionlessResolver::new(&catalog, &platforms);

        let entry = resolver.resolve(&FeatureToken::parse("servlet")).unwrap();
        assert_eq!(entry.manifest.short_name, "servlet-5.0");
    }

    #[test]
    fn test_no_platform_is_undetermined() {
        let catalog = servlet_catalog();
        let resolver = VersionlessResolver::new(&catalog, &[]);
        assert_eq!(
            resolver.resolve(&FeatureToken::parse("servlet")).unwrap_err(),
            UnresolvedReason::PlatformUndetermined
        );
    }

    #[test]
    fn test_no_intersection_is_no_match() {
        let catalog = servlet_catalog();
        let platforms = vec![platform("microProfile-6.1")];
        let resolver = VersionlessResolver::new(&catalog, &platforms);
        assert_eq!(
            resolver.resolve(&FeatureToken::parse("servlet")).unwrap_err(),
            UnresolvedReason::NoMatch {
                platforms: platforms.clone()
            }
        );
    }

    #[test]
    fn test_declaration_order_breaks_ties() {
        let catalog = servlet_catalog();
        let platforms = vec![platform("javaee-8.0"), platform("jakartaee-11.0")];
        let resolver = VersionlessResolver::new(&catalog, &platforms);
        let entry = resolver.resolve(&FeatureToken::parse("servlet")).unwrap();
        assert_eq!(entry.manifest.short_name, "servlet-4.0");
    }

    #[test]
    fn test_highest_version_within_platform() {
        let catalog = FeatureCatalog::from_entries([
            available(feature("mpConfig-3.0").with_platform(platform("microProfile-6.1"))),
            available(feature("mpConfig-3.1").with_platform(platform("microProfile-6.1"))),
        ]);
        let platforms = vec![platform("microProfile-6.1")];
        let resolver = VersionlessResolver::new(&catalog, &platforms);
        let entry = resolver.resolve(&FeatureToken::parse("mpConfig")).unwrap();
        assert_eq!(entry.manifest.short_name, "mpConfig-3.1");
    }

    #[test]
    fn test_installed_candidate_preferred() {
        let catalog = FeatureCatalog::from_entries([
            installed(feature("servlet-5.0").with_platform(platform("jakartaee-10.0"))),
            available(feature("servlet-6.0").with_platform(platform("jakartaee-11.0"))),
        ]);
        let platforms = vec![platform("jakartaee-11.0"), platform("jakartaee-10.0")];
        let resolver = VersionlessResolver::new(&catalog, &platforms);
        let entry = resolver.resolve(&FeatureToken::parse("servlet")).unwrap();
        assert_eq!(entry.manifest.short_name, "servlet-5.0");
    }

    #[test]
    fn test_exact_tokens_ignore_platforms() {
        let catalog = servlet_catalog();
        let resolver = VersionlessResolver::new(&catalog, &[]);

        let by_short = resolver.resolve(&FeatureToken::parse("servlet-6.0")).unwrap();
        assert_eq!(by_short.manifest.symbolic_name, "com.example.servlet-6.0");
        let by_symbolic = resolver
            .resolve(&FeatureToken::parse("com.example.servlet-4.0"))
            .unwrap();
        assert_eq!(by_symbolic.manifest.short_name, "servlet-4.0");
        assert_eq!(
            resolver.resolve(&FeatureToken::parse("servlet-9.9")).unwrap_err(),
            UnresolvedReason::NotFound
        );
    }

    #[test]
    fn test_unversioned_short_name_resolves_without_platform() {
        let catalog = FeatureCatalog::from_entries([available(feature("webCache"))]);
        let resolver = VersionlessResolver::new(&catalog, &[]);
        let entry = resolver.resolve(&FeatureToken::parse("webCache")).unwrap();
        assert_eq!(entry.manifest.symbolic_name, "com.example.webCache");
    }
}
