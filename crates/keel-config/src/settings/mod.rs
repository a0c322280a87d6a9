//! Conversion of a merged configuration into engine input

use std::path::{Path, PathBuf};
use std::time::Duration;

use keel_core::error::KeelError;
use keel_core::types::{FeatureToken, ResolutionRequest, TrustedKey, VerificationPolicy};
use keel_install::{EngineOptions, ProductInfoOptions};

use crate::toml::KeelToml;
use crate::ConfigResult;

/// A request and the options to run it with
#[derive(Debug, Clone)]
pub struct Settings {
    pub request: ResolutionRequest,
    pub options: EngineOptions,
    /// Unresolved tokens fail the run
    pub fail_on_unresolved: bool,
}

impl Settings {
    /// Build settings from a validated configuration.
    ///
    /// Relative paths, including local key files, are resolved against
    /// `base_dir`. Extension locations stay relative to the installation.
    pub fn from_config(config: &KeelToml, base_dir: &Path) -> ConfigResult<Self> {
        let resolve = |path: &str| -> PathBuf {
            let path = Path::new(path);
            if path.is_absolute() {
                path.to_path_buf()
            } else {
                base_dir.join(path)
            }
        };

        let keys = config
            .verification
            .keys
            .iter()
            .map(|key| TrustedKey {
                id: key.id.clone(),
                url: if key.url.contains("://") {
                    key.url.clone()
                } else {
                    resolve(&key.url).display().to_string()
                },
            })
            .collect();

        let request = ResolutionRequest {
            tokens: config.features.request.iter().map(|t| FeatureToken::parse(t)).collect(),
            platforms: config.features.platforms.clone(),
            target: config.server.target.clone(),
            accept_license: config.features.accept_license,
            verification: VerificationPolicy {
                level: config.verification.policy,
                keys,
            },
        };

        let mut options = EngineOptions::new(resolve(&config.server.install_dir));
        options.runtime_version = config.server.runtime_version.clone();
        options.from = config.sources.from.as_deref().map(resolve);
        options.esa_files = config.sources.esa.iter().map(|p| resolve(p)).collect();
        options.remote = config.sources.remote.clone();
        options.fetch_workers = config.sources.fetch_workers;
        options.extensions = config
            .extensions
            .iter()
            .map(|(name, location)| (name.clone(), PathBuf::from(location)))
            .collect();
        options.product_info = ProductInfoOptions {
            enabled: config.product_info.enabled,
            timeout: Duration::from_secs(config.product_info.timeout_secs),
        };

        Ok(Self {
            request,
            options,
            fail_on_unresolved: config.features.fail_on_unresolved,
        })
    }

    /// Replace the configured tokens with ones given on the command line
    pub fn with_tokens<I, T>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<FeatureToken>,
    {
        let tokens: Vec<FeatureToken> = tokens.into_iter().map(Into::into).collect();
        if !tokens.is_empty() {
            self.request.tokens = tokens;
        }
        self
    }

    /// Fail when there is nothing to resolve
    pub fn require_features(&self) -> ConfigResult<()> {
        if self.request.tokens.is_empty() {
            return Err(KeelError::config(
                "features.request",
                "no features requested; list them in keel.toml or on the command line",
            ));
        }
        Ok(())
    }
}
