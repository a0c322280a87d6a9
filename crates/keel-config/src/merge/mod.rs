//! Configuration discovery, layering and environment overrides

use std::collections::HashMap;

use camino::{Utf8Path, Utf8PathBuf};
use keel_core::error::KeelError;
use keel_core::types::Platform;
use tracing::debug;

use crate::toml::{load_from_file, validate_config, KeelToml};
use crate::ConfigResult;

/// Name of the project configuration file
pub const CONFIG_FILE: &str = "keel.toml";

/// Main configuration loading interface
pub struct ConfigLoader {
    /// Current working directory
    cwd: Utf8PathBuf,
}

/// Configuration layering and merging
pub struct ConfigLayering;

/// Where the base configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// keel.toml found by walking up from the working directory
    ProjectToml(Utf8PathBuf),
    /// File named with `--config`
    Explicit(Utf8PathBuf),
    /// No file; built from flags and environment alone
    CommandLine,
}

impl ConfigSource {
    /// Directory relative paths in the configuration are resolved against
    pub fn base_dir<'a>(&'a self, cwd: &'a Utf8Path) -> &'a Utf8Path {
        match self {
            ConfigSource::ProjectToml(path) | ConfigSource::Explicit(path) => path.parent().unwrap_or(cwd),
            ConfigSource::CommandLine => cwd,
        }
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new(cwd: Utf8PathBuf) -> Self {
        Self { cwd }
    }

    pub fn cwd(&self) -> &Utf8Path {
        &self.cwd
    }

    /// Load keel.toml from the working directory or its ancestors
    pub async fn load_project_config(&self) -> ConfigResult<Option<(KeelToml, ConfigSource)>> {
        let path = self.resolve_config_path(CONFIG_FILE);
        if !path.exists() {
            debug!(cwd = %self.cwd, "no keel.toml found");
            return Ok(None);
        }
        let config = load_from_file(&path).await?;
        debug!(%path, "loaded project configuration");
        Ok(Some((config, ConfigSource::ProjectToml(path))))
    }

    /// Load a configuration file named explicitly
    pub async fn load_explicit(&self, path: &Utf8Path) -> ConfigResult<(KeelToml, ConfigSource)> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.cwd.join(path)
        };
        let config = load_from_file(&path).await?;
        Ok((config, ConfigSource::Explicit(path)))
    }

    /// Find configuration file in project (walks up directory tree)
    pub fn resolve_config_path(&self, filename: &str) -> Utf8PathBuf {
        let mut current = self.cwd.as_path();

        loop {
            let config_path = current.join(filename);
            if config_path.exists() {
                return config_path;
            }

            // Move up one directory
            match current.parent() {
                Some(parent) => current = parent,
                None => break,
            }
        }

        // Path in the working directory even though it doesn't exist
        self.cwd.join(filename)
    }
}

impl ConfigLayering {
    /// Apply environment then command line overrides and validate the result
    pub fn merge_configs(
        project_config: KeelToml,
        env_overrides: HashMap<String, String>,
        cli_overrides: HashMap<String, String>,
    ) -> ConfigResult<KeelToml> {
        let mut merged = project_config;

        Self::apply_env_overrides(&mut merged, &env_overrides)?;

        // CLI flags have the highest priority
        Self::apply_cli_overrides(&mut merged, &cli_overrides)?;

        validate_config(&merged)?;
        Ok(merged)
    }

    /// Apply `KEEL_*` environment variable overrides
    fn apply_env_overrides(config: &mut KeelToml, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        for (key, value) in overrides {
            let setting = match key.as_str() {
                "KEEL_INSTALL_DIR" => "install-dir",
                "KEEL_RUNTIME_VERSION" => "runtime-version",
                "KEEL_VERIFY" => "verify",
                "KEEL_TARGET" => "target",
                "KEEL_FROM" => "from",
                "KEEL_REMOTE" => "remote",
                "KEEL_PLATFORMS" => "platforms",
                // Unknown environment variable, ignore
                _ => continue,
            };
            apply_override(config, setting, value, key)?;
        }

        Ok(())
    }

    /// Apply CLI flag overrides
    fn apply_cli_overrides(config: &mut KeelToml, overrides: &HashMap<String, String>) -> ConfigResult<()> {
        for (key, value) in overrides {
            apply_override(config, key, value, &format!("--{}", key))?;
        }

        Ok(())
    }

    /// Collect environment variable overrides
    pub fn collect_env_overrides() -> HashMap<String, String> {
        std::env::vars().filter(|(key, _)| key.starts_with("KEEL_")).collect()
    }
}

fn apply_override(config: &mut KeelToml, setting: &str, value: &str, origin: &str) -> ConfigResult<()> {
    let invalid = |reason: String| KeelError::config(origin, reason);

    match setting {
        "install-dir" => config.server.install_dir = value.to_string(),
        "runtime-version" => config.server.runtime_version = Some(value.to_string()),
        "target" => config.server.target = value.parse().map_err(invalid)?,
        "verify" => config.verification.policy = value.parse().map_err(invalid)?,
        "from" => config.sources.from = Some(value.to_string()),
        "remote" => config.sources.remote = Some(value.to_string()),
        "platforms" => {
            config.features.platforms = value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|p| p.parse::<Platform>().map_err(|e| invalid(format!("'{}': {}", p, e))))
                .collect::<ConfigResult<Vec<_>>>()?;
        },
        "accept-license" => {
            config.features.accept_license = parse_bool(value)
                .ok_or_else(|| invalid(format!("expected true or false, got '{}'", value)))?;
        },
        "fetch-workers" => {
            config.sources.fetch_workers = value
                .parse()
                .map_err(|_| invalid(format!("expected a positive number, got '{}'", value)))?;
        },
        // Unknown override, ignore
        _ => {},
    }
    Ok(())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
