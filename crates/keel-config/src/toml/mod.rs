//! keel.toml configuration parsing and serialization

use std::collections::BTreeMap;

use keel_core::error::KeelError;
use keel_core::types::{InstallTarget, Platform, TrustedKey, VerifyLevel};
use serde::{Deserialize, Serialize};

use crate::ConfigResult;

/// Complete keel.toml configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct KeelToml {
    /// Runtime installation section
    pub server: ServerSection,

    /// What to install
    #[serde(default)]
    pub features: FeaturesSection,

    /// Where features come from
    #[serde(default)]
    pub sources: SourcesSection,

    #[serde(default)]
    pub verification: VerificationSection,

    /// Named extension location overrides
    #[serde(default)]
    pub extensions: BTreeMap<String, String>,

    #[serde(default)]
    pub product_info: ProductInfoSection,
}

/// Runtime installation section
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerSection {
    /// Installation root (required)
    pub install_dir: String,

    /// Runtime version used for repository index names
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,

    /// `usr` or `extension:<name>`
    #[serde(default)]
    pub target: InstallTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FeaturesSection {
    /// Requested feature tokens
    #[serde(default)]
    pub request: Vec<String>,

    /// Declared platforms, in priority order
    #[serde(default)]
    pub platforms: Vec<Platform>,

    #[serde(default)]
    pub accept_license: bool,

    /// Treat unresolved tokens as a failed run
    #[serde(default)]
    pub fail_on_unresolved: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourcesSection {
    /// Directory repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,

    /// Explicit ESA files
    #[serde(default)]
    pub esa: Vec<String>,

    /// Remote repository base URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<String>,

    /// Parallel artifact fetches
    #[serde(default = "default_fetch_workers")]
    pub fetch_workers: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VerificationSection {
    #[serde(default)]
    pub policy: VerifyLevel,

    #[serde(default)]
    pub keys: Vec<TrustedKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProductInfoSection {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_fetch_workers() -> usize {
    4
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    300
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            from: None,
            esa: Vec::new(),
            remote: None,
            fetch_workers: default_fetch_workers(),
        }
    }
}

impl Default for ProductInfoSection {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl KeelToml {
    /// Minimal configuration for an installation without a keel.toml
    pub fn for_install_dir(install_dir: impl Into<String>) -> Self {
        Self {
            server: ServerSection {
                install_dir: install_dir.into(),
                ..ServerSection::default()
            },
            ..Self::default()
        }
    }
}

/// Parse TOML string to KeelToml configuration
pub fn parse_keel_toml(content: &str) -> ConfigResult<KeelToml> {
    let config: KeelToml = toml::from_str(content).map_err(|e| KeelError::TomlParse {
        message: e.to_string(),
    })?;

    validate_config(&config)?;

    Ok(config)
}

/// Serialize KeelToml to TOML string
pub fn serialize_keel_toml(config: &KeelToml) -> ConfigResult<String> {
    toml::to_string_pretty(config).map_err(|e| KeelError::TomlParse {
        message: format!("TOML serialization error: {}", e),
    })
}

/// Validate configuration completeness
pub fn validate_config(config: &KeelToml) -> ConfigResult<()> {
    if config.server.install_dir.trim().is_empty() {
        return Err(KeelError::config(
            "server.install-dir",
            "the runtime installation directory is required",
        ));
    }

    if let Some(token) = config.features.request.iter().find(|t| t.trim().is_empty()) {
        return Err(KeelError::config(
            "features.request",
            format!("feature tokens must not be empty (found '{}')", token),
        ));
    }

    if config.sources.fetch_workers == 0 {
        return Err(KeelError::config("sources.fetch-workers", "must be at least 1"));
    }

    if config.sources.remote.as_deref().is_some_and(|url| url.trim().is_empty()) {
        return Err(KeelError::config("sources.remote", "must not be empty when set"));
    }

    for (index, key) in config.verification.keys.iter().enumerate() {
        if key.url.trim().is_empty() {
            return Err(KeelError::config(
                "verification.keys",
                format!("key #{} has an empty url", index + 1),
            ));
        }
        if key.id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(KeelError::config(
                "verification.keys",
                format!("key #{} has an empty id", index + 1),
            ));
        }
    }

    for (name, location) in &config.extensions {
        if location.trim().is_empty() {
            return Err(KeelError::config(
                "extensions",
                format!("extension '{}' has an empty location", name),
            ));
        }
    }

    if config.product_info.timeout_secs == 0 {
        return Err(KeelError::config("product-info.timeout-secs", "must be at least 1"));
    }

    Ok(())
}

/// Load and parse keel.toml from file path
pub async fn load_from_file(path: &camino::Utf8Path) -> ConfigResult<KeelToml> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| KeelError::io(format!("Failed to read {}", path), e))?;

    parse_keel_toml(&content).map_err(|e| match e {
        KeelError::TomlParse { message } => KeelError::TomlParse {
            message: format!("In file {}: {}", path, message),
        },
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[server]
install-dir = "wlp"
runtime-version = "24.0.0.9"
target = "extension:myext"

[features]
request = ["servlet", "com.example.feature.a-1.0"]
platforms = ["jakartaee-10.0"]
accept-license = true
fail-on-unresolved = true

[sources]
from = "target/features-repo"
esa = ["local/a.esa"]
remote = "https://repo.example.com/features"
fetch-workers = 8

[verification]
policy = "enforce"
keys = [{ id = "0xABCD", url = "keys/abcd.pub" }]

[extensions]
myext = "extensions/myext"

[product-info]
enabled = false
timeout-secs = 60
"#;

    #[test]
    fn test_parse_full_config() {
        let config = parse_keel_toml(FULL).unwrap();

        assert_eq!(config.server.install_dir, "wlp");
        assert_eq!(config.server.runtime_version.as_deref(), Some("24.0.0.9"));
        assert_eq!(config.server.target, InstallTarget::Extension("myext".to_string()));
        assert_eq!(config.features.request.len(), 2);
        assert_eq!(config.features.platforms, vec!["jakartaee-10.0".parse::<Platform>().unwrap()]);
        assert!(config.features.accept_license);
        assert!(config.features.fail_on_unresolved);
        assert_eq!(config.sources.from.as_deref(), Some("target/features-repo"));
        assert_eq!(config.sources.esa, vec!["local/a.esa"]);
        assert_eq!(config.sources.fetch_workers, 8);
        assert_eq!(config.verification.policy, VerifyLevel::Enforce);
        assert_eq!(config.verification.keys[0].id.as_deref(), Some("0xABCD"));
        assert_eq!(config.extensions["myext"], "extensions/myext");
        assert!(!config.product_info.enabled);
        assert_eq!(config.product_info.timeout_secs, 60);
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = parse_keel_toml("[server]\ninstall-dir = \"wlp\"\n").unwrap();

        assert_eq!(config.server.target, InstallTarget::Usr);
        assert!(config.features.request.is_empty());
        assert_eq!(config.sources.fetch_workers, 4);
        assert_eq!(config.verification.policy, VerifyLevel::None);
        assert!(config.product_info.enabled);
        assert_eq!(config.product_info.timeout_secs, 300);
    }

    #[test]
    fn test_syntax_error_is_toml_parse() {
        let err = parse_keel_toml("[server\ninstall-dir = ").unwrap_err();
        assert!(matches!(err, KeelError::TomlParse { .. }));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let cases = [
            ("[server]\ninstall-dir = \"\"\n", Some("server.install-dir")),
            ("[server]\ninstall-dir = \"wlp\"\n[sources]\nfetch-workers = 0\n", Some("sources.fetch-workers")),
            ("[server]\ninstall-dir = \"wlp\"\n[features]\nrequest = [\" \"]\n", Some("features.request")),
            (
                "[server]\ninstall-dir = \"wlp\"\n[verification]\nkeys = [{ url = \"\" }]\n",
                Some("verification.keys"),
            ),
            ("[server]\ninstall-dir = \"wlp\"\ntarget = \"extension:\"\n", None),
            ("[server]\ninstall-dir = \"wlp\"\n[verification]\npolicy = \"strict\"\n", None),
        ];

        for (content, field) in cases {
            let err = parse_keel_toml(content).unwrap_err();
            match field {
                Some(expected) => match err {
                    KeelError::ConfigValidation { field, .. } => assert_eq!(field, expected, "{}", content),
                    other => panic!("expected validation error for {:?}, got {:?}", content, other),
                },
                None => assert!(matches!(err, KeelError::TomlParse { .. }), "{}", content),
            }
        }
    }

    #[test]
    fn test_serialize_parses_back() {
        let config = parse_keel_toml(FULL).unwrap();
        let text = serialize_keel_toml(&config).unwrap();
        assert_eq!(parse_keel_toml(&text).unwrap(), config);
    }

    #[tokio::test]
    async fn test_load_from_file_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::try_from(dir.path().join("keel.toml")).unwrap();
        tokio::fs::write(&path, "[server]\ninstall-dir = [").await.unwrap();

        match load_from_file(&path).await.unwrap_err() {
            KeelError::TomlParse { message } => assert!(message.contains("keel.toml")),
            other => panic!("unexpected error {:?}", other),
        }
    }
}
