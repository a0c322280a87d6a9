//! Directory layout of a runtime installation

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use keel_catalog::InstalledFeatures;
use keel_core::error::KeelError;
use keel_core::types::{InstallTarget, InstalledFeatureRecord, Version};
use tracing::debug;

use crate::InstallResult;

/// Properties key naming an extension's install location
pub const PRODUCT_INSTALL_KEY: &str = "com.ibm.websphere.productInstall";
const PRODUCT_ID_KEY: &str = "com.ibm.websphere.productId";

/// Paths of one runtime installation
#[derive(Debug, Clone)]
pub struct InstallLayout {
    install_dir: PathBuf,
    /// Configured extension locations, relative to the install dir when not absolute
    extensions: BTreeMap<String, PathBuf>,
}

impl InstallLayout {
    pub fn new(install_dir: impl Into<PathBuf>) -> Self {
        Self {
            install_dir: install_dir.into(),
            extensions: BTreeMap::new(),
        }
    }

    /// Register configured extension locations
    pub fn with_extensions(mut self, extensions: HashMap<String, PathBuf>) -> Self {
        self.extensions.extend(extensions);
        self
    }

    pub fn install_dir(&self) -> &Path {
        &self.install_dir
    }

    /// Manifests shipped with the runtime
    pub fn product_features_dir(&self) -> PathBuf {
        self.install_dir.join("lib").join("features")
    }

    /// Persisted state directory
    pub fn state_dir(&self) -> PathBuf {
        self.install_dir.join("lib").join(".keel")
    }

    fn properties_file(&self, name: &str) -> PathBuf {
        self.install_dir
            .join("etc")
            .join("extensions")
            .join(format!("{}.properties", name))
    }

    /// Root directory user features of `target` are installed into
    pub fn target_root(&self, target: &InstallTarget) -> InstallResult<PathBuf> {
        let name = match target {
            InstallTarget::Usr => return Ok(self.install_dir.join("usr").join("extension")),
            InstallTarget::Extension(name) => name,
        };

        if let Some(location) = self.extensions.get(name) {
            return Ok(self.absolute(location));
        }

        let properties = self.properties_file(name);
        match fs::read_to_string(&properties) {
            Ok(text) => {
                if let Some(location) = parse_properties(&text).get(PRODUCT_INSTALL_KEY) {
                    return Ok(self.absolute(Path::new(location)));
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {},
            Err(e) => {
                return Err(KeelError::io(format!("Failed to read {}", properties.display()), e));
            },
        }

        Ok(self.install_dir.join("extensions").join(name))
    }

    /// Manifest directory of a target
    pub fn features_dir(&self, target: &InstallTarget) -> InstallResult<PathBuf> {
        Ok(self.target_root(target)?.join("lib").join("features"))
    }

    /// Create the target's directories and, for extensions, its
    /// properties file when it does not exist yet
    pub fn ensure_target(&self, target: &InstallTarget) -> InstallResult<PathBuf> {
        let root = self.target_root(target)?;
        let features = root.join("lib").join("features");
        fs::create_dir_all(&features)
            .map_err(|e| KeelError::io(format!("Failed to create {}", features.display()), e))?;

        if let InstallTarget::Extension(name) = target {
            let properties = self.properties_file(name);
            if !properties.exists() {
                let location = root.strip_prefix(&self.install_dir).unwrap_or(&root);
                let text = format!(
                    "{}={}\n{}={}\n",
                    PRODUCT_ID_KEY,
                    name,
                    PRODUCT_INSTALL_KEY,
                    keel_core::utils::path::to_slash(location)
                );
                if let Some(parent) = properties.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| KeelError::io(format!("Failed to create {}", parent.display()), e))?;
                }
                fs::write(&properties, text)
                    .map_err(|e| KeelError::io(format!("Failed to write {}", properties.display()), e))?;
                debug!(extension = %name, path = %properties.display(), "extension properties written");
            }
        }
        Ok(root)
    }

    /// Everything the catalog needs to know about installed features
    pub fn installed_features(
        &self,
        records: Vec<InstalledFeatureRecord>,
        product_info: Vec<(String, Option<Version>)>,
    ) -> InstallResult<InstalledFeatures> {
        let mut targets: Vec<InstallTarget> = vec![InstallTarget::Usr];
        targets.extend(
            self.extensions
                .keys()
                .map(|name| InstallTarget::Extension(name.clone())),
        );
        for record in &records {
            if !targets.contains(&record.target) {
                targets.push(record.target.clone());
            }
        }

        let mut user_dirs = Vec::with_capacity(targets.len());
        for target in targets {
            let dir = self.features_dir(&target)?;
            user_dirs.push((target, dir));
        }

        Ok(InstalledFeatures {
            product_dir: Some(self.product_features_dir()),
            user_dirs,
            records,
            product_info,
        })
    }

    fn absolute(&self, location: &Path) -> PathBuf {
        if location.is_absolute() {
            location.to_path_buf()
        } else {
            self.install_dir.join(location)
        }
    }
}

/// Parse `key=value` lines, skipping blanks and `#`/`!` comments
fn parse_properties(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let (key, value) = line.split_once(['=', ':'])?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_usr_layout() {
        let layout = InstallLayout::new("/opt/wlp");
        assert_eq!(
            layout.features_dir(&InstallTarget::Usr).unwrap(),
            PathBuf::from("/opt/wlp/usr/extension/lib/features")
        );
        assert_eq!(layout.product_features_dir(), PathBuf::from("/opt/wlp/lib/features"));
        assert_eq!(layout.state_dir(), PathBuf::from("/opt/wlp/lib/.keel"));
    }

    #[test]
    fn test_extension_location_precedence() {
        let dir = tempdir().unwrap();
        let target = InstallTarget::Extension("ext".to_string());

        let layout = InstallLayout::new(dir.path());
        assert_eq!(layout.target_root(&target).unwrap(), dir.path().join("extensions/ext"));

        let properties = dir.path().join("etc/extensions/ext.properties");
        fs::create_dir_all(properties.parent().unwrap()).unwrap();
        fs::write(&properties, "# product\ncom.ibm.websphere.productInstall = products/ext\n").unwrap();
        assert_eq!(layout.target_root(&target).unwrap(), dir.path().join("products/ext"));

        let configured = layout.with_extensions(HashMap::from([(
            "ext".to_string(),
            PathBuf::from("/elsewhere/ext"),
        )]));
        assert_eq!(configured.target_root(&target).unwrap(), PathBuf::from("/elsewhere/ext"));
    }

    #[test]
    fn test_ensure_extension_writes_properties_once() {
        let dir = tempdir().unwrap();
        let layout = InstallLayout::new(dir.path());
        let target = InstallTarget::Extension("ext".to_string());

        let root = layout.ensure_target(&target).unwrap();
        assert!(root.join("lib/features").is_dir());

        let properties = dir.path().join("etc/extensions/ext.properties");
        let text = fs::read_to_string(&properties).unwrap();
        assert!(text.contains("com.ibm.websphere.productInstall=extensions/ext"));

        fs::write(&properties, "com.ibm.websphere.productInstall=custom\n").unwrap();
        layout.ensure_target(&target).unwrap();
        assert_eq!(
            fs::read_to_string(&properties).unwrap(),
            "com.ibm.websphere.productInstall=custom\n"
        );
    }

    #[test]
    fn test_installed_features_include_record_targets() {
        let layout = InstallLayout::new("/opt/wlp");
        let manifest = keel_core::types::FeatureManifest::new("x.a-1.0", "a-1.0", Version::new(1, 0, 0));
        let record = InstalledFeatureRecord::new(
            &manifest,
            InstallTarget::Extension("ext".to_string()),
            Vec::new(),
        );

        let installed = layout.installed_features(vec![record], Vec::new()).unwrap();
        assert_eq!(installed.user_dirs.len(), 2);
        assert_eq!(installed.product_dir, Some(PathBuf::from("/opt/wlp/lib/features")));
    }
}
