//! Installed feature query through the runtime's `productInfo` tool

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use keel_core::error::KeelError;
use keel_core::types::Version;
use tracing::{debug, info};
use wait_timeout::ChildExt;

use crate::InstallResult;

/// Default time allowed for one `productInfo featureInfo` run
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Runs `bin/productInfo featureInfo` and parses its listing
#[derive(Debug, Clone)]
pub struct ProductInfo {
    executable: PathBuf,
    timeout: Duration,
}

impl ProductInfo {
    /// Query tool of the installation rooted at `install_dir`
    pub fn new(install_dir: &Path, timeout: Duration) -> Self {
        let name = if cfg!(windows) { "productInfo.bat" } else { "productInfo" };
        Self {
            executable: install_dir.join("bin").join(name),
            timeout,
        }
    }

    pub fn is_available(&self) -> bool {
        self.executable.is_file()
    }

    /// Installed short names and versions.
    ///
    /// A missing tool yields an empty list. The child is killed when it
    /// runs past the timeout.
    pub fn installed_features(&self) -> InstallResult<Vec<(String, Option<Version>)>> {
        if !self.is_available() {
            debug!(path = %self.executable.display(), "productInfo not present");
            return Ok(Vec::new());
        }

        let command = format!("{} featureInfo", self.executable.display());
        let failed = |message: String| KeelError::ProcessFailed {
            command: command.clone(),
            message,
        };

        let mut child = Command::new(&self.executable)
            .arg("featureInfo")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| failed(e.to_string()))?;

        // Drain stdout concurrently so a full pipe cannot stall the child
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| failed("failed to capture stdout".to_string()))?;
        let reader = thread::spawn(move || {
            let mut output = String::new();
            stdout.read_to_string(&mut output).map(|_| output)
        });

        let status = match child.wait_timeout(self.timeout).map_err(|e| failed(e.to_string()))? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(KeelError::ProcessTimeout {
                    command,
                    timeout_secs: self.timeout.as_secs(),
                });
            },
        };

        let output = reader
            .join()
            .map_err(|_| failed("stdout reader panicked".to_string()))?
            .map_err(|e| failed(e.to_string()))?;
        if !status.success() {
            return Err(failed(format!("exited with {}", status)));
        }

        let features = parse_feature_info(&output);
        info!(features = features.len(), "productInfo reported installed features");
        Ok(features)
    }
}

/// Parse `featureInfo` lines of the form `name [version]`
pub fn parse_feature_info(output: &str) -> Vec<(String, Option<Version>)> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let name = parts.next()?;
            let version = parts
                .next()
                .map(|v| v.trim_start_matches('[').trim_end_matches(']'))
                .and_then(|v| v.parse::<Version>().ok());
            Some((name.to_string(), version))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feature_info() {
        let output = "servlet-4.0 [1.0.0]\n  jsp-2.3 [1.0.16]\n\nwebCache\n";
        let features = parse_feature_info(output);
        assert_eq!(features.len(), 3);
        assert_eq!(features[0], ("servlet-4.0".to_string(), Some(Version::new(1, 0, 0))));
        assert_eq!(features[1].1, Some(Version::new(1, 0, 16)));
        assert_eq!(features[2], ("webCache".to_string(), None));
    }

    #[test]
    fn test_missing_tool_reports_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let info = ProductInfo::new(dir.path(), DEFAULT_TIMEOUT);
        assert!(!info.is_available());
        assert!(info.installed_features().unwrap().is_empty());
    }

    #[cfg(unix)]
    fn script(dir: &Path, body: &str) {
        use std::os::unix::fs::PermissionsExt;

        let bin = dir.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let path = bin.join("productInfo");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_feature_info() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "[ \"$1\" = featureInfo ] || exit 2\necho 'servlet-4.0 [1.0.0]'");

        let features = ProductInfo::new(dir.path(), DEFAULT_TIMEOUT).installed_features().unwrap();
        assert_eq!(features, vec![("servlet-4.0".to_string(), Some(Version::new(1, 0, 0)))]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_fails() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "exit 3");
        let result = ProductInfo::new(dir.path(), DEFAULT_TIMEOUT).installed_features();
        assert!(matches!(result, Err(KeelError::ProcessFailed { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        script(dir.path(), "exec sleep 30");
        let result = ProductInfo::new(dir.path(), Duration::from_millis(200)).installed_features();
        assert!(matches!(result, Err(KeelError::ProcessTimeout { .. })));
    }
}
