//! Error types and result aliases for keel operations.
//!
//! `KeelError` covers the conditions that abort a whole invocation. Anything
//! that only affects one token or one feature is recorded in the
//! [`ResolutionReport`](crate::types::ResolutionReport) instead.

use thiserror::Error;

/// Unified error type for fatal keel failures
#[derive(Error, Debug)]
pub enum KeelError {
    // Config errors
    #[error("Failed to parse keel.toml: {message}")]
    TomlParse { message: String },

    #[error("Configuration field '{field}' is invalid: {reason}")]
    ConfigValidation { field: String, reason: String },

    // Catalog errors
    #[error("No feature source could be read: {message}")]
    CatalogUnavailable { message: String },

    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    // Installed state errors
    #[error("Installed feature index at {path} is corrupt: {reason}")]
    StateCorruption { path: String, reason: String },

    #[error("'{command}' did not finish within {timeout_secs}s")]
    ProcessTimeout { command: String, timeout_secs: u64 },

    #[error("'{command}' failed: {message}")]
    ProcessFailed { command: String, message: String },

    #[error("Feature '{name}' is not installed")]
    NotInstalled { name: String },

    #[error("Path '{path}' escapes the installation directory")]
    UnsafePath { path: String },

    // IO errors
    #[error("IO error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type alias for keel operations
pub type KeelResult<T> = Result<T, KeelError>;

impl KeelError {
    /// Create a network error from any error type
    pub fn network<E>(message: String, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Network {
            message,
            source: Some(Box::new(source)),
        }
    }

    /// Create an IO error from std::io::Error
    pub fn io(message: String, source: std::io::Error) -> Self {
        Self::Io { message, source }
    }

    /// Create a configuration validation error
    pub fn config(field: &str, reason: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(self, KeelError::Network { .. } | KeelError::Io { .. })
    }

    /// Get a user-friendly suggestion for fixing this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            KeelError::CatalogUnavailable { .. } => {
                Some("Check the 'from' repository path, the ESA file list or the remote repository URL")
            },
            KeelError::Network { .. } => Some("Check your network connection and try again"),
            KeelError::StateCorruption { .. } => Some(
                "Restore lib/.keel/installed.json from a backup or remove it and reinstall the user features",
            ),
            KeelError::ProcessTimeout { .. } => {
                Some("Raise [product-info] timeout-secs or disable the product-info query")
            },
            KeelError::ConfigValidation { .. } | KeelError::TomlParse { .. } => {
                Some("Fix keel.toml and run the command again")
            },
            _ => None,
        }
    }
}

/// Per-entry catalog failure; the entry is skipped and a warning recorded
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    #[error("Malformed manifest in {origin}: {reason}")]
    MalformedManifest { origin: String, reason: String },

    #[error("Source {origin} could not be read: {reason}")]
    Unreachable { origin: String, reason: String },
}

impl CatalogError {
    /// Create a malformed manifest error
    pub fn malformed(origin: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedManifest {
            origin: origin.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_corruption_is_fatal_with_suggestion() {
        let err = KeelError::StateCorruption {
            path: "wlp/lib/.keel/installed.json".to_string(),
            reason: "expected value at line 1".to_string(),
        };
        assert!(!err.is_recoverable());
        assert!(err.suggestion().is_some());
        assert!(err.to_string().contains("installed.json"));
    }

    #[test]
    fn test_io_is_recoverable() {
        let err = KeelError::io(
            "read".to_string(),
            std::io::Error::new(std::io::ErrorKind::Other, "boom"),
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_catalog_error_message() {
        let err = CatalogError::malformed("bad.esa", "missing Subsystem-SymbolicName");
        assert_eq!(
            err.to_string(),
            "Malformed manifest in bad.esa: missing Subsystem-SymbolicName"
        );
    }
}
