//! Resolution report: the only value handed back to the caller.
//!
//! Every per-token and per-feature failure ends up here as a tagged variant
//! so the caller can match exhaustively and surface distinct diagnostics.

use super::{FeatureId, FeatureToken, Platform};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};

/// Aggregated outcome of one resolution/installation invocation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionReport {
    /// Active platforms used for versionless resolution
    pub platforms: Vec<Platform>,
    /// Closure members keyed by lowercased symbolic name, in traversal order
    pub features: IndexMap<String, FeatureOutcome>,
    pub unresolved: Vec<UnresolvedToken>,
    pub conflicts: Vec<VersionConflict>,
    /// Verification outcome per to-install feature, keyed like `features`
    pub verification: IndexMap<String, VerificationOutcome>,
    /// Recoverable catalog problems (skipped manifests, unreadable sources)
    pub warnings: Vec<String>,
}

/// A closure member and where it ended up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureOutcome {
    pub feature: FeatureId,
    pub state: FeatureState,
}

/// Per-feature state after resolution and installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum FeatureState {
    /// Resolved, waiting for verification and installation
    ToInstall,
    AlreadyInstalled,
    Installed { files: usize },
    /// Written to a repository index by prepare mode
    Prepared,
    VerificationRejected(VerificationIssue),
    InstallFailed(InstallFailure),
}

/// A requested or dependency token that did not resolve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedToken {
    pub token: FeatureToken,
    /// Symbolic name of the feature that declared the dependency, if any
    pub required_by: Option<String>,
    pub reason: UnresolvedReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Versionless token with no active platform
    PlatformUndetermined,
    /// No candidate satisfies any active platform
    NoMatch { platforms: Vec<Platform> },
    /// No feature with this name exists in any source
    NotFound,
}

/// Two versions of the same feature were required
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionConflict {
    /// Versionless base name shared by both features
    pub name: String,
    /// Version that stays (already installed or first resolved)
    pub kept: FeatureId,
    /// Version that was requested but not installed
    pub rejected: FeatureId,
}

/// Result of checking one artifact against the verification policy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "issue", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// Policy `none`
    Skipped,
    /// The manifest declares no signing metadata
    Unsigned,
    Verified { key_id: String },
    /// Policy `warn`: problem reported, installation proceeds
    Warned(VerificationIssue),
    /// Policy `enforce`: feature excluded from installation
    Rejected(VerificationIssue),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VerificationIssue {
    MissingSignature { locator: String },
    KeyIdMismatch { expected: String, provided: String },
    /// A trusted key URL was configured without a key id
    MissingKeyId { url: String },
    /// The manifest requires a key that no configured key provides
    UnknownKey { key_id: String },
    KeyUnavailable { url: String, message: String },
    BadSignature { key_id: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum InstallFailure {
    /// Content copy failed; this feature's partial writes were rolled back
    Partial(String),
    /// The artifact could not be fetched from its source
    Fetch(String),
    LicenseNotAccepted(String),
    /// A dependency of this feature failed, so it was not installed
    DependencyFailed(String),
}

impl ResolutionReport {
    /// Record a resolved closure member
    pub fn add_feature(&mut self, feature: FeatureId, state: FeatureState) {
        self.features.insert(
            feature.symbolic_name.to_ascii_lowercase(),
            FeatureOutcome { feature, state },
        );
    }

    /// Move a feature to a new state
    pub fn set_state(&mut self, symbolic_name: &str, state: FeatureState) {
        if let Some(outcome) = self.features.get_mut(&symbolic_name.to_ascii_lowercase()) {
            outcome.state = state;
        }
    }

    /// State of a feature by symbolic name
    pub fn state_of(&self, symbolic_name: &str) -> Option<&FeatureState> {
        self.features
            .get(&symbolic_name.to_ascii_lowercase())
            .map(|outcome| &outcome.state)
    }

    fn in_state(&self, predicate: impl Fn(&FeatureState) -> bool) -> Vec<&FeatureId> {
        self.features
            .values()
            .filter(|outcome| predicate(&outcome.state))
            .map(|outcome| &outcome.feature)
            .collect()
    }

    /// Features installed by this invocation
    pub fn newly_installed(&self) -> Vec<&FeatureId> {
        self.in_state(|state| matches!(state, FeatureState::Installed { .. }))
    }

    /// Features that were present before this invocation
    pub fn already_installed(&self) -> Vec<&FeatureId> {
        self.in_state(|state| matches!(state, FeatureState::AlreadyInstalled))
    }

    /// Final installed set: already present plus newly installed
    pub fn installed(&self) -> Vec<&FeatureId> {
        self.in_state(|state| {
            matches!(
                state,
                FeatureState::AlreadyInstalled | FeatureState::Installed { .. }
            )
        })
    }

    /// Features still waiting to be installed
    pub fn to_install(&self) -> Vec<&FeatureId> {
        self.in_state(|state| matches!(state, FeatureState::ToInstall))
    }

    pub fn prepared(&self) -> Vec<&FeatureId> {
        self.in_state(|state| matches!(state, FeatureState::Prepared))
    }

    pub fn rejected(&self) -> Vec<&FeatureId> {
        self.in_state(|state| matches!(state, FeatureState::VerificationRejected(_)))
    }

    pub fn failed(&self) -> Vec<&FeatureId> {
        self.in_state(|state| matches!(state, FeatureState::InstallFailed(_)))
    }

    /// Verification problems reported under `warn`
    pub fn verification_warnings(&self) -> Vec<(&str, &VerificationIssue)> {
        self.verification
            .iter()
            .filter_map(|(name, outcome)| match outcome {
                VerificationOutcome::Warned(issue) => Some((name.as_str(), issue)),
                _ => None,
            })
            .collect()
    }

    /// Tokens that failed because no platform could be determined
    pub fn platform_undetermined(&self) -> Vec<&FeatureToken> {
        self.unresolved
            .iter()
            .filter(|u| u.reason == UnresolvedReason::PlatformUndetermined)
            .map(|u| &u.token)
            .collect()
    }

    /// Check whether anything requested did not end up installed
    pub fn has_failures(&self) -> bool {
        !self.unresolved.is_empty()
            || !self.conflicts.is_empty()
            || !self.rejected().is_empty()
            || !self.failed().is_empty()
    }

    /// Render the textual report consumed by the caller
    pub fn render(&self) -> String {
        let mut out = String::new();
        let names = |ids: Vec<&FeatureId>| {
            ids.iter()
                .map(|id| id.short_name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };

        if !self.platforms.is_empty() {
            let platforms: Vec<String> = self.platforms.iter().map(ToString::to_string).collect();
            let _ = writeln!(out, "Platforms: {}", platforms.join(", "));
        }
        let newly = self.newly_installed();
        if !newly.is_empty() {
            let _ = writeln!(out, "Installed features: {}", names(newly));
        }
        let prepared = self.prepared();
        if !prepared.is_empty() {
            let _ = writeln!(out, "Prepared features: {}", names(prepared));
        }
        let already = self.already_installed();
        if !already.is_empty() {
            let _ = writeln!(out, "Already installed: {}", names(already));
        }

        let undetermined = self.platform_undetermined();
        if !undetermined.is_empty() {
            let tokens: Vec<&str> = undetermined.iter().map(|t| t.as_str()).collect();
            let _ = writeln!(
                out,
                "The platform could not be determined. The following versionless features cannot be installed: [{}]",
                tokens.join(", ")
            );
        }
        for unresolved in &self.unresolved {
            if unresolved.reason != UnresolvedReason::PlatformUndetermined {
                let _ = writeln!(out, "{}", unresolved);
            }
        }
        for conflict in &self.conflicts {
            let _ = writeln!(out, "{}", conflict);
        }
        for (name, issue) in self.verification_warnings() {
            let _ = writeln!(out, "Verification warning for {}: {}", name, issue);
        }
        for outcome in self.features.values() {
            match &outcome.state {
                FeatureState::VerificationRejected(issue) => {
                    let _ = writeln!(
                        out,
                        "Feature {} was not installed because signature verification failed: {}",
                        outcome.feature.short_name, issue
                    );
                },
                FeatureState::InstallFailed(failure) => {
                    let _ = writeln!(
                        out,
                        "Feature {} failed to install: {}",
                        outcome.feature.short_name, failure
                    );
                },
                _ => {},
            }
        }
        for warning in &self.warnings {
            let _ = writeln!(out, "Warning: {}", warning);
        }
        out
    }
}

impl fmt::Display for UnresolvedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            UnresolvedReason::PlatformUndetermined => write!(
                f,
                "The platform could not be determined. The following versionless features cannot be installed: [{}]",
                self.token
            )?,
            UnresolvedReason::NoMatch { platforms } => {
                let platforms: Vec<String> = platforms.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "Feature '{}' is not available for platform(s) [{}]",
                    self.token,
                    platforms.join(", ")
                )?
            },
            UnresolvedReason::NotFound => write!(f, "Feature '{}' could not be found", self.token)?,
        }
        if let Some(parent) = &self.required_by {
            write!(f, " (required by {})", parent)?;
        }
        Ok(())
    }
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Version conflict for '{}': {} ({}) was not installed because {} ({}) is already required",
            self.name,
            self.rejected.short_name,
            self.rejected.version,
            self.kept.short_name,
            self.kept.version
        )
    }
}

impl fmt::Display for VerificationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VerificationIssue::MissingSignature { locator } => {
                write!(f, "the signature file {} is missing", locator)
            },
            VerificationIssue::KeyIdMismatch { expected, provided } => write!(
                f,
                "the key ID {} does not match the expected key ID {}",
                provided, expected
            ),
            VerificationIssue::MissingKeyId { url } => write!(
                f,
                "the key at {} has no key ID; a key ID is required when verification is enforced",
                url
            ),
            VerificationIssue::UnknownKey { key_id } => {
                write!(f, "no trusted key is configured for key ID {}", key_id)
            },
            VerificationIssue::KeyUnavailable { url, message } => {
                write!(f, "the key at {} could not be read: {}", url, message)
            },
            VerificationIssue::BadSignature { key_id, message } => {
                write!(f, "the signature does not verify with key ID {}: {}", key_id, message)
            },
        }
    }
}

impl fmt::Display for InstallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallFailure::Partial(message) => {
                write!(f, "{} (partially copied files were removed)", message)
            },
            InstallFailure::Fetch(message) => write!(f, "artifact could not be fetched: {}", message),
            InstallFailure::LicenseNotAccepted(license) => {
                write!(f, "license {} was not accepted", license)
            },
            InstallFailure::DependencyFailed(name) => {
                write!(f, "dependency {} was not installed", name)
            },
        }
    }
}
