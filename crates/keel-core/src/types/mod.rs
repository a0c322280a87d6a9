//! Core data types for keel feature resolution.
//!
//! This module provides the fundamental types used throughout keel:
//! - Version and Platform ordering
//! - Feature manifests and request tokens
//! - The resolution request, installed records and the report

pub mod manifest;
pub mod platform;
pub mod record;
pub mod report;
pub mod request;
pub mod token;
pub mod version;

// Re-export all public types
pub use manifest::{default_short_name, versionless_name, ContentEntry, FeatureId, FeatureManifest};
pub use platform::Platform;
pub use record::{InstalledFeatureRecord, InstalledFile};
pub use report::{
    FeatureOutcome, FeatureState, InstallFailure, ResolutionReport, UnresolvedReason,
    UnresolvedToken, VerificationIssue, VerificationOutcome, VersionConflict,
};
pub use request::{InstallTarget, ResolutionRequest, TrustedKey, VerificationPolicy, VerifyLevel};
pub use token::FeatureToken;
pub use version::{Version, VersionError};
