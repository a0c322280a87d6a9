//! # keel-core
//!
//! Core types and utilities shared across all keel crates.
//!
//! This crate provides:
//! - Version and Platform types used to order features and platforms
//! - FeatureManifest and FeatureToken, the unit of resolution
//! - ResolutionRequest and ResolutionReport, the engine's boundary types
//! - KeelError for fatal, whole-invocation failures
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (Version, FeatureManifest, etc.)
//! - `error`: Error types and result aliases
//! - `utils`: Hashing and path helpers

pub mod error;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use error::{CatalogError, KeelError, KeelResult};
pub use types::{
    ContentEntry, FeatureManifest, FeatureToken, InstallTarget, InstalledFeatureRecord,
    Platform, ResolutionReport, ResolutionRequest, VerificationPolicy, Version,
};
