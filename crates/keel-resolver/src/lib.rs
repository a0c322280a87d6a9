//! Feature resolution engine for keel
//!
//! This crate turns a [`ResolutionRequest`](keel_core::ResolutionRequest)
//! into a closure of concrete features: it picks the active platforms,
//! resolves versionless tokens against them and walks dependencies
//! breadth-first, recording conflicts and unresolved tokens in the report
//! instead of failing.

pub mod closure;
pub mod graph;
pub mod platform;
pub mod versionless;

// Re-export main types
pub use closure::{resolve, DependencyResolver, Resolution, ResolvedFeature};
pub use graph::FeatureGraph;
pub use platform::PlatformResolver;
pub use versionless::VersionlessResolver;
